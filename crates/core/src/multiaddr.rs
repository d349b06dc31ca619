//! The small slice of multiaddress handling the testbed needs.
//!
//! Only the "thin waist" form `/<ip4|ip6|dns|dns4|dns6>/<host>/tcp/<port>` is
//! understood. That is what the daemon writes for its API and swarm
//! listeners, and what the topology step writes back.

use crate::error::CoreError;

fn invalid(addr: &str, reason: impl Into<String>) -> CoreError {
    CoreError::InvalidAddress {
        addr: addr.to_owned(),
        reason: reason.into(),
    }
}

/// Convert a TCP multiaddress into a `host:port` string suitable for an HTTP URL.
pub fn dial_addr(addr: &str) -> Result<String, CoreError> {
    let parts: Vec<&str> = addr.split('/').collect();
    let [empty, proto, host, transport, port] = parts.as_slice() else {
        return Err(invalid(addr, "expected /<proto>/<host>/tcp/<port>"));
    };
    if !empty.is_empty() {
        return Err(invalid(addr, "multiaddress must start with '/'"));
    }
    if *transport != "tcp" {
        return Err(invalid(addr, format!("unsupported transport {transport:?}")));
    }
    let port: u16 = port
        .parse()
        .map_err(|_| invalid(addr, format!("bad port {port:?}")))?;
    if host.is_empty() {
        return Err(invalid(addr, "empty host"));
    }

    match *proto {
        "ip4" | "dns" | "dns4" | "dns6" => Ok(format!("{host}:{port}")),
        "ip6" => Ok(format!("[{host}]:{port}")),
        other => Err(invalid(addr, format!("unsupported protocol {other:?}"))),
    }
}

/// Replace wildcard bind hosts with loopback so the address is dialable on
/// the same machine.
pub fn rewrite_wildcard(addr: &str) -> String {
    addr.split('/')
        .map(|segment| match segment {
            "0.0.0.0" => "127.0.0.1",
            "::" => "::1",
            other => other,
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// Bootstrap list entry pointing at `peer_id` listening on `swarm_addr`.
pub fn bootstrap_entry(swarm_addr: &str, peer_id: &str) -> String {
    format!("{}/ipfs/{peer_id}", rewrite_wildcard(swarm_addr))
}
