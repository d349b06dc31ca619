//! The daemon's per-node configuration document.
//!
//! The daemon owns this file; the testbed only reads and rewrites a handful
//! of fields. Everything else (private key, datastore settings, sections a
//! newer daemon adds) is carried through the `extra` maps untouched.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// Treat an explicit JSON `null` the same as a missing field.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Root of the configuration document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RepoConfig {
    #[serde(default)]
    pub identity: Identity,
    #[serde(default)]
    pub addresses: Addresses,
    /// Peers dialled at startup, as `<multiaddr>/ipfs/<peer id>`.
    #[serde(default, deserialize_with = "null_as_default")]
    pub bootstrap: Vec<String>,
    #[serde(default)]
    pub discovery: Discovery,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Identity {
    /// Assigned by the daemon's init; never rewritten by the testbed.
    #[serde(rename = "PeerID", default)]
    pub peer_id: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Addresses {
    #[serde(rename = "Swarm", default, deserialize_with = "null_as_default")]
    pub swarm: Vec<String>,
    #[serde(rename = "API", default, deserialize_with = "null_as_default")]
    pub api: String,
    /// An empty string disables the HTTP gateway.
    #[serde(rename = "Gateway", default, deserialize_with = "null_as_default")]
    pub gateway: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Discovery {
    #[serde(rename = "MDNS", default)]
    pub mdns: Mdns,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Mdns {
    #[serde(rename = "Enabled", default)]
    pub enabled: bool,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl RepoConfig {
    /// Parse a configuration document.
    pub fn from_slice(bytes: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(bytes)
    }

    /// Serialize in the canonical on-disk form: pretty-printed, trailing newline.
    ///
    /// The output depends only on the document's contents, so writing the
    /// same document twice produces identical bytes.
    pub fn to_canonical_bytes(&self) -> serde_json::Result<Vec<u8>> {
        let mut bytes = serde_json::to_vec_pretty(self)?;
        bytes.push(b'\n');
        Ok(bytes)
    }

    /// The first swarm listen address, if any.
    pub fn primary_swarm_addr(&self) -> Option<&str> {
        self.addresses.swarm.first().map(String::as_str)
    }
}
