//! Cluster layout requested at init time and the address scheme derived from it.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Default first swarm port.
pub const DEFAULT_PORT_START: u16 = 4002;

/// Distance between a node's swarm port and its control-API port.
///
/// External tooling computes node addresses from this same offset, so it is
/// part of the on-disk contract.
pub const API_PORT_OFFSET: usize = 1000;

/// Largest cluster whose swarm and API port ranges cannot overlap.
pub const MAX_NODES: usize = API_PORT_OFFSET;

/// How nodes find their first peer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Bootstrap {
    /// Node 0 is the hub; every other node bootstraps against it.
    #[default]
    Star,
    /// No automatic peers.
    None,
}

impl Bootstrap {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Star => "star",
            Self::None => "none",
        }
    }
}

impl fmt::Display for Bootstrap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Bootstrap {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "star" => Ok(Self::Star),
            "none" => Ok(Self::None),
            other => Err(CoreError::UnsupportedTopology(other.to_owned())),
        }
    }
}

/// Immutable input to cluster initialization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterConfig {
    /// Number of nodes to provision.
    pub count: usize,
    /// Overwrite an existing node set without asking.
    pub force: bool,
    /// Bootstrap strategy.
    pub bootstrap: Bootstrap,
    /// First swarm port; node `i` listens on `port_start + i`.
    pub port_start: u16,
    /// Enable multicast discovery on every node.
    pub mdns: bool,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            count: 0,
            force: false,
            bootstrap: Bootstrap::Star,
            port_start: DEFAULT_PORT_START,
            mdns: false,
        }
    }
}

impl ClusterConfig {
    /// Create a new builder for `ClusterConfig`.
    pub fn builder() -> ClusterConfigBuilder {
        ClusterConfigBuilder::default()
    }

    /// Check the sizing invariants that must hold before anything touches disk.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.count == 0 {
            return Err(CoreError::InvalidCluster(
                "node count must be at least 1".into(),
            ));
        }
        if self.count > MAX_NODES {
            return Err(CoreError::InvalidCluster(format!(
                "node count {} exceeds the maximum of {MAX_NODES}",
                self.count
            )));
        }
        let highest = self.api_port(self.count - 1);
        if highest > usize::from(u16::MAX) {
            return Err(CoreError::InvalidCluster(format!(
                "port range starting at {} runs past 65535 (highest API port would be {highest})",
                self.port_start
            )));
        }
        Ok(())
    }

    /// Swarm port of node `index`.
    pub fn swarm_port(&self, index: usize) -> usize {
        usize::from(self.port_start) + index
    }

    /// Control-API port of node `index`.
    pub fn api_port(&self, index: usize) -> usize {
        self.swarm_port(index) + API_PORT_OFFSET
    }

    /// Swarm listen multiaddress of node `index` (all interfaces).
    pub fn swarm_addr(&self, index: usize) -> String {
        format!("/ip4/0.0.0.0/tcp/{}", self.swarm_port(index))
    }

    /// Control-API multiaddress of node `index` (loopback only).
    pub fn api_addr(&self, index: usize) -> String {
        format!("/ip4/127.0.0.1/tcp/{}", self.api_port(index))
    }
}

/// Builder for [`ClusterConfig`].
#[derive(Debug, Default)]
pub struct ClusterConfigBuilder {
    count: Option<usize>,
    force: Option<bool>,
    bootstrap: Option<Bootstrap>,
    port_start: Option<u16>,
    mdns: Option<bool>,
}

impl ClusterConfigBuilder {
    /// Set the number of nodes.
    #[must_use]
    pub fn count(mut self, count: usize) -> Self {
        self.count = Some(count);
        self
    }

    /// Overwrite existing nodes without prompting.
    #[must_use]
    pub fn force(mut self, force: bool) -> Self {
        self.force = Some(force);
        self
    }

    /// Set the bootstrap strategy.
    #[must_use]
    pub fn bootstrap(mut self, bootstrap: Bootstrap) -> Self {
        self.bootstrap = Some(bootstrap);
        self
    }

    /// Set the first swarm port.
    #[must_use]
    pub fn port_start(mut self, port: u16) -> Self {
        self.port_start = Some(port);
        self
    }

    /// Enable or disable multicast discovery.
    #[must_use]
    pub fn mdns(mut self, enabled: bool) -> Self {
        self.mdns = Some(enabled);
        self
    }

    /// Build the `ClusterConfig`.
    #[must_use]
    pub fn build(self) -> ClusterConfig {
        let defaults = ClusterConfig::default();
        ClusterConfig {
            count: self.count.unwrap_or(defaults.count),
            force: self.force.unwrap_or(defaults.force),
            bootstrap: self.bootstrap.unwrap_or(defaults.bootstrap),
            port_start: self.port_start.unwrap_or(defaults.port_start),
            mdns: self.mdns.unwrap_or(defaults.mdns),
        }
    }
}
