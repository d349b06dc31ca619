//! Control-API payloads decoded by the readiness checks.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Path of the identity endpoint.
pub const IDENTITY_PATH: &str = "/api/v0/id";

/// Path of the connected-peers endpoint.
pub const SWARM_PEERS_PATH: &str = "/api/v0/swarm/peers";

/// Response of the identity endpoint.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IdResponse {
    /// Peer ID the node is running as. `None` when the field is absent.
    #[serde(rename = "ID", default)]
    pub id: Option<String>,
}

/// Response of the connected-peers endpoint.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SwarmPeersResponse {
    /// One descriptor per connected peer; absent or `null` means none.
    #[serde(rename = "Strings", default)]
    pub strings: Option<Vec<Value>>,
}

impl SwarmPeersResponse {
    pub fn peer_count(&self) -> usize {
        self.strings.as_ref().map_or(0, Vec::len)
    }
}
