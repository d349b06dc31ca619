//! Core types for the local peer-to-peer testbed.
//!
//! Everything in this crate is plain data: the cluster layout requested by
//! the operator, the address scheme derived from it, the daemon's on-disk
//! configuration document, and the control-API payloads the readiness
//! checks decode. No I/O happens here.

pub mod api;
pub mod cluster;
pub mod error;
pub mod multiaddr;
pub mod node;
pub mod repo_config;

pub use api::{IDENTITY_PATH, IdResponse, SWARM_PEERS_PATH, SwarmPeersResponse};
pub use cluster::{
    API_PORT_OFFSET, Bootstrap, ClusterConfig, ClusterConfigBuilder, DEFAULT_PORT_START,
    MAX_NODES,
};
pub use error::CoreError;
pub use multiaddr::{bootstrap_entry, dial_addr, rewrite_wildcard};
pub use node::NodeState;
pub use repo_config::{Addresses, Discovery, Identity, Mdns, RepoConfig};
