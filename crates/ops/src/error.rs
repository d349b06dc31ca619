//! Error types for the orchestration layer.

use std::path::PathBuf;

use testbed_core::CoreError;
use thiserror::Error;

/// Errors from testbed operations.
#[derive(Debug, Error)]
pub enum TestbedError {
    /// The runtime configuration or cluster layout is unusable.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Init found an existing node set and was not allowed to replace it.
    #[error("testbed nodes already exist under {0}")]
    AlreadyExists(PathBuf),

    /// Unknown bootstrap strategy.
    #[error("unrecognized bootstrapping option: {0}")]
    UnsupportedTopology(String),

    /// The daemon's one-time repository initialization failed.
    #[error("node {node}: repository init failed: {reason}")]
    RepoInit { node: usize, reason: String },

    /// The daemon could not be spawned or its pid could not be recorded.
    #[error("node {node}: failed to launch daemon: {reason}")]
    Launch { node: usize, reason: String },

    /// No recorded process for this node.
    #[error("node {0} is not running")]
    NotRunning(usize),

    /// `start` found a live process already recorded for this node.
    #[error("node {node} is already running (pid {pid})")]
    AlreadyRunning { node: usize, pid: u32 },

    /// The daemon could not be signalled or did not exit.
    #[error("node {node}: failed to stop daemon: {reason}")]
    Stop { node: usize, reason: String },

    /// The control API answered with a different identity than expected.
    #[error("liveness check failed at {addr}: expected peer {expected}, got {}", actual.as_deref().unwrap_or("no ID field"))]
    IdentityMismatch {
        addr: String,
        expected: String,
        actual: Option<String>,
    },

    /// The retry budget ran out before the node became ready.
    #[error("node at {addr} failed to {condition} in given time period ({attempts} attempts)")]
    Timeout {
        addr: String,
        condition: &'static str,
        attempts: u32,
    },

    /// The control API answered with a body that does not decode.
    #[error("liveness check failed at {addr}: {reason}")]
    UnexpectedResponse { addr: String, reason: String },

    /// A multiaddress in a node config is not dialable.
    #[error("invalid address {addr:?}: {reason}")]
    InvalidAddress { addr: String, reason: String },

    /// `get` was asked for an attribute it does not know.
    #[error("unrecognized attribute: {0}")]
    UnknownAttribute(String),

    /// The node index is outside the provisioned range.
    #[error("node {node} does not exist ({count} nodes provisioned)")]
    NodeNotFound { node: usize, count: usize },

    /// A node's config document could not be read, parsed, or written.
    #[error("config {path}: {reason}")]
    ConfigDocument { path: PathBuf, reason: String },

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<CoreError> for TestbedError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::UnsupportedTopology(name) => Self::UnsupportedTopology(name),
            CoreError::InvalidCluster(reason) => Self::Configuration(reason),
            CoreError::InvalidAddress { addr, reason } => Self::InvalidAddress { addr, reason },
        }
    }
}
