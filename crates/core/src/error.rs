use thiserror::Error;

/// Errors raised while validating cluster layouts or parsing addresses.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// The requested bootstrap strategy is not one of `star` or `none`.
    #[error("unsupported bootstrap strategy: {0}")]
    UnsupportedTopology(String),

    /// The cluster layout violates a sizing or port-range invariant.
    #[error("invalid cluster layout: {0}")]
    InvalidCluster(String),

    /// A multiaddress could not be turned into a dialable `host:port`.
    #[error("invalid address {addr:?}: {reason}")]
    InvalidAddress {
        /// The offending address string.
        addr: String,
        /// Why it was rejected.
        reason: String,
    },
}
