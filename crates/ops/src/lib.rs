//! Lifecycle operations for a local cluster of peer-to-peer daemons.
//!
//! Provisions node repositories under a single root, wires them into a
//! bootstrap topology, and starts, probes, and stops their daemons. The
//! `testbed` binary is a thin layer over [`Testbed`].

mod config;
mod error;
mod init;
mod probe;
mod store;
mod supervisor;
mod testbed;
mod topology;

pub use config::{DAEMON_ENV, DaemonConfig, ProbeConfig, ROOT_ENV, TestbedConfig, resolve_root};
pub use error::TestbedError;
pub use init::{CommandInitializer, InitReport, NodeInit, RepoInitializer, initialize_all};
pub use probe::{LivenessRecord, Prober};
pub use store::{MAX_NODE_SCAN, NodeStore};
pub use supervisor::{StartedNode, StopReport, Supervisor};
pub use testbed::{Attribute, ShellLaunch, Testbed};
pub use topology::{NodeNetwork, configure as configure_topology};

/// Re-export core types for consumers.
pub use testbed_core;
