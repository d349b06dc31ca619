//! Per-node directory layout.
//!
//! Node `i` lives in `<root>/<i>`. Nodes always occupy a contiguous prefix of
//! indices starting at zero, which is what lets [`NodeStore::count`] find the
//! cluster size by looking for the first missing directory.

use std::io;
use std::path::{Path, PathBuf};

use testbed_core::RepoConfig;

use crate::error::TestbedError;

/// Upper bound on the directory scan in [`NodeStore::count`].
pub const MAX_NODE_SCAN: usize = 2000;

const CONFIG_FILE: &str = "config";
const PID_FILE: &str = "daemon.pid";
const STDOUT_FILE: &str = "daemon.stdout";
const STDERR_FILE: &str = "daemon.stderr";

/// Maps node indices to their working directories under a single root.
#[derive(Debug, Clone)]
pub struct NodeStore {
    root: PathBuf,
}

impl NodeStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn node_dir(&self, node: usize) -> PathBuf {
        self.root.join(node.to_string())
    }

    pub fn config_path(&self, node: usize) -> PathBuf {
        self.node_dir(node).join(CONFIG_FILE)
    }

    pub fn pid_path(&self, node: usize) -> PathBuf {
        self.node_dir(node).join(PID_FILE)
    }

    pub fn stdout_path(&self, node: usize) -> PathBuf {
        self.node_dir(node).join(STDOUT_FILE)
    }

    pub fn stderr_path(&self, node: usize) -> PathBuf {
        self.node_dir(node).join(STDERR_FILE)
    }

    /// Whether node `node`'s directory exists.
    pub fn exists(&self, node: usize) -> bool {
        !matches!(
            std::fs::metadata(self.node_dir(node)),
            Err(ref e) if e.kind() == io::ErrorKind::NotFound
        )
    }

    /// Number of provisioned nodes.
    ///
    /// # Panics
    ///
    /// Panics if [`MAX_NODE_SCAN`] consecutive node directories exist. Init
    /// never creates that many, so hitting the limit means the root was
    /// populated by something else.
    pub fn count(&self) -> usize {
        for node in 0..MAX_NODE_SCAN {
            if !self.exists(node) {
                return node;
            }
        }
        panic!(
            "more than {MAX_NODE_SCAN} node directories under {}",
            self.root.display()
        );
    }

    /// Fail with `NodeNotFound` unless `node` is within the provisioned range.
    pub fn ensure_node(&self, node: usize) -> Result<(), TestbedError> {
        let count = self.count();
        if node < count {
            Ok(())
        } else {
            Err(TestbedError::NodeNotFound { node, count })
        }
    }

    /// Create node `node`'s directory (and the root, if needed).
    pub fn create_node_dir(&self, node: usize) -> io::Result<PathBuf> {
        let dir = self.node_dir(node);
        std::fs::create_dir_all(&dir)?;
        Ok(dir)
    }

    /// Delete the whole node set.
    pub fn remove_all(&self) -> io::Result<()> {
        match std::fs::remove_dir_all(&self.root) {
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            other => other,
        }
    }

    pub fn load_config(&self, node: usize) -> Result<RepoConfig, TestbedError> {
        let path = self.config_path(node);
        let bytes = std::fs::read(&path).map_err(|e| TestbedError::ConfigDocument {
            path: path.clone(),
            reason: e.to_string(),
        })?;
        RepoConfig::from_slice(&bytes).map_err(|e| TestbedError::ConfigDocument {
            path,
            reason: e.to_string(),
        })
    }

    pub fn write_config(&self, node: usize, config: &RepoConfig) -> Result<(), TestbedError> {
        let path = self.config_path(node);
        let bytes = config
            .to_canonical_bytes()
            .map_err(|e| TestbedError::ConfigDocument {
                path: path.clone(),
                reason: e.to_string(),
            })?;
        std::fs::write(&path, bytes).map_err(|e| TestbedError::ConfigDocument {
            path,
            reason: e.to_string(),
        })
    }

    /// Peer ID recorded in node `node`'s config.
    pub fn peer_id(&self, node: usize) -> Result<String, TestbedError> {
        let config = self.load_config(node)?;
        if config.identity.peer_id.is_empty() {
            return Err(TestbedError::ConfigDocument {
                path: self.config_path(node),
                reason: "Identity.PeerID is empty".into(),
            });
        }
        Ok(config.identity.peer_id)
    }

    /// Pid recorded for node `node`, or `None` if the file is absent or unreadable.
    pub fn read_pid(&self, node: usize) -> Option<u32> {
        let text = std::fs::read_to_string(self.pid_path(node)).ok()?;
        text.trim().parse().ok()
    }

    pub fn write_pid(&self, node: usize, pid: u32) -> io::Result<()> {
        std::fs::write(self.pid_path(node), pid.to_string())
    }

    /// Remove node `node`'s pid file; a missing file is not an error.
    pub fn remove_pid(&self, node: usize) -> io::Result<()> {
        match std::fs::remove_file(self.pid_path(node)) {
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            other => other,
        }
    }
}
