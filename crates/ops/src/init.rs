//! Parallel per-node repository initialization.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::process::Command;
use tokio::sync::Semaphore;
use tracing::{error, info};

use crate::config::DaemonConfig;
use crate::error::TestbedError;
use crate::store::NodeStore;

/// Creates a node's repository inside an empty working directory.
#[async_trait]
pub trait RepoInitializer: Send + Sync {
    async fn init_repo(&self, node: usize, dir: &Path) -> Result<(), TestbedError>;
}

/// Runs the daemon's own `init` subcommand with the repository variable
/// pointing at the node directory.
#[derive(Debug, Clone)]
pub struct CommandInitializer {
    daemon: DaemonConfig,
}

impl CommandInitializer {
    pub fn new(daemon: DaemonConfig) -> Self {
        Self { daemon }
    }
}

#[async_trait]
impl RepoInitializer for CommandInitializer {
    async fn init_repo(&self, node: usize, dir: &Path) -> Result<(), TestbedError> {
        let output = Command::new(&self.daemon.program)
            .args(&self.daemon.init_args)
            .current_dir(dir)
            .env_clear()
            .envs(self.daemon.environment(dir))
            .output()
            .await
            .map_err(|e| TestbedError::RepoInit {
                node,
                reason: format!("{}: {e}", self.daemon.program.display()),
            })?;

        if output.status.success() {
            return Ok(());
        }
        let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
        combined.push_str(&String::from_utf8_lossy(&output.stderr));
        Err(TestbedError::RepoInit {
            node,
            reason: format!("{} ({})", output.status, combined.trim()),
        })
    }
}

/// Outcome of one node's initialization.
#[derive(Debug)]
pub struct NodeInit {
    pub node: usize,
    pub dir: PathBuf,
    pub result: Result<(), TestbedError>,
}

/// Per-node outcomes of an init fan-out, ordered by node index.
#[derive(Debug, Default)]
pub struct InitReport {
    pub nodes: Vec<NodeInit>,
}

impl InitReport {
    /// Nodes whose initialization failed.
    pub fn failures(&self) -> impl Iterator<Item = &NodeInit> {
        self.nodes.iter().filter(|n| n.result.is_err())
    }

    /// True when every node initialized cleanly.
    pub fn is_complete(&self) -> bool {
        self.failures().next().is_none()
    }
}

/// Create directories `0..count` and initialize their repositories, at most
/// `concurrency` at a time.
///
/// A failing node never stops its siblings; each outcome is reported in the
/// returned [`InitReport`].
pub async fn initialize_all(
    store: &NodeStore,
    count: usize,
    initializer: Arc<dyn RepoInitializer>,
    concurrency: usize,
) -> InitReport {
    let permits = Arc::new(Semaphore::new(concurrency.max(1)));
    let mut handles = Vec::with_capacity(count);

    for node in 0..count {
        let dir = store.node_dir(node);
        let created = store.create_node_dir(node);
        let initializer = Arc::clone(&initializer);
        let permits = Arc::clone(&permits);
        let task_dir = dir.clone();

        let handle = tokio::spawn(init_one(node, created, task_dir, initializer, permits));
        handles.push((node, dir, handle));
    }

    let mut report = InitReport::default();
    for (node, dir, handle) in handles {
        let result = match handle.await {
            Ok(result) => result,
            Err(join) => Err(TestbedError::RepoInit {
                node,
                reason: format!("init task failed: {join}"),
            }),
        };
        match &result {
            Ok(()) => info!(node, dir = %dir.display(), "repository initialized"),
            Err(e) => error!(node, error = %e, "repository init failed"),
        }
        report.nodes.push(NodeInit { node, dir, result });
    }
    report
}

async fn init_one(
    node: usize,
    created: std::io::Result<PathBuf>,
    dir: PathBuf,
    initializer: Arc<dyn RepoInitializer>,
    permits: Arc<Semaphore>,
) -> Result<(), TestbedError> {
    created?;
    let _permit = permits
        .acquire_owned()
        .await
        .map_err(|e| TestbedError::RepoInit {
            node,
            reason: e.to_string(),
        })?;
    initializer.init_repo(node, &dir).await
}
