use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use testbed_core::ClusterConfig;
use tracing::{info, warn};

use crate::config::TestbedConfig;
use crate::error::TestbedError;
use crate::init::{CommandInitializer, InitReport, RepoInitializer, initialize_all};
use crate::probe::Prober;
use crate::store::NodeStore;
use crate::supervisor::{StartedNode, StopReport, Supervisor};
use crate::topology;

/// Node attributes readable through [`Testbed::get`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Attribute {
    /// The node's peer identity.
    Id,
}

impl FromStr for Attribute {
    type Err = TestbedError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "id" => Ok(Self::Id),
            other => Err(TestbedError::UnknownAttribute(other.to_owned())),
        }
    }
}

impl fmt::Display for Attribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Id => f.write_str("id"),
        }
    }
}

/// An interactive shell scoped to one node, ready to replace the current process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShellLaunch {
    pub program: PathBuf,
    pub env: Vec<(String, String)>,
}

impl ShellLaunch {
    /// Replace the current process image with the shell.
    ///
    /// Only returns if the exec itself fails.
    #[cfg(unix)]
    pub fn exec(&self) -> std::io::Error {
        use std::os::unix::process::CommandExt;

        std::process::Command::new(&self.program)
            .env_clear()
            .envs(self.env.iter().map(|(k, v)| (k, v)))
            .exec()
    }
}

/// Lifecycle orchestrator for a local cluster of daemons.
///
/// Every operation works off the node directories under the configured root;
/// nothing is remembered between invocations except what is on disk.
pub struct Testbed {
    config: TestbedConfig,
    store: NodeStore,
    supervisor: Supervisor,
    prober: Prober,
    initializer: Arc<dyn RepoInitializer>,
}

impl Testbed {
    pub fn new(config: TestbedConfig) -> Result<Self, TestbedError> {
        let store = NodeStore::new(&config.root);
        let supervisor = Supervisor::new(store.clone(), config.daemon.clone(), config.stop_grace);
        let prober = Prober::new(config.probe)?;
        let initializer = Arc::new(CommandInitializer::new(config.daemon.clone()));
        Ok(Self {
            config,
            store,
            supervisor,
            prober,
            initializer,
        })
    }

    /// Replace the repository initializer used by [`Testbed::init`].
    #[must_use]
    pub fn with_initializer(mut self, initializer: Arc<dyn RepoInitializer>) -> Self {
        self.initializer = initializer;
        self
    }

    pub fn config(&self) -> &TestbedConfig {
        &self.config
    }

    pub fn store(&self) -> &NodeStore {
        &self.store
    }

    pub fn supervisor(&self) -> &Supervisor {
        &self.supervisor
    }

    /// Provision `cluster.count` fresh nodes and wire them together.
    ///
    /// An existing node set is only replaced when `cluster.force` is set or
    /// `confirm` agrees; otherwise this fails with
    /// [`TestbedError::AlreadyExists`] and leaves the root untouched.
    pub async fn init(
        &self,
        cluster: &ClusterConfig,
        confirm: impl FnOnce(&Path) -> bool,
    ) -> Result<InitReport, TestbedError> {
        cluster.validate()?;

        if self.store.exists(0) {
            if !cluster.force && !confirm(self.store.root()) {
                return Err(TestbedError::AlreadyExists(self.store.root().to_path_buf()));
            }
            info!(root = %self.store.root().display(), "removing existing nodes");
            self.store.remove_all()?;
        }

        let report = initialize_all(
            &self.store,
            cluster.count,
            Arc::clone(&self.initializer),
            self.config.init_concurrency,
        )
        .await;
        let failed = report.failures().count();
        if failed > 0 {
            warn!(failed, nodes = cluster.count, "some repositories failed to initialize");
        }

        topology::configure(&self.store, cluster)?;
        Ok(report)
    }

    /// Start every node; see [`Supervisor::start_all`].
    pub async fn start(&self, wait_all: bool) -> Result<Vec<StartedNode>, TestbedError> {
        self.supervisor.start_all(&self.prober, wait_all).await
    }

    /// Stop every node, collecting per-node outcomes.
    pub async fn stop(&self) -> StopReport {
        self.supervisor.stop_all().await
    }

    /// Stop everything, then start everything. Stop failures are logged only.
    pub async fn restart(&self, wait_all: bool) -> Result<Vec<StartedNode>, TestbedError> {
        let report = self.stop().await;
        for (node, err) in report.hard_failures() {
            warn!(node, error = %err, "stop failed during restart");
        }
        self.start(wait_all).await
    }

    /// Read `attr` for node `node`.
    pub fn get(&self, attr: &str, node: usize) -> Result<String, TestbedError> {
        let attr: Attribute = attr.parse()?;
        self.store.ensure_node(node)?;
        match attr {
            Attribute::Id => self.store.peer_id(node),
        }
    }

    /// Prepare a shell whose environment targets node `node`.
    ///
    /// The repository variable points at the node's directory and `NODE<i>`
    /// holds each node's peer ID. `shell` is the program to run, normally the
    /// caller's `$SHELL`.
    pub fn shell(&self, node: usize, shell: Option<String>) -> Result<ShellLaunch, TestbedError> {
        let program = shell
            .filter(|s| !s.is_empty())
            .ok_or_else(|| TestbedError::Configuration("couldn't find shell; set SHELL".into()))?;
        self.store.ensure_node(node)?;

        let mut env: Vec<(String, String)> = std::env::vars_os()
            .filter_map(|(k, v)| Some((k.into_string().ok()?, v.into_string().ok()?)))
            .filter(|(k, _)| *k != self.config.daemon.repo_env)
            .collect();
        env.push((
            self.config.daemon.repo_env.clone(),
            self.store.node_dir(node).display().to_string(),
        ));
        for peer in 0..self.store.count() {
            env.push((format!("NODE{peer}"), self.store.peer_id(peer)?));
        }

        Ok(ShellLaunch {
            program: PathBuf::from(program),
            env,
        })
    }
}
