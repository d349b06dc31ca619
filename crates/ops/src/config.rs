//! Runtime configuration for the orchestration layer.

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::TestbedError;

/// Environment variable overriding the testbed root directory.
pub const ROOT_ENV: &str = "TESTBED_ROOT";

/// Environment variable overriding the daemon executable.
pub const DAEMON_ENV: &str = "TESTBED_DAEMON";

/// How to invoke the daemon under test.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DaemonConfig {
    /// Executable name or path.
    pub program: PathBuf,
    /// Variable that points the daemon at its repository directory.
    pub repo_env: String,
    /// Arguments for the one-time repository initialization.
    pub init_args: Vec<String>,
    /// Arguments that run the long-lived daemon.
    pub run_args: Vec<String>,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            program: PathBuf::from("ipfs"),
            repo_env: "IPFS_PATH".into(),
            init_args: vec!["init".into(), "-b=1024".into()],
            run_args: vec!["daemon".into()],
        }
    }
}

impl DaemonConfig {
    /// Environment for a daemon process scoped to `repo_dir`.
    ///
    /// The caller's `PATH` is kept so the daemon can find its own helpers;
    /// nothing else leaks in from the invoking shell.
    pub fn environment(&self, repo_dir: &Path) -> Vec<(String, String)> {
        let mut env = Vec::with_capacity(2);
        if let Ok(path) = std::env::var("PATH") {
            env.push(("PATH".to_owned(), path));
        }
        env.push((self.repo_env.clone(), repo_dir.display().to_string()));
        env
    }
}

/// Retry budget for readiness probes.
///
/// # Examples
///
/// ```
/// use testbed_ops::ProbeConfig;
///
/// let config = ProbeConfig::default();
/// assert_eq!(config.attempts, 50);
/// assert_eq!(config.budget().as_secs(), 10);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeConfig {
    /// Pause between attempts.
    pub interval: Duration,
    /// Attempts before giving up with a timeout.
    pub attempts: u32,
    /// Per-request HTTP timeout.
    pub request_timeout: Duration,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(200),
            attempts: 50,
            request_timeout: Duration::from_secs(2),
        }
    }
}

impl ProbeConfig {
    /// Total time spent sleeping if every attempt fails.
    pub fn budget(&self) -> Duration {
        self.interval * self.attempts
    }
}

/// Configuration shared by every testbed component.
#[derive(Debug, Clone)]
pub struct TestbedConfig {
    /// Directory holding one subdirectory per node.
    pub root: PathBuf,
    /// Daemon invocation.
    pub daemon: DaemonConfig,
    /// Readiness probe budget.
    pub probe: ProbeConfig,
    /// Upper bound on concurrent repository initializations.
    pub init_concurrency: usize,
    /// How long a stopping daemon gets after `SIGTERM` before `SIGKILL`.
    pub stop_grace: Duration,
}

impl TestbedConfig {
    /// Create a configuration rooted at `root` with defaults for everything else.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            daemon: DaemonConfig::default(),
            probe: ProbeConfig::default(),
            init_concurrency: 16,
            stop_grace: Duration::from_secs(10),
        }
    }

    /// Create configuration from environment variables.
    ///
    /// Reads:
    /// - `TESTBED_ROOT` (optional, defaults to `$HOME/testbed`)
    /// - `HOME` (required when `TESTBED_ROOT` is unset)
    /// - `TESTBED_DAEMON` (optional, defaults to `ipfs`)
    pub fn from_env() -> Result<Self, TestbedError> {
        Self::from_env_with(None, None)
    }

    /// Like [`TestbedConfig::from_env`], but explicit values win over the
    /// environment.
    pub fn from_env_with(
        root: Option<PathBuf>,
        daemon: Option<PathBuf>,
    ) -> Result<Self, TestbedError> {
        let root = resolve_root(
            root,
            std::env::var(ROOT_ENV).ok(),
            std::env::var("HOME").ok(),
        )?;
        let mut config = Self::new(root);
        let program = daemon.or_else(|| {
            std::env::var_os(DAEMON_ENV)
                .filter(|p| !p.is_empty())
                .map(PathBuf::from)
        });
        if let Some(program) = program {
            config.daemon.program = program;
        }
        Ok(config)
    }

    /// Override the whole daemon invocation.
    #[must_use]
    pub fn with_daemon(mut self, daemon: DaemonConfig) -> Self {
        self.daemon = daemon;
        self
    }

    /// Override the probe budget.
    #[must_use]
    pub fn with_probe(mut self, probe: ProbeConfig) -> Self {
        self.probe = probe;
        self
    }

    /// Override the init fan-out width.
    #[must_use]
    pub fn with_init_concurrency(mut self, width: usize) -> Self {
        self.init_concurrency = width.max(1);
        self
    }

    /// Override the stop grace period.
    #[must_use]
    pub fn with_stop_grace(mut self, grace: Duration) -> Self {
        self.stop_grace = grace;
        self
    }
}

/// Pick the testbed root: explicit override, then `TESTBED_ROOT`, then `$HOME/testbed`.
pub fn resolve_root(
    explicit: Option<PathBuf>,
    root_env: Option<String>,
    home: Option<String>,
) -> Result<PathBuf, TestbedError> {
    if let Some(root) = explicit {
        return Ok(root);
    }
    if let Some(root) = root_env.filter(|r| !r.is_empty()) {
        return Ok(PathBuf::from(root));
    }
    match home.filter(|h| !h.is_empty()) {
        Some(home) => Ok(Path::new(&home).join("testbed")),
        None => Err(TestbedError::Configuration(format!(
            "could not find home directory; set {ROOT_ENV}"
        ))),
    }
}
