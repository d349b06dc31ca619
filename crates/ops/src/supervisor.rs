//! Daemon process lifecycle.
//!
//! The pid file is the only record that survives between invocations. A
//! child spawned by this invocation is also kept in memory so `stop` can
//! reap it directly instead of polling.

use std::collections::HashMap;
use std::fs::File;
use std::process::Stdio;
use std::time::Duration;

use nix::errno::Errno;
use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use parking_lot::Mutex;
use testbed_core::{NodeState, dial_addr};
use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

use crate::config::DaemonConfig;
use crate::error::TestbedError;
use crate::probe::Prober;
use crate::store::NodeStore;

const EXIT_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// A daemon launched by [`Supervisor::start_all`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StartedNode {
    pub node: usize,
    pub pid: u32,
}

/// Per-node outcomes of [`Supervisor::stop_all`].
#[derive(Debug, Default)]
pub struct StopReport {
    pub nodes: Vec<(usize, Result<(), TestbedError>)>,
}

impl StopReport {
    pub fn failures(&self) -> impl Iterator<Item = (usize, &TestbedError)> {
        self.nodes
            .iter()
            .filter_map(|(node, result)| result.as_ref().err().map(|e| (*node, e)))
    }

    /// Failures other than "this node was not running".
    pub fn hard_failures(&self) -> impl Iterator<Item = (usize, &TestbedError)> {
        self.failures()
            .filter(|(_, e)| !matches!(e, TestbedError::NotRunning(_)))
    }
}

/// Starts and stops node daemons.
#[derive(Debug)]
pub struct Supervisor {
    store: NodeStore,
    daemon: DaemonConfig,
    stop_grace: Duration,
    children: Mutex<HashMap<usize, Child>>,
}

impl Supervisor {
    pub fn new(store: NodeStore, daemon: DaemonConfig, stop_grace: Duration) -> Self {
        Self {
            store,
            daemon,
            stop_grace,
            children: Mutex::new(HashMap::new()),
        }
    }

    /// Current state of node `node`, judged from its pid file.
    pub fn state(&self, node: usize) -> NodeState {
        match self.store.read_pid(node) {
            Some(pid) if self.is_alive(node, pid) => NodeState::Running,
            _ => NodeState::Stopped,
        }
    }

    /// Launch node `node`'s daemon and record its pid.
    ///
    /// Fails with [`TestbedError::AlreadyRunning`] if the recorded pid is
    /// still alive. A stale pid file left by a daemon that died on its own is
    /// removed and the node is started.
    pub async fn start(&self, node: usize) -> Result<u32, TestbedError> {
        self.store.ensure_node(node)?;
        if let Some(pid) = self.store.read_pid(node) {
            if self.is_alive(node, pid) {
                return Err(TestbedError::AlreadyRunning { node, pid });
            }
            warn!(node, pid, "removing stale pid file");
            self.children.lock().remove(&node);
            self.store.remove_pid(node)?;
        }
        debug!(node, state = %NodeState::Starting, "launching daemon");

        let launch = |reason: String| TestbedError::Launch { node, reason };
        let dir = self.store.node_dir(node);
        let stdout = File::create(self.store.stdout_path(node))
            .map_err(|e| launch(e.to_string()))?;
        let stderr = File::create(self.store.stderr_path(node))
            .map_err(|e| launch(e.to_string()))?;

        let mut child = Command::new(&self.daemon.program)
            .args(&self.daemon.run_args)
            .current_dir(&dir)
            .env_clear()
            .envs(self.daemon.environment(&dir))
            .stdin(Stdio::null())
            .stdout(Stdio::from(stdout))
            .stderr(Stdio::from(stderr))
            .process_group(0)
            .spawn()
            .map_err(|e| launch(format!("{}: {e}", self.daemon.program.display())))?;

        let Some(pid) = child.id() else {
            let status = child.wait().await.map_err(|e| launch(e.to_string()))?;
            return Err(launch(format!("daemon exited immediately ({status})")));
        };

        if let Err(e) = self.store.write_pid(node, pid) {
            // Never leave a daemon running that no later stop can find.
            if let Err(kill_err) = child.kill().await {
                warn!(node, pid, error = %kill_err, "could not kill unrecorded daemon");
            }
            return Err(launch(format!("could not record pid {pid}: {e}")));
        }

        self.children.lock().insert(node, child);
        info!(node, pid, state = %NodeState::Running, "started daemon");
        Ok(pid)
    }

    /// Signal node `node`'s daemon, wait until it is gone, and remove its pid file.
    pub async fn stop(&self, node: usize) -> Result<(), TestbedError> {
        let pid = self
            .store
            .read_pid(node)
            .ok_or(TestbedError::NotRunning(node))?;

        let child = self.children.lock().remove(&node);
        match child {
            Some(child) => self.terminate_child(node, pid, child).await?,
            None => self.terminate_pid(node, pid).await?,
        }

        self.store.remove_pid(node)?;
        info!(node, pid, state = %NodeState::Stopped, "stopped daemon");
        Ok(())
    }

    /// Stop every provisioned node. One node failing does not stop the rest.
    pub async fn stop_all(&self) -> StopReport {
        let mut report = StopReport::default();
        for node in 0..self.store.count() {
            let result = self.stop(node).await;
            if let Err(ref e) = result {
                warn!(node, error = %e, "error stopping daemon");
            }
            report.nodes.push((node, result));
        }
        report
    }

    /// Start every provisioned node in index order.
    ///
    /// Node 0 is always waited on before anything else starts, since every
    /// other node in a star bootstraps against it. With `wait_all` each node
    /// is waited on before the next starts, and once all are up every node
    /// must report at least one connected peer.
    ///
    /// On failure, daemons launched by this call are stopped again so the
    /// cluster is not left half-started.
    pub async fn start_all(
        &self,
        prober: &Prober,
        wait_all: bool,
    ) -> Result<Vec<StartedNode>, TestbedError> {
        let count = self.store.count();
        if count == 0 {
            return Err(TestbedError::Configuration(
                "no testbed nodes found; run init first".into(),
            ));
        }

        let mut started = Vec::with_capacity(count);
        match self
            .launch_in_order(prober, wait_all, count, &mut started)
            .await
        {
            Ok(()) => Ok(started),
            Err(e) => {
                warn!(
                    error = %e,
                    launched = started.len(),
                    "start failed, stopping launched daemons"
                );
                for launched in started.iter().rev() {
                    if let Err(stop_err) = self.stop(launched.node).await {
                        warn!(node = launched.node, error = %stop_err, "rollback stop failed");
                    }
                }
                Err(e)
            }
        }
    }

    async fn launch_in_order(
        &self,
        prober: &Prober,
        wait_all: bool,
        count: usize,
        started: &mut Vec<StartedNode>,
    ) -> Result<(), TestbedError> {
        let mut api_addrs = Vec::with_capacity(count);
        for node in 0..count {
            let pid = self.start(node).await?;
            started.push(StartedNode { node, pid });

            if node == 0 || wait_all {
                let config = self.store.load_config(node)?;
                let addr = dial_addr(&config.addresses.api)?;
                prober
                    .wait_for_identity(&config.identity.peer_id, &addr)
                    .await?;
                api_addrs.push(addr);
            }
        }

        if wait_all && count > 1 {
            for addr in &api_addrs {
                prober.wait_for_peers(addr).await?;
            }
        }
        Ok(())
    }

    fn is_alive(&self, node: usize, pid: u32) -> bool {
        if let Some(child) = self.children.lock().get_mut(&node) {
            if child.id() == Some(pid) {
                return matches!(child.try_wait(), Ok(None));
            }
        }
        process_exists(pid)
    }

    async fn terminate_child(
        &self,
        node: usize,
        pid: u32,
        mut child: Child,
    ) -> Result<(), TestbedError> {
        if child.id() != Some(pid) {
            // The pid file was rewritten behind our back; trust the file.
            return self.terminate_pid(node, pid).await;
        }
        send_signal(node, pid, Signal::SIGTERM)?;
        match tokio::time::timeout(self.stop_grace, child.wait()).await {
            Ok(Ok(status)) => {
                debug!(node, pid, %status, "daemon exited");
                Ok(())
            }
            Ok(Err(e)) => Err(TestbedError::Stop {
                node,
                reason: e.to_string(),
            }),
            Err(_) => {
                warn!(node, pid, "daemon ignored SIGTERM, killing");
                child.kill().await.map_err(|e| TestbedError::Stop {
                    node,
                    reason: e.to_string(),
                })
            }
        }
    }

    async fn terminate_pid(&self, node: usize, pid: u32) -> Result<(), TestbedError> {
        send_signal(node, pid, Signal::SIGTERM)?;
        if wait_for_exit(pid, self.stop_grace).await {
            return Ok(());
        }
        warn!(node, pid, "daemon ignored SIGTERM, killing");
        send_signal(node, pid, Signal::SIGKILL)?;
        if wait_for_exit(pid, self.stop_grace).await {
            return Ok(());
        }
        Err(TestbedError::Stop {
            node,
            reason: format!("pid {pid} still alive after SIGKILL"),
        })
    }
}

fn to_pid(pid: u32) -> Option<Pid> {
    i32::try_from(pid)
        .ok()
        .filter(|p| *p > 0)
        .map(Pid::from_raw)
}

/// Whether a process with this pid exists (possibly owned by another user).
fn process_exists(pid: u32) -> bool {
    match to_pid(pid) {
        Some(pid) => !matches!(signal::kill(pid, None), Err(Errno::ESRCH)),
        None => false,
    }
}

/// Deliver `sig`; a process that is already gone counts as delivered.
fn send_signal(node: usize, pid: u32, sig: Signal) -> Result<(), TestbedError> {
    let target = to_pid(pid).ok_or_else(|| TestbedError::Stop {
        node,
        reason: format!("invalid pid {pid}"),
    })?;
    match signal::kill(target, sig) {
        Ok(()) | Err(Errno::ESRCH) => Ok(()),
        Err(e) => Err(TestbedError::Stop {
            node,
            reason: format!("{sig} to pid {pid}: {e}"),
        }),
    }
}

async fn wait_for_exit(pid: u32, within: Duration) -> bool {
    let deadline = tokio::time::Instant::now() + within;
    loop {
        if !process_exists(pid) {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(EXIT_POLL_INTERVAL).await;
    }
}
