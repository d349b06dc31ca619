use std::fmt;

/// Lifecycle state of a single node's daemon process.
///
/// There is no separate failed state: a daemon that died on its own reads as
/// [`NodeState::Stopped`] once its stale pid file is noticed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeState {
    Stopped,
    Starting,
    Running,
}

impl fmt::Display for NodeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Stopped => "stopped",
            Self::Starting => "starting",
            Self::Running => "running",
        })
    }
}
