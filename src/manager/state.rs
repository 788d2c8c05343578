//! The Manager's lifecycle state machine: `Configuring` → `Running` →
//! `Stopping` → `Stopped`.

use tokio::sync::watch;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Configuring,
    Running,
    Stopping,
    Stopped,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Phase::Configuring => "configuring",
            Phase::Running => "running",
            Phase::Stopping => "stopping",
            Phase::Stopped => "stopped",
        };
        write!(f, "{s}")
    }
}

/// Observable handle to the Manager's current phase. Cheap to clone; backed
/// by a `tokio::sync::watch` so tests and the metrics endpoint can await
/// transitions without polling.
#[derive(Clone)]
pub struct ManagerState {
    tx: std::sync::Arc<watch::Sender<Phase>>,
}

impl ManagerState {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(Phase::Configuring);
        Self {
            tx: std::sync::Arc::new(tx),
        }
    }

    pub fn phase(&self) -> Phase {
        *self.tx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<Phase> {
        self.tx.subscribe()
    }

    pub(super) fn transition_to_running(&self) {
        let _ = self.tx.send(Phase::Running);
    }

    pub(super) fn transition_to_stopping(&self) {
        let _ = self.tx.send(Phase::Stopping);
    }

    pub(super) fn transition_to_stopped(&self) {
        let _ = self.tx.send(Phase::Stopped);
    }
}

impl Default for ManagerState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_configuring() {
        let state = ManagerState::new();
        assert_eq!(state.phase(), Phase::Configuring);
    }

    #[test]
    fn transitions_follow_the_documented_order() {
        let state = ManagerState::new();
        state.transition_to_running();
        assert_eq!(state.phase(), Phase::Running);
        state.transition_to_stopping();
        assert_eq!(state.phase(), Phase::Stopping);
        state.transition_to_stopped();
        assert_eq!(state.phase(), Phase::Stopped);
    }
}
