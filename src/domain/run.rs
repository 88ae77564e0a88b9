//! Run state of the capture controller.
//!
//! A run moves strictly forward:
//! `Idle → Started → Draining → Stopping → Stopped | Failed`.

use serde::{Deserialize, Serialize};

/// State of a capture run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    /// Pipeline not yet instantiated
    Idle,

    /// Pipeline instantiated, playback requested
    Started,

    /// Draining the bus
    Draining,

    /// Graceful stop in progress
    Stopping,

    /// Shut down cleanly
    Stopped,

    /// Failed before the pipeline could run
    Failed,
}

impl Default for RunState {
    fn default() -> Self {
        Self::Idle
    }
}

impl RunState {
    /// Whether `next` is a legal successor of this state
    pub fn can_transition_to(self, next: RunState) -> bool {
        use RunState::*;
        matches!(
            (self, next),
            (Idle, Started)
                | (Idle, Failed)
                | (Started, Draining)
                | (Started, Failed)
                | (Draining, Stopping)
                | (Stopping, Stopped)
        )
    }

    /// Check if the run has reached a final state
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Stopped | Self::Failed)
    }

    /// Check if a stop has already been requested or completed
    pub fn is_stopping_or_done(self) -> bool {
        matches!(self, Self::Stopping | Self::Stopped | Self::Failed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forward_transitions() {
        assert!(RunState::Idle.can_transition_to(RunState::Started));
        assert!(RunState::Started.can_transition_to(RunState::Draining));
        assert!(RunState::Draining.can_transition_to(RunState::Stopping));
        assert!(RunState::Stopping.can_transition_to(RunState::Stopped));
        assert!(RunState::Idle.can_transition_to(RunState::Failed));
    }

    #[test]
    fn test_no_backwards_or_skipping() {
        assert!(!RunState::Stopping.can_transition_to(RunState::Draining));
        assert!(!RunState::Stopped.can_transition_to(RunState::Stopping));
        assert!(!RunState::Draining.can_transition_to(RunState::Stopped));
        assert!(!RunState::Idle.can_transition_to(RunState::Draining));
    }

    #[test]
    fn test_terminal_states() {
        assert!(RunState::Stopped.is_terminal());
        assert!(RunState::Failed.is_terminal());
        assert!(!RunState::Stopping.is_terminal());
        assert!(RunState::Stopping.is_stopping_or_done());
        assert!(!RunState::Draining.is_stopping_or_done());
    }
}
