//! Saga state machine.

use serde::{Deserialize, Serialize};

/// The state of a saga in its lifecycle.
///
/// State transitions:
/// ```text
/// NotStarted ──► Running ──┬──► Completed
///                          ├──► Compensating ──┬──► Failed
///                          │                   └──► ReconciliationRequired
///                          └──► ReconciliationRequired
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum SagaState {
    /// Saga has not started yet.
    #[default]
    NotStarted,

    /// Saga steps are being executed.
    Running,

    /// A step failed and compensating actions are in progress.
    Compensating,

    /// All steps completed successfully (terminal state).
    Completed,

    /// Compensation finished after a failure (terminal state).
    Failed,

    /// The services were left inconsistent and need an operator
    /// (terminal state).
    ReconciliationRequired,
}

impl SagaState {
    /// Returns true if the saga can begin running.
    pub fn can_run(&self) -> bool {
        matches!(self, SagaState::NotStarted)
    }

    /// Returns true if the saga can begin compensation.
    pub fn can_compensate(&self) -> bool {
        matches!(self, SagaState::Running)
    }

    /// Returns true if the saga can be flagged for reconciliation.
    pub fn can_require_reconciliation(&self) -> bool {
        matches!(self, SagaState::Running | SagaState::Compensating)
    }

    /// Returns true if the saga can finish successfully.
    pub fn can_complete(&self) -> bool {
        matches!(self, SagaState::Running)
    }

    /// Returns true if the saga can finish as failed.
    pub fn can_fail(&self) -> bool {
        matches!(self, SagaState::Running | SagaState::Compensating)
    }

    /// Returns true if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SagaState::Completed | SagaState::Failed | SagaState::ReconciliationRequired
        )
    }

    /// Returns the state name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            SagaState::NotStarted => "NotStarted",
            SagaState::Running => "Running",
            SagaState::Compensating => "Compensating",
            SagaState::Completed => "Completed",
            SagaState::Failed => "Failed",
            SagaState::ReconciliationRequired => "ReconciliationRequired",
        }
    }
}

impl std::fmt::Display for SagaState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_state_is_not_started() {
        assert_eq!(SagaState::default(), SagaState::NotStarted);
    }

    #[test]
    fn test_can_compensate() {
        assert!(!SagaState::NotStarted.can_compensate());
        assert!(SagaState::Running.can_compensate());
        assert!(!SagaState::Compensating.can_compensate());
        assert!(!SagaState::Completed.can_compensate());
    }

    #[test]
    fn test_reconciliation_entry_points() {
        assert!(SagaState::Running.can_require_reconciliation());
        assert!(SagaState::Compensating.can_require_reconciliation());
        assert!(!SagaState::Completed.can_require_reconciliation());
        assert!(!SagaState::NotStarted.can_require_reconciliation());
    }

    #[test]
    fn test_only_running_sagas_complete() {
        assert!(SagaState::Running.can_complete());
        assert!(!SagaState::Compensating.can_complete());
        assert!(!SagaState::Failed.can_complete());
        assert!(SagaState::Compensating.can_fail());
        assert!(!SagaState::Completed.can_fail());
        assert!(!SagaState::ReconciliationRequired.can_fail());
    }

    #[test]
    fn test_terminal_states() {
        assert!(!SagaState::Running.is_terminal());
        assert!(!SagaState::Compensating.is_terminal());
        assert!(SagaState::Completed.is_terminal());
        assert!(SagaState::Failed.is_terminal());
        assert!(SagaState::ReconciliationRequired.is_terminal());
    }

    #[test]
    fn test_display() {
        assert_eq!(SagaState::Running.to_string(), "Running");
        assert_eq!(
            SagaState::ReconciliationRequired.to_string(),
            "ReconciliationRequired"
        );
    }
}
