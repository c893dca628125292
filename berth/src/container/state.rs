//! Client-side container lifecycle state machine.

use crate::errors::{BerthError, BerthResult};
use std::fmt;

/// Lifecycle phase of a managed container, as this library tracks it.
///
/// This is the client-side view; the daemon's own status is read through
/// inspect and may momentarily disagree while an operation is in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerStatus {
    /// Created daemon-side, not started.
    Created,
    /// Started, readiness wait in progress.
    Starting,
    /// Ready; wait strategy reported success.
    Running,
    /// Stopped on request; restartable.
    Stopped,
    /// Exited on its own.
    Exited,
    /// Removed daemon-side. Terminal.
    Removed,
}

impl ContainerStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContainerStatus::Created => "created",
            ContainerStatus::Starting => "starting",
            ContainerStatus::Running => "running",
            ContainerStatus::Stopped => "stopped",
            ContainerStatus::Exited => "exited",
            ContainerStatus::Removed => "removed",
        }
    }

    pub fn can_transition_to(&self, next: ContainerStatus) -> bool {
        use ContainerStatus::*;
        match (self, next) {
            (Created, Starting) => true,
            (Starting, Running | Exited | Stopped) => true,
            (Running, Stopped | Exited) => true,
            // Restart re-enters Starting from any settled state.
            (Running | Stopped | Exited, Starting) => true,
            // Remove is allowed from anywhere except after removal.
            (Removed, _) => false,
            (_, Removed) => true,
            _ => false,
        }
    }

    /// Move to `next`, or fail if the lifecycle does not allow it.
    pub(crate) fn advance(&mut self, next: ContainerStatus) -> BerthResult<()> {
        if !self.can_transition_to(next) {
            return Err(BerthError::InvalidState(format!(
                "cannot transition container from {self} to {next}"
            )));
        }
        *self = next;
        Ok(())
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ContainerStatus::Removed)
    }
}

impl fmt::Display for ContainerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_happy_path_transitions() {
        let mut status = ContainerStatus::Created;
        status.advance(ContainerStatus::Starting).unwrap();
        status.advance(ContainerStatus::Running).unwrap();
        status.advance(ContainerStatus::Stopped).unwrap();
        status.advance(ContainerStatus::Starting).unwrap();
        status.advance(ContainerStatus::Running).unwrap();
        status.advance(ContainerStatus::Removed).unwrap();
        assert!(status.is_terminal());
    }

    #[test]
    fn test_removed_is_terminal() {
        let status = ContainerStatus::Removed;
        assert!(!status.can_transition_to(ContainerStatus::Starting));
        assert!(!status.can_transition_to(ContainerStatus::Running));
        assert!(!status.can_transition_to(ContainerStatus::Removed));
    }

    #[test]
    fn test_invalid_transition_rejected() {
        let mut status = ContainerStatus::Created;
        let err = status.advance(ContainerStatus::Running).unwrap_err();
        assert!(matches!(err, BerthError::InvalidState(_)));
        // State unchanged on rejection.
        assert_eq!(status, ContainerStatus::Created);
    }

    #[test]
    fn test_restart_reenters_starting() {
        for from in [
            ContainerStatus::Running,
            ContainerStatus::Stopped,
            ContainerStatus::Exited,
        ] {
            assert!(from.can_transition_to(ContainerStatus::Starting), "{from}");
        }
    }
}
