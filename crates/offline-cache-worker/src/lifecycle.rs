//! Worker lifecycle states and the transitions between them

use serde::Serialize;
use std::fmt;

/// Lifecycle state of one worker version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerState {
    Parsed,
    Installing,
    /// Installed and waiting to activate
    Installed,
    Activating,
    Activated,
    /// Failed to install or replaced by a newer version
    Redundant,
}

impl WorkerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Parsed => "parsed",
            Self::Installing => "installing",
            Self::Installed => "installed",
            Self::Activating => "activating",
            Self::Activated => "activated",
            Self::Redundant => "redundant",
        }
    }
}

impl fmt::Display for WorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether `from -> to` is a legal lifecycle step.
///
/// A failed activation falls back to `Installed` so the worker can be
/// activated again.
pub fn is_valid_transition(from: WorkerState, to: WorkerState) -> bool {
    use WorkerState::*;

    matches!(
        (from, to),
        (Parsed, Installing)
            | (Installing, Installed)
            | (Installing, Redundant)
            | (Installed, Activating)
            | (Installed, Redundant)
            | (Activating, Activated)
            | (Activating, Installed)
            | (Activated, Redundant)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use WorkerState::*;

    #[test]
    fn test_happy_path_transitions() {
        assert!(is_valid_transition(Parsed, Installing));
        assert!(is_valid_transition(Installing, Installed));
        assert!(is_valid_transition(Installed, Activating));
        assert!(is_valid_transition(Activating, Activated));
    }

    #[test]
    fn test_failure_transitions() {
        assert!(is_valid_transition(Installing, Redundant));
        assert!(is_valid_transition(Activating, Installed));
        assert!(is_valid_transition(Activated, Redundant));
    }

    #[test]
    fn test_invalid_transitions() {
        assert!(!is_valid_transition(Parsed, Activated));
        assert!(!is_valid_transition(Installing, Activating));
        assert!(!is_valid_transition(Redundant, Installing));
        assert!(!is_valid_transition(Activated, Activating));
        assert!(!is_valid_transition(Installed, Installed));
    }

    #[test]
    fn test_state_display_and_serialization() {
        assert_eq!(Installed.to_string(), "installed");
        assert_eq!(serde_json::to_string(&Activated).unwrap(), "\"activated\"");
    }
}
