//! ConnectionStatus - lifecycle of one client connection.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::domain::foundation::StateMachine;

/// Lifecycle status of a client connection.
///
/// ```text
/// Anonymous ──► Authenticating ──► Active
///     ▲               │              │
///     └───────────────┴──────────────┘   (logout, session fault)
///
/// any ──► Closed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    /// No user; the initial view is being sent.
    #[default]
    Anonymous,
    /// Initial view sent, waiting for a login request.
    Authenticating,
    /// A user is logged in and adapter sessions are live.
    Active,
    /// Transport gone or server shutting down.
    Closed,
}

impl StateMachine for ConnectionStatus {
    fn can_transition_to(&self, target: &Self) -> bool {
        use ConnectionStatus::*;
        matches!(
            (self, target),
            (Anonymous, Authenticating)
                | (Authenticating, Active)
                | (Authenticating, Anonymous)
                | (Active, Anonymous)
                | (Anonymous, Closed)
                | (Authenticating, Closed)
                | (Active, Closed)
        )
    }

    fn valid_transitions(&self) -> Vec<Self> {
        use ConnectionStatus::*;
        match self {
            Anonymous => vec![Authenticating, Closed],
            Authenticating => vec![Active, Anonymous, Closed],
            Active => vec![Anonymous, Closed],
            Closed => vec![],
        }
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConnectionStatus::Anonymous => "Anonymous",
            ConnectionStatus::Authenticating => "Authenticating",
            ConnectionStatus::Active => "Active",
            ConnectionStatus::Closed => "Closed",
        };
        write!(f, "{}", s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_anonymous() {
        assert_eq!(ConnectionStatus::default(), ConnectionStatus::Anonymous);
    }

    #[test]
    fn login_path_is_valid() {
        let status = ConnectionStatus::Anonymous
            .transition_to(ConnectionStatus::Authenticating)
            .and_then(|s| s.transition_to(ConnectionStatus::Active))
            .unwrap();
        assert_eq!(status, ConnectionStatus::Active);
    }

    #[test]
    fn active_cannot_authenticate_again() {
        assert!(ConnectionStatus::Active
            .transition_to(ConnectionStatus::Authenticating)
            .is_err());
    }

    #[test]
    fn anonymous_cannot_skip_to_active() {
        assert!(!ConnectionStatus::Anonymous.can_transition_to(&ConnectionStatus::Active));
    }

    #[test]
    fn every_state_can_close() {
        for status in [
            ConnectionStatus::Anonymous,
            ConnectionStatus::Authenticating,
            ConnectionStatus::Active,
        ] {
            assert!(status.can_transition_to(&ConnectionStatus::Closed));
        }
    }

    #[test]
    fn closed_is_terminal() {
        assert!(ConnectionStatus::Closed.is_terminal());
        assert!(!ConnectionStatus::Active.is_terminal());
    }

    #[test]
    fn valid_transitions_agree_with_can_transition_to() {
        use ConnectionStatus::*;
        for from in [Anonymous, Authenticating, Active, Closed] {
            for to in [Anonymous, Authenticating, Active, Closed] {
                assert_eq!(
                    from.valid_transitions().contains(&to),
                    from.can_transition_to(&to),
                    "{} -> {}",
                    from,
                    to
                );
            }
        }
    }
}
