//! Stack module - when the serving stack is allowed to run.
//!
//! The serving stack (adapter registry plus client server) exists only while
//! an event bus client is connected and, if configured, the bus reports
//! [`BusStatus::Operational`].

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::domain::foundation::StateMachine;

/// Status reported by the event bus server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum BusStatus {
    #[default]
    Standby,
    Starting,
    Operational,
    Stopping,
}

impl fmt::Display for BusStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BusStatus::Standby => "Standby",
            BusStatus::Starting => "Starting",
            BusStatus::Operational => "Operational",
            BusStatus::Stopping => "Stopping",
        };
        write!(f, "{}", s)
    }
}

/// Whether the stack should be running for a connected bus in `status`.
pub fn should_run(status: BusStatus, require_operational: bool) -> bool {
    !require_operational || status == BusStatus::Operational
}

/// Lifecycle of the serving stack within one bus connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StackStatus {
    #[default]
    Inactive,
    Active,
}

impl StateMachine for StackStatus {
    fn can_transition_to(&self, target: &Self) -> bool {
        use StackStatus::*;
        matches!((self, target), (Inactive, Active) | (Active, Inactive))
    }

    fn valid_transitions(&self) -> Vec<Self> {
        match self {
            StackStatus::Inactive => vec![StackStatus::Active],
            StackStatus::Active => vec![StackStatus::Inactive],
        }
    }
}

impl fmt::Display for StackStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StackStatus::Inactive => "Inactive",
            StackStatus::Active => "Active",
        };
        write!(f, "{}", s)
    }
}
