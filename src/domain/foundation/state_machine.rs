//! State machine trait for status enums.
//!
//! Connection and serving-stack lifecycles both go through this trait so an
//! illegal transition is caught where it is attempted instead of silently
//! corrupting the status reported to observers.

use super::ValidationError;

/// Trait for status enums that represent state machines.
///
/// # Example
///
/// ```ignore
/// impl StateMachine for ConnectionStatus {
///     fn can_transition_to(&self, target: &Self) -> bool {
///         matches!((self, target), (Anonymous, Authenticating) | (Active, Anonymous) | ...)
///     }
///     ...
/// }
///
/// let next = current.transition_to(ConnectionStatus::Active)?;
/// ```
pub trait StateMachine: Sized + Copy + PartialEq + std::fmt::Debug {
    /// Returns true if transition from self to target is valid.
    fn can_transition_to(&self, target: &Self) -> bool;

    /// Returns all valid target states from current state.
    fn valid_transitions(&self) -> Vec<Self>;

    /// Performs transition with validation, returning error if invalid.
    fn transition_to(&self, target: Self) -> Result<Self, ValidationError> {
        if self.can_transition_to(&target) {
            Ok(target)
        } else {
            Err(ValidationError::invalid_format(
                "state_transition",
                format!("Cannot transition from {:?} to {:?}", self, target),
            ))
        }
    }

    /// Checks if current state is terminal (no valid outgoing transitions).
    fn is_terminal(&self) -> bool {
        self.valid_transitions().is_empty()
    }
}
