//! Domain error types.

use thiserror::Error;

use crate::money::Money;

/// Errors raised when an entity rejects an operation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DomainError {
    /// A line quantity was zero or negative.
    #[error("Invalid quantity: {quantity} (must be greater than 0)")]
    InvalidQuantity { quantity: i64 },

    /// A monetary input that must be non-negative was negative.
    #[error("Invalid amount for {field}: {amount} (must not be negative)")]
    NegativeAmount { field: &'static str, amount: Money },

    /// A monetary computation left the representable range.
    #[error("Amount overflow: cannot {operation} amounts this large")]
    AmountOverflow { operation: &'static str },

    /// The entity is not in a state that allows the requested action.
    #[error("Invalid state transition: cannot {action} {entity} in {current_state} state")]
    InvalidStateTransition {
        entity: &'static str,
        current_state: &'static str,
        action: &'static str,
    },

    /// A stored enum value could not be recognized.
    #[error("Unknown {kind} value: {value}")]
    UnknownVariant { kind: &'static str, value: String },
}
