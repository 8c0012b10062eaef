//! Checkout error types.

use common::OrderId;
use domain::{DomainError, Role};
use store::StoreError;
use thiserror::Error;

/// Coarse classification used by callers to pick a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    Conflict,
    Validation,
    ResourceExhausted,
    Forbidden,
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::NotFound => "NOT_FOUND",
            ErrorKind::Conflict => "CONFLICT",
            ErrorKind::Validation => "VALIDATION_ERROR",
            ErrorKind::ResourceExhausted => "RESOURCE_EXHAUSTED",
            ErrorKind::Forbidden => "FORBIDDEN",
            ErrorKind::Internal => "INTERNAL",
        }
    }
}

/// Errors that can occur during checkout operations.
#[derive(Debug, Error)]
pub enum CheckoutError {
    /// A referenced entity does not exist or is not visible to the caller.
    #[error("{entity} not found: {key}")]
    NotFound { entity: &'static str, key: String },

    /// The request conflicts with the current state.
    #[error("{0}")]
    Conflict(String),

    /// The request is malformed.
    #[error("{0}")]
    Validation(String),

    /// Stock cannot cover the requested quantity.
    #[error("Insufficient stock for '{title}': only {available} available")]
    InsufficientStock { title: String, available: u32 },

    /// The payment used up its attempts before this request.
    #[error("Payment attempts exceeded for order {order_id}, create a new order")]
    AttemptsExceeded { order_id: OrderId },

    /// The principal lacks the role the operation requires.
    #[error("Operation requires the {required} role")]
    Forbidden { required: Role },

    /// Restoring stock or cancelling the cart failed.
    #[error("Compensation failed for order {order_id}: {reason}")]
    CompensationFailed { order_id: OrderId, reason: String },

    /// An entity rejected the operation.
    #[error(transparent)]
    Domain(#[from] DomainError),

    /// Storage failure.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl CheckoutError {
    pub(crate) fn not_found(entity: &'static str, key: impl ToString) -> Self {
        CheckoutError::NotFound {
            entity,
            key: key.to_string(),
        }
    }

    /// Classifies the error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            CheckoutError::NotFound { .. } => ErrorKind::NotFound,
            CheckoutError::Conflict(_) => ErrorKind::Conflict,
            CheckoutError::Validation(_) => ErrorKind::Validation,
            CheckoutError::InsufficientStock { .. } | CheckoutError::AttemptsExceeded { .. } => {
                ErrorKind::ResourceExhausted
            }
            CheckoutError::Forbidden { .. } => ErrorKind::Forbidden,
            CheckoutError::CompensationFailed { .. } => ErrorKind::Internal,
            CheckoutError::Domain(err) => match err {
                DomainError::InvalidStateTransition { .. } => ErrorKind::Conflict,
                DomainError::InvalidQuantity { .. }
                | DomainError::NegativeAmount { .. }
                | DomainError::AmountOverflow { .. }
                | DomainError::UnknownVariant { .. } => ErrorKind::Validation,
            },
            CheckoutError::Store(StoreError::UniqueViolation { .. }) => ErrorKind::Conflict,
            CheckoutError::Store(_) => ErrorKind::Internal,
        }
    }
}

/// Convenience type alias for checkout results.
pub type Result<T> = std::result::Result<T, CheckoutError>;
