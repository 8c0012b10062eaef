//! Payment state machine and the transaction audit log.

use chrono::{DateTime, Utc};
use common::{OrderId, PaymentId, TransactionId};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::DomainError;
use crate::money::Money;
use crate::order::Order;

/// Number of attempts after which a payment that never succeeded is failed.
pub const MAX_PAYMENT_ATTEMPTS: u32 = 3;

/// Settlement status shared by payments and orders.
///
/// State transitions:
/// ```text
/// Pending ──┬──► Successful
///           └──► Failed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    /// Awaiting a successful attempt.
    #[default]
    Pending,

    /// An attempt succeeded (terminal state).
    Successful,

    /// Attempts were exhausted or the order was cancelled (terminal state).
    Failed,
}

impl PaymentStatus {
    /// Returns true if no further transition is possible.
    pub fn is_terminal(&self) -> bool {
        matches!(self, PaymentStatus::Successful | PaymentStatus::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "PENDING",
            PaymentStatus::Successful => "SUCCESSFUL",
            PaymentStatus::Failed => "FAILED",
        }
    }
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for PaymentStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(PaymentStatus::Pending),
            "SUCCESSFUL" => Ok(PaymentStatus::Successful),
            "FAILED" => Ok(PaymentStatus::Failed),
            other => Err(DomainError::UnknownVariant {
                kind: "payment status",
                value: other.to_string(),
            }),
        }
    }
}

/// How the customer chose to pay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PaymentMethod {
    Upi,
    Cod,
    Card,
    Netbanking,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Upi => "UPI",
            PaymentMethod::Cod => "COD",
            PaymentMethod::Card => "CARD",
            PaymentMethod::Netbanking => "NETBANKING",
        }
    }
}

impl std::fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for PaymentMethod {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "UPI" => Ok(PaymentMethod::Upi),
            "COD" => Ok(PaymentMethod::Cod),
            "CARD" => Ok(PaymentMethod::Card),
            "NETBANKING" => Ok(PaymentMethod::Netbanking),
            other => Err(DomainError::UnknownVariant {
                kind: "payment method",
                value: other.to_string(),
            }),
        }
    }
}

/// Outcome of one payment attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TransactionStatus {
    Success,
    Failure,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Success => "SUCCESS",
            TransactionStatus::Failure => "FAILURE",
        }
    }

    /// The message recorded alongside the outcome.
    pub fn message(&self) -> &'static str {
        match self {
            TransactionStatus::Success => "Successful Payment",
            TransactionStatus::Failure => "Payment Failed",
        }
    }
}

impl std::fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for TransactionStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "SUCCESS" => Ok(TransactionStatus::Success),
            "FAILURE" => Ok(TransactionStatus::Failure),
            other => Err(DomainError::UnknownVariant {
                kind: "transaction status",
                value: other.to_string(),
            }),
        }
    }
}

/// The attempt-tracking record settling one order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payment {
    pub id: PaymentId,
    pub order_id: OrderId,
    pub total_cost: Money,
    pub mode_of_payment: PaymentMethod,
    pub attempts: u32,
    pub status: PaymentStatus,
    pub created_at: DateTime<Utc>,
}

impl Payment {
    /// Opens a pending payment for the order's frozen total.
    pub fn open(order: &Order, method: PaymentMethod) -> Self {
        Self {
            id: PaymentId::new(),
            order_id: order.id,
            total_cost: order.total,
            mode_of_payment: method,
            attempts: 0,
            status: PaymentStatus::Pending,
            created_at: Utc::now(),
        }
    }

    /// Returns true once the attempt budget is used up.
    pub fn is_exhausted(&self) -> bool {
        self.attempts >= MAX_PAYMENT_ATTEMPTS
    }

    /// Returns true if another attempt may be issued.
    pub fn can_attempt(&self) -> bool {
        self.status == PaymentStatus::Pending && !self.is_exhausted()
    }

    /// Attempts left before the payment fails.
    pub fn remaining_attempts(&self) -> u32 {
        MAX_PAYMENT_ATTEMPTS.saturating_sub(self.attempts)
    }

    /// Switches the payment method. Returns whether anything changed.
    pub fn change_method(&mut self, method: PaymentMethod) -> Result<bool, DomainError> {
        if self.status != PaymentStatus::Pending {
            return Err(self.invalid("change the method of"));
        }
        if self.mode_of_payment == method {
            return Ok(false);
        }
        self.mode_of_payment = method;
        Ok(true)
    }

    /// Counts one attempt and applies its outcome.
    ///
    /// The third failure moves the payment to `Failed`.
    pub fn record_attempt(
        &mut self,
        outcome: TransactionStatus,
    ) -> Result<PaymentStatus, DomainError> {
        if !self.can_attempt() {
            return Err(self.invalid("attempt"));
        }
        self.attempts += 1;
        self.status = match outcome {
            TransactionStatus::Success => PaymentStatus::Successful,
            TransactionStatus::Failure if self.is_exhausted() => PaymentStatus::Failed,
            TransactionStatus::Failure => PaymentStatus::Pending,
        };
        Ok(self.status)
    }

    /// Fails a pending payment without another attempt.
    pub fn mark_failed(&mut self) -> Result<(), DomainError> {
        match self.status {
            PaymentStatus::Pending => {
                self.status = PaymentStatus::Failed;
                Ok(())
            }
            PaymentStatus::Failed => Ok(()),
            PaymentStatus::Successful => Err(self.invalid("fail")),
        }
    }

    fn invalid(&self, action: &'static str) -> DomainError {
        DomainError::InvalidStateTransition {
            entity: "payment",
            current_state: self.status.as_str(),
            action,
        }
    }
}

/// One immutable log entry for a payment attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: TransactionId,
    pub payment_id: PaymentId,
    pub txn_reference: String,
    pub status: TransactionStatus,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

impl Transaction {
    /// Creates a log entry with a fresh reference token.
    pub fn record(payment_id: PaymentId, status: TransactionStatus) -> Self {
        Self {
            id: TransactionId::new(),
            payment_id,
            txn_reference: Uuid::new_v4().to_string(),
            status,
            message: status.message().to_string(),
            created_at: Utc::now(),
        }
    }
}
