//! Shared identifier types for the bookstore checkout system.

pub mod types;

pub use types::{BookId, CartId, OrderId, PaymentId, TransactionId, UserId};
