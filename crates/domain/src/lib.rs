//! Domain layer for the bookstore checkout system.
//!
//! This crate holds the entities that the settlement core moves through its
//! lifecycle, along with the rules that keep them consistent:
//! - Money arithmetic in minor units and the tax calculation
//! - Cart and cart item invariants, including derived totals
//! - Order snapshots and the payment state machine
//! - The authenticated principal consumed as a capability check

pub mod book;
pub mod cart;
pub mod error;
pub mod identity;
pub mod money;
pub mod order;
pub mod payment;
pub mod shipping;

pub use book::{Book, Genre, Inventory, NewBook};
pub use cart::{Cart, CartItem, CartStatus};
pub use common::{BookId, CartId, OrderId, PaymentId, TransactionId, UserId};
pub use error::DomainError;
pub use identity::{Principal, Role};
pub use money::{Money, TaxRate, calculate_tax};
pub use order::{Order, OrderTotals};
pub use payment::{
    MAX_PAYMENT_ATTEMPTS, Payment, PaymentMethod, PaymentStatus, Transaction, TransactionStatus,
};
pub use shipping::ShippingCost;
