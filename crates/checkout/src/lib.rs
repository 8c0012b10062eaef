//! Settlement core for the bookstore.
//!
//! Moves a cart through stock reservation, cost computation, payment
//! attempts with a retry limit, transaction logging and compensating
//! rollback of stock and cart state:
//!
//! ```text
//! CartService ──► OrderService ──► PaymentService ⇄ TransactionProcessor
//!                                        │
//!                                        └─(exhausted / cancelled)─► compensate
//! ```
//!
//! Every operation runs in one unit of work from a [`store::Store`].

pub mod cart;
pub mod catalog;
pub mod compensator;
pub mod error;
pub mod orders;
pub mod payment;
pub mod processor;

use common::UserId;
use domain::{Principal, Role};

pub use cart::{CartService, CartView};
pub use catalog::CatalogService;
pub use compensator::{Compensation, compensate};
pub use error::{CheckoutError, ErrorKind, Result};
pub use orders::OrderService;
pub use payment::{PaymentService, PaymentStatusView, Settlement};
pub use processor::{PaymentGateway, RandomGateway, ScriptedGateway, TransactionProcessor};

/// Rejects principals without `role`, returning the caller's user id.
pub(crate) fn require_role(principal: &Principal, role: Role) -> Result<UserId> {
    if !principal.has_role(role) {
        return Err(CheckoutError::Forbidden { required: role });
    }
    Ok(principal.user_id)
}
