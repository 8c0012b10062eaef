//! Shopping carts and their line items.

use chrono::{DateTime, Utc};
use common::{BookId, CartId, UserId};
use serde::{Deserialize, Serialize};

use crate::error::DomainError;
use crate::money::Money;

/// The lifecycle state of a cart.
///
/// State transitions:
/// ```text
/// Active ──► Ordered ──► Cancelled
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CartStatus {
    /// Items can be added and removed.
    #[default]
    Active,

    /// An order was placed from this cart.
    Ordered,

    /// The order was abandoned and stock returned (terminal state).
    Cancelled,
}

impl CartStatus {
    /// Returns the canonical stored form.
    pub fn as_str(&self) -> &'static str {
        match self {
            CartStatus::Active => "ACTIVE",
            CartStatus::Ordered => "ORDERED",
            CartStatus::Cancelled => "CANCELLED",
        }
    }
}

impl std::fmt::Display for CartStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for CartStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ACTIVE" => Ok(CartStatus::Active),
            "ORDERED" => Ok(CartStatus::Ordered),
            "CANCELLED" => Ok(CartStatus::Cancelled),
            other => Err(DomainError::UnknownVariant {
                kind: "cart status",
                value: other.to_string(),
            }),
        }
    }
}

/// A user's cart. `total_cost` and `total_books` are derived from the items
/// and rewritten by [`Cart::recompute`] after every item change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cart {
    pub id: CartId,
    pub user_id: UserId,
    pub total_cost: Money,
    pub total_books: u32,
    pub status: CartStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Cart {
    /// Creates an empty active cart for a user.
    pub fn new_active(user_id: UserId) -> Self {
        let now = Utc::now();
        Self {
            id: CartId::new(),
            user_id,
            total_cost: Money::zero(),
            total_books: 0,
            status: CartStatus::Active,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == CartStatus::Active
    }

    /// Rewrites the derived totals from the cart's current items.
    ///
    /// Leaves the cart untouched if either total overflows.
    pub fn recompute(&mut self, items: &[CartItem]) -> Result<(), DomainError> {
        let total_books = items
            .iter()
            .try_fold(0u32, |acc, item| acc.checked_add(item.quantity))
            .ok_or(DomainError::AmountOverflow {
                operation: "count the books of",
            })?;
        let lines = items
            .iter()
            .map(CartItem::line_total)
            .collect::<Result<Vec<_>, _>>()?;
        self.total_cost = Money::checked_sum(lines)?;
        self.total_books = total_books;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Flips an active cart to `Ordered`.
    pub fn mark_ordered(&mut self) -> Result<(), DomainError> {
        if !self.is_active() {
            return Err(self.invalid("order"));
        }
        self.status = CartStatus::Ordered;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Marks the cart `Cancelled`.
    ///
    /// Returns `false` if it already was, so callers can skip restoring stock twice.
    pub fn mark_cancelled(&mut self) -> bool {
        if self.status == CartStatus::Cancelled {
            return false;
        }
        self.status = CartStatus::Cancelled;
        self.updated_at = Utc::now();
        true
    }

    fn invalid(&self, action: &'static str) -> DomainError {
        DomainError::InvalidStateTransition {
            entity: "cart",
            current_state: self.status.as_str(),
            action,
        }
    }
}

/// One line of a cart. The price is captured when the book is first added.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartItem {
    pub cart_id: CartId,
    pub book_id: BookId,
    pub quantity: u32,
    pub price_when_added: Money,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CartItem {
    /// Creates a new line, rejecting non-positive quantities.
    pub fn new(
        cart_id: CartId,
        book_id: BookId,
        quantity: i64,
        price_when_added: Money,
    ) -> Result<Self, DomainError> {
        let quantity = positive_quantity(quantity)?;
        let now = Utc::now();
        Ok(Self {
            cart_id,
            book_id,
            quantity,
            price_when_added,
            created_at: now,
            updated_at: now,
        })
    }

    /// Returns `quantity * price_when_added`.
    pub fn line_total(&self) -> Result<Money, DomainError> {
        self.price_when_added.multiply(self.quantity)
    }

    /// Adds units to the line, keeping the original price snapshot.
    pub fn add(&mut self, quantity: i64) -> Result<(), DomainError> {
        let extra = positive_quantity(quantity)?;
        self.quantity = self
            .quantity
            .checked_add(extra)
            .ok_or(DomainError::InvalidQuantity { quantity })?;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Removes one unit. Returns `false` when the line is now empty and must be deleted.
    pub fn decrement(&mut self) -> bool {
        self.quantity = self.quantity.saturating_sub(1);
        self.updated_at = Utc::now();
        self.quantity > 0
    }
}

/// Validates a requested quantity, returning it as an unsigned count.
pub fn positive_quantity(quantity: i64) -> Result<u32, DomainError> {
    if quantity <= 0 {
        return Err(DomainError::InvalidQuantity { quantity });
    }
    u32::try_from(quantity).map_err(|_| DomainError::InvalidQuantity { quantity })
}
