//! Orders: immutable cost snapshots taken from a cart at checkout.

use chrono::{DateTime, Utc};
use common::{CartId, OrderId, UserId};
use serde::{Deserialize, Serialize};

use crate::error::DomainError;
use crate::money::{Money, TaxRate, calculate_tax};
use crate::payment::PaymentStatus;

/// The four monetary fields of an order, computed once at creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderTotals {
    pub cart_cost: Money,
    pub shipping_cost: Money,
    pub taxes: Money,
    pub total: Money,
}

impl OrderTotals {
    /// Computes taxes on `cart_cost + shipping_cost` and the grand total.
    pub fn compute(
        cart_cost: Money,
        shipping_cost: Money,
        rate: TaxRate,
    ) -> Result<Self, DomainError> {
        let taxes = calculate_tax(cart_cost, shipping_cost, rate)?;
        Ok(Self {
            cart_cost,
            shipping_cost,
            taxes,
            total: Money::checked_sum([cart_cost, shipping_cost, taxes])?,
        })
    }
}

/// A placed order.
///
/// Monetary fields are frozen at creation. `payment_status` mirrors the
/// order's payment record and is updated in the same unit of work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub user_id: UserId,
    pub cart_id: Option<CartId>,
    pub cart_cost: Money,
    pub shipping_cost: Money,
    pub taxes: Money,
    pub total: Money,
    pub shipping_address: String,
    pub country: String,
    pub payment_status: PaymentStatus,
    pub created_at: DateTime<Utc>,
}

impl Order {
    /// Creates a pending order from a cart and its computed totals.
    pub fn place(
        user_id: UserId,
        cart_id: CartId,
        totals: OrderTotals,
        shipping_address: impl Into<String>,
        country: impl Into<String>,
    ) -> Self {
        Self {
            id: OrderId::new(),
            user_id,
            cart_id: Some(cart_id),
            cart_cost: totals.cart_cost,
            shipping_cost: totals.shipping_cost,
            taxes: totals.taxes,
            total: totals.total,
            shipping_address: shipping_address.into(),
            country: country.into(),
            payment_status: PaymentStatus::Pending,
            created_at: Utc::now(),
        }
    }

    /// Returns the frozen monetary fields.
    pub fn totals(&self) -> OrderTotals {
        OrderTotals {
            cart_cost: self.cart_cost,
            shipping_cost: self.shipping_cost,
            taxes: self.taxes,
            total: self.total,
        }
    }

    pub fn is_settled(&self) -> bool {
        self.payment_status.is_terminal()
    }

    /// Copies the payment's status onto the order.
    pub fn mirror_payment(&mut self, status: PaymentStatus) {
        self.payment_status = status;
    }

    /// Changes the delivery address while payment is still pending.
    pub fn update_shipping_address(
        &mut self,
        address: impl Into<String>,
    ) -> Result<(), DomainError> {
        if self.is_settled() {
            return Err(DomainError::InvalidStateTransition {
                entity: "order",
                current_state: self.payment_status.as_str(),
                action: "update the address of",
            });
        }
        self.shipping_address = address.into();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_totals_for_two_item_cart() {
        let totals = OrderTotals::compute(
            Money::from_units(25),
            Money::from_units(20),
            TaxRate::DEFAULT,
        )
        .unwrap();

        assert_eq!(totals.cart_cost, Money::from_cents(2500));
        assert_eq!(totals.taxes, Money::from_cents(810));
        assert_eq!(totals.total, Money::from_cents(5310));
    }

    #[test]
    fn test_place_starts_pending() {
        let totals =
            OrderTotals::compute(Money::from_units(10), Money::zero(), TaxRate::DEFAULT).unwrap();
        let cart_id = CartId::new();
        let order = Order::place(UserId::new(), cart_id, totals, "1 Main St", "India");

        assert_eq!(order.payment_status, PaymentStatus::Pending);
        assert_eq!(order.cart_id, Some(cart_id));
        assert_eq!(order.totals(), totals);
    }

    #[test]
    fn test_address_locked_after_settlement() {
        let totals =
            OrderTotals::compute(Money::from_units(10), Money::zero(), TaxRate::DEFAULT).unwrap();
        let mut order = Order::place(UserId::new(), CartId::new(), totals, "old", "India");

        order.update_shipping_address("new").unwrap();
        assert_eq!(order.shipping_address, "new");

        order.mirror_payment(PaymentStatus::Successful);
        assert!(order.update_shipping_address("newer").is_err());
        assert_eq!(order.shipping_address, "new");
    }
}
