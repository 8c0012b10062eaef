//! Order assembly from a customer's active cart.

use std::time::Instant;

use common::{OrderId, UserId};
use domain::{Money, Order, OrderTotals, PaymentStatus, Principal, Role, TaxRate};
use store::{
    BookRepository, CartRepository, OrderRepository, PaymentRepository, ShippingRepository,
    Store, UnitOfWork,
};

use crate::compensator;
use crate::error::{CheckoutError, Result};
use crate::require_role;

/// Service that turns carts into orders and manages them afterwards.
#[derive(Clone)]
pub struct OrderService<S: Store> {
    store: S,
    tax_rate: TaxRate,
}

impl<S: Store> OrderService<S> {
    pub fn new(store: S, tax_rate: TaxRate) -> Self {
        Self { store, tax_rate }
    }

    /// Places an order for everything in the caller's active cart.
    ///
    /// Validates every line against live stock before taking any of it.
    /// Stock decrements, the order row and the cart's flip to `ORDERED`
    /// commit together or not at all.
    #[tracing::instrument(skip(self, principal, shipping_address), fields(user_id = %principal.user_id))]
    pub async fn create_order(
        &self,
        principal: &Principal,
        shipping_address: &str,
        country: &str,
    ) -> Result<Order> {
        let start = Instant::now();
        let user_id = require_role(principal, Role::Customer)?;

        match self.place(user_id, shipping_address, country).await {
            Ok(order) => {
                metrics::counter!("orders_created_total").increment(1);
                metrics::histogram!("order_creation_duration_seconds")
                    .record(start.elapsed().as_secs_f64());
                tracing::info!(order_id = %order.id, total = %order.total, "order created");
                Ok(order)
            }
            Err(e) => {
                metrics::counter!("order_creation_failed_total").increment(1);
                tracing::warn!(error = %e, "order creation rejected");
                Err(e)
            }
        }
    }

    async fn place(&self, user_id: UserId, shipping_address: &str, country: &str) -> Result<Order> {
        let mut uow = self.store.begin().await?;

        let mut cart = uow
            .find_active_cart(user_id)
            .await?
            .ok_or_else(|| CheckoutError::not_found("cart", user_id))?;
        let items = uow.cart_items(cart.id).await?;
        if items.is_empty() {
            return Err(CheckoutError::Validation("Cart is empty".to_string()));
        }

        for item in &items {
            let book = uow
                .find_book(item.book_id)
                .await?
                .ok_or_else(|| CheckoutError::not_found("book", item.book_id))?;
            if !book.inventory.can_supply(item.quantity) {
                return Err(CheckoutError::InsufficientStock {
                    title: book.title,
                    available: book.inventory.quantity,
                });
            }
        }

        let mut cart_cost = Money::zero();
        for item in &items {
            if !uow.decrement_stock(item.book_id, item.quantity).await? {
                // Stock moved between validation and decrement.
                let book = uow
                    .find_book(item.book_id)
                    .await?
                    .ok_or_else(|| CheckoutError::not_found("book", item.book_id))?;
                return Err(CheckoutError::InsufficientStock {
                    title: book.title,
                    available: book.inventory.quantity,
                });
            }
            cart_cost = cart_cost.checked_add(item.line_total()?)?;
        }

        let shipping = uow
            .shipping_cost(country)
            .await?
            .ok_or_else(|| CheckoutError::not_found("shipping cost", country))?;
        let totals = OrderTotals::compute(cart_cost, shipping.cost, self.tax_rate)?;

        let order = Order::place(user_id, cart.id, totals, shipping_address, country);
        uow.insert_order(&order).await?;
        cart.mark_ordered()?;
        uow.save_cart(&cart).await?;

        uow.commit().await?;
        Ok(order)
    }

    /// Lists the caller's orders, newest first.
    pub async fn list_orders(&self, principal: &Principal) -> Result<Vec<Order>> {
        let user_id = require_role(principal, Role::Customer)?;
        let mut uow = self.store.begin().await?;
        let orders = uow.orders_for_user(user_id).await?;
        uow.rollback().await?;
        Ok(orders)
    }

    /// Returns one of the caller's orders.
    pub async fn get_order(&self, principal: &Principal, order_id: OrderId) -> Result<Order> {
        let user_id = require_role(principal, Role::Customer)?;
        let mut uow = self.store.begin().await?;
        let order = owned_order(&mut uow, user_id, order_id, false).await?;
        uow.rollback().await?;
        Ok(order)
    }

    /// Changes the delivery address of an order whose payment is still pending.
    #[tracing::instrument(skip(self, principal, address), fields(user_id = %principal.user_id))]
    pub async fn update_shipping_address(
        &self,
        principal: &Principal,
        order_id: OrderId,
        address: &str,
    ) -> Result<Order> {
        let user_id = require_role(principal, Role::Customer)?;
        let mut uow = self.store.begin().await?;
        let mut order = owned_order(&mut uow, user_id, order_id, true).await?;

        order.update_shipping_address(address)?;
        uow.save_order(&order).await?;
        uow.commit().await?;

        tracing::info!("shipping address updated");
        Ok(order)
    }

    /// Cancels an unpaid order.
    ///
    /// The payment (if one was opened) and the order become `FAILED` and the
    /// cart's stock is restored. The order row is kept.
    #[tracing::instrument(skip(self, principal), fields(user_id = %principal.user_id))]
    pub async fn cancel_order(&self, principal: &Principal, order_id: OrderId) -> Result<Order> {
        let user_id = require_role(principal, Role::Customer)?;
        let mut uow = self.store.begin().await?;
        let mut order = owned_order(&mut uow, user_id, order_id, true).await?;

        match order.payment_status {
            PaymentStatus::Successful => {
                return Err(CheckoutError::Conflict(
                    "Order is already paid and cannot be cancelled".to_string(),
                ));
            }
            PaymentStatus::Failed => {
                return Err(CheckoutError::Conflict(
                    "Order is already cancelled or failed".to_string(),
                ));
            }
            PaymentStatus::Pending => {}
        }

        if let Some(mut payment) = uow.find_payment_for_order(order_id).await? {
            payment.mark_failed()?;
            uow.save_payment(&payment).await?;
        }
        order.mirror_payment(PaymentStatus::Failed);
        uow.save_order(&order).await?;

        let compensation = compensator::compensate(&mut uow, &order).await?;
        uow.commit().await?;

        tracing::info!(?compensation, "order cancelled");
        Ok(order)
    }
}

/// Loads an order that belongs to `user_id`, optionally locking it.
///
/// Orders owned by someone else are reported as missing.
pub(crate) async fn owned_order<U: UnitOfWork>(
    uow: &mut U,
    user_id: UserId,
    order_id: OrderId,
    lock: bool,
) -> Result<Order> {
    let order = if lock {
        uow.lock_order(order_id).await?
    } else {
        uow.find_order(order_id).await?
    };
    order
        .filter(|o| o.user_id == user_id)
        .ok_or_else(|| CheckoutError::not_found("order", order_id))
}
