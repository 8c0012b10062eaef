//! Returns stock and cancels the cart behind an order that will never be paid.

use domain::Order;
use store::{BookRepository, CartRepository, StoreError, UnitOfWork};

use crate::error::{CheckoutError, Result};

/// What a compensation run did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compensation {
    /// Stock was restored and the cart cancelled.
    Restored { lines: usize, units: u32 },
    /// The cart was already cancelled by an earlier run.
    AlreadyCancelled,
    /// The order no longer references a cart.
    NoCart,
}

/// Restores inventory for every item of the order's cart and marks the cart
/// cancelled, inside the caller's unit of work.
///
/// Running it twice for the same order restores stock once. Store failures
/// come back as [`CheckoutError::CompensationFailed`] and the caller must not
/// commit.
#[tracing::instrument(skip(uow, order), fields(order_id = %order.id))]
pub async fn compensate<U: UnitOfWork>(uow: &mut U, order: &Order) -> Result<Compensation> {
    let failed = |e: StoreError| CheckoutError::CompensationFailed {
        order_id: order.id,
        reason: e.to_string(),
    };

    let Some(cart_id) = order.cart_id else {
        tracing::warn!("order has no cart, nothing to compensate");
        return Ok(Compensation::NoCart);
    };

    let Some(mut cart) = uow.find_cart(cart_id).await.map_err(failed)? else {
        tracing::warn!(%cart_id, "cart referenced by order is gone, nothing to compensate");
        return Ok(Compensation::NoCart);
    };

    if !cart.mark_cancelled() {
        tracing::debug!(%cart_id, "cart already cancelled");
        return Ok(Compensation::AlreadyCancelled);
    }

    let items = uow.cart_items(cart_id).await.map_err(failed)?;
    let mut units: u32 = 0;
    for item in &items {
        if !uow
            .restore_stock(item.book_id, item.quantity)
            .await
            .map_err(failed)?
        {
            tracing::warn!(book_id = %item.book_id, "book removed from catalog, stock not restored");
            continue;
        }
        units = units.saturating_add(item.quantity);
    }
    uow.save_cart(&cart).await.map_err(failed)?;

    metrics::counter!("compensations_total").increment(1);
    tracing::warn!(%cart_id, lines = items.len(), units, "stock restored and cart cancelled");

    Ok(Compensation::Restored {
        lines: items.len(),
        units,
    })
}
