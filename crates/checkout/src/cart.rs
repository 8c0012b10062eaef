//! Cart aggregation: line items and the derived cart totals.

use common::BookId;
use domain::{Book, Cart, CartItem, Principal, Role, cart::positive_quantity};
use serde::Serialize;
use store::{BookRepository, CartRepository, Store, UnitOfWork};

use crate::error::{CheckoutError, Result};
use crate::require_role;

/// A cart together with its current items.
#[derive(Debug, Clone, Serialize)]
pub struct CartView {
    pub cart: Cart,
    pub items: Vec<CartItem>,
}

/// Service for a customer's active cart.
///
/// Every mutation rewrites the cart's derived totals in the same unit of work.
#[derive(Clone)]
pub struct CartService<S: Store> {
    store: S,
}

impl<S: Store> CartService<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Returns the caller's active cart.
    pub async fn get_cart(&self, principal: &Principal) -> Result<CartView> {
        let user_id = require_role(principal, Role::Customer)?;
        let mut uow = self.store.begin().await?;
        let cart = uow
            .find_active_cart(user_id)
            .await?
            .ok_or_else(|| CheckoutError::not_found("cart", user_id))?;
        let items = uow.cart_items(cart.id).await?;
        uow.rollback().await?;
        Ok(CartView { cart, items })
    }

    /// Returns the items of the caller's active cart.
    pub async fn cart_items(&self, principal: &Principal) -> Result<Vec<CartItem>> {
        Ok(self.get_cart(principal).await?.items)
    }

    /// Adds `quantity` units of a book, creating the active cart if needed.
    ///
    /// A book already in the cart accumulates into its line and keeps the
    /// price captured when it was first added.
    #[tracing::instrument(skip(self, principal), fields(user_id = %principal.user_id))]
    pub async fn add_item(
        &self,
        principal: &Principal,
        book_id: BookId,
        quantity: i64,
    ) -> Result<CartView> {
        let user_id = require_role(principal, Role::Customer)?;
        let requested = positive_quantity(quantity)?;

        let mut uow = self.store.begin().await?;
        let book = find_book(&mut uow, book_id).await?;

        let cart = match uow.find_active_cart(user_id).await? {
            Some(cart) => cart,
            None => {
                let cart = uow.create_active_cart(user_id).await?;
                tracing::info!(cart_id = %cart.id, "active cart created");
                cart
            }
        };

        let item = match uow.find_cart_item(cart.id, book_id).await? {
            Some(mut item) => {
                ensure_stock(&book, item.quantity.saturating_add(requested))?;
                item.add(quantity)?;
                item
            }
            None => {
                ensure_stock(&book, requested)?;
                CartItem::new(cart.id, book_id, quantity, book.price)?
            }
        };
        uow.save_cart_item(&item).await?;

        let view = refresh(&mut uow, cart).await?;
        uow.commit().await?;
        tracing::info!(quantity = item.quantity, "cart item added");
        Ok(view)
    }

    /// Deletes a line from the caller's active cart.
    #[tracing::instrument(skip(self, principal), fields(user_id = %principal.user_id))]
    pub async fn remove_item(&self, principal: &Principal, book_id: BookId) -> Result<CartView> {
        let user_id = require_role(principal, Role::Customer)?;
        let mut uow = self.store.begin().await?;
        let cart = active_cart(&mut uow, user_id).await?;

        if !uow.delete_cart_item(cart.id, book_id).await? {
            return Err(CheckoutError::not_found("cart item", book_id));
        }

        let view = refresh(&mut uow, cart).await?;
        uow.commit().await?;
        Ok(view)
    }

    /// Adds one unit to an existing line.
    #[tracing::instrument(skip(self, principal), fields(user_id = %principal.user_id))]
    pub async fn increment_item(&self, principal: &Principal, book_id: BookId) -> Result<CartView> {
        let user_id = require_role(principal, Role::Customer)?;
        let mut uow = self.store.begin().await?;
        let cart = active_cart(&mut uow, user_id).await?;
        let mut item = find_item(&mut uow, &cart, book_id).await?;
        let book = find_book(&mut uow, book_id).await?;

        ensure_stock(&book, item.quantity.saturating_add(1))?;
        item.add(1)?;
        uow.save_cart_item(&item).await?;

        let view = refresh(&mut uow, cart).await?;
        uow.commit().await?;
        Ok(view)
    }

    /// Removes one unit from a line, deleting the line when it reaches zero.
    #[tracing::instrument(skip(self, principal), fields(user_id = %principal.user_id))]
    pub async fn decrement_item(&self, principal: &Principal, book_id: BookId) -> Result<CartView> {
        let user_id = require_role(principal, Role::Customer)?;
        let mut uow = self.store.begin().await?;
        let cart = active_cart(&mut uow, user_id).await?;
        let mut item = find_item(&mut uow, &cart, book_id).await?;

        if item.decrement() {
            uow.save_cart_item(&item).await?;
        } else {
            uow.delete_cart_item(cart.id, book_id).await?;
        }

        let view = refresh(&mut uow, cart).await?;
        uow.commit().await?;
        Ok(view)
    }
}

async fn active_cart<U: UnitOfWork>(uow: &mut U, user_id: common::UserId) -> Result<Cart> {
    uow.find_active_cart(user_id)
        .await?
        .ok_or_else(|| CheckoutError::not_found("cart", user_id))
}

async fn find_item<U: UnitOfWork>(uow: &mut U, cart: &Cart, book_id: BookId) -> Result<CartItem> {
    uow.find_cart_item(cart.id, book_id)
        .await?
        .ok_or_else(|| CheckoutError::not_found("cart item", book_id))
}

async fn find_book<U: UnitOfWork>(uow: &mut U, book_id: BookId) -> Result<Book> {
    uow.find_book(book_id)
        .await?
        .ok_or_else(|| CheckoutError::not_found("book", book_id))
}

fn ensure_stock(book: &Book, wanted: u32) -> Result<()> {
    if !book.inventory.can_supply(wanted) {
        return Err(CheckoutError::InsufficientStock {
            title: book.title.clone(),
            available: book.available(),
        });
    }
    Ok(())
}

/// Recomputes and stores the cart's totals from its current items.
async fn refresh<U: UnitOfWork>(uow: &mut U, mut cart: Cart) -> Result<CartView> {
    let items = uow.cart_items(cart.id).await?;
    cart.recompute(&items)?;
    uow.save_cart(&cart).await?;
    Ok(CartView { cart, items })
}
