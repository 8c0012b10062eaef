//! Admin operations on the catalog and shipping rates.

use common::BookId;
use domain::{Book, Money, NewBook, Principal, Role, ShippingCost};
use store::{BookRepository, ShippingRepository, Store, StoreError, UnitOfWork};

use crate::error::{CheckoutError, Result};
use crate::require_role;

/// Minimal catalog administration.
#[derive(Clone)]
pub struct CatalogService<S: Store> {
    store: S,
}

impl<S: Store> CatalogService<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Adds a book with its initial stock.
    #[tracing::instrument(skip(self, principal, new_book), fields(title = %new_book.title))]
    pub async fn add_book(&self, principal: &Principal, new_book: NewBook) -> Result<Book> {
        require_role(principal, Role::Admin)?;
        let book = new_book.into_book()?;

        let mut uow = self.store.begin().await?;
        uow.insert_book(&book).await.map_err(|e| match e {
            StoreError::UniqueViolation { .. } => {
                CheckoutError::Conflict(format!("Book with title '{}' already exists", book.title))
            }
            other => other.into(),
        })?;
        uow.commit().await?;

        tracing::info!(book_id = %book.id, stock = book.available(), "book added");
        Ok(book)
    }

    /// Overwrites a book's stock.
    #[tracing::instrument(skip(self, principal))]
    pub async fn set_stock(
        &self,
        principal: &Principal,
        book_id: BookId,
        quantity: u32,
    ) -> Result<Book> {
        require_role(principal, Role::Admin)?;
        let mut uow = self.store.begin().await?;
        if !uow.set_stock(book_id, quantity).await? {
            return Err(CheckoutError::not_found("book", book_id));
        }
        let book = uow
            .find_book(book_id)
            .await?
            .ok_or_else(|| CheckoutError::not_found("book", book_id))?;
        uow.commit().await?;
        Ok(book)
    }

    /// Creates or replaces the shipping rate for a country.
    #[tracing::instrument(skip(self, principal))]
    pub async fn set_shipping_cost(
        &self,
        principal: &Principal,
        country: &str,
        cost: Money,
    ) -> Result<ShippingCost> {
        require_role(principal, Role::Admin)?;
        let shipping = ShippingCost::new(country, cost)?;
        let mut uow = self.store.begin().await?;
        uow.upsert_shipping_cost(&shipping).await?;
        uow.commit().await?;
        Ok(shipping)
    }
}
