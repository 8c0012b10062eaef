use async_trait::async_trait;
use common::{BookId, CartId, OrderId, PaymentId, UserId};
use domain::{Book, Cart, CartItem, Order, Payment, ShippingCost, Transaction};

use crate::Result;

/// Books and the inventory rows attached to them.
#[async_trait]
pub trait BookRepository: Send {
    /// Loads a book together with its current stock.
    async fn find_book(&mut self, id: BookId) -> Result<Option<Book>>;

    /// Inserts a book and its inventory row.
    ///
    /// Fails with `UniqueViolation` if the title is already taken.
    async fn insert_book(&mut self, book: &Book) -> Result<()>;

    /// Overwrites the stock of a book. Returns `false` if the book does not exist.
    async fn set_stock(&mut self, id: BookId, quantity: u32) -> Result<bool>;

    /// Takes `quantity` units from stock if at least that many are available.
    ///
    /// Returns `false`, leaving stock untouched, when the book is missing or
    /// the stock is insufficient. Never drives stock below zero.
    async fn decrement_stock(&mut self, id: BookId, quantity: u32) -> Result<bool>;

    /// Returns `quantity` units to stock. Returns `false` if the book does not exist.
    async fn restore_stock(&mut self, id: BookId, quantity: u32) -> Result<bool>;

    /// Adds to the book's purchased counter.
    async fn record_purchase(&mut self, id: BookId, quantity: u32) -> Result<()>;
}

/// Carts and cart items.
#[async_trait]
pub trait CartRepository: Send {
    /// Returns the user's single active cart, if any.
    async fn find_active_cart(&mut self, user_id: UserId) -> Result<Option<Cart>>;

    /// Creates and stores an empty active cart for the user.
    async fn create_active_cart(&mut self, user_id: UserId) -> Result<Cart>;

    /// Loads a cart in any status.
    async fn find_cart(&mut self, id: CartId) -> Result<Option<Cart>>;

    /// Persists the cart's totals and status.
    async fn save_cart(&mut self, cart: &Cart) -> Result<()>;

    /// Lists a cart's items regardless of the cart's status.
    async fn cart_items(&mut self, cart_id: CartId) -> Result<Vec<CartItem>>;

    async fn find_cart_item(
        &mut self,
        cart_id: CartId,
        book_id: BookId,
    ) -> Result<Option<CartItem>>;

    /// Inserts or updates the line keyed by `(cart_id, book_id)`.
    async fn save_cart_item(&mut self, item: &CartItem) -> Result<()>;

    /// Deletes a line. Returns `false` if it did not exist.
    async fn delete_cart_item(&mut self, cart_id: CartId, book_id: BookId) -> Result<bool>;
}

/// Per-country shipping rates.
#[async_trait]
pub trait ShippingRepository: Send {
    async fn shipping_cost(&mut self, country: &str) -> Result<Option<ShippingCost>>;

    async fn upsert_shipping_cost(&mut self, cost: &ShippingCost) -> Result<()>;
}

/// Orders.
#[async_trait]
pub trait OrderRepository: Send {
    async fn insert_order(&mut self, order: &Order) -> Result<()>;

    async fn find_order(&mut self, id: OrderId) -> Result<Option<Order>>;

    /// Loads an order and holds an exclusive lock on it until the unit of
    /// work ends. All payment transitions for the order go through this.
    async fn lock_order(&mut self, id: OrderId) -> Result<Option<Order>>;

    /// Persists mutable order fields (address and payment status).
    async fn save_order(&mut self, order: &Order) -> Result<()>;

    /// Lists a user's orders, newest first.
    async fn orders_for_user(&mut self, user_id: UserId) -> Result<Vec<Order>>;
}

/// Payments and their append-only transaction log.
#[async_trait]
pub trait PaymentRepository: Send {
    async fn find_payment_for_order(&mut self, order_id: OrderId) -> Result<Option<Payment>>;

    async fn insert_payment(&mut self, payment: &Payment) -> Result<()>;

    /// Persists method, attempt count and status.
    async fn save_payment(&mut self, payment: &Payment) -> Result<()>;

    /// Appends an attempt outcome. Existing rows are never modified.
    async fn append_transaction(&mut self, transaction: &Transaction) -> Result<()>;

    /// Lists a payment's transactions, oldest first.
    async fn transactions_for_payment(&mut self, payment_id: PaymentId)
    -> Result<Vec<Transaction>>;
}

/// One storage transaction scoped to a single core operation.
#[async_trait]
pub trait UnitOfWork:
    BookRepository + CartRepository + ShippingRepository + OrderRepository + PaymentRepository
{
    /// Makes every change made through this unit of work durable.
    async fn commit(self) -> Result<()>;

    /// Discards every change made through this unit of work.
    async fn rollback(self) -> Result<()>;
}

/// Factory for units of work.
///
/// All implementations must be thread-safe and cheap to clone.
#[async_trait]
pub trait Store: Clone + Send + Sync + 'static {
    type Uow: UnitOfWork + 'static;

    /// Opens a new unit of work.
    async fn begin(&self) -> Result<Self::Uow>;
}
