use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use common::{BookId, CartId, OrderId, PaymentId, UserId};
use domain::{Book, Cart, CartItem, Order, Payment, ShippingCost, Transaction};
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::{
    Result, StoreError,
    store::{
        BookRepository, CartRepository, OrderRepository, PaymentRepository, ShippingRepository,
        Store, UnitOfWork,
    },
};

#[derive(Debug, Clone, Default)]
struct MemoryState {
    books: HashMap<BookId, Book>,
    carts: HashMap<CartId, Cart>,
    cart_items: BTreeMap<(CartId, BookId), CartItem>,
    shipping: HashMap<String, ShippingCost>,
    orders: HashMap<OrderId, Order>,
    payments: HashMap<PaymentId, Payment>,
    transactions: Vec<Transaction>,
}

/// In-memory store for tests and local runs.
///
/// A unit of work holds the store's lock for its whole lifetime and works
/// on a private copy of the state, so units of work are fully serialized
/// and a rollback is simply dropping the copy.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    state: Arc<Mutex<MemoryState>>,
    fail_on_commit: Arc<AtomicBool>,
}

impl InMemoryStore {
    /// Creates a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Configures every subsequent commit to fail until reset.
    pub fn set_fail_on_commit(&self, fail: bool) {
        self.fail_on_commit.store(fail, Ordering::SeqCst);
    }

    /// Returns the committed stock of a book.
    pub async fn stock_of(&self, book_id: BookId) -> Option<u32> {
        self.state
            .lock()
            .await
            .books
            .get(&book_id)
            .map(Book::available)
    }

    /// Returns the number of committed transaction rows.
    pub async fn transaction_count(&self) -> usize {
        self.state.lock().await.transactions.len()
    }
}

#[async_trait]
impl Store for InMemoryStore {
    type Uow = InMemoryUnitOfWork;

    async fn begin(&self) -> Result<InMemoryUnitOfWork> {
        let guard = self.state.clone().lock_owned().await;
        let working = guard.clone();
        Ok(InMemoryUnitOfWork {
            guard,
            working,
            fail_on_commit: self.fail_on_commit.load(Ordering::SeqCst),
        })
    }
}

/// Unit of work over [`InMemoryStore`].
pub struct InMemoryUnitOfWork {
    guard: OwnedMutexGuard<MemoryState>,
    working: MemoryState,
    fail_on_commit: bool,
}

#[async_trait]
impl UnitOfWork for InMemoryUnitOfWork {
    async fn commit(mut self) -> Result<()> {
        if self.fail_on_commit {
            return Err(StoreError::CommitFailed(
                "in-memory store configured to fail".to_string(),
            ));
        }
        *self.guard = self.working;
        Ok(())
    }

    async fn rollback(self) -> Result<()> {
        Ok(())
    }
}

#[async_trait]
impl BookRepository for InMemoryUnitOfWork {
    async fn find_book(&mut self, id: BookId) -> Result<Option<Book>> {
        Ok(self.working.books.get(&id).cloned())
    }

    async fn insert_book(&mut self, book: &Book) -> Result<()> {
        if self.working.books.values().any(|b| b.title == book.title) {
            return Err(StoreError::UniqueViolation {
                constraint: "books_title_key".to_string(),
            });
        }
        self.working.books.insert(book.id, book.clone());
        Ok(())
    }

    async fn set_stock(&mut self, id: BookId, quantity: u32) -> Result<bool> {
        Ok(match self.working.books.get_mut(&id) {
            Some(book) => {
                book.inventory.quantity = quantity;
                true
            }
            None => false,
        })
    }

    async fn decrement_stock(&mut self, id: BookId, quantity: u32) -> Result<bool> {
        Ok(match self.working.books.get_mut(&id) {
            Some(book) if book.inventory.can_supply(quantity) => {
                book.inventory.quantity -= quantity;
                true
            }
            _ => false,
        })
    }

    async fn restore_stock(&mut self, id: BookId, quantity: u32) -> Result<bool> {
        Ok(match self.working.books.get_mut(&id) {
            Some(book) => {
                book.inventory.quantity = book
                    .inventory
                    .quantity
                    .checked_add(quantity)
                    .ok_or(StoreError::CounterOverflow {
                        table: "inventory",
                        column: "quantity",
                    })?;
                true
            }
            None => false,
        })
    }

    async fn record_purchase(&mut self, id: BookId, quantity: u32) -> Result<()> {
        if let Some(book) = self.working.books.get_mut(&id) {
            book.purchased = book
                .purchased
                .checked_add(quantity)
                .ok_or(StoreError::CounterOverflow {
                    table: "books",
                    column: "purchased",
                })?;
        }
        Ok(())
    }
}

#[async_trait]
impl CartRepository for InMemoryUnitOfWork {
    async fn find_active_cart(&mut self, user_id: UserId) -> Result<Option<Cart>> {
        Ok(self
            .working
            .carts
            .values()
            .find(|c| c.user_id == user_id && c.is_active())
            .cloned())
    }

    async fn create_active_cart(&mut self, user_id: UserId) -> Result<Cart> {
        if self
            .working
            .carts
            .values()
            .any(|c| c.user_id == user_id && c.is_active())
        {
            return Err(StoreError::UniqueViolation {
                constraint: "carts_one_active_per_user".to_string(),
            });
        }
        let cart = Cart::new_active(user_id);
        self.working.carts.insert(cart.id, cart.clone());
        Ok(cart)
    }

    async fn find_cart(&mut self, id: CartId) -> Result<Option<Cart>> {
        Ok(self.working.carts.get(&id).cloned())
    }

    async fn save_cart(&mut self, cart: &Cart) -> Result<()> {
        self.working.carts.insert(cart.id, cart.clone());
        Ok(())
    }

    async fn cart_items(&mut self, cart_id: CartId) -> Result<Vec<CartItem>> {
        Ok(self
            .working
            .cart_items
            .values()
            .filter(|item| item.cart_id == cart_id)
            .cloned()
            .collect())
    }

    async fn find_cart_item(
        &mut self,
        cart_id: CartId,
        book_id: BookId,
    ) -> Result<Option<CartItem>> {
        Ok(self.working.cart_items.get(&(cart_id, book_id)).cloned())
    }

    async fn save_cart_item(&mut self, item: &CartItem) -> Result<()> {
        self.working
            .cart_items
            .insert((item.cart_id, item.book_id), item.clone());
        Ok(())
    }

    async fn delete_cart_item(&mut self, cart_id: CartId, book_id: BookId) -> Result<bool> {
        Ok(self.working.cart_items.remove(&(cart_id, book_id)).is_some())
    }
}

#[async_trait]
impl ShippingRepository for InMemoryUnitOfWork {
    async fn shipping_cost(&mut self, country: &str) -> Result<Option<ShippingCost>> {
        Ok(self.working.shipping.get(country).cloned())
    }

    async fn upsert_shipping_cost(&mut self, cost: &ShippingCost) -> Result<()> {
        self.working
            .shipping
            .insert(cost.country.clone(), cost.clone());
        Ok(())
    }
}

#[async_trait]
impl OrderRepository for InMemoryUnitOfWork {
    async fn insert_order(&mut self, order: &Order) -> Result<()> {
        self.working.orders.insert(order.id, order.clone());
        Ok(())
    }

    async fn find_order(&mut self, id: OrderId) -> Result<Option<Order>> {
        Ok(self.working.orders.get(&id).cloned())
    }

    async fn lock_order(&mut self, id: OrderId) -> Result<Option<Order>> {
        // The unit of work already holds the store-wide lock.
        self.find_order(id).await
    }

    async fn save_order(&mut self, order: &Order) -> Result<()> {
        self.working.orders.insert(order.id, order.clone());
        Ok(())
    }

    async fn orders_for_user(&mut self, user_id: UserId) -> Result<Vec<Order>> {
        let mut orders: Vec<_> = self
            .working
            .orders
            .values()
            .filter(|o| o.user_id == user_id)
            .cloned()
            .collect();
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(orders)
    }
}

#[async_trait]
impl PaymentRepository for InMemoryUnitOfWork {
    async fn find_payment_for_order(&mut self, order_id: OrderId) -> Result<Option<Payment>> {
        Ok(self
            .working
            .payments
            .values()
            .find(|p| p.order_id == order_id)
            .cloned())
    }

    async fn insert_payment(&mut self, payment: &Payment) -> Result<()> {
        if self
            .working
            .payments
            .values()
            .any(|p| p.order_id == payment.order_id)
        {
            return Err(StoreError::UniqueViolation {
                constraint: "payments_order_id_key".to_string(),
            });
        }
        self.working.payments.insert(payment.id, payment.clone());
        Ok(())
    }

    async fn save_payment(&mut self, payment: &Payment) -> Result<()> {
        self.working.payments.insert(payment.id, payment.clone());
        Ok(())
    }

    async fn append_transaction(&mut self, transaction: &Transaction) -> Result<()> {
        self.working.transactions.push(transaction.clone());
        Ok(())
    }

    async fn transactions_for_payment(
        &mut self,
        payment_id: PaymentId,
    ) -> Result<Vec<Transaction>> {
        Ok(self
            .working
            .transactions
            .iter()
            .filter(|t| t.payment_id == payment_id)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::{Genre, Money, NewBook};

    fn new_book(title: &str, quantity: u32) -> Book {
        NewBook {
            title: title.to_string(),
            author: "Author".to_string(),
            genre: Genre::Mystery,
            year: "2001".to_string(),
            description: String::new(),
            image: String::new(),
            price: Money::from_units(10),
            quantity,
        }
        .into_book()
        .unwrap()
    }

    #[tokio::test]
    async fn commit_publishes_changes() {
        let store = InMemoryStore::new();
        let book = new_book("Committed", 3);

        let mut uow = store.begin().await.unwrap();
        uow.insert_book(&book).await.unwrap();
        uow.commit().await.unwrap();

        assert_eq!(store.stock_of(book.id).await, Some(3));
    }

    #[tokio::test]
    async fn rollback_and_drop_discard_changes() {
        let store = InMemoryStore::new();

        let mut uow = store.begin().await.unwrap();
        let a = new_book("Rolled back", 1);
        uow.insert_book(&a).await.unwrap();
        uow.rollback().await.unwrap();

        let mut uow = store.begin().await.unwrap();
        let b = new_book("Dropped", 1);
        uow.insert_book(&b).await.unwrap();
        drop(uow);

        assert_eq!(store.stock_of(a.id).await, None);
        assert_eq!(store.stock_of(b.id).await, None);
    }

    #[tokio::test]
    async fn decrement_never_goes_negative() {
        let store = InMemoryStore::new();
        let book = new_book("Scarce", 2);

        let mut uow = store.begin().await.unwrap();
        uow.insert_book(&book).await.unwrap();
        assert!(!uow.decrement_stock(book.id, 3).await.unwrap());
        assert!(uow.decrement_stock(book.id, 2).await.unwrap());
        assert!(!uow.decrement_stock(book.id, 1).await.unwrap());
        assert!(!uow.decrement_stock(BookId::new(), 1).await.unwrap());
        uow.commit().await.unwrap();

        assert_eq!(store.stock_of(book.id).await, Some(0));
    }

    #[tokio::test]
    async fn counters_reject_overflow() {
        let store = InMemoryStore::new();
        let book = new_book("Bottomless", u32::MAX - 1);

        let mut uow = store.begin().await.unwrap();
        uow.insert_book(&book).await.unwrap();
        assert!(uow.restore_stock(book.id, 1).await.unwrap());
        assert!(matches!(
            uow.restore_stock(book.id, 1).await,
            Err(StoreError::CounterOverflow { .. })
        ));
        uow.record_purchase(book.id, u32::MAX).await.unwrap();
        assert!(matches!(
            uow.record_purchase(book.id, 1).await,
            Err(StoreError::CounterOverflow { .. })
        ));
        uow.commit().await.unwrap();

        assert_eq!(store.stock_of(book.id).await, Some(u32::MAX));
    }

    #[tokio::test]
    async fn duplicate_title_is_rejected() {
        let store = InMemoryStore::new();
        let mut uow = store.begin().await.unwrap();
        uow.insert_book(&new_book("Twice", 1)).await.unwrap();
        let err = uow.insert_book(&new_book("Twice", 1)).await.unwrap_err();
        assert!(matches!(err, StoreError::UniqueViolation { .. }));
    }

    #[tokio::test]
    async fn one_active_cart_per_user() {
        let store = InMemoryStore::new();
        let user = UserId::new();
        let mut uow = store.begin().await.unwrap();

        let mut cart = uow.create_active_cart(user).await.unwrap();
        assert!(uow.create_active_cart(user).await.is_err());

        cart.mark_ordered().unwrap();
        uow.save_cart(&cart).await.unwrap();
        assert!(uow.find_active_cart(user).await.unwrap().is_none());

        let fresh = uow.create_active_cart(user).await.unwrap();
        assert_ne!(fresh.id, cart.id);
    }

    #[tokio::test]
    async fn failing_commit_keeps_previous_state() {
        let store = InMemoryStore::new();
        store.set_fail_on_commit(true);

        let mut uow = store.begin().await.unwrap();
        let book = new_book("Never stored", 1);
        uow.insert_book(&book).await.unwrap();
        assert!(matches!(
            uow.commit().await,
            Err(StoreError::CommitFailed(_))
        ));

        store.set_fail_on_commit(false);
        assert_eq!(store.stock_of(book.id).await, None);
    }
}
