//! Settlement behaviour when the store misbehaves mid-operation.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use checkout::{
    CartService, CatalogService, CheckoutError, ErrorKind, OrderService, PaymentService,
    ScriptedGateway, TransactionProcessor, compensate,
};
use common::{BookId, CartId, OrderId, PaymentId, UserId};
use domain::{
    Book, Cart, CartItem, CartStatus, Genre, Money, NewBook, Order, Payment, PaymentMethod,
    PaymentStatus, Principal, ShippingCost, TaxRate, Transaction, TransactionStatus,
};
use store::{
    BookRepository, CartRepository, InMemoryStore, InMemoryUnitOfWork, OrderRepository,
    PaymentRepository, Result, ShippingRepository, Store, StoreError, UnitOfWork,
};

const FAILURE: Option<TransactionStatus> = Some(TransactionStatus::Failure);

#[derive(Default)]
struct Faults {
    /// `restore_stock` fails with a database error.
    restore_stock: AtomicBool,
    /// `decrement_stock` refuses and the book disappears for the rest of the unit of work.
    book_vanishes_on_decrement: AtomicBool,
}

/// In-memory store with switchable faults.
#[derive(Clone, Default)]
struct FaultyStore {
    inner: InMemoryStore,
    faults: Arc<Faults>,
}

struct FaultyUnitOfWork {
    inner: InMemoryUnitOfWork,
    faults: Arc<Faults>,
    vanished: HashSet<BookId>,
}

#[async_trait]
impl Store for FaultyStore {
    type Uow = FaultyUnitOfWork;

    async fn begin(&self) -> Result<FaultyUnitOfWork> {
        Ok(FaultyUnitOfWork {
            inner: self.inner.begin().await?,
            faults: self.faults.clone(),
            vanished: HashSet::new(),
        })
    }
}

#[async_trait]
impl UnitOfWork for FaultyUnitOfWork {
    async fn commit(self) -> Result<()> {
        self.inner.commit().await
    }

    async fn rollback(self) -> Result<()> {
        self.inner.rollback().await
    }
}

#[async_trait]
impl BookRepository for FaultyUnitOfWork {
    async fn find_book(&mut self, id: BookId) -> Result<Option<Book>> {
        if self.vanished.contains(&id) {
            return Ok(None);
        }
        self.inner.find_book(id).await
    }

    async fn insert_book(&mut self, book: &Book) -> Result<()> {
        self.inner.insert_book(book).await
    }

    async fn set_stock(&mut self, id: BookId, quantity: u32) -> Result<bool> {
        self.inner.set_stock(id, quantity).await
    }

    async fn decrement_stock(&mut self, id: BookId, quantity: u32) -> Result<bool> {
        if self.faults.book_vanishes_on_decrement.load(Ordering::SeqCst) {
            self.vanished.insert(id);
            return Ok(false);
        }
        self.inner.decrement_stock(id, quantity).await
    }

    async fn restore_stock(&mut self, id: BookId, quantity: u32) -> Result<bool> {
        if self.faults.restore_stock.load(Ordering::SeqCst) {
            return Err(StoreError::Database(sqlx::Error::PoolTimedOut));
        }
        self.inner.restore_stock(id, quantity).await
    }

    async fn record_purchase(&mut self, id: BookId, quantity: u32) -> Result<()> {
        self.inner.record_purchase(id, quantity).await
    }
}

#[async_trait]
impl CartRepository for FaultyUnitOfWork {
    async fn find_active_cart(&mut self, user_id: UserId) -> Result<Option<Cart>> {
        self.inner.find_active_cart(user_id).await
    }

    async fn create_active_cart(&mut self, user_id: UserId) -> Result<Cart> {
        self.inner.create_active_cart(user_id).await
    }

    async fn find_cart(&mut self, id: CartId) -> Result<Option<Cart>> {
        self.inner.find_cart(id).await
    }

    async fn save_cart(&mut self, cart: &Cart) -> Result<()> {
        self.inner.save_cart(cart).await
    }

    async fn cart_items(&mut self, cart_id: CartId) -> Result<Vec<CartItem>> {
        self.inner.cart_items(cart_id).await
    }

    async fn find_cart_item(
        &mut self,
        cart_id: CartId,
        book_id: BookId,
    ) -> Result<Option<CartItem>> {
        self.inner.find_cart_item(cart_id, book_id).await
    }

    async fn save_cart_item(&mut self, item: &CartItem) -> Result<()> {
        self.inner.save_cart_item(item).await
    }

    async fn delete_cart_item(&mut self, cart_id: CartId, book_id: BookId) -> Result<bool> {
        self.inner.delete_cart_item(cart_id, book_id).await
    }
}

#[async_trait]
impl ShippingRepository for FaultyUnitOfWork {
    async fn shipping_cost(&mut self, country: &str) -> Result<Option<ShippingCost>> {
        self.inner.shipping_cost(country).await
    }

    async fn upsert_shipping_cost(&mut self, cost: &ShippingCost) -> Result<()> {
        self.inner.upsert_shipping_cost(cost).await
    }
}

#[async_trait]
impl OrderRepository for FaultyUnitOfWork {
    async fn insert_order(&mut self, order: &Order) -> Result<()> {
        self.inner.insert_order(order).await
    }

    async fn find_order(&mut self, id: OrderId) -> Result<Option<Order>> {
        self.inner.find_order(id).await
    }

    async fn lock_order(&mut self, id: OrderId) -> Result<Option<Order>> {
        self.inner.lock_order(id).await
    }

    async fn save_order(&mut self, order: &Order) -> Result<()> {
        self.inner.save_order(order).await
    }

    async fn orders_for_user(&mut self, user_id: UserId) -> Result<Vec<Order>> {
        self.inner.orders_for_user(user_id).await
    }
}

#[async_trait]
impl PaymentRepository for FaultyUnitOfWork {
    async fn find_payment_for_order(&mut self, order_id: OrderId) -> Result<Option<Payment>> {
        self.inner.find_payment_for_order(order_id).await
    }

    async fn insert_payment(&mut self, payment: &Payment) -> Result<()> {
        self.inner.insert_payment(payment).await
    }

    async fn save_payment(&mut self, payment: &Payment) -> Result<()> {
        self.inner.save_payment(payment).await
    }

    async fn append_transaction(&mut self, transaction: &Transaction) -> Result<()> {
        self.inner.append_transaction(transaction).await
    }

    async fn transactions_for_payment(
        &mut self,
        payment_id: PaymentId,
    ) -> Result<Vec<Transaction>> {
        self.inner.transactions_for_payment(payment_id).await
    }
}

struct FaultHarness {
    store: FaultyStore,
    carts: CartService<FaultyStore>,
    orders: OrderService<FaultyStore>,
    payments: PaymentService<FaultyStore>,
    book: BookId,
}

impl FaultHarness {
    /// One book with 5 in stock and shipping to India configured.
    async fn new() -> Self {
        let store = FaultyStore::default();
        let admin = Principal::admin(UserId::new());
        let catalog = CatalogService::new(store.clone());
        let book = catalog
            .add_book(
                &admin,
                NewBook {
                    title: "Fragile".to_string(),
                    author: "Test Author".to_string(),
                    genre: Genre::Thriller,
                    year: "2019".to_string(),
                    description: String::new(),
                    image: String::new(),
                    price: Money::from_cents(1000),
                    quantity: 5,
                },
            )
            .await
            .unwrap()
            .id;
        catalog
            .set_shipping_cost(&admin, "India", Money::from_cents(2000))
            .await
            .unwrap();

        let processor = TransactionProcessor::new(Arc::new(ScriptedGateway::always(
            TransactionStatus::Failure,
        )));
        Self {
            carts: CartService::new(store.clone()),
            orders: OrderService::new(store.clone(), TaxRate::DEFAULT),
            payments: PaymentService::new(store.clone(), processor),
            store,
            book,
        }
    }

    async fn order_two(&self, user: &Principal) -> Order {
        self.carts.add_item(user, self.book, 2).await.unwrap();
        self.orders
            .create_order(user, "9 Fault Line", "India")
            .await
            .unwrap()
    }

    async fn cart_status(&self, order: &Order) -> CartStatus {
        let mut uow = self.store.begin().await.unwrap();
        let cart_id = order.cart_id.unwrap();
        uow.find_cart(cart_id).await.unwrap().unwrap().status
    }
}

#[tokio::test]
async fn test_compensation_store_failure_is_internal() {
    let h = FaultHarness::new().await;
    let user = Principal::customer(UserId::new());
    let order = h.order_two(&user).await;

    h.store.faults.restore_stock.store(true, Ordering::SeqCst);
    let mut uow = h.store.begin().await.unwrap();
    let err = compensate(&mut uow, &order).await.unwrap_err();

    assert!(
        matches!(err, CheckoutError::CompensationFailed { order_id, .. } if order_id == order.id),
        "unexpected error: {err}"
    );
    assert_eq!(err.kind(), ErrorKind::Internal);
}

#[tokio::test]
async fn test_failed_compensation_leaves_third_attempt_uncommitted() {
    let h = FaultHarness::new().await;
    let user = Principal::customer(UserId::new());
    let order = h.order_two(&user).await;

    h.payments
        .start_or_retry_payment(&user, order.id, PaymentMethod::Cod, FAILURE)
        .await
        .unwrap();
    h.payments
        .retry_payment(&user, order.id, FAILURE)
        .await
        .unwrap();

    h.store.faults.restore_stock.store(true, Ordering::SeqCst);
    let err = h
        .payments
        .retry_payment(&user, order.id, FAILURE)
        .await
        .unwrap_err();
    assert!(matches!(err, CheckoutError::CompensationFailed { .. }));
    assert_eq!(err.kind(), ErrorKind::Internal);
    h.store.faults.restore_stock.store(false, Ordering::SeqCst);

    let status = h.payments.payment_status(&user, order.id).await.unwrap();
    assert_eq!(status.payment.attempts, 2);
    assert_eq!(status.payment.status, PaymentStatus::Pending);
    assert_eq!(h.store.inner.transaction_count().await, 2);
    assert_eq!(h.store.inner.stock_of(h.book).await, Some(3));
    assert_eq!(h.cart_status(&order).await, CartStatus::Ordered);
    let order_now = h.orders.get_order(&user, order.id).await.unwrap();
    assert_eq!(order_now.payment_status, PaymentStatus::Pending);
}

#[tokio::test]
async fn test_book_removed_during_order_is_not_found() {
    let h = FaultHarness::new().await;
    let user = Principal::customer(UserId::new());
    h.carts.add_item(&user, h.book, 2).await.unwrap();

    h.store
        .faults
        .book_vanishes_on_decrement
        .store(true, Ordering::SeqCst);
    let err = h
        .orders
        .create_order(&user, "9 Fault Line", "India")
        .await
        .unwrap_err();

    assert!(
        matches!(&err, CheckoutError::NotFound { entity: "book", key } if *key == h.book.to_string()),
        "unexpected error: {err}"
    );
    assert_eq!(h.store.inner.stock_of(h.book).await, Some(5));
}
