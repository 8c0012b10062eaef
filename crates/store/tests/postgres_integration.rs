//! PostgreSQL integration tests
//!
//! These tests share one PostgreSQL container and need a Docker daemon.
//! Run with:
//!
//! ```bash
//! cargo test -p store --test postgres_integration -- --ignored --test-threads=1
//! ```

use std::sync::Arc;

use common::UserId;
use domain::{
    Book, Genre, Money, NewBook, Order, OrderTotals, Payment, PaymentMethod, PaymentStatus,
    ShippingCost, TaxRate, Transaction, TransactionStatus,
};
use sqlx::PgPool;
use store::{
    BookRepository, CartRepository, OrderRepository, PaymentRepository, PostgresStore,
    ShippingRepository, Store, StoreError, UnitOfWork,
};
use testcontainers::{ContainerAsync, runners::AsyncRunner};
use testcontainers_modules::postgres::Postgres;
use tokio::sync::OnceCell;

struct ContainerInfo {
    #[allow(dead_code)] // Container must stay alive for tests
    container: ContainerAsync<Postgres>,
    connection_string: String,
}

static CONTAINER: OnceCell<Arc<ContainerInfo>> = OnceCell::const_new();

async fn get_container_info() -> Arc<ContainerInfo> {
    CONTAINER
        .get_or_init(|| async {
            let container = Postgres::default().start().await.unwrap();

            let host = container.get_host().await.unwrap();
            let port = container.get_host_port_ipv4(5432).await.unwrap();

            let connection_string =
                format!("postgres://postgres:postgres@{}:{}/postgres", host, port);

            let temp_pool = PgPool::connect(&connection_string).await.unwrap();
            sqlx::raw_sql(include_str!(
                "../../../migrations/001_create_bookstore_tables.sql"
            ))
            .execute(&temp_pool)
            .await
            .unwrap();
            temp_pool.close().await;

            Arc::new(ContainerInfo {
                container,
                connection_string,
            })
        })
        .await
        .clone()
}

async fn get_test_store() -> PostgresStore {
    let info = get_container_info().await;
    let store = PostgresStore::connect(&info.connection_string, 5)
        .await
        .unwrap();

    sqlx::query(
        "TRUNCATE TABLE transactions, payments, orders, cart_items, carts, shipping_costs, inventory, books",
    )
    .execute(store.pool())
    .await
    .unwrap();

    store
}

fn new_book(title: &str, quantity: u32) -> Book {
    NewBook {
        title: title.to_string(),
        author: "Author".to_string(),
        genre: Genre::SciFi,
        year: "1999".to_string(),
        description: "desc".to_string(),
        image: String::new(),
        price: Money::from_cents(1250),
        quantity,
    }
    .into_book()
    .unwrap()
}

async fn seed_book(store: &PostgresStore, title: &str, quantity: u32) -> Book {
    let book = new_book(title, quantity);
    let mut uow = store.begin().await.unwrap();
    uow.insert_book(&book).await.unwrap();
    uow.commit().await.unwrap();
    book
}

#[tokio::test]
#[ignore = "requires a Docker daemon"]
async fn book_round_trip() {
    let store = get_test_store().await;
    let book = seed_book(&store, "Round Trip", 4).await;

    let mut uow = store.begin().await.unwrap();
    let loaded = uow.find_book(book.id).await.unwrap().unwrap();
    assert_eq!(loaded.title, "Round Trip");
    assert_eq!(loaded.genre, Genre::SciFi);
    assert_eq!(loaded.price, Money::from_cents(1250));
    assert_eq!(loaded.available(), 4);
}

#[tokio::test]
#[ignore = "requires a Docker daemon"]
async fn duplicate_title_maps_to_unique_violation() {
    let store = get_test_store().await;
    seed_book(&store, "Unique", 1).await;

    let mut uow = store.begin().await.unwrap();
    let err = uow.insert_book(&new_book("Unique", 1)).await.unwrap_err();
    assert!(matches!(err, StoreError::UniqueViolation { .. }));
}

#[tokio::test]
#[ignore = "requires a Docker daemon"]
async fn conditional_decrement_refuses_oversell() {
    let store = get_test_store().await;
    let book = seed_book(&store, "Scarce", 2).await;

    let mut uow = store.begin().await.unwrap();
    assert!(!uow.decrement_stock(book.id, 3).await.unwrap());
    assert!(uow.decrement_stock(book.id, 2).await.unwrap());
    assert!(!uow.decrement_stock(book.id, 1).await.unwrap());
    uow.commit().await.unwrap();

    let mut uow = store.begin().await.unwrap();
    assert_eq!(uow.find_book(book.id).await.unwrap().unwrap().available(), 0);
}

#[tokio::test]
#[ignore = "requires a Docker daemon"]
async fn rollback_discards_writes() {
    let store = get_test_store().await;
    let book = seed_book(&store, "Rollback", 5).await;

    let mut uow = store.begin().await.unwrap();
    assert!(uow.decrement_stock(book.id, 5).await.unwrap());
    uow.rollback().await.unwrap();

    let mut uow = store.begin().await.unwrap();
    assert_eq!(uow.find_book(book.id).await.unwrap().unwrap().available(), 5);
}

#[tokio::test]
#[ignore = "requires a Docker daemon"]
async fn partial_index_allows_one_active_cart() {
    let store = get_test_store().await;
    let user = UserId::new();

    let mut uow = store.begin().await.unwrap();
    let mut cart = uow.create_active_cart(user).await.unwrap();
    uow.commit().await.unwrap();

    let mut uow = store.begin().await.unwrap();
    assert!(matches!(
        uow.create_active_cart(user).await,
        Err(StoreError::UniqueViolation { .. })
    ));
    drop(uow);

    let mut uow = store.begin().await.unwrap();
    cart.mark_ordered().unwrap();
    uow.save_cart(&cart).await.unwrap();
    assert!(uow.find_active_cart(user).await.unwrap().is_none());
    uow.create_active_cart(user).await.unwrap();
    uow.commit().await.unwrap();
}

#[tokio::test]
#[ignore = "requires a Docker daemon"]
async fn order_payment_and_transactions_round_trip() {
    let store = get_test_store().await;
    let user = UserId::new();

    let mut uow = store.begin().await.unwrap();
    let cart = uow.create_active_cart(user).await.unwrap();
    uow.upsert_shipping_cost(&ShippingCost::new("India", Money::from_units(20)).unwrap())
        .await
        .unwrap();
    let ship = uow.shipping_cost("India").await.unwrap().unwrap();

    let totals = OrderTotals::compute(Money::from_units(25), ship.cost, TaxRate::DEFAULT).unwrap();
    let order = Order::place(user, cart.id, totals, "1 Main St", "India");
    uow.insert_order(&order).await.unwrap();

    let mut payment = Payment::open(&order, PaymentMethod::Upi);
    uow.insert_payment(&payment).await.unwrap();
    assert!(uow.insert_payment(&Payment::open(&order, PaymentMethod::Card)).await.is_err());
    uow.commit().await.unwrap();

    let mut uow = store.begin().await.unwrap();
    let mut locked = uow.lock_order(order.id).await.unwrap().unwrap();
    assert_eq!(locked.total, Money::from_cents(5310));

    payment.record_attempt(TransactionStatus::Success).unwrap();
    uow.save_payment(&payment).await.unwrap();
    uow.append_transaction(&Transaction::record(payment.id, TransactionStatus::Success))
        .await
        .unwrap();
    locked.mirror_payment(payment.status);
    uow.save_order(&locked).await.unwrap();
    uow.commit().await.unwrap();

    let mut uow = store.begin().await.unwrap();
    let stored = uow.find_payment_for_order(order.id).await.unwrap().unwrap();
    assert_eq!(stored.status, PaymentStatus::Successful);
    assert_eq!(stored.attempts, 1);
    let txns = uow.transactions_for_payment(payment.id).await.unwrap();
    assert_eq!(txns.len(), 1);
    assert_eq!(txns[0].message, "Successful Payment");
    let orders = uow.orders_for_user(user).await.unwrap();
    assert_eq!(orders.len(), 1);
    assert_eq!(orders[0].payment_status, PaymentStatus::Successful);
}
