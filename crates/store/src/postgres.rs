use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{BookId, CartId, OrderId, PaymentId, TransactionId, UserId};
use domain::{
    Book, Cart, CartItem, Inventory, Money, Order, Payment, ShippingCost, Transaction,
};
use sqlx::{
    PgPool, Postgres, Row,
    postgres::{PgPoolOptions, PgRow},
};
use uuid::Uuid;

use crate::{
    Result, StoreError,
    store::{
        BookRepository, CartRepository, OrderRepository, PaymentRepository, ShippingRepository,
        Store, UnitOfWork,
    },
};

const BOOK_COLUMNS: &str = r#"
    b.id, b.title, b.author, b.genre, b.year, b.description, b.image, b.price_cents,
    b.avg_rating, b.purchased, b.added_on, i.quantity
"#;

const CART_COLUMNS: &str = "id, user_id, total_cost_cents, total_books, status, created_at, updated_at";

const CART_ITEM_COLUMNS: &str =
    "cart_id, book_id, quantity, price_when_added_cents, created_at, updated_at";

const ORDER_COLUMNS: &str = r#"
    id, user_id, cart_id, cart_cost_cents, shipping_cost_cents, taxes_cents, total_cents,
    shipping_address, country, payment_status, created_at
"#;

const PAYMENT_COLUMNS: &str =
    "id, order_id, total_cost_cents, mode_of_payment, attempts, status, created_at";

const TRANSACTION_COLUMNS: &str = "id, payment_id, txn_reference, status, message, created_at";

/// PostgreSQL-backed store.
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Creates a store over an existing pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connects a new pool to `database_url`.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        Ok(Self::new(pool))
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        tracing::info!("database migrations applied");
        Ok(())
    }
}

#[async_trait]
impl Store for PostgresStore {
    type Uow = PostgresUnitOfWork;

    async fn begin(&self) -> Result<PostgresUnitOfWork> {
        Ok(PostgresUnitOfWork {
            tx: self.pool.begin().await?,
        })
    }
}

/// Unit of work backed by one database transaction.
///
/// Dropping it without committing rolls the transaction back.
pub struct PostgresUnitOfWork {
    tx: sqlx::Transaction<'static, Postgres>,
}

#[async_trait]
impl UnitOfWork for PostgresUnitOfWork {
    async fn commit(self) -> Result<()> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self) -> Result<()> {
        self.tx.rollback().await?;
        Ok(())
    }
}

fn write_error(e: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(ref db_err) = e
        && db_err.is_unique_violation()
    {
        return StoreError::UniqueViolation {
            constraint: db_err.constraint().unwrap_or_default().to_string(),
        };
    }
    StoreError::Database(e)
}

fn parse<T>(table: &'static str, value: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value.parse().map_err(|e: T::Err| StoreError::Decode {
        table,
        reason: e.to_string(),
    })
}

fn count(table: &'static str, value: i64) -> Result<u32> {
    u32::try_from(value).map_err(|_| StoreError::Decode {
        table,
        reason: format!("count out of range: {value}"),
    })
}

fn row_to_book(row: PgRow) -> Result<Book> {
    let id = BookId::from_uuid(row.try_get::<Uuid, _>("id")?);
    let genre: String = row.try_get("genre")?;
    Ok(Book {
        id,
        title: row.try_get("title")?,
        author: row.try_get("author")?,
        genre: parse("books", &genre)?,
        year: row.try_get("year")?,
        description: row.try_get("description")?,
        image: row.try_get("image")?,
        price: Money::from_cents(row.try_get("price_cents")?),
        avg_rating: row.try_get("avg_rating")?,
        purchased: count("books", row.try_get("purchased")?)?,
        added_on: row.try_get("added_on")?,
        inventory: Inventory {
            book_id: id,
            quantity: count("inventory", row.try_get("quantity")?)?,
        },
    })
}

fn row_to_cart(row: PgRow) -> Result<Cart> {
    let status: String = row.try_get("status")?;
    Ok(Cart {
        id: CartId::from_uuid(row.try_get::<Uuid, _>("id")?),
        user_id: UserId::from_uuid(row.try_get::<Uuid, _>("user_id")?),
        total_cost: Money::from_cents(row.try_get("total_cost_cents")?),
        total_books: count("carts", row.try_get("total_books")?)?,
        status: parse("carts", &status)?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn row_to_cart_item(row: PgRow) -> Result<CartItem> {
    Ok(CartItem {
        cart_id: CartId::from_uuid(row.try_get::<Uuid, _>("cart_id")?),
        book_id: BookId::from_uuid(row.try_get::<Uuid, _>("book_id")?),
        quantity: count("cart_items", row.try_get("quantity")?)?,
        price_when_added: Money::from_cents(row.try_get("price_when_added_cents")?),
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn row_to_order(row: PgRow) -> Result<Order> {
    let payment_status: String = row.try_get("payment_status")?;
    Ok(Order {
        id: OrderId::from_uuid(row.try_get::<Uuid, _>("id")?),
        user_id: UserId::from_uuid(row.try_get::<Uuid, _>("user_id")?),
        cart_id: row
            .try_get::<Option<Uuid>, _>("cart_id")?
            .map(CartId::from_uuid),
        cart_cost: Money::from_cents(row.try_get("cart_cost_cents")?),
        shipping_cost: Money::from_cents(row.try_get("shipping_cost_cents")?),
        taxes: Money::from_cents(row.try_get("taxes_cents")?),
        total: Money::from_cents(row.try_get("total_cents")?),
        shipping_address: row.try_get("shipping_address")?,
        country: row.try_get("country")?,
        payment_status: parse("orders", &payment_status)?,
        created_at: row.try_get::<DateTime<Utc>, _>("created_at")?,
    })
}

fn row_to_payment(row: PgRow) -> Result<Payment> {
    let method: String = row.try_get("mode_of_payment")?;
    let status: String = row.try_get("status")?;
    Ok(Payment {
        id: PaymentId::from_uuid(row.try_get::<Uuid, _>("id")?),
        order_id: OrderId::from_uuid(row.try_get::<Uuid, _>("order_id")?),
        total_cost: Money::from_cents(row.try_get("total_cost_cents")?),
        mode_of_payment: parse("payments", &method)?,
        attempts: count("payments", row.try_get("attempts")?)?,
        status: parse("payments", &status)?,
        created_at: row.try_get("created_at")?,
    })
}

fn row_to_transaction(row: PgRow) -> Result<Transaction> {
    let status: String = row.try_get("status")?;
    Ok(Transaction {
        id: TransactionId::from_uuid(row.try_get::<Uuid, _>("id")?),
        payment_id: PaymentId::from_uuid(row.try_get::<Uuid, _>("payment_id")?),
        txn_reference: row.try_get("txn_reference")?,
        status: parse("transactions", &status)?,
        message: row.try_get("message")?,
        created_at: row.try_get("created_at")?,
    })
}

#[async_trait]
impl BookRepository for PostgresUnitOfWork {
    async fn find_book(&mut self, id: BookId) -> Result<Option<Book>> {
        let row = sqlx::query(&format!(
            "SELECT {BOOK_COLUMNS} FROM books b JOIN inventory i ON i.book_id = b.id WHERE b.id = $1"
        ))
        .bind(id.as_uuid())
        .fetch_optional(&mut *self.tx)
        .await?;

        row.map(row_to_book).transpose()
    }

    async fn insert_book(&mut self, book: &Book) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO books (id, title, author, genre, year, description, image, price_cents,
                               avg_rating, purchased, added_on)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(book.id.as_uuid())
        .bind(&book.title)
        .bind(&book.author)
        .bind(book.genre.as_str())
        .bind(&book.year)
        .bind(&book.description)
        .bind(&book.image)
        .bind(book.price.cents())
        .bind(book.avg_rating)
        .bind(i64::from(book.purchased))
        .bind(book.added_on)
        .execute(&mut *self.tx)
        .await
        .map_err(write_error)?;

        sqlx::query("INSERT INTO inventory (book_id, quantity) VALUES ($1, $2)")
            .bind(book.id.as_uuid())
            .bind(i64::from(book.inventory.quantity))
            .execute(&mut *self.tx)
            .await
            .map_err(write_error)?;

        Ok(())
    }

    async fn set_stock(&mut self, id: BookId, quantity: u32) -> Result<bool> {
        let result = sqlx::query("UPDATE inventory SET quantity = $2 WHERE book_id = $1")
            .bind(id.as_uuid())
            .bind(i64::from(quantity))
            .execute(&mut *self.tx)
            .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn decrement_stock(&mut self, id: BookId, quantity: u32) -> Result<bool> {
        // Conditional update so concurrent checkouts can never oversell.
        let result = sqlx::query(
            "UPDATE inventory SET quantity = quantity - $2 WHERE book_id = $1 AND quantity >= $2",
        )
        .bind(id.as_uuid())
        .bind(i64::from(quantity))
        .execute(&mut *self.tx)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn restore_stock(&mut self, id: BookId, quantity: u32) -> Result<bool> {
        let result =
            sqlx::query("UPDATE inventory SET quantity = quantity + $2 WHERE book_id = $1")
                .bind(id.as_uuid())
                .bind(i64::from(quantity))
                .execute(&mut *self.tx)
                .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn record_purchase(&mut self, id: BookId, quantity: u32) -> Result<()> {
        sqlx::query("UPDATE books SET purchased = purchased + $2 WHERE id = $1")
            .bind(id.as_uuid())
            .bind(i64::from(quantity))
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl CartRepository for PostgresUnitOfWork {
    async fn find_active_cart(&mut self, user_id: UserId) -> Result<Option<Cart>> {
        let row = sqlx::query(&format!(
            "SELECT {CART_COLUMNS} FROM carts WHERE user_id = $1 AND status = 'ACTIVE' FOR UPDATE"
        ))
        .bind(user_id.as_uuid())
        .fetch_optional(&mut *self.tx)
        .await?;

        row.map(row_to_cart).transpose()
    }

    async fn create_active_cart(&mut self, user_id: UserId) -> Result<Cart> {
        let cart = Cart::new_active(user_id);
        sqlx::query(&format!(
            "INSERT INTO carts ({CART_COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6, $7)"
        ))
        .bind(cart.id.as_uuid())
        .bind(cart.user_id.as_uuid())
        .bind(cart.total_cost.cents())
        .bind(i64::from(cart.total_books))
        .bind(cart.status.as_str())
        .bind(cart.created_at)
        .bind(cart.updated_at)
        .execute(&mut *self.tx)
        .await
        .map_err(write_error)?;

        Ok(cart)
    }

    async fn find_cart(&mut self, id: CartId) -> Result<Option<Cart>> {
        let row = sqlx::query(&format!("SELECT {CART_COLUMNS} FROM carts WHERE id = $1"))
            .bind(id.as_uuid())
            .fetch_optional(&mut *self.tx)
            .await?;

        row.map(row_to_cart).transpose()
    }

    async fn save_cart(&mut self, cart: &Cart) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE carts
            SET total_cost_cents = $2, total_books = $3, status = $4, updated_at = $5
            WHERE id = $1
            "#,
        )
        .bind(cart.id.as_uuid())
        .bind(cart.total_cost.cents())
        .bind(i64::from(cart.total_books))
        .bind(cart.status.as_str())
        .bind(cart.updated_at)
        .execute(&mut *self.tx)
        .await
        .map_err(write_error)?;

        Ok(())
    }

    async fn cart_items(&mut self, cart_id: CartId) -> Result<Vec<CartItem>> {
        let rows = sqlx::query(&format!(
            "SELECT {CART_ITEM_COLUMNS} FROM cart_items WHERE cart_id = $1 ORDER BY created_at ASC"
        ))
        .bind(cart_id.as_uuid())
        .fetch_all(&mut *self.tx)
        .await?;

        rows.into_iter().map(row_to_cart_item).collect()
    }

    async fn find_cart_item(
        &mut self,
        cart_id: CartId,
        book_id: BookId,
    ) -> Result<Option<CartItem>> {
        let row = sqlx::query(&format!(
            "SELECT {CART_ITEM_COLUMNS} FROM cart_items WHERE cart_id = $1 AND book_id = $2"
        ))
        .bind(cart_id.as_uuid())
        .bind(book_id.as_uuid())
        .fetch_optional(&mut *self.tx)
        .await?;

        row.map(row_to_cart_item).transpose()
    }

    async fn save_cart_item(&mut self, item: &CartItem) -> Result<()> {
        sqlx::query(&format!(
            r#"
            INSERT INTO cart_items ({CART_ITEM_COLUMNS})
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (cart_id, book_id) DO UPDATE SET
                quantity = EXCLUDED.quantity,
                price_when_added_cents = EXCLUDED.price_when_added_cents,
                updated_at = EXCLUDED.updated_at
            "#
        ))
        .bind(item.cart_id.as_uuid())
        .bind(item.book_id.as_uuid())
        .bind(i64::from(item.quantity))
        .bind(item.price_when_added.cents())
        .bind(item.created_at)
        .bind(item.updated_at)
        .execute(&mut *self.tx)
        .await?;

        Ok(())
    }

    async fn delete_cart_item(&mut self, cart_id: CartId, book_id: BookId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM cart_items WHERE cart_id = $1 AND book_id = $2")
            .bind(cart_id.as_uuid())
            .bind(book_id.as_uuid())
            .execute(&mut *self.tx)
            .await?;
        Ok(result.rows_affected() == 1)
    }
}

#[async_trait]
impl ShippingRepository for PostgresUnitOfWork {
    async fn shipping_cost(&mut self, country: &str) -> Result<Option<ShippingCost>> {
        let row = sqlx::query("SELECT country, cost_cents FROM shipping_costs WHERE country = $1")
            .bind(country)
            .fetch_optional(&mut *self.tx)
            .await?;

        match row {
            Some(row) => Ok(Some(ShippingCost {
                country: row.try_get("country")?,
                cost: Money::from_cents(row.try_get("cost_cents")?),
            })),
            None => Ok(None),
        }
    }

    async fn upsert_shipping_cost(&mut self, cost: &ShippingCost) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO shipping_costs (country, cost_cents)
            VALUES ($1, $2)
            ON CONFLICT (country) DO UPDATE SET cost_cents = EXCLUDED.cost_cents
            "#,
        )
        .bind(&cost.country)
        .bind(cost.cost.cents())
        .execute(&mut *self.tx)
        .await?;

        Ok(())
    }
}

#[async_trait]
impl OrderRepository for PostgresUnitOfWork {
    async fn insert_order(&mut self, order: &Order) -> Result<()> {
        sqlx::query(&format!(
            "INSERT INTO orders ({ORDER_COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)"
        ))
        .bind(order.id.as_uuid())
        .bind(order.user_id.as_uuid())
        .bind(order.cart_id.map(|id| id.as_uuid()))
        .bind(order.cart_cost.cents())
        .bind(order.shipping_cost.cents())
        .bind(order.taxes.cents())
        .bind(order.total.cents())
        .bind(&order.shipping_address)
        .bind(&order.country)
        .bind(order.payment_status.as_str())
        .bind(order.created_at)
        .execute(&mut *self.tx)
        .await
        .map_err(write_error)?;

        Ok(())
    }

    async fn find_order(&mut self, id: OrderId) -> Result<Option<Order>> {
        let row = sqlx::query(&format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1"))
            .bind(id.as_uuid())
            .fetch_optional(&mut *self.tx)
            .await?;

        row.map(row_to_order).transpose()
    }

    async fn lock_order(&mut self, id: OrderId) -> Result<Option<Order>> {
        let row = sqlx::query(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1 FOR UPDATE"
        ))
        .bind(id.as_uuid())
        .fetch_optional(&mut *self.tx)
        .await?;

        row.map(row_to_order).transpose()
    }

    async fn save_order(&mut self, order: &Order) -> Result<()> {
        sqlx::query("UPDATE orders SET shipping_address = $2, payment_status = $3 WHERE id = $1")
            .bind(order.id.as_uuid())
            .bind(&order.shipping_address)
            .bind(order.payment_status.as_str())
            .execute(&mut *self.tx)
            .await?;

        Ok(())
    }

    async fn orders_for_user(&mut self, user_id: UserId) -> Result<Vec<Order>> {
        let rows = sqlx::query(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE user_id = $1 ORDER BY created_at DESC"
        ))
        .bind(user_id.as_uuid())
        .fetch_all(&mut *self.tx)
        .await?;

        rows.into_iter().map(row_to_order).collect()
    }
}

#[async_trait]
impl PaymentRepository for PostgresUnitOfWork {
    async fn find_payment_for_order(&mut self, order_id: OrderId) -> Result<Option<Payment>> {
        let row = sqlx::query(&format!(
            "SELECT {PAYMENT_COLUMNS} FROM payments WHERE order_id = $1"
        ))
        .bind(order_id.as_uuid())
        .fetch_optional(&mut *self.tx)
        .await?;

        row.map(row_to_payment).transpose()
    }

    async fn insert_payment(&mut self, payment: &Payment) -> Result<()> {
        sqlx::query(&format!(
            "INSERT INTO payments ({PAYMENT_COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6, $7)"
        ))
        .bind(payment.id.as_uuid())
        .bind(payment.order_id.as_uuid())
        .bind(payment.total_cost.cents())
        .bind(payment.mode_of_payment.as_str())
        .bind(i64::from(payment.attempts))
        .bind(payment.status.as_str())
        .bind(payment.created_at)
        .execute(&mut *self.tx)
        .await
        .map_err(write_error)?;

        Ok(())
    }

    async fn save_payment(&mut self, payment: &Payment) -> Result<()> {
        sqlx::query(
            "UPDATE payments SET mode_of_payment = $2, attempts = $3, status = $4 WHERE id = $1",
        )
        .bind(payment.id.as_uuid())
        .bind(payment.mode_of_payment.as_str())
        .bind(i64::from(payment.attempts))
        .bind(payment.status.as_str())
        .execute(&mut *self.tx)
        .await?;

        Ok(())
    }

    async fn append_transaction(&mut self, transaction: &Transaction) -> Result<()> {
        sqlx::query(&format!(
            "INSERT INTO transactions ({TRANSACTION_COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6)"
        ))
        .bind(transaction.id.as_uuid())
        .bind(transaction.payment_id.as_uuid())
        .bind(&transaction.txn_reference)
        .bind(transaction.status.as_str())
        .bind(&transaction.message)
        .bind(transaction.created_at)
        .execute(&mut *self.tx)
        .await
        .map_err(write_error)?;

        Ok(())
    }

    async fn transactions_for_payment(
        &mut self,
        payment_id: PaymentId,
    ) -> Result<Vec<Transaction>> {
        let rows = sqlx::query(&format!(
            "SELECT {TRANSACTION_COLUMNS} FROM transactions WHERE payment_id = $1 ORDER BY created_at ASC"
        ))
        .bind(payment_id.as_uuid())
        .fetch_all(&mut *self.tx)
        .await?;

        rows.into_iter().map(row_to_transaction).collect()
    }
}
