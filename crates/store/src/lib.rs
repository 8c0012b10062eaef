//! Persistence for the bookstore checkout system.
//!
//! Every core operation runs inside one [`UnitOfWork`] obtained from a
//! [`Store`]. The caller commits or rolls it back explicitly; dropping an
//! uncommitted unit of work discards its changes.

pub mod error;
pub mod memory;
pub mod postgres;
pub mod store;

pub use error::{Result, StoreError};
pub use memory::{InMemoryStore, InMemoryUnitOfWork};
pub use postgres::{PostgresStore, PostgresUnitOfWork};
pub use store::{
    BookRepository, CartRepository, OrderRepository, PaymentRepository, ShippingRepository,
    Store, UnitOfWork,
};
