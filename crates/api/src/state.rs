//! Shared application state.

use std::sync::Arc;
use std::time::Duration;

use checkout::{
    CartService, CatalogService, OrderService, PaymentGateway, PaymentService,
    TransactionProcessor,
};
use domain::TaxRate;
use store::Store;

/// Shared application state accessible from all handlers.
pub struct AppState<S: Store> {
    pub carts: CartService<S>,
    pub orders: OrderService<S>,
    pub payments: PaymentService<S>,
    pub catalog: CatalogService<S>,
    /// Delay before a background payment attempt runs.
    pub payment_delay: Duration,
}

impl<S: Store> AppState<S> {
    pub fn new(
        store: S,
        gateway: Arc<dyn PaymentGateway>,
        tax_rate: TaxRate,
        payment_delay: Duration,
    ) -> Self {
        Self {
            carts: CartService::new(store.clone()),
            orders: OrderService::new(store.clone(), tax_rate),
            payments: PaymentService::new(store.clone(), TransactionProcessor::new(gateway)),
            catalog: CatalogService::new(store),
            payment_delay,
        }
    }
}
