//! HTTP API server for the bookstore checkout core.
//!
//! Exposes cart, order, payment and catalog endpoints over any
//! [`store::Store`], with structured logging (tracing) and Prometheus
//! metrics.

pub mod config;
pub mod error;
pub mod routes;
pub mod state;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, patch, post, put};
use checkout::RandomGateway;
use metrics_exporter_prometheus::PrometheusHandle;
use store::Store;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::Config;
pub use state::AppState;

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<S: Store>(state: Arc<AppState<S>>, metrics_handle: PrometheusHandle) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check))
        // Cart
        .route("/cart", get(routes::cart::get::<S>))
        .route("/cart/items", post(routes::cart::add_item::<S>))
        .route(
            "/cart/items/{book_id}",
            axum::routing::delete(routes::cart::remove::<S>),
        )
        .route(
            "/cart/items/{book_id}/increment",
            patch(routes::cart::increment::<S>),
        )
        .route(
            "/cart/items/{book_id}/decrement",
            patch(routes::cart::decrement::<S>),
        )
        // Orders
        .route(
            "/orders",
            post(routes::orders::create::<S>).get(routes::orders::list::<S>),
        )
        .route("/orders/{id}", get(routes::orders::get::<S>))
        .route(
            "/orders/{id}/address",
            patch(routes::orders::update_address::<S>),
        )
        .route("/orders/{id}/cancel", post(routes::orders::cancel::<S>))
        // Payments
        .route(
            "/payments/{order_id}/start",
            post(routes::payments::start::<S>),
        )
        .route(
            "/payments/{order_id}/retry",
            post(routes::payments::retry::<S>),
        )
        .route(
            "/payments/{order_id}/status",
            get(routes::payments::status::<S>),
        )
        .route(
            "/payments/{order_id}/transactions",
            get(routes::payments::transactions::<S>),
        )
        // Catalog
        .route("/books", post(routes::catalog::add_book::<S>))
        .route("/books/{id}/stock", put(routes::catalog::set_stock::<S>))
        .route(
            "/shipping-costs/{country}",
            put(routes::catalog::set_shipping_cost::<S>),
        )
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

/// Creates the default application state with the simulated payment gateway.
pub fn create_default_state<S: Store>(store: S, config: &Config) -> Arc<AppState<S>> {
    Arc::new(AppState::new(
        store,
        Arc::new(RandomGateway::new()),
        config.tax_rate,
        config.payment_delay,
    ))
}

/// Registers descriptions for the checkout metrics.
pub fn describe_metrics() {
    metrics::describe_counter!("orders_created_total", "Orders placed from a cart");
    metrics::describe_counter!(
        "order_creation_failed_total",
        "Order placements rejected or rolled back"
    );
    metrics::describe_histogram!(
        "order_creation_duration_seconds",
        metrics::Unit::Seconds,
        "Time spent placing an order"
    );
    metrics::describe_counter!(
        "payment_attempts_total",
        "Payment attempts by outcome"
    );
    metrics::describe_counter!("payments_succeeded_total", "Payments settled successfully");
    metrics::describe_counter!(
        "payments_failed_total",
        "Payments failed after exhausting their attempts"
    );
    metrics::describe_counter!(
        "compensations_total",
        "Carts cancelled with their stock restored"
    );
}
