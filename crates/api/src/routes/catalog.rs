//! Admin endpoints for books, stock and shipping rates.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use common::BookId;
use domain::{Book, Money, NewBook, ShippingCost};
use serde::Deserialize;
use store::Store;

use super::auth::Caller;
use super::parse_id;
use crate::error::ApiError;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct SetStockRequest {
    pub quantity: u32,
}

#[derive(Deserialize)]
pub struct SetShippingCostRequest {
    pub cost_cents: i64,
}

/// POST /books
#[tracing::instrument(skip(state, req))]
pub async fn add_book<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    Caller(principal): Caller,
    Json(req): Json<NewBook>,
) -> Result<(StatusCode, Json<Book>), ApiError> {
    let book = state.catalog.add_book(&principal, req).await?;
    Ok((StatusCode::CREATED, Json(book)))
}

/// PUT /books/:id/stock
#[tracing::instrument(skip(state, req))]
pub async fn set_stock<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    Caller(principal): Caller,
    Path(id): Path<String>,
    Json(req): Json<SetStockRequest>,
) -> Result<Json<Book>, ApiError> {
    let book_id: BookId = parse_id("book", &id)?;
    Ok(Json(
        state
            .catalog
            .set_stock(&principal, book_id, req.quantity)
            .await?,
    ))
}

/// PUT /shipping-costs/:country
#[tracing::instrument(skip(state, req))]
pub async fn set_shipping_cost<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    Caller(principal): Caller,
    Path(country): Path<String>,
    Json(req): Json<SetShippingCostRequest>,
) -> Result<Json<ShippingCost>, ApiError> {
    let shipping = state
        .catalog
        .set_shipping_cost(&principal, &country, Money::from_cents(req.cost_cents))
        .await?;
    Ok(Json(shipping))
}
