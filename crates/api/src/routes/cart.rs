//! Cart endpoints for the calling customer.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use checkout::CartView;
use common::BookId;
use serde::Deserialize;
use store::Store;

use super::auth::Caller;
use super::parse_id;
use crate::error::ApiError;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct AddItemRequest {
    pub book_id: BookId,
    pub quantity: i64,
}

/// GET /cart: the caller's active cart and its items.
#[tracing::instrument(skip(state))]
pub async fn get<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    Caller(principal): Caller,
) -> Result<Json<CartView>, ApiError> {
    Ok(Json(state.carts.get_cart(&principal).await?))
}

/// POST /cart/items: add a book, creating the cart if needed.
#[tracing::instrument(skip(state, req))]
pub async fn add_item<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    Caller(principal): Caller,
    Json(req): Json<AddItemRequest>,
) -> Result<(StatusCode, Json<CartView>), ApiError> {
    let view = state
        .carts
        .add_item(&principal, req.book_id, req.quantity)
        .await?;
    Ok((StatusCode::CREATED, Json(view)))
}

/// PATCH /cart/items/:book_id/increment
#[tracing::instrument(skip(state))]
pub async fn increment<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    Caller(principal): Caller,
    Path(book_id): Path<String>,
) -> Result<Json<CartView>, ApiError> {
    let book_id = parse_id("book", &book_id)?;
    Ok(Json(state.carts.increment_item(&principal, book_id).await?))
}

/// PATCH /cart/items/:book_id/decrement: a line reaching zero is removed.
#[tracing::instrument(skip(state))]
pub async fn decrement<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    Caller(principal): Caller,
    Path(book_id): Path<String>,
) -> Result<Json<CartView>, ApiError> {
    let book_id = parse_id("book", &book_id)?;
    Ok(Json(state.carts.decrement_item(&principal, book_id).await?))
}

/// DELETE /cart/items/:book_id
#[tracing::instrument(skip(state))]
pub async fn remove<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    Caller(principal): Caller,
    Path(book_id): Path<String>,
) -> Result<Json<CartView>, ApiError> {
    let book_id = parse_id("book", &book_id)?;
    Ok(Json(state.carts.remove_item(&principal, book_id).await?))
}
