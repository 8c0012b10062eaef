//! Order placement, listing and editing endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use common::OrderId;
use domain::Order;
use serde::Deserialize;
use store::Store;

use super::auth::Caller;
use super::parse_id;
use crate::error::ApiError;
use crate::state::AppState;

// -- Request types --

#[derive(Deserialize)]
pub struct CreateOrderRequest {
    pub shipping_address: String,
    pub country: String,
}

#[derive(Deserialize)]
pub struct UpdateAddressRequest {
    pub shipping_address: String,
}

// -- Handlers --

/// POST /orders: snapshot the active cart into a new order.
#[tracing::instrument(skip(state, req))]
pub async fn create<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    Caller(principal): Caller,
    Json(req): Json<CreateOrderRequest>,
) -> Result<(StatusCode, Json<Order>), ApiError> {
    let order = state
        .orders
        .create_order(&principal, &req.shipping_address, &req.country)
        .await?;
    Ok((StatusCode::CREATED, Json(order)))
}

/// GET /orders: the caller's orders, newest first.
#[tracing::instrument(skip(state))]
pub async fn list<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    Caller(principal): Caller,
) -> Result<Json<Vec<Order>>, ApiError> {
    Ok(Json(state.orders.list_orders(&principal).await?))
}

/// GET /orders/:id
#[tracing::instrument(skip(state))]
pub async fn get<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    Caller(principal): Caller,
    Path(id): Path<String>,
) -> Result<Json<Order>, ApiError> {
    let order_id: OrderId = parse_id("order", &id)?;
    Ok(Json(state.orders.get_order(&principal, order_id).await?))
}

/// PATCH /orders/:id/address: only while the payment is pending.
#[tracing::instrument(skip(state, req))]
pub async fn update_address<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    Caller(principal): Caller,
    Path(id): Path<String>,
    Json(req): Json<UpdateAddressRequest>,
) -> Result<Json<Order>, ApiError> {
    let order_id: OrderId = parse_id("order", &id)?;
    let order = state
        .orders
        .update_shipping_address(&principal, order_id, &req.shipping_address)
        .await?;
    Ok(Json(order))
}

/// POST /orders/:id/cancel: fails an unpaid order and restores its stock.
#[tracing::instrument(skip(state))]
pub async fn cancel<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    Caller(principal): Caller,
    Path(id): Path<String>,
) -> Result<Json<Order>, ApiError> {
    let order_id: OrderId = parse_id("order", &id)?;
    Ok(Json(state.orders.cancel_order(&principal, order_id).await?))
}
