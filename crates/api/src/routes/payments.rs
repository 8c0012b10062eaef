//! Payment start, retry and status polling endpoints.
//!
//! Start and retry only validate and acknowledge; the attempt itself runs
//! on a background task after the configured delay and the client polls
//! `/payments/:order_id/status` for the outcome.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use checkout::PaymentStatusView;
use common::{OrderId, PaymentId};
use domain::{Payment, PaymentMethod, Transaction, TransactionStatus};
use serde::{Deserialize, Serialize};
use store::Store;

use super::auth::Caller;
use super::parse_id;
use crate::error::ApiError;
use crate::state::AppState;

// -- Request types --

#[derive(Deserialize)]
pub struct StartPaymentRequest {
    pub method: PaymentMethod,
}

/// Optional override of the simulated gateway outcome.
#[derive(Debug, Default, Deserialize)]
pub struct SimulationParams {
    pub txn_status: Option<bool>,
}

impl SimulationParams {
    fn forced_outcome(&self) -> Option<TransactionStatus> {
        self.txn_status.map(|ok| {
            if ok {
                TransactionStatus::Success
            } else {
                TransactionStatus::Failure
            }
        })
    }
}

// -- Response types --

#[derive(Serialize)]
pub struct PaymentAcceptedResponse {
    pub status: &'static str,
    pub order_id: OrderId,
    pub payment_id: PaymentId,
    pub method: PaymentMethod,
    pub attempt: u32,
    pub message: String,
}

impl PaymentAcceptedResponse {
    fn new(order_id: OrderId, payment: &Payment) -> Self {
        Self {
            status: "processing",
            order_id,
            payment_id: payment.id,
            method: payment.mode_of_payment,
            attempt: payment.attempts + 1,
            message: "Payment is being processed, poll the status endpoint for the outcome"
                .to_string(),
        }
    }
}

// -- Handlers --

/// POST /payments/:order_id/start: open or re-method the payment and queue an attempt.
#[tracing::instrument(skip(state, req))]
pub async fn start<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    Caller(principal): Caller,
    Path(order_id): Path<String>,
    Query(params): Query<SimulationParams>,
    Json(req): Json<StartPaymentRequest>,
) -> Result<(StatusCode, Json<PaymentAcceptedResponse>), ApiError> {
    let order_id: OrderId = parse_id("order", &order_id)?;
    let payment = state
        .payments
        .prepare(&principal, order_id, req.method)
        .await?;

    state
        .payments
        .spawn_settlement(order_id, params.forced_outcome(), state.payment_delay);

    Ok((
        StatusCode::ACCEPTED,
        Json(PaymentAcceptedResponse::new(order_id, &payment)),
    ))
}

/// POST /payments/:order_id/retry: queue another attempt with the current method.
#[tracing::instrument(skip(state))]
pub async fn retry<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    Caller(principal): Caller,
    Path(order_id): Path<String>,
    Query(params): Query<SimulationParams>,
) -> Result<(StatusCode, Json<PaymentAcceptedResponse>), ApiError> {
    let order_id: OrderId = parse_id("order", &order_id)?;
    let payment = state.payments.prepare_retry(&principal, order_id).await?;

    state
        .payments
        .spawn_settlement(order_id, params.forced_outcome(), state.payment_delay);

    Ok((
        StatusCode::ACCEPTED,
        Json(PaymentAcceptedResponse::new(order_id, &payment)),
    ))
}

/// GET /payments/:order_id/status
#[tracing::instrument(skip(state))]
pub async fn status<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    Caller(principal): Caller,
    Path(order_id): Path<String>,
) -> Result<Json<PaymentStatusView>, ApiError> {
    let order_id: OrderId = parse_id("order", &order_id)?;
    Ok(Json(state.payments.payment_status(&principal, order_id).await?))
}

/// GET /payments/:order_id/transactions: attempt log, oldest first.
#[tracing::instrument(skip(state))]
pub async fn transactions<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    Caller(principal): Caller,
    Path(order_id): Path<String>,
) -> Result<Json<Vec<Transaction>>, ApiError> {
    let order_id: OrderId = parse_id("order", &order_id)?;
    Ok(Json(state.payments.transactions(&principal, order_id).await?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forced_outcome_from_query() {
        let none = SimulationParams::default();
        assert_eq!(none.forced_outcome(), None);

        let ok = SimulationParams {
            txn_status: Some(true),
        };
        assert_eq!(ok.forced_outcome(), Some(TransactionStatus::Success));

        let fail = SimulationParams {
            txn_status: Some(false),
        };
        assert_eq!(fail.forced_outcome(), Some(TransactionStatus::Failure));
    }
}
