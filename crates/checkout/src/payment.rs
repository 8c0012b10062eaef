//! Payment state machine: attempt tracking, settlement and retries.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use common::{OrderId, UserId};
use domain::{
    MAX_PAYMENT_ATTEMPTS, Order, Payment, PaymentMethod, PaymentStatus, Principal, Role,
    Transaction, TransactionStatus,
};
use serde::Serialize;
use store::{BookRepository, CartRepository, OrderRepository, PaymentRepository, Store, UnitOfWork};
use tokio::sync::Notify;
use tokio::task::JoinHandle;

use crate::compensator;
use crate::error::{CheckoutError, Result};
use crate::orders::owned_order;
use crate::processor::TransactionProcessor;
use crate::require_role;

/// Result of one settled attempt.
#[derive(Debug, Clone, Serialize)]
pub struct Settlement {
    pub order: Order,
    pub payment: Payment,
    pub outcome: TransactionStatus,
}

/// Snapshot of a payment for status polling.
#[derive(Debug, Clone, Serialize)]
pub struct PaymentStatusView {
    pub payment: Payment,
    pub max_attempts: u32,
    pub remaining_attempts: u32,
    pub can_retry: bool,
    pub last_transaction_status: Option<TransactionStatus>,
    pub message: Option<String>,
}

/// Service driving the payment of orders.
///
/// Every transition locks the order first, so at most one attempt per order
/// is in flight at a time.
#[derive(Clone)]
pub struct PaymentService<S: Store> {
    store: S,
    processor: TransactionProcessor,
    in_flight: InFlight,
}

/// Counts background settlements that have not finished yet.
#[derive(Clone, Default)]
struct InFlight {
    count: Arc<AtomicUsize>,
    idle: Arc<Notify>,
}

/// Held by one background settlement; released when its task ends or is aborted.
struct InFlightGuard(InFlight);

impl InFlight {
    fn enter(&self) -> InFlightGuard {
        self.count.fetch_add(1, Ordering::SeqCst);
        InFlightGuard(self.clone())
    }

    fn len(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }

    async fn wait_idle(&self) {
        loop {
            // Register before reading the count so a release in between is not missed.
            let released = self.idle.notified();
            if self.len() == 0 {
                return;
            }
            released.await;
        }
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        if self.0.count.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.0.idle.notify_waiters();
        }
    }
}

impl<S: Store> PaymentService<S> {
    pub fn new(store: S, processor: TransactionProcessor) -> Self {
        Self {
            store,
            processor,
            in_flight: InFlight::default(),
        }
    }

    /// Opens the order's payment, or switches its method, ready for an attempt.
    ///
    /// A payment that already used all its attempts is failed here, the
    /// order's stock is restored and `AttemptsExceeded` is returned.
    #[tracing::instrument(skip(self, principal), fields(user_id = %principal.user_id))]
    pub async fn prepare(
        &self,
        principal: &Principal,
        order_id: OrderId,
        method: PaymentMethod,
    ) -> Result<Payment> {
        let user_id = require_role(principal, Role::Customer)?;
        let mut uow = self.store.begin().await?;
        let mut order = owned_order(&mut uow, user_id, order_id, true).await?;
        ensure_unsettled(&order)?;

        let payment = match uow.find_payment_for_order(order_id).await? {
            None => {
                let payment = Payment::open(&order, method);
                uow.insert_payment(&payment).await?;
                tracing::info!(payment_id = %payment.id, %method, "payment opened");
                payment
            }
            Some(mut payment) => {
                if payment.change_method(method)? {
                    uow.save_payment(&payment).await?;
                    tracing::info!(payment_id = %payment.id, %method, "payment method changed");
                }
                payment
            }
        };

        if payment.is_exhausted() {
            return exhaust(uow, &mut order, payment).await;
        }

        uow.commit().await?;
        Ok(payment)
    }

    /// Checks that the caller's order has a payment that can be retried.
    #[tracing::instrument(skip(self, principal), fields(user_id = %principal.user_id))]
    pub async fn prepare_retry(&self, principal: &Principal, order_id: OrderId) -> Result<Payment> {
        let user_id = require_role(principal, Role::Customer)?;
        let mut uow = self.store.begin().await?;
        let mut order = owned_order(&mut uow, user_id, order_id, true).await?;
        ensure_unsettled(&order)?;

        let payment = uow
            .find_payment_for_order(order_id)
            .await?
            .ok_or_else(|| CheckoutError::not_found("payment", order_id))?;

        if payment.is_exhausted() {
            return exhaust(uow, &mut order, payment).await;
        }

        uow.rollback().await?;
        Ok(payment)
    }

    /// Runs one payment attempt for the order.
    ///
    /// The order is locked and its state re-checked before the attempt. A
    /// success marks payment and order `SUCCESSFUL` and counts the books as
    /// purchased. The final failed attempt marks both `FAILED` and restores
    /// the cart's stock.
    #[tracing::instrument(skip(self))]
    pub async fn settle(
        &self,
        order_id: OrderId,
        force: Option<TransactionStatus>,
    ) -> Result<Settlement> {
        let mut uow = self.store.begin().await?;
        let mut order = uow
            .lock_order(order_id)
            .await?
            .ok_or_else(|| CheckoutError::not_found("order", order_id))?;
        ensure_unsettled(&order)?;

        let mut payment = uow
            .find_payment_for_order(order_id)
            .await?
            .ok_or_else(|| CheckoutError::not_found("payment", order_id))?;

        if payment.is_exhausted() {
            return exhaust(uow, &mut order, payment).await;
        }

        let outcome = self.processor.attempt(&mut uow, &mut payment, force).await?;
        order.mirror_payment(payment.status);
        uow.save_order(&order).await?;

        match payment.status {
            PaymentStatus::Successful => {
                record_purchases(&mut uow, &order).await?;
                uow.commit().await?;
                metrics::counter!("payments_succeeded_total").increment(1);
                tracing::info!(attempts = payment.attempts, "payment successful");
            }
            PaymentStatus::Failed => {
                compensator::compensate(&mut uow, &order).await?;
                uow.commit().await?;
                metrics::counter!("payments_failed_total").increment(1);
                tracing::warn!(attempts = payment.attempts, "payment failed, attempts exhausted");
            }
            PaymentStatus::Pending => {
                uow.commit().await?;
                tracing::info!(
                    remaining = payment.remaining_attempts(),
                    "payment attempt failed, retry allowed"
                );
            }
        }

        Ok(Settlement {
            order,
            payment,
            outcome,
        })
    }

    /// Prepares the payment and runs one attempt right away.
    pub async fn start_or_retry_payment(
        &self,
        principal: &Principal,
        order_id: OrderId,
        method: PaymentMethod,
        force: Option<TransactionStatus>,
    ) -> Result<Settlement> {
        self.prepare(principal, order_id, method).await?;
        self.settle(order_id, force).await
    }

    /// Retries the existing payment with its current method.
    pub async fn retry_payment(
        &self,
        principal: &Principal,
        order_id: OrderId,
        force: Option<TransactionStatus>,
    ) -> Result<Settlement> {
        self.prepare_retry(principal, order_id).await?;
        self.settle(order_id, force).await
    }

    /// Runs [`settle`](Self::settle) on a background task after `delay`.
    ///
    /// Failures are logged; callers observe the result by polling the
    /// payment status. The task counts as in flight until it ends, see
    /// [`drain_settlements`](Self::drain_settlements).
    pub fn spawn_settlement(
        &self,
        order_id: OrderId,
        force: Option<TransactionStatus>,
        delay: Duration,
    ) -> JoinHandle<()> {
        let service = self.clone();
        let guard = self.in_flight.enter();
        tokio::spawn(async move {
            let _guard = guard;
            tokio::time::sleep(delay).await;
            match service.settle(order_id, force).await {
                Ok(settlement) => tracing::debug!(
                    %order_id,
                    status = %settlement.payment.status,
                    "background settlement finished"
                ),
                Err(e) => match e.kind() {
                    crate::ErrorKind::Internal => {
                        tracing::error!(%order_id, error = %e, "background settlement failed")
                    }
                    _ => tracing::warn!(%order_id, error = %e, "background settlement rejected"),
                },
            }
        })
    }

    /// Number of background settlements that have not finished.
    pub fn settlements_in_flight(&self) -> usize {
        self.in_flight.len()
    }

    /// Waits up to `grace` for background settlements to finish.
    ///
    /// Returns how many were still running when the grace period ran out.
    /// An unfinished settlement never committed, so its attempt can be
    /// retried after restart.
    pub async fn drain_settlements(&self, grace: Duration) -> usize {
        let pending = self.in_flight.len();
        if pending == 0 {
            return 0;
        }
        tracing::info!(pending, "waiting for background settlements");
        match tokio::time::timeout(grace, self.in_flight.wait_idle()).await {
            Ok(()) => 0,
            Err(_) => self.in_flight.len(),
        }
    }

    /// Returns the payment of one of the caller's orders with retry hints.
    pub async fn payment_status(
        &self,
        principal: &Principal,
        order_id: OrderId,
    ) -> Result<PaymentStatusView> {
        let user_id = require_role(principal, Role::Customer)?;
        let (payment, transactions) = self.load(user_id, order_id).await?;
        let last = transactions.last();

        Ok(PaymentStatusView {
            max_attempts: MAX_PAYMENT_ATTEMPTS,
            remaining_attempts: payment.remaining_attempts(),
            can_retry: payment.can_attempt(),
            last_transaction_status: last.map(|t| t.status),
            message: last.map(|t| t.message.clone()),
            payment,
        })
    }

    /// Returns the transaction log of one of the caller's orders, oldest first.
    pub async fn transactions(
        &self,
        principal: &Principal,
        order_id: OrderId,
    ) -> Result<Vec<Transaction>> {
        let user_id = require_role(principal, Role::Customer)?;
        Ok(self.load(user_id, order_id).await?.1)
    }

    async fn load(&self, user_id: UserId, order_id: OrderId) -> Result<(Payment, Vec<Transaction>)> {
        let mut uow = self.store.begin().await?;
        owned_order(&mut uow, user_id, order_id, false).await?;
        let payment = uow
            .find_payment_for_order(order_id)
            .await?
            .ok_or_else(|| CheckoutError::not_found("payment", order_id))?;
        let transactions = uow.transactions_for_payment(payment.id).await?;
        uow.rollback().await?;
        Ok((payment, transactions))
    }
}

fn ensure_unsettled(order: &Order) -> Result<()> {
    match order.payment_status {
        PaymentStatus::Pending => Ok(()),
        PaymentStatus::Successful => Err(CheckoutError::Conflict(
            "Payment already completed for this order".to_string(),
        )),
        PaymentStatus::Failed => Err(CheckoutError::Conflict(
            "Payment attempts exceeded or order cancelled, create a new order".to_string(),
        )),
    }
}

/// Fails a payment whose attempts are used up and compensates its order.
///
/// Commits the unit of work and always returns `AttemptsExceeded` unless
/// the compensation itself fails.
async fn exhaust<U: UnitOfWork, T>(mut uow: U, order: &mut Order, mut payment: Payment) -> Result<T> {
    payment.mark_failed()?;
    uow.save_payment(&payment).await?;
    order.mirror_payment(PaymentStatus::Failed);
    uow.save_order(order).await?;
    compensator::compensate(&mut uow, order).await?;
    uow.commit().await?;

    metrics::counter!("payments_failed_total").increment(1);
    tracing::warn!(order_id = %order.id, attempts = payment.attempts, "payment attempts exceeded");
    Err(CheckoutError::AttemptsExceeded { order_id: order.id })
}

async fn record_purchases<U: UnitOfWork>(uow: &mut U, order: &Order) -> Result<()> {
    let Some(cart_id) = order.cart_id else {
        return Ok(());
    };
    for item in uow.cart_items(cart_id).await? {
        uow.record_purchase(item.book_id, item.quantity).await?;
    }
    Ok(())
}
