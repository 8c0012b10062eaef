//! Transaction processor and the simulated payment gateway.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use domain::{Payment, Transaction, TransactionStatus};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use store::{PaymentRepository, UnitOfWork};

use crate::error::{CheckoutError, Result};

/// Decides the outcome of one payment attempt.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn charge(&self, payment: &Payment) -> TransactionStatus;
}

/// Gateway that succeeds half of the time.
#[derive(Debug, Default)]
pub struct RandomGateway {
    rng: Option<Mutex<StdRng>>,
}

impl RandomGateway {
    /// Creates a gateway backed by the thread-local generator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a gateway with a reproducible outcome sequence.
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: Some(Mutex::new(StdRng::seed_from_u64(seed))),
        }
    }

    fn flip(&self) -> bool {
        match &self.rng {
            Some(rng) => match rng.lock() {
                Ok(mut rng) => rng.random_bool(0.5),
                Err(poisoned) => poisoned.into_inner().random_bool(0.5),
            },
            None => rand::rng().random_bool(0.5),
        }
    }
}

#[async_trait]
impl PaymentGateway for RandomGateway {
    async fn charge(&self, _payment: &Payment) -> TransactionStatus {
        if self.flip() {
            TransactionStatus::Success
        } else {
            TransactionStatus::Failure
        }
    }
}

/// Gateway that replays a fixed list of outcomes, for tests.
///
/// Once the script runs out every further charge returns the fallback.
#[derive(Debug, Clone)]
pub struct ScriptedGateway {
    script: Arc<Mutex<VecDeque<TransactionStatus>>>,
    fallback: TransactionStatus,
}

impl ScriptedGateway {
    pub fn new(outcomes: impl IntoIterator<Item = TransactionStatus>) -> Self {
        Self {
            script: Arc::new(Mutex::new(outcomes.into_iter().collect())),
            fallback: TransactionStatus::Failure,
        }
    }

    /// A gateway that always answers `outcome`.
    pub fn always(outcome: TransactionStatus) -> Self {
        Self {
            script: Arc::new(Mutex::new(VecDeque::new())),
            fallback: outcome,
        }
    }

    /// Returns the number of scripted outcomes not yet consumed.
    pub fn remaining(&self) -> usize {
        self.script.lock().map(|s| s.len()).unwrap_or(0)
    }
}

#[async_trait]
impl PaymentGateway for ScriptedGateway {
    async fn charge(&self, _payment: &Payment) -> TransactionStatus {
        let next = match self.script.lock() {
            Ok(mut script) => script.pop_front(),
            Err(_) => None,
        };
        next.unwrap_or(self.fallback)
    }
}

/// Runs single payment attempts and appends their transaction rows.
#[derive(Clone)]
pub struct TransactionProcessor {
    gateway: Arc<dyn PaymentGateway>,
}

impl TransactionProcessor {
    pub fn new(gateway: Arc<dyn PaymentGateway>) -> Self {
        Self { gateway }
    }

    /// Performs one attempt against `payment` and persists the result.
    ///
    /// `force` bypasses the gateway. Counts exactly one attempt and writes
    /// exactly one transaction row. Refuses settled or exhausted payments
    /// without writing anything.
    #[tracing::instrument(skip(self, uow, payment), fields(payment_id = %payment.id, attempt = payment.attempts + 1))]
    pub async fn attempt<U: UnitOfWork>(
        &self,
        uow: &mut U,
        payment: &mut Payment,
        force: Option<TransactionStatus>,
    ) -> Result<TransactionStatus> {
        if !payment.can_attempt() {
            tracing::warn!(status = %payment.status, attempts = payment.attempts, "attempt refused");
            return Err(CheckoutError::Conflict(format!(
                "Payment {} cannot be attempted in {} state after {} attempts",
                payment.id, payment.status, payment.attempts
            )));
        }

        let outcome = match force {
            Some(outcome) => outcome,
            None => self.gateway.charge(payment).await,
        };

        payment.record_attempt(outcome)?;
        uow.save_payment(payment).await?;
        let transaction = Transaction::record(payment.id, outcome);
        uow.append_transaction(&transaction).await?;

        metrics::counter!("payment_attempts_total", "outcome" => outcome.as_str()).increment(1);
        tracing::info!(
            %outcome,
            txn_reference = %transaction.txn_reference,
            status = %payment.status,
            "payment attempt recorded"
        );

        Ok(outcome)
    }
}
