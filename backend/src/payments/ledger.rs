use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard},
    time::Duration,
};

use async_trait::async_trait;
use chrono::Utc;
use thiserror::Error;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::{
    ConfirmPricing, PayableQuote, PaymentAttempt, PaymentError, PaymentMethod, PaymentObserver,
    PaymentStatus, PaymentUpdate,
};

#[derive(Debug, Error)]
#[error("{0}")]
pub struct SettlementError(pub String);

/// Settles a confirmed attempt and returns the transaction id.
#[async_trait]
pub trait SettlementGateway: Send + Sync + 'static {
    async fn settle(&self, attempt: &PaymentAttempt) -> Result<String, SettlementError>;
}

/// Stand-in processor: waits a fixed delay, then always succeeds.
pub struct SimulatedGateway {
    delay: Duration,
}

impl SimulatedGateway {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

pub fn transaction_id() -> String {
    let suffix: [u8; 3] = rand::random();
    format!("TXN-{}-{}", Utc::now().timestamp_millis(), hex::encode(suffix))
}

#[async_trait]
impl SettlementGateway for SimulatedGateway {
    async fn settle(&self, _attempt: &PaymentAttempt) -> Result<String, SettlementError> {
        tokio::time::sleep(self.delay).await;
        Ok(transaction_id())
    }
}

/// In-memory registry of payment attempts.
///
/// The lock is never held across the settlement await; the per-quote
/// exclusion is checked and the state changed under a single lock. A quote
/// holds at most one attempt that is not completed, so the map stays
/// bounded by the number of quotes.
pub struct PaymentLedger {
    attempts: Mutex<HashMap<Uuid, PaymentAttempt>>,
    gateway: Arc<dyn SettlementGateway>,
    observer: Arc<dyn PaymentObserver>,
}

impl PaymentLedger {
    pub fn new(gateway: Arc<dyn SettlementGateway>, observer: Arc<dyn PaymentObserver>) -> Self {
        Self {
            attempts: Mutex::new(HashMap::new()),
            gateway,
            observer,
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<Uuid, PaymentAttempt>> {
        self.attempts.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn ensure_quote_open(
        attempts: &HashMap<Uuid, PaymentAttempt>,
        quote: &PayableQuote,
        except: Option<Uuid>,
    ) -> Result<(), PaymentError> {
        for attempt in attempts.values() {
            if attempt.quote.id != quote.id || Some(attempt.id) == except {
                continue;
            }
            match attempt.status {
                PaymentStatus::Processing => {
                    return Err(PaymentError::AttemptInFlight(quote.number.clone()))
                }
                PaymentStatus::Completed => {
                    return Err(PaymentError::AlreadyPaid(quote.number.clone()))
                }
                PaymentStatus::Pending | PaymentStatus::Failed => {}
            }
        }
        Ok(())
    }

    /// Opens a pending attempt for `quote`. Earlier pending or failed
    /// attempts for the same quote are dropped.
    pub fn start(
        &self,
        quote: PayableQuote,
        method: PaymentMethod,
    ) -> Result<PaymentAttempt, PaymentError> {
        let mut attempts = self.lock();
        Self::ensure_quote_open(&attempts, &quote, None)?;
        let before = attempts.len();
        attempts.retain(|_, attempt| attempt.quote.id != quote.id);
        let replaced = before - attempts.len();

        let attempt = PaymentAttempt::new(quote, method);
        attempts.insert(attempt.id, attempt.clone());
        info!(
            payment_id = %attempt.id,
            quote_id = attempt.quote.id,
            replaced,
            "payment attempt started"
        );
        Ok(attempt)
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn get(&self, id: Uuid) -> Result<PaymentAttempt, PaymentError> {
        self.lock().get(&id).cloned().ok_or(PaymentError::NotFound)
    }

    pub fn update(&self, id: Uuid, update: PaymentUpdate) -> Result<PaymentAttempt, PaymentError> {
        let mut attempts = self.lock();
        let attempt = attempts.get_mut(&id).ok_or(PaymentError::NotFound)?;
        attempt.apply(update)?;
        Ok(attempt.clone())
    }

    /// `pending -> processing`, rejected while another attempt for the same
    /// quote is processing or once the quote is paid.
    pub fn confirm(&self, id: Uuid, pricing: &ConfirmPricing) -> Result<PaymentAttempt, PaymentError> {
        let mut attempts = self.lock();
        let quote = attempts
            .get(&id)
            .map(|attempt| attempt.quote.clone())
            .ok_or(PaymentError::NotFound)?;
        Self::ensure_quote_open(&attempts, &quote, Some(id))?;
        let attempt = attempts.get_mut(&id).ok_or(PaymentError::NotFound)?;
        attempt.confirm(pricing)?;
        info!(payment_id = %id, quote_id = quote.id, amount = ?attempt.amount, "payment confirmed");
        Ok(attempt.clone())
    }

    /// Confirms and settles in the background.
    pub fn confirm_and_settle(
        self: &Arc<Self>,
        id: Uuid,
        pricing: &ConfirmPricing,
    ) -> Result<PaymentAttempt, PaymentError> {
        let attempt = self.confirm(id, pricing)?;
        let ledger = Arc::clone(self);
        tokio::spawn(async move {
            if let Err(err) = ledger.settle(id).await {
                error!(payment_id = %id, error = %err, "payment settlement bookkeeping failed");
            }
        });
        Ok(attempt)
    }

    /// Runs the gateway for a processing attempt and records the outcome.
    pub async fn settle(&self, id: Uuid) -> Result<PaymentAttempt, PaymentError> {
        let snapshot = self.get(id)?;
        if snapshot.status != PaymentStatus::Processing {
            return Err(PaymentError::InvalidTransition {
                from: snapshot.status,
                action: "settle",
            });
        }

        let outcome = self.gateway.settle(&snapshot).await;

        let (attempt, newly_completed) = {
            let mut attempts = self.lock();
            let attempt = attempts.get_mut(&id).ok_or(PaymentError::NotFound)?;
            let newly_completed = match outcome {
                Ok(transaction_id) => attempt.complete(transaction_id)?,
                Err(err) => {
                    warn!(payment_id = %id, error = %err, "payment settlement failed");
                    attempt.fail(err.0)?;
                    false
                }
            };
            (attempt.clone(), newly_completed)
        };

        if newly_completed {
            info!(
                payment_id = %id,
                transaction_id = attempt.transaction_id.as_deref().unwrap_or_default(),
                "payment completed"
            );
            self.observer.payment_completed(&attempt);
        }
        Ok(attempt)
    }
}
