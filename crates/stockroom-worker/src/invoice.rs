//! Invoice delivery.
//!
//! In queue mode `InvoiceWorker` pops tasks from the durable list and
//! pushes failed ones back to the tail. In stream mode
//! `InvoiceTopicHandler` consumes `checkout-events` and relies on
//! redelivery instead.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use stockroom_core::error::DomainError;
use stockroom_core::event::InvoiceTask;
use stockroom_core::invoice::TaskQueue;
use stockroom_stream::MessageHandler;
use tokio_util::sync::CancellationToken;

/// Delivers one invoice to its recipient.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send_invoice(&self, task: &InvoiceTask) -> Result<(), DomainError>;
}

/// Stand-in for an email gateway: waits a fixed time and fails a fraction
/// of sends at random.
#[derive(Debug, Clone)]
pub struct SimulatedMailer {
    failure_rate: f64,
    send_delay: Duration,
}

impl SimulatedMailer {
    /// `failure_rate` is clamped to `0.0..=1.0`.
    #[must_use]
    pub fn new(failure_rate: f64) -> Self {
        Self {
            failure_rate: if failure_rate.is_nan() { 0.0 } else { failure_rate.clamp(0.0, 1.0) },
            send_delay: Duration::ZERO,
        }
    }

    #[must_use]
    pub fn with_send_delay(mut self, delay: Duration) -> Self {
        self.send_delay = delay;
        self
    }
}

#[async_trait]
impl Mailer for SimulatedMailer {
    async fn send_invoice(&self, task: &InvoiceTask) -> Result<(), DomainError> {
        tracing::info!(user_id = task.user_id, email = %task.email, "sending invoice");
        let fails = rand::rng().random_bool(self.failure_rate);
        if fails {
            return Err(DomainError::Transient(format!(
                "mail server unreachable for {}",
                task.email
            )));
        }
        tokio::time::sleep(self.send_delay).await;
        tracing::info!(
            user_id = task.user_id,
            product_id = task.product_id,
            total_price = task.total_price,
            "invoice sent"
        );
        Ok(())
    }
}

/// Bounded exponential backoff after consecutive failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Delay after the first failure.
    pub base: Duration,
    /// Largest delay.
    pub max: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base: Duration::from_secs(1),
            max: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Delay after `consecutive_failures` failures in a row: zero for none,
    /// then `base`, doubling up to `max`.
    #[must_use]
    pub fn delay(&self, consecutive_failures: u32) -> Duration {
        if consecutive_failures == 0 {
            return Duration::ZERO;
        }
        let factor = 1u32
            .checked_shl(consecutive_failures - 1)
            .unwrap_or(u32::MAX);
        self.base.saturating_mul(factor).min(self.max)
    }
}

/// What happened to one queue poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessOutcome {
    /// The queue stayed empty for the poll timeout.
    Idle,
    /// The invoice was delivered.
    Sent,
    /// The entry did not decode and was discarded.
    Dropped,
    /// Delivery failed and the entry went back to the tail.
    Requeued,
}

/// Supervised consumer of the invoice queue.
pub struct InvoiceWorker {
    queue: Arc<dyn TaskQueue>,
    mailer: Arc<dyn Mailer>,
    retry: RetryPolicy,
    poll_timeout: Duration,
}

impl InvoiceWorker {
    #[must_use]
    pub fn new(queue: Arc<dyn TaskQueue>, mailer: Arc<dyn Mailer>) -> Self {
        Self {
            queue,
            mailer,
            retry: RetryPolicy::default(),
            poll_timeout: Duration::from_secs(5),
        }
    }

    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Bounds each blocking pop so cancellation is noticed promptly.
    #[must_use]
    pub fn with_poll_timeout(mut self, timeout: Duration) -> Self {
        self.poll_timeout = timeout;
        self
    }

    /// Pops and processes at most one entry.
    ///
    /// # Errors
    ///
    /// The queue's error when popping or requeueing fails.
    pub async fn process_one(&self) -> Result<ProcessOutcome, DomainError> {
        match self.queue.pop(self.poll_timeout).await? {
            None => Ok(ProcessOutcome::Idle),
            Some(entry) => self.process_entry(&entry).await,
        }
    }

    /// Processes entries until `cancel` fires.
    ///
    /// Cancellation is only observed between polls: a pop may already have
    /// removed its entry from the queue, so it always runs to completion and
    /// the entry is sent or requeued. Shutdown therefore waits up to one
    /// poll timeout.
    pub async fn run(self, cancel: CancellationToken) {
        tracing::info!("invoice worker started");
        let mut consecutive_failures = 0u32;
        while !cancel.is_cancelled() {
            let outcome = self.process_one().await;

            let failed = match outcome {
                Ok(ProcessOutcome::Sent) => {
                    consecutive_failures = 0;
                    false
                }
                Ok(ProcessOutcome::Idle | ProcessOutcome::Dropped) => false,
                Ok(ProcessOutcome::Requeued) => true,
                Err(e) => {
                    tracing::error!(error = %e, "invoice queue unavailable");
                    true
                }
            };
            if !failed {
                continue;
            }

            consecutive_failures = consecutive_failures.saturating_add(1);
            let delay = self.retry.delay(consecutive_failures);
            tracing::debug!(
                delay_ms = delay.as_millis(),
                consecutive_failures,
                "backing off"
            );
            tokio::select! {
                () = cancel.cancelled() => break,
                () = tokio::time::sleep(delay) => {}
            }
        }
        tracing::info!("invoice worker stopped");
    }

    async fn process_entry(&self, entry: &str) -> Result<ProcessOutcome, DomainError> {
        let task: InvoiceTask = match serde_json::from_str(entry) {
            Ok(task) => task,
            Err(e) => {
                tracing::error!(error = %e, entry, "dropping malformed invoice task");
                return Ok(ProcessOutcome::Dropped);
            }
        };

        match self.mailer.send_invoice(&task).await {
            Ok(()) => Ok(ProcessOutcome::Sent),
            Err(e) => {
                tracing::warn!(
                    user_id = task.user_id,
                    error = %e,
                    "invoice delivery failed, requeueing"
                );
                self.queue.push_back(entry).await?;
                Ok(ProcessOutcome::Requeued)
            }
        }
    }
}

/// Delivers invoices arriving on `checkout-events`.
pub struct InvoiceTopicHandler {
    mailer: Arc<dyn Mailer>,
}

impl InvoiceTopicHandler {
    #[must_use]
    pub fn new(mailer: Arc<dyn Mailer>) -> Self {
        Self { mailer }
    }
}

#[async_trait]
impl MessageHandler for InvoiceTopicHandler {
    async fn handle(&self, payload: &[u8]) -> Result<(), DomainError> {
        let task: InvoiceTask = serde_json::from_slice(payload)
            .map_err(|e| DomainError::Validation(format!("undecodable invoice task: {e}")))?;
        self.mailer.send_invoice(&task).await
    }
}
