//! Worker configuration from environment variables.

use std::str::FromStr;
use std::time::Duration;

use stockroom_core::invoice::InvoiceBackend;

use crate::error::WorkerError;

/// Settings read once at startup.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkerConfig {
    /// Redis holding the invoice queue (`REDIS_URL`).
    pub redis_url: String,
    /// NATS server (`NATS_URL`).
    pub nats_url: String,
    /// Elasticsearch cluster (`ELASTICSEARCH_URL`).
    pub elasticsearch_url: String,
    /// Partitions per topic (`EVENT_PARTITIONS`).
    pub partitions: u32,
    /// Durable consumer group name (`CONSUMER_GROUP`).
    pub consumer_group: String,
    /// Active invoice channel (`INVOICE_BACKEND`).
    pub invoice_backend: InvoiceBackend,
    /// Fraction of simulated sends that fail (`INVOICE_FAILURE_RATE`).
    pub invoice_failure_rate: f64,
    /// Simulated time to send one invoice (`INVOICE_SEND_DELAY_MS`).
    pub invoice_send_delay: Duration,
}

impl WorkerConfig {
    /// Reads the process environment.
    ///
    /// # Errors
    ///
    /// `WorkerError::Config` naming the first invalid variable.
    pub fn from_env() -> Result<Self, WorkerError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads settings through `lookup`, applying defaults for unset keys.
    ///
    /// # Errors
    ///
    /// `WorkerError::Config` naming the first invalid variable.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, WorkerError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let text = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let partitions: u32 = parse(&lookup, "EVENT_PARTITIONS", 3)?;
        if partitions == 0 {
            return Err(WorkerError::Config("EVENT_PARTITIONS must be at least 1".into()));
        }
        let invoice_failure_rate: f64 = parse(&lookup, "INVOICE_FAILURE_RATE", 0.2)?;
        if !(0.0..=1.0).contains(&invoice_failure_rate) {
            return Err(WorkerError::Config(
                "INVOICE_FAILURE_RATE must be between 0 and 1".into(),
            ));
        }

        Ok(Self {
            redis_url: text("REDIS_URL", "redis://127.0.0.1:6379"),
            nats_url: text("NATS_URL", "nats://127.0.0.1:4222"),
            elasticsearch_url: text("ELASTICSEARCH_URL", "http://127.0.0.1:9200"),
            partitions,
            consumer_group: text("CONSUMER_GROUP", "inventory-worker-group"),
            invoice_backend: parse(&lookup, "INVOICE_BACKEND", InvoiceBackend::Queue)?,
            invoice_failure_rate,
            invoice_send_delay: Duration::from_millis(parse(
                &lookup,
                "INVOICE_SEND_DELAY_MS",
                2000,
            )?),
        })
    }
}

fn parse<T, F>(lookup: &F, key: &str, default: T) -> Result<T, WorkerError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| WorkerError::Config(format!("{key} is invalid: {e}"))),
    }
}
