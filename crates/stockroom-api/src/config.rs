//! API server configuration from environment variables.

use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use stockroom_core::invoice::InvoiceBackend;

use crate::error::AppError;

/// Settings read once at startup.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiConfig {
    /// PostgreSQL connection string (`DATABASE_URL`, required).
    pub database_url: String,
    /// Bind host (`HOST`).
    pub host: String,
    /// Bind port (`PORT`).
    pub port: u16,
    /// Redis for the cache and invoice queue (`REDIS_URL`).
    pub redis_url: String,
    /// NATS server (`NATS_URL`).
    pub nats_url: String,
    /// Partitions per topic (`EVENT_PARTITIONS`).
    pub partitions: u32,
    /// Active invoice channel (`INVOICE_BACKEND`).
    pub invoice_backend: InvoiceBackend,
    /// Timeout for each guarded store read (`DB_QUERY_TIMEOUT_MS`).
    pub query_timeout: Duration,
    /// OTLP collector; tracing stays local when unset
    /// (`OTEL_EXPORTER_OTLP_ENDPOINT`).
    pub otlp_endpoint: Option<String>,
}

impl ApiConfig {
    /// Reads the process environment.
    ///
    /// # Errors
    ///
    /// `AppError::Config` naming the first missing or invalid variable.
    pub fn from_env() -> Result<Self, AppError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads settings through `lookup`, applying defaults for unset keys.
    ///
    /// # Errors
    ///
    /// `AppError::Config` naming the first missing or invalid variable.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let text = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let database_url = lookup("DATABASE_URL")
            .filter(|url| !url.trim().is_empty())
            .ok_or_else(|| {
                AppError::Config("DATABASE_URL environment variable must be set".into())
            })?;
        let partitions: u32 = parse(&lookup, "EVENT_PARTITIONS", 3)?;
        if partitions == 0 {
            return Err(AppError::Config("EVENT_PARTITIONS must be at least 1".into()));
        }
        let timeout_ms: u64 = parse(&lookup, "DB_QUERY_TIMEOUT_MS", 5000)?;
        if timeout_ms == 0 {
            return Err(AppError::Config("DB_QUERY_TIMEOUT_MS must be positive".into()));
        }

        Ok(Self {
            database_url,
            host: text("HOST", "0.0.0.0"),
            port: parse(&lookup, "PORT", 3000)?,
            redis_url: text("REDIS_URL", "redis://127.0.0.1:6379"),
            nats_url: text("NATS_URL", "nats://127.0.0.1:4222"),
            partitions,
            invoice_backend: parse(&lookup, "INVOICE_BACKEND", InvoiceBackend::Queue)?,
            query_timeout: Duration::from_millis(timeout_ms),
            otlp_endpoint: lookup("OTEL_EXPORTER_OTLP_ENDPOINT").filter(|v| !v.trim().is_empty()),
        })
    }

    /// The socket address to bind.
    ///
    /// # Errors
    ///
    /// `AppError::Config` if `HOST:PORT` is not a valid address.
    pub fn bind_addr(&self) -> Result<SocketAddr, AppError> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|e| AppError::Config(format!("invalid HOST:PORT combination: {e}")))
    }
}

fn parse<T, F>(lookup: &F, key: &str, default: T) -> Result<T, AppError>
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
            .map_err(|e| AppError::Config(format!("{key} is invalid: {e}"))),
    }
}
