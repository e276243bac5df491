//! Domain error types.

use thiserror::Error;

/// Top-level domain error type shared by every Stockroom crate.
#[derive(Debug, Error)]
pub enum DomainError {
    /// No product row matched the given id.
    #[error("product not found: {0}")]
    NotFound(i64),

    /// The caller supplied an invalid value.
    #[error("validation error: {0}")]
    Validation(String),

    /// The circuit breaker guarding the primary store is open.
    #[error("service temporarily unavailable (circuit open)")]
    ServiceUnavailable,

    /// The conditional stock decrement matched no row.
    ///
    /// Either the product does not exist or its stock is lower than the
    /// requested quantity; the two causes are not distinguished.
    #[error("insufficient stock or product not found: {product_id}")]
    InsufficientStockOrNotFound {
        /// The product the checkout targeted.
        product_id: i64,
    },

    /// A database, cache, broker or index call failed in a retryable way.
    #[error("transient I/O failure: {0}")]
    Transient(String),

    /// A write failed and cannot be retried transparently.
    #[error("persistence failure: {0}")]
    Persistence(String),
}

impl DomainError {
    /// Returns `true` for errors a caller may retry later with the same input.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::ServiceUnavailable | Self::Transient(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_breaker_and_io_failures_are_retryable() {
        assert!(DomainError::ServiceUnavailable.is_retryable());
        assert!(DomainError::Transient("timeout".into()).is_retryable());
    }

    #[test]
    fn test_business_failures_are_not_retryable() {
        assert!(!DomainError::NotFound(1).is_retryable());
        assert!(!DomainError::Validation("bad".into()).is_retryable());
        assert!(!DomainError::InsufficientStockOrNotFound { product_id: 1 }.is_retryable());
        assert!(!DomainError::Persistence("constraint".into()).is_retryable());
    }
}
