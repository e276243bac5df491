use stockroom_core::error::DomainError;

/// Every Redis failure is an I/O failure from the caller's point of view.
pub(crate) fn map_redis_error(error: redis::RedisError) -> DomainError {
    DomainError::Transient(format!("redis: {error}"))
}
