//! Shared application state.

use std::sync::Arc;

use stockroom_catalog::checkout::CheckoutService;
use stockroom_catalog::repository::ProductRepository;

/// Application state shared across all request handlers.
#[derive(Clone)]
pub struct AppState {
    /// Cached, breaker-guarded product access.
    pub repository: Arc<ProductRepository>,
    /// Purchase transactions.
    pub checkout: Arc<CheckoutService>,
}

impl AppState {
    /// Create new application state.
    #[must_use]
    pub fn new(repository: Arc<ProductRepository>, checkout: Arc<CheckoutService>) -> Self {
        Self {
            repository,
            checkout,
        }
    }
}
