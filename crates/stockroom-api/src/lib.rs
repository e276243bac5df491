//! Stockroom API — HTTP surface for the catalog service.
//!
//! Product CRUD and checkout are served by a thin axum layer over the
//! catalog crate; every domain error is rendered as `{error, message}`.

use axum::Router;

pub mod config;
pub mod error;
pub mod routes;
pub mod state;
pub mod telemetry;

use state::AppState;

/// Builds the application router. `main.rs` adds the HTTP middleware.
pub fn app(state: AppState) -> Router {
    Router::new()
        .merge(routes::health::router())
        .nest("/products", routes::products::router())
        .merge(routes::checkout::router())
        .with_state(state)
}
