//! Shared test helpers for API integration tests.
#![allow(dead_code)]

use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use stockroom_api::state::AppState;
use stockroom_catalog::breaker::{BreakerSettings, CircuitBreaker};
use stockroom_catalog::checkout::CheckoutService;
use stockroom_catalog::repository::ProductRepository;
use stockroom_core::clock::Clock;
use stockroom_core::model::Product;
use stockroom_test_support::{
    FixedClock, InMemoryCache, InMemoryProductStore, RecordingInvoiceDispatcher,
    RecordingPublisher,
};
use tower::ServiceExt;

/// The router plus handles on every in-memory dependency behind it.
pub struct TestApp {
    pub store: Arc<InMemoryProductStore>,
    pub cache: Arc<InMemoryCache>,
    pub publisher: Arc<RecordingPublisher>,
    pub dispatcher: Arc<RecordingInvoiceDispatcher>,
    state: AppState,
}

impl TestApp {
    /// A fresh router over the shared state.
    pub fn router(&self) -> Router {
        stockroom_api::app(self.state.clone())
    }
}

/// Fixed timestamp used across all integration tests.
fn fixed_clock() -> Arc<dyn Clock> {
    Arc::new(FixedClock(
        chrono::TimeZone::with_ymd_and_hms(&chrono::Utc, 2026, 1, 15, 10, 0, 0).unwrap(),
    ))
}

/// A product with the given id, price and stock.
pub fn product(id: i64, price: i64, stock: i64) -> Product {
    Product {
        id,
        name: format!("Product {id}"),
        price,
        stock,
    }
}

/// Build the full app over in-memory doubles seeded with `products`.
pub fn build_test_app(products: Vec<Product>) -> TestApp {
    let clock = fixed_clock();
    let store = Arc::new(InMemoryProductStore::with_products(products));
    let cache = Arc::new(InMemoryCache::new());
    let publisher = Arc::new(RecordingPublisher::new());
    let dispatcher = Arc::new(RecordingInvoiceDispatcher::new());
    let breaker = Arc::new(CircuitBreaker::new(
        BreakerSettings::default(),
        clock.clone(),
    ));

    let repository = ProductRepository::new(
        store.clone(),
        cache.clone(),
        breaker,
        publisher.clone(),
        clock.clone(),
    );
    let checkout = CheckoutService::new(
        store.clone(),
        cache.clone(),
        publisher.clone(),
        dispatcher.clone(),
        clock,
    );

    TestApp {
        store,
        cache,
        publisher,
        dispatcher,
        state: AppState::new(Arc::new(repository), Arc::new(checkout)),
    }
}

async fn send(app: Router, request: Request<Body>) -> (StatusCode, serde_json::Value) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let body_bytes = response.into_body().collect().await.unwrap().to_bytes();
    // Extractor rejections answer in plain text.
    let json = if body_bytes.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&body_bytes).unwrap_or_else(|_| {
            serde_json::Value::String(String::from_utf8_lossy(&body_bytes).into_owned())
        })
    };

    (status, json)
}

/// Send a request with a JSON body and extra headers and return the response.
pub async fn send_json(
    app: Router,
    method: &str,
    uri: &str,
    headers: &[(&str, &str)],
    body: &serde_json::Value,
) -> (StatusCode, serde_json::Value) {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json");
    for (name, value) in headers {
        builder = builder.header(*name, *value);
    }
    let request = builder
        .body(Body::from(serde_json::to_vec(body).unwrap()))
        .unwrap();

    send(app, request).await
}

/// Send a POST request with a JSON body and return the response.
pub async fn post_json(
    app: Router,
    uri: &str,
    body: &serde_json::Value,
) -> (StatusCode, serde_json::Value) {
    send_json(app, "POST", uri, &[], body).await
}

/// Send a PUT request with a JSON body and return the response.
pub async fn put_json(
    app: Router,
    uri: &str,
    body: &serde_json::Value,
) -> (StatusCode, serde_json::Value) {
    send_json(app, "PUT", uri, &[], body).await
}

/// Send a GET request and return the response.
pub async fn get_json(app: Router, uri: &str) -> (StatusCode, serde_json::Value) {
    let request = Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .unwrap();

    send(app, request).await
}

/// Send a DELETE request and return the response.
pub async fn delete(app: Router, uri: &str) -> (StatusCode, serde_json::Value) {
    let request = Request::builder()
        .method("DELETE")
        .uri(uri)
        .body(Body::empty())
        .unwrap();

    send(app, request).await
}
