//! Product catalog routes.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::{Json, Router, routing::get};
use serde::Deserialize;
use tracing::instrument;

use stockroom_core::model::{NewProduct, Product, ProductFilter};

use crate::error::ApiError;
use crate::state::AppState;

/// Query string for GET /.
#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    /// 1-based page number.
    pub page: Option<u32>,
    /// Page size.
    pub limit: Option<u32>,
    /// Case-insensitive name substring.
    pub search: Option<String>,
}

/// Request body for PUT /{id}. The id comes from the path.
#[derive(Debug, Deserialize)]
pub struct UpdateProductRequest {
    pub name: String,
    pub price: i64,
    pub stock: i64,
}

/// GET /
#[instrument(skip(state))]
async fn list_products(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<Product>>, ApiError> {
    let filter = ProductFilter::new(query.page, query.limit, query.search)?;
    let products = state.repository.list(&filter).await?;
    Ok(Json(products))
}

/// GET /{id}
#[instrument(skip(state))]
async fn get_product(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Product>, ApiError> {
    Ok(Json(state.repository.get_by_id(id).await?))
}

/// POST /
#[instrument(skip(state, request), fields(name = %request.name))]
async fn create_product(
    State(state): State<AppState>,
    Json(request): Json<NewProduct>,
) -> Result<(StatusCode, Json<Product>), ApiError> {
    let product = state.repository.create(request).await?;
    Ok((StatusCode::CREATED, Json(product)))
}

/// PUT /{id}
#[instrument(skip(state, request))]
async fn update_product(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(request): Json<UpdateProductRequest>,
) -> Result<Json<Product>, ApiError> {
    let product = Product {
        id,
        name: request.name,
        price: request.price,
        stock: request.stock,
    };
    Ok(Json(state.repository.update(product).await?))
}

/// DELETE /{id}
#[instrument(skip(state))]
async fn delete_product(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    state.repository.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Returns the router for the product catalog.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_products).post(create_product))
        .route(
            "/{id}",
            get(get_product).put(update_product).delete(delete_product),
        )
}
