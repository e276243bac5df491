//! `PostgreSQL` implementation of the `ProductStore` trait.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool, Postgres, QueryBuilder};

use stockroom_core::error::DomainError;
use stockroom_core::model::{
    NewProduct, Product, ProductFilter, Purchase, PurchaseOrder, Transaction,
};
use stockroom_core::store::ProductStore;

use crate::schema;

#[derive(Debug, FromRow)]
struct ProductRow {
    id: i64,
    name: String,
    price: i64,
    stock: i64,
}

impl From<ProductRow> for Product {
    fn from(row: ProductRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            price: row.price,
            stock: row.stock,
        }
    }
}

#[derive(Debug, FromRow)]
struct TransactionRow {
    id: i64,
    user_id: i64,
    product_id: i64,
    quantity: i64,
    total_price: i64,
    created_at: DateTime<Utc>,
}

impl From<TransactionRow> for Transaction {
    fn from(row: TransactionRow) -> Self {
        Self {
            id: row.id,
            user_id: row.user_id,
            product_id: row.product_id,
            quantity: row.quantity,
            total_price: row.total_price,
            created_at: row.created_at,
        }
    }
}

/// PostgreSQL-backed product store.
#[derive(Debug, Clone)]
pub struct PgProductStore {
    pool: PgPool,
}

impl PgProductStore {
    /// Creates a new `PgProductStore`.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// The underlying pool.
    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

/// Connection-level failures are retryable; everything else is not.
fn map_sqlx_error(error: sqlx::Error) -> DomainError {
    match error {
        transient @ (sqlx::Error::Io(_)
        | sqlx::Error::Tls(_)
        | sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed) => DomainError::Transient(transient.to_string()),
        other => DomainError::Persistence(other.to_string()),
    }
}

/// Escapes `LIKE` wildcards so the search term matches literally.
fn escape_like(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len());
    for c in term.chars() {
        if matches!(c, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

fn list_query(filter: &ProductFilter) -> Result<QueryBuilder<'static, Postgres>, DomainError> {
    let offset = i64::try_from(filter.offset())
        .map_err(|_| DomainError::Validation("page is too large".into()))?;

    let mut query = QueryBuilder::new("SELECT ");
    query.push(schema::PRODUCT_COLUMNS).push(" FROM products");
    if !filter.search().is_empty() {
        query
            .push(" WHERE name ILIKE ")
            .push_bind(format!("%{}%", escape_like(filter.search())))
            .push(r" ESCAPE '\'");
    }
    query
        .push(" LIMIT ")
        .push_bind(i64::from(filter.limit()))
        .push(" OFFSET ")
        .push_bind(offset);
    Ok(query)
}

#[async_trait]
impl ProductStore for PgProductStore {
    async fn list(&self, filter: &ProductFilter) -> Result<Vec<Product>, DomainError> {
        let mut query = list_query(filter)?;
        let rows: Vec<ProductRow> = query
            .build_query_as()
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        Ok(rows.into_iter().map(Product::from).collect())
    }

    async fn find(&self, id: i64) -> Result<Option<Product>, DomainError> {
        let row: Option<ProductRow> = sqlx::query_as(schema::SELECT_PRODUCT_BY_ID)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        Ok(row.map(Product::from))
    }

    async fn insert(&self, product: &NewProduct) -> Result<Product, DomainError> {
        let id: i64 = sqlx::query_scalar(schema::INSERT_PRODUCT)
            .bind(&product.name)
            .bind(product.price)
            .bind(product.stock)
            .fetch_one(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        Ok(product.clone().with_id(id))
    }

    async fn update(&self, product: &Product) -> Result<bool, DomainError> {
        let result = sqlx::query(schema::UPDATE_PRODUCT)
            .bind(&product.name)
            .bind(product.price)
            .bind(product.stock)
            .bind(product.id)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete(&self, id: i64) -> Result<bool, DomainError> {
        let result = sqlx::query(schema::DELETE_PRODUCT)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        Ok(result.rows_affected() > 0)
    }

    async fn purchase(&self, order: &PurchaseOrder) -> Result<Purchase, DomainError> {
        // Returning early drops `tx`, which rolls back.
        let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;

        let row: Option<ProductRow> = sqlx::query_as(schema::DECREMENT_STOCK)
            .bind(order.quantity)
            .bind(order.product_id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;
        let Some(row) = row else {
            return Err(DomainError::InsufficientStockOrNotFound {
                product_id: order.product_id,
            });
        };

        let total_price = row
            .price
            .checked_mul(order.quantity)
            .ok_or_else(|| DomainError::Validation("total price overflows".into()))?;

        let transaction: TransactionRow = sqlx::query_as(schema::INSERT_TRANSACTION)
            .bind(order.user_id)
            .bind(order.product_id)
            .bind(order.quantity)
            .bind(total_price)
            .fetch_one(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;

        tx.commit().await.map_err(map_sqlx_error)?;
        tracing::debug!(
            product_id = order.product_id,
            quantity = order.quantity,
            "purchase committed"
        );

        Ok(Purchase {
            transaction: transaction.into(),
            product: row.into(),
        })
    }
}
