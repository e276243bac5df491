//! `SearchIndex` over the Elasticsearch document REST API.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use stockroom_core::error::DomainError;
use stockroom_core::event::AuditRecord;
use stockroom_core::model::Product;
use stockroom_core::search::SearchIndex;

/// Index holding one document per product.
pub const PRODUCTS_INDEX: &str = "products";

/// Append-only index of processed events.
pub const AUDIT_INDEX: &str = "product-logs";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Elasticsearch client for the product read model.
#[derive(Debug, Clone)]
pub struct ElasticsearchIndex {
    client: Client,
    base_url: String,
}

impl ElasticsearchIndex {
    /// Creates a client for the cluster at `base_url`.
    ///
    /// # Errors
    ///
    /// `DomainError::Transient` if the HTTP client cannot be built.
    pub fn new(base_url: &str) -> Result<Self, DomainError> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| DomainError::Transient(format!("elasticsearch client: {e}")))?;
        Ok(Self::with_client(client, base_url))
    }

    /// Uses an existing HTTP client.
    #[must_use]
    pub fn with_client(client: Client, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_owned(),
        }
    }

    /// Checks that the cluster answers.
    ///
    /// # Errors
    ///
    /// `DomainError::Transient` if the cluster is unreachable or unhealthy.
    pub async fn ping(&self) -> Result<(), DomainError> {
        let response = self
            .client
            .get(&self.base_url)
            .send()
            .await
            .map_err(transport_error)?;
        check_status(response, "ping").await.map(|_| ())
    }

    fn document_url(&self, id: i64) -> String {
        format!("{}/{PRODUCTS_INDEX}/_doc/{id}", self.base_url)
    }

    fn audit_url(&self) -> String {
        format!("{}/{AUDIT_INDEX}/_doc", self.base_url)
    }
}

fn transport_error(error: reqwest::Error) -> DomainError {
    DomainError::Transient(format!("elasticsearch: {error}"))
}

/// Passes successful responses through; overload and server errors are
/// transient, other client errors are not.
async fn check_status(response: Response, operation: &str) -> Result<Response, DomainError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    let message = format!("elasticsearch {operation} returned {status}: {body}");
    if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        Err(DomainError::Transient(message))
    } else {
        Err(DomainError::Persistence(message))
    }
}

#[async_trait]
impl SearchIndex for ElasticsearchIndex {
    async fn upsert(&self, product: &Product) -> Result<(), DomainError> {
        let response = self
            .client
            .put(self.document_url(product.id))
            .json(product)
            .send()
            .await
            .map_err(transport_error)?;
        check_status(response, "index").await?;
        tracing::debug!(product_id = product.id, "document indexed");
        Ok(())
    }

    async fn delete(&self, id: i64) -> Result<bool, DomainError> {
        let response = self
            .client
            .delete(self.document_url(id))
            .send()
            .await
            .map_err(transport_error)?;
        if response.status() == StatusCode::NOT_FOUND {
            tracing::debug!(product_id = id, "document already absent");
            return Ok(false);
        }
        check_status(response, "delete").await?;
        Ok(true)
    }

    async fn append_audit(&self, record: &AuditRecord) -> Result<(), DomainError> {
        let response = self
            .client
            .post(self.audit_url())
            .json(record)
            .send()
            .await
            .map_err(transport_error)?;
        check_status(response, "audit").await.map(|_| ())
    }
}
