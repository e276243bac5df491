//! Events and tasks that travel between the API and the workers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::model::Product;

/// Topic carrying `ProductEvent`s, keyed by product id.
pub const PRODUCT_EVENTS_TOPIC: &str = "product-events";

/// Topic carrying `InvoiceTask`s when the stream invoice backend is used,
/// keyed by user id.
pub const CHECKOUT_EVENTS_TOPIC: &str = "checkout-events";

/// Name of the durable list holding queued `InvoiceTask`s.
pub const INVOICE_QUEUE: &str = "queue:invoice_sending";

/// The kind of mutation a `ProductEvent` announces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ProductAction {
    /// A product was inserted.
    Create,
    /// A product's fields (including stock) changed.
    Update,
    /// A product was removed.
    Delete,
}

impl ProductAction {
    /// Wire name of the action.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Create => "CREATE",
            Self::Update => "UPDATE",
            Self::Delete => "DELETE",
        }
    }
}

impl std::fmt::Display for ProductAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A product mutation announced on `PRODUCT_EVENTS_TOPIC`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductEvent {
    /// Unique event identifier; absent on payloads from older producers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_id: Option<Uuid>,
    /// When the mutation was committed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub occurred_at: Option<DateTime<Utc>>,
    /// The mutation kind.
    pub action: ProductAction,
    /// Product snapshot. For `Delete` only `id` is meaningful.
    #[serde(rename = "payload")]
    pub product: Product,
}

impl ProductEvent {
    /// Builds an event for `product` stamped at `occurred_at`.
    #[must_use]
    pub fn new(action: ProductAction, product: Product, occurred_at: DateTime<Utc>) -> Self {
        Self {
            event_id: Some(Uuid::now_v7()),
            occurred_at: Some(occurred_at),
            action,
            product,
        }
    }

    /// Builds a delete event carrying only the product id.
    #[must_use]
    pub fn deleted(product_id: i64, occurred_at: DateTime<Utc>) -> Self {
        Self::new(ProductAction::Delete, Product::id_only(product_id), occurred_at)
    }

    /// Ordering key: every event for one product shares a partition.
    #[must_use]
    pub fn partition_key(&self) -> String {
        self.product.id.to_string()
    }
}

/// Work item asking the invoice worker to email a receipt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceTask {
    /// The purchasing user.
    pub user_id: i64,
    /// Recipient address.
    pub email: String,
    /// The purchased product.
    pub product_id: i64,
    /// Units bought.
    pub quantity: i64,
    /// Amount charged.
    pub total_price: i64,
}

impl InvoiceTask {
    /// Ordering key on the checkout topic.
    #[must_use]
    pub fn partition_key(&self) -> String {
        self.user_id.to_string()
    }
}

/// Append-only record of one processed `ProductEvent`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditRecord {
    /// When the synchronizer processed the event.
    pub timestamp: DateTime<Utc>,
    /// The mutation kind.
    pub action: ProductAction,
    /// The affected product.
    pub product_id: i64,
    /// The product snapshot carried by the event.
    pub payload: Product,
}

impl AuditRecord {
    /// Builds the audit entry for `event`.
    #[must_use]
    pub fn for_event(event: &ProductEvent, timestamp: DateTime<Utc>) -> Self {
        Self {
            timestamp,
            action: event.action,
            product_id: event.product.id,
            payload: event.product.clone(),
        }
    }
}
