//! Post-commit side effects shared by the repository and checkout.
//!
//! None of these may fail the caller: the primary store already holds the
//! truth, so cache and event errors are logged and dropped.

use std::sync::Arc;

use stockroom_core::cache::{Cache, PRODUCT_LIST_NAMESPACE, product_key};
use stockroom_core::clock::Clock;
use stockroom_core::event::{PRODUCT_EVENTS_TOPIC, ProductAction, ProductEvent};
use stockroom_core::model::Product;
use stockroom_core::publisher::{EventPublisher, publish_json, publish_json_once};

#[derive(Clone)]
pub(crate) struct ChangeNotifier {
    cache: Arc<dyn Cache>,
    publisher: Arc<dyn EventPublisher>,
    clock: Arc<dyn Clock>,
}

impl ChangeNotifier {
    pub(crate) fn new(
        cache: Arc<dyn Cache>,
        publisher: Arc<dyn EventPublisher>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            cache,
            publisher,
            clock,
        }
    }

    pub(crate) fn cache(&self) -> &dyn Cache {
        self.cache.as_ref()
    }

    /// Drops the cached product and every cached list page.
    pub(crate) async fn invalidate_product(&self, id: i64) {
        let key = product_key(id);
        if let Err(e) = self.cache.delete(&key).await {
            tracing::warn!(cache_key = %key, error = %e, "failed to invalidate cached product");
        }
        self.invalidate_lists().await;
    }

    pub(crate) async fn invalidate_lists(&self) {
        if let Err(e) = self.cache.delete_prefix(PRODUCT_LIST_NAMESPACE).await {
            tracing::warn!(
                prefix = PRODUCT_LIST_NAMESPACE,
                error = %e,
                "failed to invalidate cached product lists"
            );
        }
    }

    /// Publishes a `ProductEvent` for a committed mutation.
    pub(crate) async fn announce(&self, action: ProductAction, product: Product) {
        let event = match action {
            ProductAction::Delete => ProductEvent::deleted(product.id, self.clock.now()),
            ProductAction::Create | ProductAction::Update => {
                ProductEvent::new(action, product, self.clock.now())
            }
        };
        let key = event.partition_key();
        let publisher = self.publisher.as_ref();
        let published = match event.event_id {
            Some(id) => {
                let message_id = id.to_string();
                publish_json_once(publisher, PRODUCT_EVENTS_TOPIC, &key, &message_id, &event)
                    .await
            }
            None => publish_json(publisher, PRODUCT_EVENTS_TOPIC, &key, &event).await,
        };
        match published {
            Ok(()) => tracing::debug!(%action, product_id = %key, "product event published"),
            Err(e) => tracing::error!(
                %action,
                product_id = %key,
                error = %e,
                "failed to publish product event; search index will lag"
            ),
        }
    }
}
