//! Invoice dispatch over the checkout topic.

use std::sync::Arc;

use async_trait::async_trait;
use stockroom_core::error::DomainError;
use stockroom_core::event::{CHECKOUT_EVENTS_TOPIC, InvoiceTask};
use stockroom_core::invoice::InvoiceDispatcher;
use stockroom_core::publisher::{EventPublisher, publish_json};

/// Sends invoice tasks on `checkout-events`, keyed by user id so one
/// customer's invoices stay ordered.
#[derive(Clone)]
pub struct TopicInvoiceDispatcher {
    publisher: Arc<dyn EventPublisher>,
}

impl TopicInvoiceDispatcher {
    #[must_use]
    pub fn new(publisher: Arc<dyn EventPublisher>) -> Self {
        Self { publisher }
    }
}

#[async_trait]
impl InvoiceDispatcher for TopicInvoiceDispatcher {
    async fn dispatch(&self, task: &InvoiceTask) -> Result<(), DomainError> {
        publish_json(
            self.publisher.as_ref(),
            CHECKOUT_EVENTS_TOPIC,
            &task.partition_key(),
            task,
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use stockroom_test_support::{FailingPublisher, RecordingPublisher};

    use super::*;

    fn task() -> InvoiceTask {
        InvoiceTask {
            user_id: 7,
            email: "buyer@example.com".into(),
            product_id: 42,
            quantity: 2,
            total_price: 2000,
        }
    }

    #[tokio::test]
    async fn test_dispatch_publishes_on_checkout_topic_keyed_by_user() {
        // Arrange
        let publisher = Arc::new(RecordingPublisher::new());
        let dispatcher = TopicInvoiceDispatcher::new(publisher.clone());

        // Act
        dispatcher.dispatch(&task()).await.unwrap();

        // Assert
        let sent = publisher.sent_on(CHECKOUT_EVENTS_TOPIC);
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].key, "7");
        assert_eq!(sent[0].decode::<InvoiceTask>(), task());
    }

    #[tokio::test]
    async fn test_dispatch_surfaces_publish_failure() {
        let dispatcher = TopicInvoiceDispatcher::new(Arc::new(FailingPublisher));

        let result = dispatcher.dispatch(&task()).await;

        assert!(matches!(result, Err(DomainError::Transient(_))));
    }
}
