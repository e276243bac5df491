//! Checkout: atomic stock decrement plus transaction record, followed by
//! cache invalidation, a stock-change event and an invoice task.

use std::sync::Arc;

use stockroom_core::cache::Cache;
use stockroom_core::clock::Clock;
use stockroom_core::error::DomainError;
use stockroom_core::event::{InvoiceTask, ProductAction};
use stockroom_core::invoice::InvoiceDispatcher;
use stockroom_core::model::{CheckoutRequest, Customer, PurchaseOrder, Transaction};
use stockroom_core::publisher::EventPublisher;
use stockroom_core::store::ProductStore;

use crate::notifier::ChangeNotifier;

/// Runs purchases against the primary store.
pub struct CheckoutService {
    store: Arc<dyn ProductStore>,
    notifier: ChangeNotifier,
    dispatcher: Arc<dyn InvoiceDispatcher>,
}

impl CheckoutService {
    #[must_use]
    pub fn new(
        store: Arc<dyn ProductStore>,
        cache: Arc<dyn Cache>,
        publisher: Arc<dyn EventPublisher>,
        dispatcher: Arc<dyn InvoiceDispatcher>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            notifier: ChangeNotifier::new(cache, publisher, clock),
            dispatcher,
        }
    }

    /// Buys `request.quantity` units for `customer`.
    ///
    /// Once the store commits, the purchase stands: cache, event and invoice
    /// failures are logged and do not affect the result.
    ///
    /// # Errors
    ///
    /// `Validation` for a non-positive quantity,
    /// `InsufficientStockOrNotFound` when the product is missing or short,
    /// or the store's error.
    pub async fn checkout(
        &self,
        customer: &Customer,
        request: CheckoutRequest,
    ) -> Result<Transaction, DomainError> {
        if request.quantity <= 0 {
            return Err(DomainError::Validation("quantity must be positive".into()));
        }

        let order = PurchaseOrder {
            user_id: customer.user_id,
            product_id: request.product_id,
            quantity: request.quantity,
        };
        let purchase = self.store.purchase(&order).await.inspect_err(|e| {
            tracing::info!(
                user_id = customer.user_id,
                product_id = request.product_id,
                error = %e,
                "checkout rejected"
            );
        })?;
        let transaction = purchase.transaction;
        tracing::info!(
            transaction_id = transaction.id,
            user_id = transaction.user_id,
            product_id = transaction.product_id,
            remaining_stock = purchase.product.stock,
            "checkout committed"
        );

        self.notifier.invalidate_product(transaction.product_id).await;
        self.notifier
            .announce(ProductAction::Update, purchase.product)
            .await;

        let task = InvoiceTask {
            user_id: customer.user_id,
            email: customer.email.clone(),
            product_id: transaction.product_id,
            quantity: transaction.quantity,
            total_price: transaction.total_price,
        };
        if let Err(e) = self.dispatcher.dispatch(&task).await {
            tracing::error!(
                transaction_id = transaction.id,
                user_id = task.user_id,
                error = %e,
                "failed to dispatch invoice task"
            );
        }

        Ok(transaction)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use stockroom_core::event::{PRODUCT_EVENTS_TOPIC, ProductEvent};
    use stockroom_core::model::Product;
    use stockroom_test_support::{
        FailingInvoiceDispatcher, FixedClock, InMemoryCache, InMemoryProductStore,
        RecordingInvoiceDispatcher, RecordingPublisher,
    };

    use super::*;

    struct Fixture {
        store: Arc<InMemoryProductStore>,
        cache: Arc<InMemoryCache>,
        publisher: Arc<RecordingPublisher>,
        dispatcher: Arc<RecordingInvoiceDispatcher>,
        service: CheckoutService,
    }

    fn fixture(stock: i64) -> Fixture {
        let store = Arc::new(InMemoryProductStore::with_products(vec![Product {
            id: 42,
            name: "Mechanical Keyboard".into(),
            price: 1000,
            stock,
        }]));
        let cache = Arc::new(InMemoryCache::new());
        let publisher = Arc::new(RecordingPublisher::new());
        let dispatcher = Arc::new(RecordingInvoiceDispatcher::new());
        let service = CheckoutService::new(
            store.clone(),
            cache.clone(),
            publisher.clone(),
            dispatcher.clone(),
            Arc::new(FixedClock(Utc.with_ymd_and_hms(2026, 1, 15, 10, 0, 0).unwrap())),
        );
        Fixture {
            store,
            cache,
            publisher,
            dispatcher,
            service,
        }
    }

    fn buyer() -> Customer {
        Customer {
            user_id: 7,
            email: "buyer@example.com".into(),
        }
    }

    #[tokio::test]
    async fn test_checkout_decrements_stock_and_dispatches_invoice() {
        // Arrange
        let f = fixture(5);
        f.cache.insert_raw("product:42", "{}");
        f.cache.insert_raw("products:page:1:limit:10:search:", "[]");

        // Act
        let transaction = f
            .service
            .checkout(
                &buyer(),
                CheckoutRequest {
                    product_id: 42,
                    quantity: 2,
                },
            )
            .await
            .unwrap();

        // Assert
        assert_eq!(transaction.total_price, 2000);
        assert_eq!(transaction.user_id, 7);
        assert_eq!(f.store.product(42).unwrap().stock, 3);
        assert_eq!(f.store.transactions(), vec![transaction]);
        assert!(f.cache.is_empty());
        assert_eq!(
            f.dispatcher.dispatched(),
            vec![InvoiceTask {
                user_id: 7,
                email: "buyer@example.com".into(),
                product_id: 42,
                quantity: 2,
                total_price: 2000,
            }]
        );
    }

    #[tokio::test]
    async fn test_checkout_emits_update_event_with_remaining_stock() {
        // Arrange
        let f = fixture(5);

        // Act
        f.service
            .checkout(
                &buyer(),
                CheckoutRequest {
                    product_id: 42,
                    quantity: 2,
                },
            )
            .await
            .unwrap();

        // Assert
        let sent = f.publisher.sent_on(PRODUCT_EVENTS_TOPIC);
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].key, "42");
        let event: ProductEvent = sent[0].decode();
        assert_eq!(event.action, ProductAction::Update);
        assert_eq!(event.product.stock, 3);
    }

    #[tokio::test]
    async fn test_checkout_rejects_non_positive_quantity() {
        // Arrange
        let f = fixture(5);

        // Act
        let zero = f
            .service
            .checkout(
                &buyer(),
                CheckoutRequest {
                    product_id: 42,
                    quantity: 0,
                },
            )
            .await;
        let negative = f
            .service
            .checkout(
                &buyer(),
                CheckoutRequest {
                    product_id: 42,
                    quantity: -1,
                },
            )
            .await;

        // Assert
        assert!(matches!(zero, Err(DomainError::Validation(_))));
        assert!(matches!(negative, Err(DomainError::Validation(_))));
        assert_eq!(f.store.product(42).unwrap().stock, 5);
    }

    #[tokio::test]
    async fn test_checkout_beyond_stock_fails_without_side_effects() {
        // Arrange
        let f = fixture(1);

        // Act
        let result = f
            .service
            .checkout(
                &buyer(),
                CheckoutRequest {
                    product_id: 42,
                    quantity: 2,
                },
            )
            .await;

        // Assert
        assert!(matches!(
            result,
            Err(DomainError::InsufficientStockOrNotFound { product_id: 42 })
        ));
        assert_eq!(f.store.product(42).unwrap().stock, 1);
        assert!(f.publisher.sent().is_empty());
        assert!(f.dispatcher.dispatched().is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_concurrent_checkout_of_last_unit_has_one_winner() {
        // Arrange
        let f = fixture(1);
        let service = Arc::new(f.service);
        let request = CheckoutRequest {
            product_id: 42,
            quantity: 1,
        };

        // Act
        let first = tokio::spawn({
            let service = service.clone();
            async move { service.checkout(&buyer(), request).await }
        });
        let second = tokio::spawn({
            let service = service.clone();
            async move { service.checkout(&buyer(), request).await }
        });
        let outcomes = [first.await.unwrap(), second.await.unwrap()];

        // Assert
        assert_eq!(outcomes.iter().filter(|o| o.is_ok()).count(), 1);
        assert!(outcomes.iter().any(|o| matches!(
            o,
            Err(DomainError::InsufficientStockOrNotFound { .. })
        )));
        assert_eq!(f.store.product(42).unwrap().stock, 0);
    }

    #[tokio::test]
    async fn test_dispatch_failure_does_not_fail_committed_checkout() {
        // Arrange
        let store = Arc::new(InMemoryProductStore::with_products(vec![Product {
            id: 42,
            name: "Mechanical Keyboard".into(),
            price: 1000,
            stock: 5,
        }]));
        let service = CheckoutService::new(
            store.clone(),
            Arc::new(InMemoryCache::new()),
            Arc::new(RecordingPublisher::new()),
            Arc::new(FailingInvoiceDispatcher),
            Arc::new(FixedClock(Utc.with_ymd_and_hms(2026, 1, 15, 10, 0, 0).unwrap())),
        );

        // Act
        let result = service
            .checkout(
                &buyer(),
                CheckoutRequest {
                    product_id: 42,
                    quantity: 1,
                },
            )
            .await;

        // Assert
        assert!(result.is_ok());
        assert_eq!(store.product(42).unwrap().stock, 4);
    }
}
