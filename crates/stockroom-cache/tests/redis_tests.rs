//! Integration tests against a live Redis at `REDIS_URL`
//! (default `redis://127.0.0.1:6379`). Run with `-- --ignored`.

use std::time::Duration;

use stockroom_cache::{RedisCache, RedisInvoiceQueue, connect};
use stockroom_core::cache::Cache;
use stockroom_core::event::InvoiceTask;
use stockroom_core::invoice::{InvoiceDispatcher, TaskQueue};

fn redis_url() -> String {
    std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string())
}

#[tokio::test]
#[ignore = "requires Redis via REDIS_URL"]
async fn test_set_get_delete_round_trip() {
    let cache = RedisCache::new(connect(&redis_url()).await.unwrap());

    cache
        .set("it:product:1", r#"{"id":1}"#, Duration::from_secs(30))
        .await
        .unwrap();
    let hit = cache.get("it:product:1").await.unwrap();
    cache.delete("it:product:1").await.unwrap();
    let miss = cache.get("it:product:1").await.unwrap();

    assert_eq!(hit.as_deref(), Some(r#"{"id":1}"#));
    assert_eq!(miss, None);
}

#[tokio::test]
#[ignore = "requires Redis via REDIS_URL"]
async fn test_delete_prefix_only_removes_matching_keys() {
    let cache = RedisCache::new(connect(&redis_url()).await.unwrap());
    for page in 1..=3 {
        cache
            .set(
                &format!("it-products:page:{page}:limit:10:search:"),
                "[]",
                Duration::from_secs(30),
            )
            .await
            .unwrap();
    }
    cache
        .set("it-product:9", "{}", Duration::from_secs(30))
        .await
        .unwrap();

    cache.delete_prefix("it-products:").await.unwrap();

    assert_eq!(
        cache.get("it-products:page:2:limit:10:search:").await.unwrap(),
        None
    );
    assert!(cache.get("it-product:9").await.unwrap().is_some());
    cache.delete("it-product:9").await.unwrap();
}

#[tokio::test]
#[ignore = "requires Redis via REDIS_URL"]
async fn test_queue_is_fifo_and_pop_times_out_when_empty() {
    let queue = RedisInvoiceQueue::new(connect(&redis_url()).await.unwrap())
        .with_key("it:queue:invoice_sending");
    let task = InvoiceTask {
        user_id: 7,
        email: "buyer@example.com".into(),
        product_id: 42,
        quantity: 2,
        total_price: 2000,
    };

    queue.dispatch(&task).await.unwrap();
    queue.push_back("second").await.unwrap();
    let first = queue.pop(Duration::from_secs(1)).await.unwrap().unwrap();
    let second = queue.pop(Duration::from_secs(1)).await.unwrap();
    let empty = queue.pop(Duration::from_secs(1)).await.unwrap();

    assert_eq!(serde_json::from_str::<InvoiceTask>(&first).unwrap(), task);
    assert_eq!(second.as_deref(), Some("second"));
    assert_eq!(empty, None);
}
