//! Retry and debounced error delivery wired around a `CommandCache`.

use command_cache::resilience::debounce::create_debounced_error_handler;
use command_cache::{
    classify, retry, CommandCache, CommandCacheConfig, Error, ErrorKind, FnExecutor, Retry,
    RetryConfig,
};
use serde_json::json;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_test::{assert_err, assert_ok};

fn flaky(failures: u32, message: &'static str, calls: Arc<AtomicU32>) -> FnExecutor {
    FnExecutor::new(move |_, _| {
        let calls = Arc::clone(&calls);
        async move {
            if calls.fetch_add(1, Ordering::SeqCst) < failures {
                Err(Error::backend(message))
            } else {
                Ok(json!({ "ok": true }))
            }
        }
    })
}

fn fast_retry(max_retries: u32) -> RetryConfig {
    RetryConfig::new()
        .with_max_retries(max_retries)
        .with_initial_delay(Duration::from_millis(100))
        .with_max_delay(Duration::from_millis(1_000))
}

#[tokio::test(start_paused = true)]
async fn recoverable_backend_failures_are_retried() {
    let calls = Arc::new(AtomicU32::new(0));
    let cache = CommandCache::with_config(
        flaky(2, "request timed out", Arc::clone(&calls)),
        CommandCacheConfig::default().with_retry(fast_retry(3)),
    )
    .unwrap();

    let started = tokio::time::Instant::now();
    let value = assert_ok!(cache.cached_invoke("get_items", None, None).await);
    assert_eq!(value, json!({ "ok": true }));
    assert_eq!(calls.load(Ordering::SeqCst), 3);
    // 100ms then 200ms of backoff.
    assert!(started.elapsed() >= Duration::from_millis(300));
}

#[tokio::test(start_paused = true)]
async fn unrecoverable_failures_fail_fast() {
    let calls = Arc::new(AtomicU32::new(0));
    let cache = CommandCache::with_config(
        flaky(5, "401 Unauthorized", Arc::clone(&calls)),
        CommandCacheConfig::default().with_retry(fast_retry(3)),
    )
    .unwrap();

    let err = assert_err!(cache.cached_invoke("get_profile", None, None).await);
    assert_eq!(classify(&err), ErrorKind::Unauthorized);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn exhausted_retries_return_last_error() {
    let calls = Arc::new(AtomicU32::new(0));
    let cache = CommandCache::with_config(
        flaky(10, "connection reset by peer", Arc::clone(&calls)),
        CommandCacheConfig::default().with_retry(fast_retry(2)),
    )
    .unwrap();

    let err = assert_err!(cache.cached_invoke("get_status", None, None).await);
    assert_eq!(classify(&err), ErrorKind::Network);
    assert_eq!(err.message(), "connection reset by peer");
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[tokio::test(start_paused = true)]
async fn joined_callers_share_one_retry_sequence() {
    let calls = Arc::new(AtomicU32::new(0));
    let cache = CommandCache::with_config(
        flaky(1, "network unreachable", Arc::clone(&calls)),
        CommandCacheConfig::default().with_retry(fast_retry(3)),
    )
    .unwrap();

    let (a, b) = tokio::join!(
        cache.cached_invoke("get_items", None, None),
        cache.cached_invoke("get_items", None, None)
    );
    assert!(a.is_ok() && b.is_ok());
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test(start_paused = true)]
async fn mutations_are_not_retried() {
    let calls = Arc::new(AtomicU32::new(0));
    let cache = CommandCache::with_config(
        flaky(1, "connection refused", Arc::clone(&calls)),
        CommandCacheConfig::default().with_retry(fast_retry(3)),
    )
    .unwrap();

    assert_err!(cache.invoke_mutation("create_item", None).await);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn custom_predicate_overrides_classification() {
    let calls = &AtomicU32::new(0);
    let policy = Retry::with_predicate(fast_retry(3), |err: &Error| {
        classify(err) == ErrorKind::NotFound
    });

    let result: Result<u32, Error> = policy
        .run(move || async move {
            if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(Error::backend("404"))
            } else {
                Ok(7)
            }
        })
        .await;
    assert_eq!(result.unwrap(), 7);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test(start_paused = true)]
async fn retry_function_uses_default_predicate() {
    let calls = &AtomicU32::new(0);
    let result: Result<(), Error> = retry(
        move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(Error::backend("invalid payload"))
        },
        fast_retry(3),
    )
    .await;
    assert_eq!(classify(&result.unwrap_err()), ErrorKind::Validation);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn burst_of_cache_failures_is_reported_once() {
    let cache = CommandCache::with_config(
        FnExecutor::new(|command, _| async move {
            Err(Error::backend(format!("{} failed: connection refused", command)))
        }),
        CommandCacheConfig::default().without_retry(),
    )
    .unwrap();

    let delivered = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&delivered);
    let notify = create_debounced_error_handler(
        move |err: Error| sink.lock().unwrap().push(err.message()),
        Duration::from_millis(1_000),
    );

    for command in ["get_items", "get_status", "get_stats"] {
        if let Err(err) = cache.cached_invoke(command, None, None).await {
            notify.call(err);
        }
    }
    assert!(notify.is_pending());

    tokio::time::sleep(Duration::from_millis(1_100)).await;
    let delivered = delivered.lock().unwrap();
    assert_eq!(delivered.as_slice(), ["get_stats failed: connection refused"]);
    assert!(!notify.is_pending());
}
