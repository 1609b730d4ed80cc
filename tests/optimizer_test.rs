//! End-to-end behaviour of `Optimizer::call`: caching, deduplication,
//! the concurrency bound and statistics.

use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use request_optimizer::{CallOptions, ErrorKind, Optimizer, OptimizerConfig, OptimizerError};
use serde_json::json;

fn quiet_config() -> OptimizerConfig {
    OptimizerConfig::new().jitter(false).enable_logging(false)
}

/// Operation that counts invocations and takes `delay` to return `value`.
fn counted(
    calls: &Arc<AtomicU32>,
    delay: Duration,
    value: &'static str,
) -> impl Fn() -> futures_util::future::BoxFuture<'static, request_optimizer::Result<String>>
+ Send
+ Sync
+ Clone
+ 'static {
    let calls = calls.clone();
    move || {
        let calls = calls.clone();
        Box::pin(async move {
            calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(delay).await;
            Ok(value.to_string())
        })
    }
}

#[tokio::test(start_paused = true)]
async fn concurrent_identical_calls_share_one_operation() {
    let optimizer = Optimizer::new(quiet_config()).unwrap();
    let calls = Arc::new(AtomicU32::new(0));
    let op = counted(&calls, Duration::from_millis(100), "profile");
    let options = CallOptions::new().params(json!({"id": 7}));

    let (a, b, c) = tokio::join!(
        optimizer.call("user.profile", op.clone(), options.clone()),
        optimizer.call("user.profile", op.clone(), options.clone()),
        optimizer.call("user.profile", op.clone(), options.clone()),
    );

    assert_eq!(a.unwrap(), "profile");
    assert_eq!(b.unwrap(), "profile");
    assert_eq!(c.unwrap(), "profile");
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    let stats = optimizer.stats();
    assert_eq!(stats.total_requests, 3);
    assert_eq!(stats.cache_hits, 0);
    assert_eq!(stats.cache_size, 1);
}

#[tokio::test(start_paused = true)]
async fn different_params_are_not_deduplicated() {
    let optimizer = Optimizer::new(quiet_config()).unwrap();
    let calls = Arc::new(AtomicU32::new(0));
    let op = counted(&calls, Duration::from_millis(50), "orders");

    let (a, b) = tokio::join!(
        optimizer.call("orders", op.clone(), CallOptions::new().params(json!({"page": 1}))),
        optimizer.call("orders", op.clone(), CallOptions::new().params(json!({"page": 2}))),
    );
    assert!(a.is_ok() && b.is_ok());
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test(start_paused = true)]
async fn cached_value_served_until_expiry() {
    let optimizer = Optimizer::new(quiet_config().cache_expiry(Duration::from_secs(5))).unwrap();
    let calls = Arc::new(AtomicU32::new(0));
    let op = counted(&calls, Duration::ZERO, "catalog");

    optimizer.call("catalog", op.clone(), CallOptions::new()).await.unwrap();
    tokio::time::advance(Duration::from_secs(4)).await;
    optimizer.call("catalog", op.clone(), CallOptions::new()).await.unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    tokio::time::advance(Duration::from_secs(2)).await;
    optimizer.call("catalog", op.clone(), CallOptions::new()).await.unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 2);

    let stats = optimizer.stats();
    assert_eq!(stats.total_requests, 3);
    assert_eq!(stats.cache_hits, 1);
}

#[tokio::test(start_paused = true)]
async fn per_call_expiry_applies_to_stored_entry() {
    let optimizer = Optimizer::new(quiet_config()).unwrap();
    let calls = Arc::new(AtomicU32::new(0));
    let op = counted(&calls, Duration::ZERO, "banner");
    let short = CallOptions::new().cache_expiry(Duration::from_millis(500));

    optimizer.call("banner", op.clone(), short.clone()).await.unwrap();
    tokio::time::advance(Duration::from_secs(1)).await;
    // default expiry would still be fresh; the entry carries its own ttl
    optimizer.call("banner", op.clone(), CallOptions::new()).await.unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test(start_paused = true)]
async fn disabled_cache_always_invokes_operation() {
    let optimizer = Optimizer::new(quiet_config().enable_cache(false)).unwrap();
    let calls = Arc::new(AtomicU32::new(0));
    let op = counted(&calls, Duration::ZERO, "feed");

    for _ in 0..3 {
        optimizer.call("feed", op.clone(), CallOptions::new()).await.unwrap();
    }
    assert_eq!(calls.load(Ordering::SeqCst), 3);
    assert_eq!(optimizer.stats().cache_size, 0);
}

#[tokio::test(start_paused = true)]
async fn failures_are_not_cached() {
    let optimizer: Optimizer<String> =
        Optimizer::new(quiet_config().max_retries(0)).unwrap();
    let calls = Arc::new(AtomicU32::new(0));
    let op = {
        let calls = calls.clone();
        move || {
            let calls = calls.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(OptimizerError::Http {
                    status: 404,
                    message: "missing".into(),
                })
            }
        }
    };

    for _ in 0..2 {
        let err = optimizer
            .call("missing", op.clone(), CallOptions::new())
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::NotFound);
    }
    assert_eq!(calls.load(Ordering::SeqCst), 2);

    let stats = optimizer.stats();
    assert_eq!(stats.error_count, 2);
    assert_eq!(stats.error_rate, 100.0);
    assert_eq!(stats.cache_size, 0);
}

#[tokio::test(start_paused = true)]
async fn concurrency_bound_holds_and_waiters_start_in_order() {
    let optimizer = Optimizer::new(quiet_config().max_concurrent(2)).unwrap();
    let active = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));
    let started = Arc::new(Mutex::new(Vec::new()));

    let calls = (0..5).map(|i| {
        let active = active.clone();
        let peak = peak.clone();
        let started = started.clone();
        let op = move || {
            let active = active.clone();
            let peak = peak.clone();
            let started = started.clone();
            async move {
                started.lock().unwrap().push(i);
                let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(100)).await;
                active.fetch_sub(1, Ordering::SeqCst);
                Ok::<_, OptimizerError>(i)
            }
        };
        let optimizer = optimizer.clone();
        async move { optimizer.call(&format!("job-{i}"), op, CallOptions::new()).await }
    });

    let results = futures_util::future::join_all(calls).await;
    let values: Vec<usize> = results.into_iter().map(|r| r.unwrap()).collect();
    assert_eq!(values, vec![0, 1, 2, 3, 4]);
    assert_eq!(peak.load(Ordering::SeqCst), 2);
    assert_eq!(*started.lock().unwrap(), vec![0, 1, 2, 3, 4]);
}

#[tokio::test(start_paused = true)]
async fn stats_report_active_and_queued_calls() {
    let optimizer: Optimizer<u32> =
        Optimizer::new(quiet_config().max_concurrent(1)).unwrap();

    let handles: Vec<_> = (0..3)
        .map(|i| {
            let optimizer = optimizer.clone();
            tokio::spawn(async move {
                optimizer
                    .call(
                        &format!("slow-{i}"),
                        move || async move {
                            tokio::time::sleep(Duration::from_secs(1)).await;
                            Ok(i)
                        },
                        CallOptions::new(),
                    )
                    .await
            })
        })
        .collect();

    while optimizer.stats().queue_length < 2 {
        tokio::task::yield_now().await;
    }
    let stats = optimizer.stats();
    assert_eq!(stats.active_requests, 1);
    assert_eq!(stats.queue_length, 2);

    for handle in handles {
        handle.await.unwrap().unwrap();
    }
    let stats = optimizer.stats();
    assert_eq!(stats.active_requests, 0);
    assert_eq!(stats.queue_length, 0);
}

#[tokio::test(start_paused = true)]
async fn destroy_fails_queued_callers() {
    let optimizer: Optimizer<u32> =
        Optimizer::new(quiet_config().max_concurrent(1)).unwrap();

    let running = tokio::spawn({
        let optimizer = optimizer.clone();
        async move {
            optimizer
                .call(
                    "long",
                    || async {
                        tokio::time::sleep(Duration::from_secs(1)).await;
                        Ok(1)
                    },
                    CallOptions::new(),
                )
                .await
        }
    });
    let queued = tokio::spawn({
        let optimizer = optimizer.clone();
        async move {
            optimizer
                .call("queued", || async { Ok(2) }, CallOptions::new())
                .await
        }
    });

    while optimizer.stats().queue_length < 1 {
        tokio::task::yield_now().await;
    }
    optimizer.destroy();

    let err = queued.await.unwrap().unwrap_err();
    assert_eq!(err.original, OptimizerError::Destroyed);
    assert!(!err.can_retry);
    assert_eq!(running.await.unwrap().unwrap(), 1);
}

#[tokio::test(start_paused = true)]
async fn call_finishing_after_destroy_keeps_newer_registration() {
    let optimizer = Optimizer::new(quiet_config()).unwrap();
    let calls = Arc::new(AtomicU32::new(0));
    let options = CallOptions::new().enable_cache(false);

    let first = tokio::spawn({
        let optimizer = optimizer.clone();
        let op = counted(&calls, Duration::from_millis(100), "first");
        let options = options.clone();
        async move { optimizer.call("feed", op, options).await }
    });
    while calls.load(Ordering::SeqCst) < 1 {
        tokio::task::yield_now().await;
    }
    optimizer.destroy();

    let second = tokio::spawn({
        let optimizer = optimizer.clone();
        let op = counted(&calls, Duration::from_millis(1000), "second");
        let options = options.clone();
        async move { optimizer.call("feed", op, options).await }
    });
    while calls.load(Ordering::SeqCst) < 2 {
        tokio::task::yield_now().await;
    }

    assert_eq!(first.await.unwrap().unwrap(), "first");

    // the first dispatch has ended; the second is still registered
    let third = optimizer
        .call("feed", counted(&calls, Duration::from_millis(10), "third"), options)
        .await
        .unwrap();
    assert_eq!(third, "second");
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(second.await.unwrap().unwrap(), "second");
}

#[tokio::test(start_paused = true)]
async fn dropped_caller_does_not_cancel_shared_work() {
    let optimizer = Optimizer::new(quiet_config()).unwrap();
    let calls = Arc::new(AtomicU32::new(0));
    let op = counted(&calls, Duration::from_millis(200), "report");

    let abandoned = tokio::time::timeout(
        Duration::from_millis(50),
        optimizer.call("report", op.clone(), CallOptions::new()),
    )
    .await;
    assert!(abandoned.is_err());

    tokio::time::sleep(Duration::from_millis(300)).await;
    let value = optimizer
        .call("report", op.clone(), CallOptions::new())
        .await
        .unwrap();
    assert_eq!(value, "report");
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn clear_cache_and_invalidate() {
    let optimizer = Optimizer::new(quiet_config()).unwrap();
    let calls = Arc::new(AtomicU32::new(0));
    let op = counted(&calls, Duration::ZERO, "x");
    let params = json!({"id": 1});

    optimizer
        .call("item", op.clone(), CallOptions::new().params(params.clone()))
        .await
        .unwrap();
    assert!(optimizer.invalidate("item", Some(&params)));
    assert!(!optimizer.invalidate("item", Some(&params)));

    optimizer.call("other", op.clone(), CallOptions::new()).await.unwrap();
    optimizer.clear_cache();
    assert_eq!(optimizer.stats().cache_size, 0);

    optimizer.reset_stats();
    assert_eq!(optimizer.stats().total_requests, 0);
}

#[test]
fn invalid_config_is_rejected() {
    let err = Optimizer::<u32>::new(OptimizerConfig::new().max_concurrent(0))
        .err()
        .unwrap();
    assert!(matches!(err, OptimizerError::Configuration(_)));
}
