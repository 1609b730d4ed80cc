use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use request_optimizer::{
    CallOptions, ErrorKind, Optimizer, OptimizerConfig, OptimizerError, RetryPolicy, Statistics,
    with_retry,
};
use tokio::time::Instant;

/// Operation that fails `failures` times with `fail_with`, then succeeds.
struct FailThenSucceed {
    remaining: AtomicU32,
    total_calls: AtomicU32,
    fail_with: fn() -> OptimizerError,
}

impl FailThenSucceed {
    fn new(failures: u32, fail_with: fn() -> OptimizerError) -> Arc<Self> {
        Arc::new(Self {
            remaining: AtomicU32::new(failures),
            total_calls: AtomicU32::new(0),
            fail_with,
        })
    }

    async fn run(&self) -> request_optimizer::Result<&'static str> {
        self.total_calls.fetch_add(1, Ordering::SeqCst);
        let left = self.remaining.load(Ordering::SeqCst);
        if left > 0 {
            self.remaining.store(left - 1, Ordering::SeqCst);
            return Err((self.fail_with)());
        }
        Ok("ok")
    }

    fn call_count(&self) -> u32 {
        self.total_calls.load(Ordering::SeqCst)
    }
}

fn network() -> OptimizerError {
    OptimizerError::Network("connection reset".into())
}

fn not_found() -> OptimizerError {
    OptimizerError::Http {
        status: 404,
        message: "missing".into(),
    }
}

fn no_jitter() -> RetryPolicy {
    RetryPolicy::new().jitter(false)
}

#[tokio::test(start_paused = true)]
async fn retries_transient_error_then_succeeds() {
    let op = FailThenSucceed::new(2, network);
    let stats = Statistics::new();

    let result = with_retry(&no_jitter(), "flaky", &stats, || {
        let op = op.clone();
        async move { op.run().await }
    })
    .await;

    assert_eq!(result.unwrap(), "ok");
    assert_eq!(op.call_count(), 3);
    assert_eq!(stats.retry_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn gives_up_after_max_retries() {
    let op = FailThenSucceed::new(10, network);
    let stats = Statistics::new();
    let policy = no_jitter().max_retries(2);

    let err = with_retry(&policy, "down", &stats, || {
        let op = op.clone();
        async move { op.run().await }
    })
    .await
    .unwrap_err();

    assert_eq!(op.call_count(), 3);
    assert_eq!(err.retry_count, 2);
    assert_eq!(err.kind, ErrorKind::Network);
    assert!(err.can_retry);
    assert_eq!(err.original, network());
}

#[tokio::test(start_paused = true)]
async fn client_error_is_not_retried() {
    let op = FailThenSucceed::new(1, not_found);
    let stats = Statistics::new();

    let err = with_retry(&no_jitter(), "lookup", &stats, || {
        let op = op.clone();
        async move { op.run().await }
    })
    .await
    .unwrap_err();

    assert_eq!(op.call_count(), 1);
    assert_eq!(err.retry_count, 0);
    assert_eq!(err.kind, ErrorKind::NotFound);
    assert!(!err.can_retry);
    assert_eq!(stats.retry_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn backoff_delays_without_jitter_are_exact() {
    let op = FailThenSucceed::new(2, network);
    let started = Instant::now();

    with_retry(&no_jitter(), "timed", &Statistics::new(), || {
        let op = op.clone();
        async move { op.run().await }
    })
    .await
    .unwrap();

    // 1s before the first retry, 2s before the second
    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_secs(3), "elapsed {elapsed:?}");
    assert!(elapsed < Duration::from_millis(3_010), "elapsed {elapsed:?}");
}

#[tokio::test(start_paused = true)]
async fn jittered_delays_stay_within_bounds() {
    let op = FailThenSucceed::new(2, network);
    let started = Instant::now();

    with_retry(&RetryPolicy::new(), "jittered", &Statistics::new(), || {
        let op = op.clone();
        async move { op.run().await }
    })
    .await
    .unwrap();

    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_secs(3), "elapsed {elapsed:?}");
    assert!(elapsed < Duration::from_secs(5), "elapsed {elapsed:?}");
}

#[tokio::test(start_paused = true)]
async fn slow_attempt_times_out_and_is_retried() {
    let calls = Arc::new(AtomicU32::new(0));
    let policy = no_jitter()
        .max_retries(1)
        .timeout(Duration::from_secs(1))
        .base_delay(Duration::from_millis(100));

    let err = with_retry(&policy, "slow", &Statistics::new(), || {
        let calls = calls.clone();
        async move {
            calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(())
        }
    })
    .await
    .unwrap_err();

    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(err.kind, ErrorKind::Timeout);
    assert_eq!(err.original, OptimizerError::Timeout(Duration::from_secs(1)));
}

#[tokio::test(start_paused = true)]
async fn zero_retries_means_single_attempt() {
    let op = FailThenSucceed::new(1, network);

    let err = with_retry(&RetryPolicy::disabled(), "once", &Statistics::new(), || {
        let op = op.clone();
        async move { op.run().await }
    })
    .await
    .unwrap_err();

    assert_eq!(op.call_count(), 1);
    assert_eq!(err.retry_count, 0);
}

#[tokio::test(start_paused = true)]
async fn optimizer_counts_retries_in_stats() {
    let optimizer = Optimizer::new(
        OptimizerConfig::new()
            .jitter(false)
            .base_delay(Duration::from_millis(10))
            .enable_logging(false),
    )
    .unwrap();
    let op = FailThenSucceed::new(2, || OptimizerError::Http {
        status: 503,
        message: "unavailable".into(),
    });

    let value = optimizer
        .call(
            "busy",
            move || {
                let op = op.clone();
                async move { op.run().await }
            },
            CallOptions::new(),
        )
        .await
        .unwrap();

    assert_eq!(value, "ok");
    let stats = optimizer.stats();
    assert_eq!(stats.retry_count, 2);
    assert_eq!(stats.error_count, 0);
}

#[tokio::test(start_paused = true)]
async fn call_options_override_retry_budget() {
    let optimizer = Optimizer::new(OptimizerConfig::new().jitter(false).enable_logging(false))
        .unwrap();
    let op = FailThenSucceed::new(5, network);
    let counter = op.clone();

    let err = optimizer
        .call(
            "override",
            move || {
                let op = op.clone();
                async move { op.run().await }
            },
            CallOptions::new()
                .max_retries(1)
                .base_delay(Duration::from_millis(5)),
        )
        .await
        .unwrap_err();

    assert_eq!(counter.call_count(), 2);
    assert_eq!(err.retry_count, 1);
}
