//! Batch execution and cache warm-up.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use request_optimizer::{
    BatchOptions, CallOptions, CallSpec, ErrorKind, Optimizer, OptimizerConfig, OptimizerError,
    WarmupReport,
};
use serde_json::json;
use tokio::time::Instant;

fn optimizer() -> Optimizer<String> {
    Optimizer::new(
        OptimizerConfig::new()
            .max_retries(0)
            .jitter(false)
            .enable_logging(false),
    )
    .unwrap()
}

fn ok_spec(identity: &str, value: &'static str) -> CallSpec<String> {
    CallSpec::new(identity, move || async move { Ok(value.to_string()) })
}

fn missing_spec(identity: &str) -> CallSpec<String> {
    CallSpec::new(identity, || async {
        Err(OptimizerError::Http {
            status: 404,
            message: "no such item".into(),
        })
    })
}

#[tokio::test(start_paused = true)]
async fn collects_results_and_errors_by_index() {
    let optimizer = optimizer();
    let specs = vec![
        ok_spec("a", "first"),
        missing_spec("b"),
        ok_spec("c", "third"),
    ];

    let outcome = optimizer
        .batch_call(specs, BatchOptions::new().concurrency(2))
        .await
        .unwrap();

    assert_eq!(
        outcome.results,
        vec![Some("first".to_string()), None, Some("third".to_string())]
    );
    assert_eq!(outcome.errors.len(), 1);
    assert_eq!(outcome.errors[0].index, 1);
    assert_eq!(outcome.errors[0].error.kind, ErrorKind::NotFound);
    assert!(!outcome.is_complete());
    assert_eq!(outcome.stats.total_requests, 3);
    assert_eq!(outcome.stats.error_count, 1);
}

#[tokio::test(start_paused = true)]
async fn fail_fast_returns_first_error() {
    let optimizer = optimizer();
    let specs = vec![ok_spec("a", "first"), missing_spec("b")];

    let err = optimizer
        .batch_call(specs, BatchOptions::new().fail_fast(true))
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::NotFound);
}

#[tokio::test(start_paused = true)]
async fn chunks_run_one_after_another() {
    let optimizer = optimizer();
    let origin = Instant::now();
    let starts = Arc::new(Mutex::new(Vec::new()));

    let specs: Vec<CallSpec<String>> = (0..4)
        .map(|i| {
            let starts = starts.clone();
            CallSpec::new(format!("job-{i}"), move || {
                let starts = starts.clone();
                async move {
                    starts.lock().unwrap().push((i, origin.elapsed()));
                    tokio::time::sleep(Duration::from_millis(100)).await;
                    Ok(format!("done-{i}"))
                }
            })
        })
        .collect();

    let outcome = optimizer
        .batch_call(specs, BatchOptions::new().concurrency(2))
        .await
        .unwrap();
    assert!(outcome.is_complete());
    assert_eq!(outcome.results[3].as_deref(), Some("done-3"));

    let starts = starts.lock().unwrap();
    for (i, at) in starts.iter() {
        if *i < 2 {
            assert!(*at < Duration::from_millis(100), "job {i} started at {at:?}");
        } else {
            assert!(*at >= Duration::from_millis(100), "job {i} started at {at:?}");
        }
    }
}

#[tokio::test(start_paused = true)]
async fn spec_options_override_batch_options() {
    let optimizer = optimizer();
    let params = json!({"page": 3});
    let specs = vec![ok_spec("page", "p3").options(CallOptions::new().params(params.clone()))];

    optimizer
        .batch_call(specs, BatchOptions::new())
        .await
        .unwrap();
    assert!(optimizer.invalidate("page", Some(&params)));
}

#[tokio::test(start_paused = true)]
async fn warmup_fills_cache_and_reports_failures() {
    let optimizer: Optimizer<String> = Optimizer::new(
        OptimizerConfig::new()
            .enable_cache(false)
            .max_retries(0)
            .enable_logging(false),
    )
    .unwrap();

    let report = optimizer
        .warmup_cache(vec![
            ok_spec("menu", "menu"),
            ok_spec("banner", "banner"),
            missing_spec("gone"),
        ])
        .await;
    assert_eq!(
        report,
        WarmupReport {
            succeeded: 2,
            failed: 1
        }
    );

    // warm-up forces caching even though the instance disables it
    let cached = optimizer
        .call(
            "menu",
            || async { Ok("fresh".to_string()) },
            CallOptions::new().enable_cache(true),
        )
        .await
        .unwrap();
    assert_eq!(cached, "menu");
    assert_eq!(optimizer.stats().cache_hits, 1);
}
