//! Per-optimizer statistics.
//!
//! Counters are lock-free atomics; the running mean latency is guarded by
//! a mutex because its two fields must move together.

use std::fmt;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::Serialize;

/// Live counters owned by one optimizer instance.
#[derive(Debug, Default)]
pub struct Statistics {
    total_requests: AtomicU64,
    cache_hits: AtomicU64,
    retry_count: AtomicU64,
    error_count: AtomicU64,
    latency: Mutex<RunningMean>,
}

#[derive(Debug, Default, Clone, Copy)]
struct RunningMean {
    mean_ms: f64,
    samples: u64,
}

impl Statistics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_request(&self) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cache_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_retry(&self) {
        self.retry_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_error(&self) {
        self.error_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Fold a successful call's latency into the running mean.
    pub fn record_latency(&self, elapsed: Duration) {
        let sample = elapsed.as_secs_f64() * 1_000.0;
        let mut latency = self.latency.lock().unwrap_or_else(|e| e.into_inner());
        latency.samples += 1;
        latency.mean_ms += (sample - latency.mean_ms) / latency.samples as f64;
    }

    pub fn total_requests(&self) -> u64 {
        self.total_requests.load(Ordering::Relaxed)
    }

    pub fn cache_hits(&self) -> u64 {
        self.cache_hits.load(Ordering::Relaxed)
    }

    pub fn retry_count(&self) -> u64 {
        self.retry_count.load(Ordering::Relaxed)
    }

    pub fn error_count(&self) -> u64 {
        self.error_count.load(Ordering::Relaxed)
    }

    /// Mean latency of successful non-cached calls, in milliseconds.
    pub fn avg_response_time_ms(&self) -> f64 {
        self.latency
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .mean_ms
    }

    pub fn reset(&self) {
        self.total_requests.store(0, Ordering::Relaxed);
        self.cache_hits.store(0, Ordering::Relaxed);
        self.retry_count.store(0, Ordering::Relaxed);
        self.error_count.store(0, Ordering::Relaxed);
        *self.latency.lock().unwrap_or_else(|e| e.into_inner()) = RunningMean::default();
    }
}

/// Read-only snapshot returned by [`Optimizer::stats()`](crate::Optimizer::stats).
///
/// Rates are percentages in `0.0..=100.0`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OptimizerStats {
    pub total_requests: u64,
    pub cache_hits: u64,
    pub retry_count: u64,
    pub error_count: u64,
    pub avg_response_time_ms: f64,
    pub cache_hit_rate: f64,
    pub error_rate: f64,
    pub cache_size: usize,
    pub active_requests: usize,
    pub queue_length: usize,
}

impl OptimizerStats {
    pub(crate) fn collect(
        stats: &Statistics,
        cache_size: usize,
        active_requests: usize,
        queue_length: usize,
    ) -> Self {
        let total = stats.total_requests();
        let cache_hits = stats.cache_hits();
        let error_count = stats.error_count();
        Self {
            total_requests: total,
            cache_hits,
            retry_count: stats.retry_count(),
            error_count,
            avg_response_time_ms: stats.avg_response_time_ms(),
            cache_hit_rate: percentage(cache_hits, total),
            error_rate: percentage(error_count, total),
            cache_size,
            active_requests,
            queue_length,
        }
    }
}

fn percentage(part: u64, total: u64) -> f64 {
    if total == 0 {
        0.0
    } else {
        part as f64 / total as f64 * 100.0
    }
}

impl fmt::Display for OptimizerStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "requests={} hits={} ({:.2}%) retries={} errors={} ({:.2}%) avg={:.1}ms cache={} active={} queued={}",
            self.total_requests,
            self.cache_hits,
            self.cache_hit_rate,
            self.retry_count,
            self.error_count,
            self.error_rate,
            self.avg_response_time_ms,
            self.cache_size,
            self.active_requests,
            self.queue_length,
        )
    }
}
