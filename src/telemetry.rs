//! Telemetry metric name constants.
//!
//! Centralised metric names for optimizer and dispatcher operations.
//! Consumers install their own `metrics` recorder (e.g. prometheus,
//! statsd); without a recorder installed, all metric calls are no-ops.
//!
//! # Metric naming conventions
//!
//! All metrics are prefixed with `request_optimizer_`. Counters end in
//! `_total`, histograms use meaningful units (e.g. `_seconds`).
//!
//! # Common labels
//!
//! - `status`: "ok" or "error"
//! - `operation`: identity of the optimized call

/// Total logical calls made through an optimizer, including cache hits.
///
/// Labels: `status` ("ok" | "error").
pub const REQUESTS_TOTAL: &str = "request_optimizer_requests_total";

/// Duration of calls that reached the dispatch path, in seconds.
pub const REQUEST_DURATION_SECONDS: &str = "request_optimizer_request_duration_seconds";

/// Total retry attempts (not counting the initial attempt).
///
/// Labels: `operation`.
pub const RETRIES_TOTAL: &str = "request_optimizer_retries_total";

/// Total response cache hits.
pub const CACHE_HITS_TOTAL: &str = "request_optimizer_cache_hits_total";

/// Total response cache misses.
pub const CACHE_MISSES_TOTAL: &str = "request_optimizer_cache_misses_total";

/// Entries evicted because the cache was full.
pub const CACHE_EVICTIONS_TOTAL: &str = "request_optimizer_cache_evictions_total";

/// Calls served by attaching to an identical in-flight request.
pub const DEDUPLICATED_TOTAL: &str = "request_optimizer_deduplicated_total";

/// Dispatcher requests aborted because a newer identical request was issued.
pub const DISPATCH_CANCELLED_TOTAL: &str = "request_optimizer_dispatch_cancelled_total";
