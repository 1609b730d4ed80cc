//! The optimizer facade.
//!
//! [`Optimizer::call`] layers four strategies around an asynchronous
//! operation:
//!
//! ```text
//! call(identity, operation, options)
//!        │
//!        ▼
//!  cache hit? ──yes──► return cached value (no slot, no retry)
//!        │ no
//!        ▼
//!  in flight? ──yes──► await the shared call
//!        │ no
//!        ▼
//!  acquire slot (FIFO wait when full)
//!        │
//!        ▼
//!  registered meanwhile? ──yes──► release slot, await the shared call
//!        │ no
//!        ▼
//!  spawn dispatch: with_retry → cache insert → unregister → release slot
//! ```
//!
//! A dispatch runs as its own task, so it finishes even if every caller
//! waiting on it is dropped.

mod batch;

pub use batch::{BatchError, BatchOptions, BatchOutcome, BoxOperation, CallSpec, WarmupReport};

use std::future::Future;
use std::sync::Arc;

use futures_util::FutureExt;
use tokio::time::Instant;
use tracing::debug;

use crate::cache::{CacheKey, CacheStore, PendingRegistry, SharedCall};
use crate::config::{CallOptions, OptimizerConfig, ResolvedCall, millis};
use crate::error::{CallResult, EnhancedError, OptimizerError, Result};
use crate::gate::{ConcurrencyGate, SlotGuard};
use crate::retry::with_retry;
use crate::stats::{OptimizerStats, Statistics};
use crate::telemetry;

/// Caching, deduplicating, concurrency-limited, retrying call executor.
///
/// Cloning is cheap and clones share all state. Separately constructed
/// optimizers share nothing.
pub struct Optimizer<V> {
    config: Arc<OptimizerConfig>,
    cache: Arc<CacheStore<V>>,
    pending: Arc<PendingRegistry<V>>,
    gate: Arc<ConcurrencyGate>,
    stats: Arc<Statistics>,
}

impl<V> Clone for Optimizer<V> {
    fn clone(&self) -> Self {
        Self {
            config: self.config.clone(),
            cache: self.cache.clone(),
            pending: self.pending.clone(),
            gate: self.gate.clone(),
            stats: self.stats.clone(),
        }
    }
}

impl<V> Optimizer<V>
where
    V: Clone + Send + Sync + 'static,
{
    /// Build an optimizer after validating `config`.
    pub fn new(config: OptimizerConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            cache: Arc::new(CacheStore::new(config.max_cache_size)),
            pending: Arc::new(PendingRegistry::new()),
            gate: ConcurrencyGate::new(config.max_concurrent),
            stats: Arc::new(Statistics::new()),
            config: Arc::new(config),
        })
    }

    pub fn config(&self) -> &OptimizerConfig {
        &self.config
    }

    /// Run `operation` through the cache, deduplication, the concurrency
    /// gate and the retry executor.
    ///
    /// `identity` names the operation; together with `options.params` it
    /// forms the cache key, so two calls with equal identity and params are
    /// considered the same request.
    pub async fn call<F, Fut>(
        &self,
        identity: &str,
        operation: F,
        options: CallOptions,
    ) -> CallResult<V>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<V>> + Send + 'static,
    {
        let started = Instant::now();
        let resolved = options.resolve(&self.config);
        let key = CacheKey::new(identity, options.params.as_ref());
        self.stats.record_request();
        self.trace(key, identity, "call started");

        if resolved.enable_cache {
            if let Some(value) = self.cache.get(&key) {
                self.stats.record_cache_hit();
                metrics::counter!(telemetry::CACHE_HITS_TOTAL).increment(1);
                metrics::counter!(telemetry::REQUESTS_TOTAL, "status" => "ok").increment(1);
                self.trace(key, identity, "served from cache");
                return Ok(value);
            }
            metrics::counter!(telemetry::CACHE_MISSES_TOTAL).increment(1);
        }

        let call = match self.pending.get(&key) {
            Some(in_flight) => {
                metrics::counter!(telemetry::DEDUPLICATED_TOTAL).increment(1);
                self.trace(key, identity, "attached to in-flight request");
                in_flight
            }
            None => {
                let slot = match self.gate.acquire().await {
                    Ok(slot) => slot,
                    Err(e) => return Err(self.fail(key, identity, e.into())),
                };
                let (call, registered) = self.pending.get_or_register(key, |id| {
                    self.dispatch(key, id, identity.to_owned(), slot, operation, resolved)
                });
                if !registered {
                    metrics::counter!(telemetry::DEDUPLICATED_TOTAL).increment(1);
                    self.trace(key, identity, "attached to in-flight request");
                }
                call
            }
        };

        match call.await {
            Ok(value) => {
                let elapsed = started.elapsed();
                self.stats.record_latency(elapsed);
                metrics::histogram!(telemetry::REQUEST_DURATION_SECONDS)
                    .record(elapsed.as_secs_f64());
                metrics::counter!(telemetry::REQUESTS_TOTAL, "status" => "ok").increment(1);
                if self.config.enable_logging {
                    debug!(
                        optimizer = %self.config.log_prefix,
                        %key,
                        identity,
                        elapsed_ms = millis(elapsed),
                        "call succeeded"
                    );
                }
                Ok(value)
            }
            Err(err) => Err(self.fail(key, identity, err)),
        }
    }

    /// Spawn the dispatch task for `key` and wrap it as a shared call.
    ///
    /// The task owns the slot and the registry entry; both are released
    /// when it ends, after a successful value has been cached.
    fn dispatch<F, Fut>(
        &self,
        key: CacheKey,
        id: u64,
        identity: String,
        slot: SlotGuard,
        operation: F,
        resolved: ResolvedCall,
    ) -> SharedCall<V>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<V>> + Send + 'static,
    {
        let cache = self.cache.clone();
        let stats = self.stats.clone();
        let registration = Registration {
            registry: self.pending.clone(),
            key,
            id,
        };

        let task = tokio::spawn(async move {
            let _slot = slot;
            let result = with_retry(&resolved.retry, &identity, &stats, operation).await;
            if resolved.enable_cache {
                if let Ok(value) = &result {
                    cache.insert(key, value.clone(), resolved.cache_expiry);
                }
            }
            drop(registration);
            result
        });

        async move {
            match task.await {
                Ok(result) => result,
                Err(e) => Err(EnhancedError::from(OptimizerError::Task(e.to_string()))),
            }
        }
        .boxed()
        .shared()
    }

    fn fail(&self, key: CacheKey, identity: &str, err: EnhancedError) -> EnhancedError {
        self.stats.record_error();
        metrics::counter!(telemetry::REQUESTS_TOTAL, "status" => "error").increment(1);
        if self.config.enable_logging {
            debug!(
                optimizer = %self.config.log_prefix,
                %key,
                identity,
                kind = %err.kind,
                retry_count = err.retry_count,
                error = %err,
                "call failed"
            );
        }
        err
    }

    fn trace(&self, key: CacheKey, identity: &str, event: &'static str) {
        if self.config.enable_logging {
            debug!(optimizer = %self.config.log_prefix, %key, identity, "{event}");
        }
    }

    /// Snapshot of the running statistics.
    pub fn stats(&self) -> OptimizerStats {
        OptimizerStats::collect(
            &self.stats,
            self.cache.len(),
            self.gate.active(),
            self.gate.queue_len(),
        )
    }

    /// Drop the cached value for one identity/params pair.
    pub fn invalidate(&self, identity: &str, params: Option<&serde_json::Value>) -> bool {
        self.cache.remove(&CacheKey::new(identity, params)).is_some()
    }

    pub fn clear_cache(&self) {
        self.cache.clear();
        if self.config.enable_logging {
            debug!(optimizer = %self.config.log_prefix, "cache cleared");
        }
    }

    pub fn reset_stats(&self) {
        self.stats.reset();
        if self.config.enable_logging {
            debug!(optimizer = %self.config.log_prefix, "statistics reset");
        }
    }

    /// Clear the cache, forget in-flight calls and fail every queued caller.
    ///
    /// Dispatches already running finish normally and release their slots.
    pub fn destroy(&self) {
        self.cache.clear();
        self.pending.clear();
        self.gate.close_waiters();
        if self.config.enable_logging {
            debug!(optimizer = %self.config.log_prefix, "optimizer destroyed");
        }
    }
}

/// Removes a registry entry when the owning dispatch ends, even by panic,
/// unless a newer call has taken the key since.
struct Registration<V: Clone> {
    registry: Arc<PendingRegistry<V>>,
    key: CacheKey,
    id: u64,
}

impl<V: Clone> Drop for Registration<V> {
    fn drop(&mut self) {
        self.registry.remove_if(&self.key, self.id);
    }
}
