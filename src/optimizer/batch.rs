//! Batch execution and cache warm-up on top of [`Optimizer::call`].

use std::future::Future;
use std::sync::Arc;

use futures_util::FutureExt;
use futures_util::future::{BoxFuture, join_all, try_join_all};
use serde::Serialize;
use tracing::{debug, warn};

use super::Optimizer;
use crate::config::CallOptions;
use crate::error::{CallResult, EnhancedError, Result};
use crate::stats::OptimizerStats;

/// Type-erased operation, re-invocable for retries.
pub type BoxOperation<V> = Arc<dyn Fn() -> BoxFuture<'static, Result<V>> + Send + Sync>;

/// One call in a batch or warm-up list.
pub struct CallSpec<V> {
    pub identity: String,
    /// Overrides the batch-wide options for this call only.
    pub options: Option<CallOptions>,
    operation: BoxOperation<V>,
}

impl<V> Clone for CallSpec<V> {
    fn clone(&self) -> Self {
        Self {
            identity: self.identity.clone(),
            options: self.options.clone(),
            operation: self.operation.clone(),
        }
    }
}

impl<V: Send + 'static> CallSpec<V> {
    pub fn new<F, Fut>(identity: impl Into<String>, operation: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<V>> + Send + 'static,
    {
        Self {
            identity: identity.into(),
            options: None,
            operation: Arc::new(move || operation().boxed()),
        }
    }

    pub fn options(mut self, options: CallOptions) -> Self {
        self.options = Some(options);
        self
    }
}

/// How a batch is run.
#[derive(Debug, Clone)]
pub struct BatchOptions {
    /// Calls started together per chunk (minimum 1). Default: 3.
    pub concurrency: usize,
    /// Abort on the first failure instead of collecting errors.
    pub fail_fast: bool,
    /// Options for specs that carry none of their own.
    pub call: CallOptions,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            concurrency: 3,
            fail_fast: false,
            call: CallOptions::default(),
        }
    }
}

impl BatchOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.concurrency = n;
        self
    }

    pub fn fail_fast(mut self, enabled: bool) -> Self {
        self.fail_fast = enabled;
        self
    }

    pub fn call_options(mut self, options: CallOptions) -> Self {
        self.call = options;
        self
    }
}

/// A failed batch entry.
#[derive(Debug, Clone)]
pub struct BatchError {
    /// Position of the failed spec in the input.
    pub index: usize,
    pub error: EnhancedError,
}

/// Results of a batch, aligned with the input order.
#[derive(Debug, Clone)]
pub struct BatchOutcome<V> {
    /// `None` where the call at that index failed.
    pub results: Vec<Option<V>>,
    pub errors: Vec<BatchError>,
    /// Optimizer statistics taken after the last chunk.
    pub stats: OptimizerStats,
}

impl<V> BatchOutcome<V> {
    pub fn is_complete(&self) -> bool {
        self.errors.is_empty()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct WarmupReport {
    pub succeeded: usize,
    pub failed: usize,
}

impl<V> Optimizer<V>
where
    V: Clone + Send + Sync + 'static,
{
    /// Run `specs` in consecutive chunks of `options.concurrency`.
    ///
    /// Each chunk is started together and awaited before the next one
    /// begins. With `fail_fast` the first failing call ends the batch with
    /// its error; otherwise failures are collected and the batch always
    /// returns `Ok`.
    pub async fn batch_call(
        &self,
        specs: Vec<CallSpec<V>>,
        options: BatchOptions,
    ) -> CallResult<BatchOutcome<V>> {
        let chunk_size = options.concurrency.max(1);
        let mut results: Vec<Option<V>> = vec![None; specs.len()];
        let mut errors = Vec::new();

        for (chunk_index, chunk) in specs.chunks(chunk_size).enumerate() {
            let offset = chunk_index * chunk_size;
            let calls = chunk.iter().enumerate().map(|(i, spec)| {
                let call_options = spec.options.clone().unwrap_or_else(|| options.call.clone());
                async move { (offset + i, self.run_spec(spec, call_options).await) }
            });

            if options.fail_fast {
                let values = try_join_all(
                    calls.map(|call| async move {
                        let (index, outcome) = call.await;
                        outcome.map(|value| (index, value))
                    }),
                )
                .await?;
                for (index, value) in values {
                    results[index] = Some(value);
                }
            } else {
                for (index, outcome) in join_all(calls).await {
                    match outcome {
                        Ok(value) => results[index] = Some(value),
                        Err(error) => errors.push(BatchError { index, error }),
                    }
                }
            }
        }

        Ok(BatchOutcome {
            results,
            errors,
            stats: self.stats(),
        })
    }

    /// Call every spec once with caching forced on, so later calls hit the
    /// cache. Failures are logged and counted, never raised.
    pub async fn warmup_cache(&self, specs: Vec<CallSpec<V>>) -> WarmupReport {
        if self.config.enable_logging {
            debug!(
                optimizer = %self.config.log_prefix,
                count = specs.len(),
                "warming cache"
            );
        }

        let outcomes = join_all(specs.iter().map(|spec| async move {
            let call_options = spec.options.clone().unwrap_or_default().enable_cache(true);
            match self.run_spec(spec, call_options).await {
                Ok(_) => true,
                Err(e) => {
                    warn!(identity = %spec.identity, error = %e, "cache warm-up call failed");
                    false
                }
            }
        }))
        .await;

        let succeeded = outcomes.iter().filter(|ok| **ok).count();
        WarmupReport {
            succeeded,
            failed: outcomes.len() - succeeded,
        }
    }

    async fn run_spec(&self, spec: &CallSpec<V>, options: CallOptions) -> CallResult<V> {
        let operation = spec.operation.clone();
        self.call(&spec.identity, move || (*operation)(), options)
            .await
    }
}
