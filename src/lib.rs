//! request-optimizer - caching, deduplication, bounded concurrency and
//! retry for client-side API calls
//!
//! An [`Optimizer`] wraps arbitrary asynchronous operations. Identical
//! concurrent calls share one execution, successful results are cached
//! for a configurable time, at most `max_concurrent` operations run at
//! once (the rest wait in FIFO order), and transient failures are retried
//! with exponential backoff and jitter.
//!
//! # Example
//!
//! ```rust,no_run
//! use request_optimizer::{CallOptions, Optimizer, OptimizerConfig, OptimizerError};
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let optimizer: Optimizer<String> = Optimizer::new(OptimizerConfig::default())?;
//!
//!     let profile = optimizer
//!         .call(
//!             "user.profile",
//!             || async { Ok::<_, OptimizerError>("alice".to_string()) },
//!             CallOptions::new().params(json!({"id": 7})),
//!         )
//!         .await?;
//!
//!     println!("{profile} / {}", optimizer.stats());
//!     Ok(())
//! }
//! ```
//!
//! The [`dispatch`] module provides an HTTP dispatcher with the backend's
//! envelope, credential and session-expiry conventions.

pub mod cache;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod gate;
pub mod optimizer;
pub mod retry;
pub mod stats;
pub mod telemetry;
pub mod timer;

// Re-export main types at crate root
pub use cache::CacheKey;
pub use config::{CallOptions, DispatcherConfig, OptimizerConfig, Settings};
pub use error::{CallResult, EnhancedError, ErrorKind, ErrorReport, OptimizerError, Result};
pub use optimizer::{
    BatchError, BatchOptions, BatchOutcome, BoxOperation, CallSpec, Optimizer, WarmupReport,
};
pub use retry::{RetryPolicy, with_retry};
pub use stats::{OptimizerStats, Statistics};
