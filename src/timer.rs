//! Timer helpers shared by the retry executor and the dispatcher.
//!
//! Built on tokio's timer, so tests can drive them with a paused clock.

use std::future::Future;
use std::time::Duration;

use crate::error::{OptimizerError, Result};

/// Suspend the current task for `duration`.
pub async fn sleep(duration: Duration) {
    tokio::time::sleep(duration).await;
}

/// Race `fut` against a timer.
///
/// On expiry `fut` is dropped and [`OptimizerError::Timeout`] is returned.
/// Work the future already handed off elsewhere is not reclaimed.
pub async fn with_timeout<F, T>(duration: Duration, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(duration, fut).await {
        Ok(result) => result,
        Err(_) => Err(OptimizerError::Timeout(duration)),
    }
}
