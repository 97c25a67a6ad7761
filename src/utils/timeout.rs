//! Async timeout helpers.
//!
//! Every network wait in the crate goes through [`with_timeout_error`] so a
//! slow or silent peer surfaces as `ProtocolError::Timeout` instead of
//! blocking a task forever.

use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::error::{ProtocolError, Result};

/// Default timeout for connects, reads and round trips
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Time allowed for in-flight connections to finish on shutdown
pub const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

/// Await `future`, mapping an elapsed deadline to `ProtocolError::Timeout`
pub async fn with_timeout_error<F, T>(future: F, duration: Duration) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(duration, future).await {
        Ok(result) => result,
        Err(_) => {
            warn!(timeout_ms = duration.as_millis() as u64, "Operation timed out");
            Err(ProtocolError::Timeout)
        }
    }
}
