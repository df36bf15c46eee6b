//! Timeout constants and async timeout wrappers.

use std::future::Future;
use std::time::Duration;

use crate::error::{ProtocolError, Result};

/// How long one connect attempt may stay in flight.
pub const CONNECT_ATTEMPT_TIMEOUT: Duration = Duration::from_millis(2000);

/// Attempts made by one connect sequence before giving up.
pub const CONNECT_ATTEMPTS: u32 = 5;

/// Run `future`, mapping an elapsed deadline to [`ProtocolError::Timeout`].
pub async fn with_timeout_error<F, T>(future: F, duration: Duration) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    tokio::time::timeout(duration, future)
        .await
        .map_err(|_| ProtocolError::Timeout)?
}
