//! Deadline helper for business work.
//!
//! The engine never applies timeouts itself. Work that calls out to slow
//! systems can bound its own waits with [`with_timeout`].

use std::future::Future;
use std::time::Duration;

/// A bounded future did not finish in time.
#[derive(Debug, thiserror::Error)]
#[error("operation timed out after {after:?}")]
pub struct TimeoutError {
  pub after: Duration,
}

/// Await `future`, failing if it takes longer than `after`.
pub async fn with_timeout<F>(future: F, after: Duration) -> Result<F::Output, TimeoutError>
where
  F: Future,
{
  tokio::time::timeout(after, future)
    .await
    .map_err(|_| TimeoutError { after })
}
