//! Timeout enforcement.
//!
//! # Responsibilities
//! - Wrap downstream calls with a deadline
//! - Convert an elapsed deadline into a downstream failure
//!
//! # Design Decisions
//! - Uses Tokio's timeout facilities; the inner future is dropped on expiry
//! - Timeout errors are distinct from other errors (`DownstreamError::Timeout`)
//! - Timed-out requests surface as 504 Gateway Timeout at the HTTP boundary

use std::future::Future;
use std::time::Duration;

use crate::dispatch::DownstreamError;

/// Run `future` with a deadline, mapping expiry to [`DownstreamError::Timeout`].
pub async fn with_timeout<T, F>(deadline: Duration, future: F) -> Result<T, DownstreamError>
where
    F: Future<Output = Result<T, DownstreamError>>,
{
    match tokio::time::timeout(deadline, future).await {
        Ok(result) => result,
        Err(_) => Err(DownstreamError::Timeout {
            after_ms: deadline.as_millis() as u64,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_timeout_elapses() {
        let result: Result<(), _> = with_timeout(Duration::from_millis(50), async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await;

        assert!(matches!(result, Err(DownstreamError::Timeout { after_ms: 50 })));
    }

    #[tokio::test]
    async fn test_inner_result_passes_through() {
        let ok = with_timeout(Duration::from_secs(1), async { Ok(7) }).await;
        assert_eq!(ok.unwrap(), 7);

        let err: Result<(), _> = with_timeout(Duration::from_secs(1), async {
            Err(DownstreamError::Connect("refused".into()))
        })
        .await;
        assert!(matches!(err, Err(DownstreamError::Connect(_))));
    }
}
