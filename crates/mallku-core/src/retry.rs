//! Exponential-backoff retry helper for external calls (§5: base 100ms,
//! cap 2s, three attempts before surfacing `Error::Transient`).

use crate::error::Error;
use std::future::Future;
use std::time::Duration;

const BASE: Duration = Duration::from_millis(100);
const CAP: Duration = Duration::from_secs(2);
const ATTEMPTS: u32 = 3;

/// Runs `op` up to three times, doubling the delay each retry (capped at
/// 2s), returning the last error as `Error::Transient` if every attempt
/// fails with a `Transient`-eligible error. Any other error returned by
/// `op` is propagated immediately without retrying.
pub async fn with_backoff<T, F, Fut>(mut op: F) -> crate::Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = crate::Result<T>>,
{
    let mut delay = BASE;
    let mut last_err = None;
    for attempt in 0..ATTEMPTS {
        match op().await {
            Ok(v) => return Ok(v),
            Err(Error::Transient { detail }) => {
                last_err = Some(detail);
                if attempt + 1 < ATTEMPTS {
                    tokio::time::sleep(delay).await;
                    delay = std::cmp::min(delay * 2, CAP);
                }
            }
            Err(other) => return Err(other),
        }
    }
    Err(Error::transient(last_err.unwrap_or_else(|| "retries exhausted".to_string())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn succeeds_without_retry() {
        let calls = AtomicUsize::new(0);
        let result = with_backoff(|| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Ok::<_, Error>(42) }
        })
        .await
        .unwrap();
        assert_eq!(result, 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn retries_then_surfaces_transient() {
        let calls = AtomicUsize::new(0);
        let result: crate::Result<()> = with_backoff(|| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(Error::transient("boom")) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn non_transient_errors_do_not_retry() {
        let calls = AtomicUsize::new(0);
        let result: crate::Result<()> = with_backoff(|| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(Error::invariant("nope")) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
