//! `race` and `retry`.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use backon::{ConstantBuilder, Retryable};

/// Which branch of a [`race`] resolved first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Winner<A, B> {
    /// The first branch.
    First(A),
    /// The second branch.
    Second(B),
}

/// Polls both branches and returns the first to resolve.
///
/// The losing branch is dropped. Whatever it was waiting on may still finish
/// elsewhere, but its result never reaches the caller. When both are ready on
/// the same poll, `first` wins.
pub async fn race<A, B>(
    first: impl Future<Output = A>,
    second: impl Future<Output = B>,
) -> Winner<A, B> {
    tokio::select! {
        biased;
        a = first => Winner::First(a),
        b = second => Winner::Second(b),
    }
}

/// Runs `op` until it succeeds, at most `max_attempts` times in total.
///
/// Attempts follow each other without delay. If every attempt fails, the
/// error of the last one is returned.
///
/// # Errors
///
/// Returns the last attempt's error once `max_attempts` attempts failed.
pub async fn retry<T, E, F, Fut>(max_attempts: u32, op: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    let retries = usize::try_from(max_attempts.saturating_sub(1)).unwrap_or(usize::MAX);
    let backoff = ConstantBuilder::default()
        .with_delay(Duration::ZERO)
        .with_max_times(retries);

    op.retry(backoff)
        .notify(|error: &E, _| tracing::warn!(%error, "attempt failed, retrying"))
        .await
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    #[tokio::test]
    async fn test_retry_reports_last_error() {
        let attempts = &AtomicU32::new(0);
        let result: Result<(), String> = retry(3, || async move {
            let n = attempts.fetch_add(1, Ordering::SeqCst) + 1;
            Err(format!("attempt {n}"))
        })
        .await;
        assert_eq!(result.unwrap_err(), "attempt 3");
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_stops_at_first_success() {
        let attempts = &AtomicU32::new(0);
        let result: Result<u32, String> = retry(4, || async move {
            let n = attempts.fetch_add(1, Ordering::SeqCst) + 1;
            if n < 2 {
                Err("transient".to_string())
            } else {
                Ok(n)
            }
        })
        .await;
        assert_eq!(result.unwrap(), 2);
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_single_attempt_does_not_retry() {
        let attempts = &AtomicU32::new(0);
        let result: Result<(), &str> = retry(1, || async move {
            attempts.fetch_add(1, Ordering::SeqCst);
            Err("nope")
        })
        .await;
        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_race_drops_loser() {
        let winner = race(
            tokio::time::sleep(Duration::from_secs(60)),
            std::future::ready("event"),
        )
        .await;
        assert_eq!(winner, Winner::Second("event"));

        let winner = race(
            std::future::pending::<()>(),
            tokio::time::sleep(Duration::from_secs(60)),
        )
        .await;
        assert_eq!(winner, Winner::Second(()));
    }
}
