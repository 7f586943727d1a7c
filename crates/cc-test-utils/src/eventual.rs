//! Eventual consistency helpers for timing-dependent tests.
//!
//! Platform cleanup runs on spawned tasks after the HTTP response is sent,
//! so tests poll for its effects with exponential backoff.

use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;

/// Categories of eventual consistency with their maximum wait.
#[derive(Debug, Clone, Copy)]
pub enum ConsistencyCategory {
    /// Background platform cleanup after a conference closes.
    PlatformCleanup,
}

impl ConsistencyCategory {
    /// Get the maximum timeout for this consistency category.
    pub fn timeout(&self) -> Duration {
        match self {
            ConsistencyCategory::PlatformCleanup => Duration::from_secs(5),
        }
    }

    /// Get the initial retry delay for exponential backoff.
    fn initial_delay(&self) -> Duration {
        Duration::from_millis(5)
    }
}

/// Assert that a condition becomes true within the timeout for the given
/// consistency category.
///
/// Backoff starts at 5ms and doubles, capped at the remaining time.
///
/// # Example
///
/// ```rust,ignore
/// assert_eventually(ConsistencyCategory::PlatformCleanup, || async {
///     server.platform().deleted_sessions().len() == 1
/// })
/// .await
/// .expect("session should be deleted");
/// ```
pub async fn assert_eventually<F, Fut>(
    category: ConsistencyCategory,
    mut condition: F,
) -> Result<(), String>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let timeout = category.timeout();
    let mut delay = category.initial_delay();
    let start = std::time::Instant::now();

    loop {
        if condition().await {
            return Ok(());
        }

        let elapsed = start.elapsed();
        if elapsed >= timeout {
            return Err(format!(
                "Condition not met within {:?} (category: {:?})",
                timeout, category
            ));
        }

        sleep(delay).await;

        delay *= 2;

        let remaining = timeout.saturating_sub(elapsed);
        if delay > remaining {
            delay = remaining;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_assert_eventually_succeeds_after_retries() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&attempts);

        let result = assert_eventually(ConsistencyCategory::PlatformCleanup, || {
            let counter = Arc::clone(&counter);
            async move { counter.fetch_add(1, Ordering::SeqCst) >= 2 }
        })
        .await;

        assert!(result.is_ok());
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_assert_eventually_times_out() {
        let result =
            assert_eventually(ConsistencyCategory::PlatformCleanup, || async { false }).await;

        let message = result.unwrap_err();
        assert!(message.contains("PlatformCleanup"));
    }
}
