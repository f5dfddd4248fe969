use std::future::Future;
use std::time::Duration;

use tracing::warn;

/// Errors the limiter can recognise as upstream throttling.
pub trait Throttling {
    fn is_throttled(&self) -> bool;
}

/// Polite-client policy: a fixed delay before every request, and on a
/// throttling response one long cooldown followed by a bounded number of
/// retries.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    delay: Duration,
    cooldown: Duration,
    max_retries: u32,
}

impl RateLimiter {
    pub fn new(delay: Duration, cooldown: Duration) -> Self {
        Self {
            delay,
            cooldown,
            max_retries: 1,
        }
    }

    /// No waiting at all. For tests and local fixtures.
    pub fn immediate() -> Self {
        Self::new(Duration::ZERO, Duration::ZERO)
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Run `op`, passing the attempt number (0 for the first try) so callers
    /// can shrink their request on a retry. A throttling error past the retry
    /// allowance is returned to the caller.
    pub async fn run<T, E, F, Fut>(&self, label: &str, mut op: F) -> Result<T, E>
    where
        E: Throttling,
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let mut attempt = 0;
        loop {
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            match op(attempt).await {
                Err(e) if e.is_throttled() && attempt < self.max_retries => {
                    warn!(
                        label,
                        attempt,
                        cooldown_secs = self.cooldown.as_secs(),
                        "Throttled, cooling down before retry"
                    );
                    tokio::time::sleep(self.cooldown).await;
                    attempt += 1;
                }
                result => return result,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Debug)]
    enum FakeError {
        Throttled,
        Broken,
    }

    impl std::fmt::Display for FakeError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "{self:?}")
        }
    }

    impl Throttling for FakeError {
        fn is_throttled(&self) -> bool {
            matches!(self, FakeError::Throttled)
        }
    }

    #[tokio::test(start_paused = true)]
    async fn retries_once_after_cooldown() {
        let limiter = RateLimiter::new(Duration::from_secs(2), Duration::from_secs(60));
        let calls = AtomicU32::new(0);
        let started = tokio::time::Instant::now();

        let result: Result<u32, FakeError> = limiter
            .run("search", |attempt| {
                calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if attempt == 0 {
                        Err(FakeError::Throttled)
                    } else {
                        Ok(attempt)
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        // delay + cooldown + delay
        assert!(started.elapsed() >= Duration::from_secs(64));
    }

    #[tokio::test(start_paused = true)]
    async fn second_throttle_is_returned() {
        let limiter = RateLimiter::new(Duration::ZERO, Duration::from_secs(60));
        let calls = AtomicU32::new(0);

        let result: Result<(), FakeError> = limiter
            .run("search", |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(FakeError::Throttled) }
            })
            .await;

        assert!(matches!(result, Err(FakeError::Throttled)));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn other_errors_are_not_retried() {
        let limiter = RateLimiter::immediate();
        let calls = AtomicU32::new(0);

        let result: Result<(), FakeError> = limiter
            .run("comments", |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(FakeError::Broken) }
            })
            .await;

        assert!(matches!(result, Err(FakeError::Broken)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
