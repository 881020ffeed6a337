//! Exponential backoff for retried store operations.

use crate::Result;
use std::future::Future;
use std::time::Duration;
use tokio_retry::strategy::jitter;
use tokio_retry::Retry;
use tracing::{error, warn};

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Delay before the first retry.
    pub base_delay: Duration,
    /// Growth factor applied to the delay after every retry.
    pub multiplier: u64,
    pub max_delay: Option<Duration>,
    /// Total attempts, including the first one.
    pub max_attempts: usize,
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(100),
            multiplier: 2,
            max_delay: None,
            max_attempts: 10,
            jitter: false,
        }
    }
}

impl RetryPolicy {
    pub fn with_base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }

    pub fn with_multiplier(mut self, multiplier: u64) -> Self {
        self.multiplier = multiplier;
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: usize) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = Some(max_delay);
        self
    }

    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    /// Delays slept between attempts, one fewer than `max_attempts`.
    ///
    /// The n-th delay is `base_delay * multiplier^n`, capped at `max_delay`.
    pub fn delays(&self) -> Box<dyn Iterator<Item = Duration> + Send> {
        let multiplier = u32::try_from(self.multiplier.max(1)).unwrap_or(u32::MAX);
        let max_delay = self.max_delay;

        let backoff = std::iter::successors(Some(self.base_delay), move |delay| {
            Some(delay.saturating_mul(multiplier))
        })
        .map(move |delay| match max_delay {
            Some(cap) => delay.min(cap),
            None => delay,
        });

        let retries = self.max_attempts.saturating_sub(1);
        if self.jitter {
            Box::new(backoff.map(jitter).take(retries))
        } else {
            Box::new(backoff.take(retries))
        }
    }

    /// Run `action` until it succeeds or the attempts are used up, returning
    /// the last error in the latter case.
    pub async fn run<T, A, Fut>(&self, operation: &str, mut action: A) -> Result<T>
    where
        A: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let max_attempts = self.max_attempts;
        let mut attempt = 0usize;

        Retry::spawn(self.delays(), || {
            attempt += 1;
            let current = attempt;
            let fut = action();
            async move {
                fut.await.map_err(|e| {
                    warn!(
                        "[{}] Attempt {}/{} failed: {}",
                        operation, current, max_attempts, e
                    );
                    e
                })
            }
        })
        .await
        .map_err(|e| {
            error!("[{}] Giving up after retries: {}", operation, e);
            e
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn instant_policy(max_attempts: usize) -> RetryPolicy {
        RetryPolicy::default()
            .with_base_delay(Duration::ZERO)
            .with_max_attempts(max_attempts)
    }

    #[test]
    fn test_default_delays_double() {
        let delays: Vec<Duration> = RetryPolicy::default().delays().take(4).collect();
        assert_eq!(
            delays,
            vec![
                Duration::from_millis(100),
                Duration::from_millis(200),
                Duration::from_millis(400),
                Duration::from_millis(800),
            ]
        );
    }

    #[test]
    fn test_delays_keep_sub_millisecond_precision() {
        let ms = Duration::from_millis;
        let cases = [
            (ms(1), 2, 4, vec![ms(1), ms(2), ms(4)]),
            (
                Duration::from_micros(500),
                2,
                3,
                vec![Duration::from_micros(500), ms(1)],
            ),
            (ms(101), 2, 3, vec![ms(101), ms(202)]),
            (ms(100), 3, 4, vec![ms(100), ms(300), ms(900)]),
        ];

        for (base, multiplier, attempts, expected) in cases {
            let delays: Vec<Duration> = RetryPolicy::default()
                .with_base_delay(base)
                .with_multiplier(multiplier)
                .with_max_attempts(attempts)
                .delays()
                .collect();
            assert_eq!(delays, expected, "base {:?} x{}", base, multiplier);
        }
    }

    #[test]
    fn test_delays_respect_attempt_limit_and_cap() {
        let policy = RetryPolicy::default()
            .with_max_attempts(5)
            .with_max_delay(Duration::from_millis(300));
        let delays: Vec<Duration> = policy.delays().collect();
        assert_eq!(
            delays,
            vec![
                Duration::from_millis(100),
                Duration::from_millis(200),
                Duration::from_millis(300),
                Duration::from_millis(300),
            ]
        );
    }

    #[test]
    fn test_jittered_delays_never_exceed_backoff() {
        let policy = RetryPolicy::default().with_jitter(true).with_max_attempts(4);
        for (jittered, plain) in policy.delays().zip(RetryPolicy::default().delays()) {
            assert!(jittered <= plain);
        }
    }

    #[tokio::test]
    async fn test_run_succeeds_after_failures() {
        let calls = AtomicUsize::new(0);

        let result = instant_policy(5)
            .run("flaky", || {
                let call = calls.fetch_add(1, Ordering::SeqCst) + 1;
                async move {
                    if call < 3 {
                        Err(Error::S3(format!("attempt {} failed", call)))
                    } else {
                        Ok(call)
                    }
                }
            })
            .await
            .unwrap();

        assert_eq!(result, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_run_returns_last_error_when_exhausted() {
        let calls = AtomicUsize::new(0);

        let err = instant_policy(3)
            .run("always-failing", || {
                let call = calls.fetch_add(1, Ordering::SeqCst) + 1;
                async move { Err::<(), _>(Error::S3(format!("attempt {}", call))) }
            })
            .await
            .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(err.to_string(), "S3 error: attempt 3");
    }
}
