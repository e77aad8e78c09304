//! Bounded retry for calls into the answer generator
//!
//! Every external call made by the interview core goes through one
//! [`RetryPolicy`]: at most `max_attempts` independent attempts, then a
//! permanent `GenerationExhausted`. Attempts share no state; the operation
//! closure is invoked afresh each time.

use crate::config::InterviewConfig;
use sdk::errors::AssessmentError;
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tracing::{error, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay: Duration::ZERO,
        }
    }
}

impl RetryPolicy {
    /// A policy with `max_attempts` total attempts (at least one)
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
        }
    }

    pub fn from_config(config: &InterviewConfig) -> Self {
        Self::new(
            config.max_attempts,
            Duration::from_millis(config.retry_delay_ms),
        )
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Run `operation` until it succeeds or the attempt budget is spent.
    ///
    /// The closure receives the 1-based attempt number. `label` names the
    /// call in log records.
    pub async fn run<T, E, F, Fut>(&self, label: &str, mut operation: F) -> Result<T, AssessmentError>
    where
        E: Display,
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let mut last_error = String::new();

        for attempt in 1..=self.max_attempts {
            match operation(attempt).await {
                Ok(value) => return Ok(value),
                Err(e) => {
                    last_error = e.to_string();

                    if attempt < self.max_attempts {
                        warn!(
                            call = label,
                            attempt,
                            max_attempts = self.max_attempts,
                            error = %last_error,
                            "Retrying generator call"
                        );
                        if !self.delay.is_zero() {
                            tokio::time::sleep(self.delay).await;
                        }
                    }
                }
            }
        }

        error!(
            call = label,
            attempts = self.max_attempts,
            error = %last_error,
            "Generator call exhausted its retries"
        );
        Err(AssessmentError::GenerationExhausted {
            attempts: self.max_attempts,
            last_error,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn test_succeeds_after_transient_failures() {
        let policy = RetryPolicy::default();
        let calls = AtomicU32::new(0);

        let result = policy
            .run("ask", |attempt| {
                calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if attempt < 3 {
                        Err("timeout")
                    } else {
                        Ok(attempt)
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_exhausts_after_max_attempts() {
        let policy = RetryPolicy::default();
        let calls = AtomicU32::new(0);

        let result: Result<(), _> = policy
            .run("judge", |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err("provider error") }
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        match result {
            Err(AssessmentError::GenerationExhausted { attempts, last_error }) => {
                assert_eq!(attempts, 3);
                assert_eq!(last_error, "provider error");
            }
            other => panic!("expected exhaustion, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_first_success_makes_one_call() {
        let policy = RetryPolicy::new(5, Duration::ZERO);
        let calls = AtomicU32::new(0);

        let result = policy
            .run("ask", |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Ok::<_, String>("answer") }
            })
            .await;

        assert_eq!(result.unwrap(), "answer");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_zero_attempts_is_raised_to_one() {
        assert_eq!(RetryPolicy::new(0, Duration::ZERO).max_attempts(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_delay_between_attempts() {
        let policy = RetryPolicy::new(3, Duration::from_millis(250));
        let start = tokio::time::Instant::now();

        let _: Result<(), _> = policy.run("ask", |_| async { Err("down") }).await;

        // Two pauses: none after the final attempt
        assert_eq!(start.elapsed(), Duration::from_millis(500));
    }
}
