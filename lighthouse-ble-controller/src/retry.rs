//! Bounded retry with a fixed delay

use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::{ControlError, Shutdown};

/// Retries transient failures a bounded number of times
///
/// BLE connection setup fails transiently often enough that a short fixed
/// delay clears most failures without holding the caller up for long.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one
    pub max_attempts: u32,
    /// Pause between attempts
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: Self::DEFAULT_MAX_ATTEMPTS,
            delay: Self::DEFAULT_DELAY,
        }
    }
}

impl RetryPolicy {
    pub const DEFAULT_MAX_ATTEMPTS: u32 = 10;
    pub const DEFAULT_DELAY: Duration = Duration::from_millis(500);

    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self { max_attempts, delay }
    }

    /// Run `operation` until it succeeds, fails fatally, or attempts run out
    ///
    /// The operation receives the 1-based attempt number. On exhaustion the
    /// last failure is returned. A triggered `shutdown` stops the loop before
    /// the next attempt or in the middle of a delay.
    pub async fn execute<T, F, Fut>(
        &self,
        station: &str,
        shutdown: &Shutdown,
        mut operation: F,
    ) -> Result<T, ControlError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, ControlError>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut shutdown = shutdown.clone();
        let mut attempt = 1;

        loop {
            if shutdown.is_triggered() {
                return Err(ControlError::Cancelled);
            }

            let error = match operation(attempt).await {
                Ok(value) => return Ok(value),
                Err(error) if !error.is_transient() => return Err(error),
                Err(error) => error,
            };

            if attempt >= max_attempts {
                warn!(station, attempt, max_attempts, %error, "giving up");
                return Err(error);
            }

            warn!(station, attempt, max_attempts, %error, "failed, retrying {attempt}/{max_attempts}");

            tokio::select! {
                _ = tokio::time::sleep(self.delay) => {}
                _ = shutdown.triggered() => return Err(ControlError::Cancelled),
            }
            attempt += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use tokio::time::Instant;

    fn policy() -> RetryPolicy {
        RetryPolicy::new(4, Duration::from_millis(500))
    }

    #[tokio::test(start_paused = true)]
    async fn transient_failures_use_every_attempt() {
        let calls = Cell::new(0);
        let started = Instant::now();

        let result: Result<(), _> = policy()
            .execute("test", &Shutdown::never(), |attempt| {
                calls.set(calls.get() + 1);
                assert_eq!(attempt, calls.get());
                async { Err(ControlError::ConnectionFailed("not found".into())) }
            })
            .await;

        assert!(matches!(result, Err(ControlError::ConnectionFailed(_))));
        assert_eq!(calls.get(), 4);
        assert_eq!(started.elapsed(), Duration::from_millis(1500));
    }

    #[tokio::test(start_paused = true)]
    async fn invalid_address_is_attempted_once() {
        let calls = Cell::new(0);
        let started = Instant::now();

        let result: Result<(), _> = policy()
            .execute("test", &Shutdown::never(), |_| {
                calls.set(calls.get() + 1);
                async { Err("00:11".parse::<lighthouse_proto::BaseStationAddress>().unwrap_err().into()) }
            })
            .await;

        assert!(matches!(result, Err(ControlError::InvalidAddress(_))));
        assert_eq!(calls.get(), 1);
        assert_eq!(started.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn recovers_after_transient_failure() {
        let calls = Cell::new(0);

        let result = policy()
            .execute("test", &Shutdown::never(), |attempt| {
                calls.set(calls.get() + 1);
                async move {
                    if attempt < 3 {
                        Err(ControlError::CommunicationFailed("unreachable".into()))
                    } else {
                        Ok(attempt)
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), 3);
        assert_eq!(calls.get(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_interrupts_the_delay() {
        let (handle, shutdown) = crate::shutdown::channel();
        let calls = Cell::new(0);
        let started = Instant::now();
        let slow = RetryPolicy::new(10, Duration::from_secs(30));

        let trigger = async {
            tokio::time::sleep(Duration::from_secs(1)).await;
            handle.trigger();
        };
        let run = slow.execute("test", &shutdown, |_| {
            calls.set(calls.get() + 1);
            async { Err::<(), _>(ControlError::InvalidState("disconnected".into())) }
        });

        let (result, ()) = tokio::join!(run, trigger);
        assert!(matches!(result, Err(ControlError::Cancelled)));
        assert_eq!(calls.get(), 1);
        assert_eq!(started.elapsed(), Duration::from_secs(1));
    }

    #[test]
    fn default_policy() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 10);
        assert_eq!(policy.delay, Duration::from_millis(500));
    }
}
