use crate::api::ApiError;
use crate::shutdown::StopHandle;
use std::thread;
use std::time::Duration;
use tracing::warn;

/// Fixed-delay retry for upstream calls.
///
/// Connection and broker errors are retried; malformed replies are returned
/// at once. `max_attempts = None` retries until success or until the
/// attached stop handle is signalled.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub delay: Duration,
    pub max_attempts: Option<u32>,
    stop: Option<StopHandle>,
}

impl RetryPolicy {
    pub const DEFAULT_DELAY: Duration = Duration::from_secs(3);
    pub const MUTATION_ATTEMPTS: u32 = 3;

    pub fn unbounded(delay: Duration) -> Self {
        Self {
            delay,
            max_attempts: None,
            stop: None,
        }
    }

    pub fn bounded(delay: Duration, max_attempts: u32) -> Self {
        Self {
            delay,
            max_attempts: Some(max_attempts.max(1)),
            stop: None,
        }
    }

    /// One attempt, no retry.
    pub fn single() -> Self {
        Self::bounded(Duration::ZERO, 1)
    }

    /// The policy for order submission and closes: three attempts.
    pub fn mutation() -> Self {
        Self::bounded(Self::DEFAULT_DELAY, Self::MUTATION_ATTEMPTS)
    }

    /// Stop retrying once `handle` is signalled.
    pub fn cancel_on(mut self, handle: StopHandle) -> Self {
        self.stop = Some(handle);
        self
    }

    fn exhausted(&self, attempt: u32) -> bool {
        self.max_attempts.is_some_and(|max| attempt >= max)
            || self.stop.as_ref().is_some_and(StopHandle::is_stop_requested)
    }

    /// Run `call` until it succeeds, fails terminally, or attempts run out.
    /// The last error is returned on failure.
    pub fn run<T>(
        &self,
        operation: &str,
        mut call: impl FnMut() -> Result<T, ApiError>,
    ) -> Result<T, ApiError> {
        let mut attempt = 0u32;
        loop {
            attempt = attempt.saturating_add(1);
            match call() {
                Ok(value) => return Ok(value),
                Err(e) if !e.is_retryable() => return Err(e),
                Err(e) if self.exhausted(attempt) => {
                    warn!(operation, attempt, error = %e, "giving up on upstream call");
                    return Err(e);
                }
                Err(e) => {
                    warn!(
                        operation,
                        attempt,
                        error = %e,
                        "upstream call failed, retrying in {:?}",
                        self.delay
                    );
                    thread::sleep(self.delay);
                }
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::unbounded(Self::DEFAULT_DELAY)
    }
}
