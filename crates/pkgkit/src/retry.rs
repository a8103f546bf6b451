//! Retry logic with exponential backoff for transient errors.

use crate::error::{Error, Result};
use crate::types::RetryConfig;
use declarative::{CancelToken, ExecError};
use std::thread;
use std::time::{Duration, Instant};

/// Granularity of the cancellable sleep between attempts
const SLEEP_SLICE: Duration = Duration::from_millis(50);

/// Callback trait for retry progress notifications.
pub trait RetryCallback {
    /// Called when an operation is being retried.
    ///
    /// # Arguments
    /// * `attempt` - Current attempt number (1-indexed)
    /// * `max_attempts` - Maximum number of attempts
    /// * `error` - The error that triggered the retry
    /// * `delay` - Time until the next attempt
    fn on_retry(&self, attempt: u32, max_attempts: u32, error: &Error, delay: Duration);
}

/// Callback that logs retries at warn level.
pub struct LogCallback;

impl RetryCallback for LogCallback {
    fn on_retry(&self, attempt: u32, max_attempts: u32, error: &Error, delay: Duration) {
        log::warn!(
            "attempt {attempt}/{max_attempts} failed: {error}. Retrying in {:.1}s",
            delay.as_secs_f64()
        );
    }
}

/// Execute an operation with retry logic.
///
/// Retries the operation if it returns a retryable error, using exponential
/// backoff between attempts. The wait between attempts ends early when
/// `cancel` fires, returning a cancellation error.
///
/// # Arguments
/// * `config` - Retry configuration
/// * `cancel` - Cancellation observed while waiting
/// * `callback` - Optional callback for retry notifications
/// * `operation` - The operation to execute
///
/// # Returns
/// The result of the operation, or the last error if all attempts failed.
pub fn with_retry<T, F>(
    config: &RetryConfig,
    cancel: &CancelToken,
    callback: Option<&dyn RetryCallback>,
    mut operation: F,
) -> Result<T>
where
    F: FnMut() -> Result<T>,
{
    let max_attempts = config.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        let err = match operation() {
            Ok(result) => return Ok(result),
            Err(e) => e,
        };

        // Not retryable, or out of attempts
        if !err.is_retryable() || attempt + 1 >= max_attempts {
            return Err(err);
        }

        let delay = config.delay_for_attempt(attempt);
        if let Some(cb) = callback {
            cb.on_retry(attempt + 1, max_attempts, &err, delay);
        }

        if !sleep_unless_cancelled(delay, cancel) {
            return Err(Error::Exec(ExecError::Cancelled {
                program: "retry".to_string(),
            }));
        }
        attempt += 1;
    }
}

/// Sleep for `delay`, returning `false` if cancelled first.
fn sleep_unless_cancelled(delay: Duration, cancel: &CancelToken) -> bool {
    let deadline = Instant::now() + delay;
    loop {
        if cancel.is_cancelled() {
            return false;
        }
        let now = Instant::now();
        if now >= deadline {
            return true;
        }
        thread::sleep(SLEEP_SLICE.min(deadline - now));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;

    fn fast() -> RetryConfig {
        RetryConfig {
            max_attempts: 3,
            base_delay: Duration::from_millis(1),
            backoff_factor: 1.0,
            max_delay: Duration::from_millis(10),
        }
    }

    fn network() -> Error {
        Error::Network {
            manager: "npm".to_string(),
            message: "ETIMEDOUT".to_string(),
        }
    }

    #[test]
    fn test_with_retry_success_first_try() {
        let config = RetryConfig::no_retry();
        let result = with_retry(&config, &CancelToken::new(), None, || Ok::<_, Error>(42));
        assert_eq!(result.unwrap(), 42);
    }

    #[test]
    fn test_with_retry_non_retryable_error() {
        let attempts = Rc::new(Cell::new(0));
        let attempts_clone = attempts.clone();

        let result: Result<()> = with_retry(&fast(), &CancelToken::new(), None, || {
            attempts_clone.set(attempts_clone.get() + 1);
            Err(Error::NotFound {
                manager: "brew".to_string(),
                name: "foo".to_string(),
            })
        });

        assert!(result.is_err());
        // NotFound is not retryable
        assert_eq!(attempts.get(), 1);
    }

    #[test]
    fn test_with_retry_eventual_success() {
        let attempts = Rc::new(Cell::new(0));
        let attempts_clone = attempts.clone();

        let result = with_retry(&fast(), &CancelToken::new(), None, || {
            let current = attempts_clone.get();
            attempts_clone.set(current + 1);
            if current < 2 { Err(network()) } else { Ok(42) }
        });

        assert_eq!(result.unwrap(), 42);
        assert_eq!(attempts.get(), 3);
    }

    #[test]
    fn test_with_retry_all_attempts_fail() {
        let attempts = Rc::new(Cell::new(0));
        let attempts_clone = attempts.clone();

        let result: Result<()> = with_retry(&fast(), &CancelToken::new(), None, || {
            attempts_clone.set(attempts_clone.get() + 1);
            Err(network())
        });

        assert!(matches!(result, Err(Error::Network { .. })));
        assert_eq!(attempts.get(), 3);
    }

    #[test]
    fn test_cancel_interrupts_backoff() {
        let config = RetryConfig {
            max_attempts: 5,
            base_delay: Duration::from_secs(30),
            backoff_factor: 1.0,
            max_delay: Duration::from_secs(30),
        };
        let cancel = CancelToken::new();
        let trigger = cancel.clone();
        let start = Instant::now();

        let result: Result<()> = with_retry(&config, &cancel, None, || {
            trigger.cancel();
            Err(network())
        });

        assert!(result.unwrap_err().is_cancelled());
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn test_callback_invoked() {
        use std::sync::Arc;
        use std::sync::atomic::{AtomicU32, Ordering};

        struct CountingCallback(Arc<AtomicU32>);
        impl RetryCallback for CountingCallback {
            fn on_retry(&self, _: u32, _: u32, _: &Error, _: Duration) {
                self.0.fetch_add(1, Ordering::SeqCst);
            }
        }

        let count = Arc::new(AtomicU32::new(0));
        let callback = CountingCallback(count.clone());
        let _: Result<()> = with_retry(&fast(), &CancelToken::new(), Some(&callback), || {
            Err(network())
        });

        // Two retries between three attempts
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }
}
