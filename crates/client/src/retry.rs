//! Retry policy for the query dispatch path.
//!
//! Classification is a total, pure function over the gRPC status code so it
//! can be unit tested away from any network code. Waits between attempts
//! follow a Fibonacci schedule; the only cap is the attempt budget itself.

use std::future::Future;
use std::time::Duration;

use tracing::{error, warn};

use crate::error::{ClientError, Result};

/// Outcome of classifying a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryClass {
    /// Transient condition, safe to retry.
    Retryable,
    /// Abort immediately without consuming the remaining budget.
    Terminal,
}

/// Classifies a gRPC status code as retryable or terminal.
///
/// Unavailable, unknown, timed-out and internal conditions are transient;
/// everything else, including permission and authentication failures, aborts
/// the retry loop.
pub fn classify(code: tonic::Code) -> RetryClass {
    match code {
        tonic::Code::Unavailable
        | tonic::Code::Unknown
        | tonic::Code::DeadlineExceeded
        | tonic::Code::Internal => RetryClass::Retryable,
        _ => RetryClass::Terminal,
    }
}

/// Fibonacci-growth wait schedule: base, base, 2x, 3x, 5x, ...
#[derive(Debug, Clone)]
pub struct FibonacciBackoff {
    base: Duration,
    current: u64,
    next: u64,
}

impl FibonacciBackoff {
    pub fn new(base: Duration) -> Self {
        Self {
            base,
            current: 1,
            next: 1,
        }
    }
}

impl Iterator for FibonacciBackoff {
    type Item = Duration;

    fn next(&mut self) -> Option<Duration> {
        let delay = self.base.saturating_mul(u32::try_from(self.current).unwrap_or(u32::MAX));
        let step = self.current.saturating_add(self.next);
        self.current = self.next;
        self.next = step;
        Some(delay)
    }
}

/// Retry budget and wait base for the query path.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Retries on top of the first attempt.
    pub max_retries: u32,
    /// Unit for the Fibonacci wait schedule.
    pub backoff_base: Duration,
}

impl RetryPolicy {
    pub(crate) const DEFAULT_BACKOFF_BASE: Duration = Duration::from_millis(100);

    pub fn new(max_retries: u32) -> Self {
        Self {
            max_retries,
            backoff_base: Self::DEFAULT_BACKOFF_BASE,
        }
    }

    fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }
}

/// Runs `operation` under `policy`, waiting between retryable failures.
///
/// The closure is invoked once per attempt and must capture no state from a
/// previous attempt. Terminal statuses abort immediately; exhausting the
/// budget surfaces the last cause.
pub(crate) async fn retry_with_backoff<T, F, Fut>(
    policy: &RetryPolicy,
    operation_name: &str,
    mut operation: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = std::result::Result<T, tonic::Status>>,
{
    let max_attempts = policy.max_attempts();
    let mut backoff = FibonacciBackoff::new(policy.backoff_base);

    let mut attempt = 0u32;
    loop {
        attempt += 1;
        match operation().await {
            Ok(result) => return Ok(result),
            Err(status) => {
                if classify(status.code()) == RetryClass::Terminal {
                    return Err(ClientError::from(status));
                }
                if attempt >= max_attempts {
                    error!(
                        "'{}' failed after {} attempts: {}",
                        operation_name, max_attempts, status
                    );
                    return Err(ClientError::RetriesExhausted {
                        attempts: attempt,
                        source: Box::new(status),
                    });
                }
                // the schedule always yields
                let delay = backoff.next().unwrap_or(policy.backoff_base);
                warn!(
                    "'{}' failed, retrying in {:?} (attempt {}/{}): {}",
                    operation_name, delay, attempt, max_attempts, status
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
}
