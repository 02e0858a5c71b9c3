//! Bounded exponential-backoff retry around fallible operations.
//!
//! Delays grow geometrically without jitter: the wait before attempt `n + 1`
//! is `initial_delay * backoff_multiplier^(n - 1)`. Sleeping is routed through
//! [`Sleeper`] so callers can observe or skip the delays.

use std::fmt::Display;
use std::thread;
use std::time::Duration;

use tracing::{error, warn};

/// Attempt budget and backoff shape for one class of operation.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RetryPolicy {
    /// Total number of attempts, including the first.
    pub max_attempts: u32,
    /// Delay after the first failed attempt.
    pub initial_delay: Duration,
    /// Factor applied to the delay after every failed attempt.
    pub backoff_multiplier: f64,
}

impl RetryPolicy {
    /// Budget for remote command execution.
    pub const COMMAND: Self = Self::new(3, Duration::from_secs(2), 1.5);

    /// Budget for file transfers.
    pub const TRANSFER: Self = Self::new(2, Duration::from_secs(1), 1.5);

    /// Creates a policy.
    #[must_use]
    pub const fn new(max_attempts: u32, initial_delay: Duration, backoff_multiplier: f64) -> Self {
        Self {
            max_attempts,
            initial_delay,
            backoff_multiplier,
        }
    }

    /// Returns the delays slept between attempts when every attempt fails.
    #[must_use]
    pub fn delays(&self) -> Vec<Duration> {
        let mut delays = Vec::new();
        let mut delay = self.initial_delay;
        for _ in 1..self.max_attempts.max(1) {
            delays.push(delay);
            delay = delay.mul_f64(self.backoff_multiplier);
        }
        delays
    }
}

/// Blocks the current thread between attempts.
pub trait Sleeper {
    /// Sleeps for `duration`.
    fn sleep(&self, duration: Duration);
}

/// Sleeper backed by [`std::thread::sleep`].
#[derive(Clone, Copy, Debug, Default)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        thread::sleep(duration);
    }
}

/// Runs `operation` until it succeeds or the policy's budget is spent.
///
/// A policy with `max_attempts` of zero still makes one attempt.
///
/// # Errors
///
/// Returns the error from the final attempt unchanged.
pub fn retry<T, E, S, F>(
    policy: &RetryPolicy,
    sleeper: &S,
    label: &str,
    mut operation: F,
) -> Result<T, E>
where
    E: Display,
    S: Sleeper + ?Sized,
    F: FnMut() -> Result<T, E>,
{
    let budget = policy.max_attempts.max(1);
    let mut delay = policy.initial_delay;
    let mut attempt = 1;
    loop {
        match operation() {
            Ok(value) => return Ok(value),
            Err(err) if attempt < budget => {
                warn!(
                    operation = label,
                    attempt,
                    max_attempts = budget,
                    retry_in = ?delay,
                    error = %err,
                    "attempt failed, retrying"
                );
                sleeper.sleep(delay);
                delay = delay.mul_f64(policy.backoff_multiplier);
                attempt += 1;
            }
            Err(err) => {
                error!(operation = label, attempts = budget, error = %err, "all attempts failed");
                return Err(err);
            }
        }
    }
}
