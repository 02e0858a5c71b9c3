//! Deadline-bounded polling shared by every wait loop in the crate.

use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tokio::time::{Instant, sleep};

/// Outcome of a single probe.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Probe<T> {
    /// The awaited condition holds; polling stops with this value.
    Ready(T),
    /// Not yet; poll again after the interval.
    Pending,
}

/// Raised when the deadline passes before a probe reports ready.
#[derive(Clone, Copy, Debug, Error, Eq, PartialEq)]
#[error("condition not met within {waited:?}")]
pub struct PollTimeout {
    /// Time spent polling.
    pub waited: Duration,
}

/// Calls `probe` every `interval` until it is ready or `timeout` elapses.
///
/// The probe always runs at least once, and the final sleep is shortened so
/// the loop never overshoots the deadline by more than one probe.
///
/// # Errors
///
/// Returns [`PollTimeout`] when the deadline passes first.
pub async fn poll_until<T, F, Fut>(
    interval: Duration,
    timeout: Duration,
    mut probe: F,
) -> Result<T, PollTimeout>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Probe<T>>,
{
    let started = Instant::now();
    let deadline = started + timeout;
    loop {
        if let Probe::Ready(value) = probe().await {
            return Ok(value);
        }
        let now = Instant::now();
        if now >= deadline {
            return Err(PollTimeout {
                waited: now.duration_since(started),
            });
        }
        sleep(interval.min(deadline.duration_since(now))).await;
    }
}
