//! Shared politeness clock
//!
//! One clock belongs to one [`Fetcher`](super::Fetcher). Every fetch start
//! passes through [`PoliteClock::wait_turn`], which serializes callers and
//! spaces consecutive starts at least `delay` apart, no matter how many
//! tasks share the fetcher or which hosts they target.

use std::time::{Duration, Instant};
use tokio::sync::Mutex;

/// Minimum spacing between consecutive fetch starts
#[derive(Debug)]
pub struct PoliteClock {
    /// Configured politeness delay
    delay: Duration,

    /// Start time of the most recent fetch, `None` before the first one
    last_fetch: Mutex<Option<Instant>>,
}

impl PoliteClock {
    /// Creates a clock that has not seen any fetch yet
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            last_fetch: Mutex::new(None),
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Waits for this caller's turn and records it as the latest fetch start
    ///
    /// The lock is held across the sleep, so callers queue behind each other
    /// and each one measures its wait from the start recorded by the previous
    /// caller. Returns the recorded start time.
    pub async fn wait_turn(&self) -> Instant {
        let mut last_fetch = self.last_fetch.lock().await;

        if let Some(wait) = time_until_next_fetch(*last_fetch, self.delay, Instant::now()) {
            tracing::trace!("Politeness wait of {:?}", wait);
            tokio::time::sleep(wait).await;
        }

        let started = Instant::now();
        *last_fetch = Some(started);
        started
    }

    /// Start time of the most recent fetch
    pub async fn last_fetch(&self) -> Option<Instant> {
        *self.last_fetch.lock().await
    }
}

/// Calculates the time until the next fetch may start
///
/// Returns None if a fetch may start now, or the duration to wait otherwise.
fn time_until_next_fetch(
    last_fetch: Option<Instant>,
    delay: Duration,
    now: Instant,
) -> Option<Duration> {
    let last = last_fetch?;
    let elapsed = now.saturating_duration_since(last);
    delay.checked_sub(elapsed).filter(|wait| !wait.is_zero())
}
