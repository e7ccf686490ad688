//! Deadline clock
//!
//! Monotonic time comes from [`tokio::time::Instant`] so that tests can pause
//! and advance the clock instead of sleeping for real.

use std::time::Duration;

use tokio::time::Instant;

/// Margin added on top of every caller-supplied response timeout.
///
/// The deadline is `timeout + RX_TIMEOUT_FLOOR`, not `max(timeout, floor)`,
/// so a 20 ms connect timeout really waits 120 ms.
pub const RX_TIMEOUT_FLOOR: Duration = Duration::from_millis(100);

/// Absolute point in time after which a pending receive is abandoned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deadline {
    at: Instant,
}

impl Deadline {
    /// Deadline for a response to a request sent now
    pub fn for_response(timeout: Duration) -> Self {
        Self::after(timeout + RX_TIMEOUT_FLOOR)
    }

    /// Deadline `duration` from now
    pub fn after(duration: Duration) -> Self {
        Self {
            at: Instant::now() + duration,
        }
    }

    pub fn instant(&self) -> Instant {
        self.at
    }

    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.at
    }

    /// Time left until the deadline, zero once it has passed
    pub fn remaining(&self) -> Duration {
        self.at.saturating_duration_since(Instant::now())
    }
}

/// Suspend the current task for `duration`
pub async fn delay(duration: Duration) {
    tokio::time::sleep(duration).await;
}

/// Whole milliseconds elapsed since `since`
pub fn elapsed_ms(since: Instant) -> u64 {
    since.elapsed().as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_pending, assert_ready, task};

    #[tokio::test(start_paused = true)]
    async fn test_response_deadline_adds_floor() {
        let start = Instant::now();
        let deadline = Deadline::for_response(Duration::from_millis(20));

        assert_eq!(deadline.instant() - start, Duration::from_millis(120));
        assert!(!deadline.is_expired());
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_expires() {
        let deadline = Deadline::after(Duration::from_millis(50));

        delay(Duration::from_millis(49)).await;
        assert!(!deadline.is_expired());
        assert_eq!(deadline.remaining(), Duration::from_millis(1));

        delay(Duration::from_millis(1)).await;
        assert!(deadline.is_expired());
        assert_eq!(deadline.remaining(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_delay_pending_until_elapsed() {
        let mut pause = task::spawn(delay(Duration::from_millis(20)));
        assert_pending!(pause.poll());

        tokio::time::advance(Duration::from_millis(19)).await;
        assert_pending!(pause.poll());

        tokio::time::advance(Duration::from_millis(1)).await;
        assert!(pause.is_woken());
        assert_ready!(pause.poll());
    }

    #[tokio::test(start_paused = true)]
    async fn test_elapsed_ms() {
        let start = Instant::now();
        delay(Duration::from_millis(250)).await;
        assert_eq!(elapsed_ms(start), 250);
    }
}
