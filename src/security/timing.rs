//! Timing attack protection utilities
//!
//! Failed logins take at least a fixed amount of time so that an unknown
//! account and a wrong password cannot be told apart by latency.

use std::time::Duration;
use tokio::time::Instant;

/// Deadline before which a failed authentication must not answer
pub struct AuthTimer {
    deadline: Instant,
}

impl AuthTimer {
    /// Start timing now with a minimum duration of `floor`
    pub fn new(floor: Duration) -> Self {
        Self {
            deadline: Instant::now() + floor,
        }
    }

    /// Time left until the floor is reached
    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    /// Sleep until the floor is reached; returns at once if it already is
    pub async fn wait(self) {
        tokio::time::sleep_until(self.deadline).await;
    }
}

impl Default for AuthTimer {
    /// Minimum duration of 100ms
    fn default() -> Self {
        Self::new(Duration::from_millis(100))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_wait_reaches_floor() {
        let start = Instant::now();
        AuthTimer::new(Duration::from_millis(10)).wait().await;
        assert!(start.elapsed() >= Duration::from_millis(10));
    }

    #[tokio::test]
    async fn test_no_delay_once_elapsed() {
        let timer = AuthTimer::new(Duration::from_millis(5));
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(timer.remaining(), Duration::ZERO);

        let before = Instant::now();
        timer.wait().await;
        assert!(before.elapsed() < Duration::from_millis(10));
    }
}
