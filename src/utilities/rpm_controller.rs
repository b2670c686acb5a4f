//! Requests-per-minute limiter for LLM calls.
//!
//! Every sub-agent attempt passes through [`RpmController::check_or_wait`]
//! before it reaches the provider. When the per-minute budget is spent the
//! caller sleeps until the current window closes.

use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::{sleep, Instant};

/// Length of one accounting window.
const WINDOW: Duration = Duration::from_secs(60);

#[derive(Debug)]
struct Window {
    started: Instant,
    count: u32,
}

/// Shared RPM budget. Cheap to share behind an `Arc`.
#[derive(Debug)]
pub struct RpmController {
    max_rpm: Option<u32>,
    window: Mutex<Window>,
}

impl Default for RpmController {
    fn default() -> Self {
        Self::new(None)
    }
}

impl RpmController {
    /// Create a controller. `None` (or zero) disables limiting.
    pub fn new(max_rpm: Option<u32>) -> Self {
        Self {
            max_rpm: max_rpm.filter(|m| *m > 0),
            window: Mutex::new(Window {
                started: Instant::now(),
                count: 0,
            }),
        }
    }

    pub fn max_rpm(&self) -> Option<u32> {
        self.max_rpm
    }

    /// Count one request, waiting for the next window if the budget is spent.
    pub async fn check_or_wait(&self) {
        let Some(max) = self.max_rpm else {
            return;
        };

        loop {
            let wait = {
                let mut window = self.window.lock().await;
                let elapsed = window.started.elapsed();
                if elapsed >= WINDOW {
                    window.started = Instant::now();
                    window.count = 0;
                }
                if window.count < max {
                    window.count += 1;
                    return;
                }
                WINDOW.saturating_sub(elapsed)
            };

            log::info!(
                "Max RPM ({}) reached, waiting {:.1}s for next minute",
                max,
                wait.as_secs_f64()
            );
            sleep(wait).await;
        }
    }

    /// Requests counted in the current window.
    pub async fn current_rpm(&self) -> u32 {
        self.window.lock().await.count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unlimited_never_counts() {
        let rpm = RpmController::new(None);
        for _ in 0..100 {
            rpm.check_or_wait().await;
        }
        assert_eq!(rpm.current_rpm().await, 0);
        assert_eq!(RpmController::new(Some(0)).max_rpm(), None);
    }

    #[tokio::test]
    async fn test_counts_within_budget() {
        let rpm = RpmController::new(Some(3));
        rpm.check_or_wait().await;
        rpm.check_or_wait().await;
        assert_eq!(rpm.current_rpm().await, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_waits_for_next_window_when_exhausted() {
        let rpm = RpmController::new(Some(2));
        let start = Instant::now();
        rpm.check_or_wait().await;
        rpm.check_or_wait().await;
        assert!(start.elapsed() < Duration::from_secs(1));

        rpm.check_or_wait().await;
        assert!(start.elapsed() >= WINDOW);
        assert_eq!(rpm.current_rpm().await, 1);
    }
}
