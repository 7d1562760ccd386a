//! Sliding one-second order counter

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::time::Duration;
use tokio::time::Instant;

const WINDOW: Duration = Duration::from_secs(1);

/// Admission times of recent orders for one strategy.
///
/// Never holds more than `limit` entries. Shared by concurrent checks, so
/// the expiry, the count and the append happen under one lock.
#[derive(Debug)]
pub struct FrequencyWindow {
    limit: usize,
    stamps: Mutex<VecDeque<Instant>>,
}

impl FrequencyWindow {
    pub fn new(limit: usize) -> Self {
        Self {
            limit,
            stamps: Mutex::new(VecDeque::with_capacity(limit)),
        }
    }

    /// Record an order at `now` if fewer than `limit` were admitted in the
    /// preceding second. Returns the count seen before this order on refusal.
    pub fn try_admit(&self, now: Instant) -> Result<(), usize> {
        let mut stamps = self.stamps.lock();
        drop_expired(&mut stamps, now);
        if stamps.len() >= self.limit {
            return Err(stamps.len());
        }
        stamps.push_back(now);
        Ok(())
    }

    /// Forget admissions older than one second before `now`; returns how
    /// many are left
    pub fn expire(&self, now: Instant) -> usize {
        let mut stamps = self.stamps.lock();
        drop_expired(&mut stamps, now);
        stamps.len()
    }

    pub fn len(&self) -> usize {
        self.stamps.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn drop_expired(stamps: &mut VecDeque<Instant>, now: Instant) {
    while let Some(&oldest) = stamps.front() {
        if now.saturating_duration_since(oldest) >= WINDOW {
            stamps.pop_front();
        } else {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_window_slides() {
        let window = FrequencyWindow::new(3);
        let start = Instant::now();

        assert!(window.try_admit(start).is_ok());
        assert!(window.try_admit(start).is_ok());
        assert!(window.try_admit(start + Duration::from_millis(500)).is_ok());
        assert_eq!(window.try_admit(start + Duration::from_millis(900)), Err(3));

        // the first two expire exactly one second after admission
        assert!(window.try_admit(start + WINDOW).is_ok());
        assert_eq!(window.len(), 2);

        assert_eq!(window.expire(start + WINDOW + Duration::from_millis(500)), 1);
        assert_eq!(window.expire(start + WINDOW * 2), 0);
        assert!(window.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_limit_refuses_everything() {
        let window = FrequencyWindow::new(0);
        assert_eq!(window.try_admit(Instant::now()), Err(0));
        assert!(window.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_admissions_bounded() {
        let window = std::sync::Arc::new(FrequencyWindow::new(10));
        let now = Instant::now();
        let mut tasks = Vec::new();
        for _ in 0..50 {
            let window = window.clone();
            tasks.push(tokio::spawn(async move { window.try_admit(now).is_ok() }));
        }
        let mut admitted = 0;
        for task in tasks {
            if task.await.unwrap() {
                admitted += 1;
            }
        }
        assert_eq!(admitted, 10);
        assert_eq!(window.len(), 10);
    }
}
