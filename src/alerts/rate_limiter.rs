use crate::events::Timestamp;
use chrono::Duration;

/// Minimum-interval limiter for digest delivery
///
/// Remembers when the last delivery happened and answers whether enough time
/// has passed for the next one. A limiter that has never delivered is always
/// due, so the first alert after startup goes out right away.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    /// Minimum spacing between two deliveries
    min_interval: Duration,
    /// When the last delivery was made, if ever
    last_delivery: Option<Timestamp>,
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(Duration::seconds(30))
    }
}

impl RateLimiter {
    /// Create a new limiter with the specified minimum interval
    ///
    /// # Arguments
    ///
    /// * `min_interval` - Minimum time between two deliveries
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_delivery: None,
        }
    }

    /// Check if a delivery may be made at `now`
    ///
    /// # Returns
    ///
    /// `true` if nothing was delivered yet or at least `min_interval` has
    /// elapsed since the last delivery
    pub fn is_due_at(&self, now: Timestamp) -> bool {
        match self.elapsed_at(now) {
            Some(elapsed) => elapsed >= self.min_interval,
            None => true,
        }
    }

    /// Time since the last delivery, `None` if there was none
    pub fn elapsed_at(&self, now: Timestamp) -> Option<Duration> {
        self.last_delivery.map(|last| now - last)
    }

    /// Record that a delivery was made at `timestamp`
    pub fn record_delivery_at(&mut self, timestamp: Timestamp) {
        self.last_delivery = Some(timestamp);
    }

    /// When the last delivery was made
    pub fn last_delivery(&self) -> Option<Timestamp> {
        self.last_delivery
    }
}
