use crate::alerts::format::render_digest;
use crate::alerts::RateLimiter;
use crate::config::AlertsConfig;
use crate::error::AlertError;
use crate::events::{AlertEvent, Timestamp};
use crate::notify::{NotificationChannel, ParseMode};
use chrono::{Duration, Utc};
use log::{debug, error, info, warn};
use std::sync::{Arc, Mutex, MutexGuard};

/// Queue and delivery clock, guarded together by the aggregator's lock
#[derive(Debug)]
struct AggregatorState {
    /// Deferred alerts in submission order
    queue: Vec<AlertEvent>,
    /// Tracks the last delivery and the minimum spacing between deliveries
    rate_limiter: RateLimiter,
}

impl AggregatorState {
    /// Capture the whole queue if a delivery is due at `now`
    ///
    /// On capture the delivery clock moves to `now` and the queue is left
    /// empty. An empty queue never captures and never moves the clock.
    fn take_due_batch(&mut self, now: Timestamp, force: bool) -> Option<Vec<AlertEvent>> {
        if self.queue.is_empty() {
            return None;
        }
        if !force && !self.rate_limiter.is_due_at(now) {
            return None;
        }
        self.rate_limiter.record_delivery_at(now);
        Some(std::mem::take(&mut self.queue))
    }
}

/// Collapses bursts of alerts into category digests
///
/// With queueing disabled every alert is delivered on its own as soon as it
/// is submitted. With queueing enabled alerts are queued and the whole queue
/// goes out as one digest whenever a submission finds that `min_interval`
/// has passed since the previous delivery.
///
/// A lone deferred alert is only released by a later submission or by
/// `tick()`, so the host must call `tick()` periodically to guarantee
/// delivery when the alert stream goes quiet.
///
/// The queue is captured under the lock and the lock is released before the
/// digest is rendered and sent, so submissions keep queueing while a slow
/// delivery is in flight. Delivery is at-most-once: a captured batch whose
/// send fails is dropped.
pub struct AlertAggregator {
    channel: Arc<dyn NotificationChannel>,
    state: Mutex<AggregatorState>,
    queueing_enabled: bool,
}

impl AlertAggregator {
    /// Create a new aggregator
    ///
    /// # Arguments
    ///
    /// * `channel` - Where immediate alerts and digests are delivered
    /// * `queueing_enabled` - Batch alerts into digests instead of sending each one
    /// * `min_interval` - Minimum spacing between deliveries when batching
    pub fn new(
        channel: Arc<dyn NotificationChannel>,
        queueing_enabled: bool,
        min_interval: Duration,
    ) -> Self {
        Self {
            channel,
            state: Mutex::new(AggregatorState {
                queue: Vec::new(),
                rate_limiter: RateLimiter::new(min_interval),
            }),
            queueing_enabled,
        }
    }

    /// Create an aggregator from the `[alerts]` configuration section
    pub fn from_config(channel: Arc<dyn NotificationChannel>, config: &AlertsConfig) -> Self {
        Self::new(
            channel,
            config.queueing_enabled,
            Duration::seconds(config.min_interval_seconds as i64),
        )
    }

    fn state(&self) -> MutexGuard<'_, AggregatorState> {
        self.state
            .lock()
            .expect("alert aggregator state lock poisoned")
    }

    /// Submit an alert at the current time
    ///
    /// See [`AlertAggregator::submit_at`].
    pub async fn submit(&self, event: AlertEvent) -> Result<(), AlertError> {
        self.submit_at(event, Utc::now()).await
    }

    /// Submit an alert as if it arrived at `now`
    ///
    /// # Returns
    ///
    /// `Ok(())` if the alert was delivered, included in a digest, or queued
    ///
    /// # Errors
    ///
    /// Returns `AlertError::MalformedEvent` if the alert lacks a category or
    /// short message; such alerts are neither sent nor queued. Delivery
    /// failures from the channel are returned as-is.
    pub async fn submit_at(&self, event: AlertEvent, now: Timestamp) -> Result<(), AlertError> {
        if let Err(e) = event.validate() {
            warn!("Rejected alert: {}", e);
            return Err(e);
        }

        if !self.queueing_enabled {
            self.state().rate_limiter.record_delivery_at(now);
            return match self.channel.send(&event.message, ParseMode::MarkdownV2).await {
                Ok(()) => {
                    info!("Sent alert: {}", event.short_message);
                    Ok(())
                }
                Err(e) => {
                    error!("Failed to send alert '{}': {}", event.short_message, e);
                    Err(e)
                }
            };
        }

        let batch = {
            let mut state = self.state();
            state.queue.push(event);
            let batch = state.take_due_batch(now, false);
            if batch.is_none() {
                debug!(
                    "Queued alert, {} waiting for next digest",
                    state.queue.len()
                );
            }
            batch
        };

        match batch {
            Some(batch) => self.deliver_digest(batch, now).await.map(|_| ()),
            None => Ok(()),
        }
    }

    /// Periodic flush check at the current time
    ///
    /// See [`AlertAggregator::tick_at`].
    pub async fn tick(&self) -> Result<usize, AlertError> {
        self.tick_at(Utc::now()).await
    }

    /// Deliver queued alerts if the minimum interval has passed by `now`
    ///
    /// Safe to call arbitrarily often: with an empty queue, or before the
    /// interval has elapsed, nothing is sent and the delivery clock is left
    /// untouched.
    ///
    /// # Returns
    ///
    /// `Ok(usize)` with the number of alerts delivered
    pub async fn tick_at(&self, now: Timestamp) -> Result<usize, AlertError> {
        let batch = self.state().take_due_batch(now, false);
        match batch {
            Some(batch) => self.deliver_digest(batch, now).await,
            None => Ok(0),
        }
    }

    /// Deliver everything queued right now, ignoring the minimum interval
    pub async fn flush(&self) -> Result<usize, AlertError> {
        self.flush_at(Utc::now()).await
    }

    /// Deliver everything queued as of `now`, ignoring the minimum interval
    ///
    /// Used on shutdown. An empty queue is a no-op.
    pub async fn flush_at(&self, now: Timestamp) -> Result<usize, AlertError> {
        let batch = self.state().take_due_batch(now, true);
        match batch {
            Some(batch) => self.deliver_digest(batch, now).await,
            None => Ok(0),
        }
    }

    /// Render and send a captured batch; the lock must not be held here
    async fn deliver_digest(
        &self,
        batch: Vec<AlertEvent>,
        generated_at: Timestamp,
    ) -> Result<usize, AlertError> {
        let count = batch.len();
        let digest = render_digest(&batch, generated_at);

        match self.channel.send(&digest, ParseMode::MarkdownV2).await {
            Ok(()) => {
                info!("Delivered digest with {} alerts", count);
                Ok(count)
            }
            Err(e) => {
                error!("Failed to deliver digest, {} alerts dropped: {}", count, e);
                Err(e)
            }
        }
    }

    /// Number of alerts waiting for the next digest
    pub fn queued_alert_count(&self) -> usize {
        self.state().queue.len()
    }

    /// When the last immediate alert or digest was delivered
    pub fn last_delivery_time(&self) -> Option<Timestamp> {
        self.state().rate_limiter.last_delivery()
    }

    pub fn is_queueing_enabled(&self) -> bool {
        self.queueing_enabled
    }
}
