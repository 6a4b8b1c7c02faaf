//! Core event types for the swap watcher
//!
//! This module defines the alert events handed to the aggregator and the raw
//! records the host runtime feeds in from the chain.

use crate::error::AlertError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Timestamp type for consistent time handling across the application
pub type Timestamp = DateTime<Utc>;

/// One detected occurrence to report
///
/// `message` and `short_message` are already formatted for the channel's
/// markup dialect. Once submitted, the aggregator owns the event.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AlertEvent {
    /// Full formatted body, sent as-is on immediate delivery
    pub message: String,
    /// One-line summary used in digests
    pub short_message: String,
    /// Grouping key within a digest
    pub category: String,
    /// Deep link for debugging the underlying transaction
    pub explorer_url: Option<String>,
}

impl AlertEvent {
    pub fn new(
        message: impl Into<String>,
        short_message: impl Into<String>,
        category: impl Into<String>,
        explorer_url: Option<String>,
    ) -> Self {
        Self {
            message: message.into(),
            short_message: short_message.into(),
            category: category.into(),
            explorer_url,
        }
    }

    /// Check the fields a digest cannot be rendered without
    ///
    /// # Errors
    ///
    /// Returns `AlertError::MalformedEvent` if the category or the short
    /// message is empty.
    pub fn validate(&self) -> Result<(), AlertError> {
        if self.category.trim().is_empty() {
            return Err(AlertError::MalformedEvent(
                "category must not be empty".to_string(),
            ));
        }
        if self.short_message.trim().is_empty() {
            return Err(AlertError::MalformedEvent(format!(
                "short message must not be empty (category: {})",
                self.category
            )));
        }
        Ok(())
    }
}

/// Decoded Uniswap V3 `Swap` log as delivered by the host runtime
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SwapLog {
    /// Pool contract that emitted the log
    pub pool: String,
    pub transaction_hash: String,
    /// Signed raw amount of token0 (positive means paid into the pool)
    pub amount0: i128,
    /// Signed raw amount of token1
    pub amount1: i128,
    pub sender: String,
    pub recipient: String,
}

/// Records the host runtime writes to the bot, one JSON object per line
///
/// Externally tagged (`{"swap": {...}}`) so raw amounts deserialize straight
/// into `i128` without serde's buffered content.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum HostEvent {
    /// A new block was observed
    Block { number: u64 },
    /// A swap log from a watched pool
    Swap(SwapLog),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alert_event_validation() {
        let event = AlertEvent::new("body", "short", "Uniswap V3 Swap", None);
        assert!(event.validate().is_ok());

        let no_category = AlertEvent::new("body", "short", "  ", None);
        assert!(matches!(
            no_category.validate(),
            Err(AlertError::MalformedEvent(_))
        ));

        let no_summary = AlertEvent::new("body", "", "Uniswap V3 Swap", None);
        assert!(matches!(
            no_summary.validate(),
            Err(AlertError::MalformedEvent(_))
        ));
    }

    #[test]
    fn test_host_event_block_deserialization() {
        let event: HostEvent = serde_json::from_str(r#"{"block":{"number":17793100}}"#).unwrap();
        assert_eq!(event, HostEvent::Block { number: 17793100 });
    }

    #[test]
    fn test_host_event_swap_deserialization() {
        let line = r#"{"swap": {
            "pool": "0x88e6a0c2ddd26feeb64f039a2c41296fcb3f5640",
            "transaction_hash": "0xabc",
            "amount0": 2500000000,
            "amount1": -1000000000000000000,
            "sender": "0x3fC91A3afd70395Cd496C647d5a6CC9D4B2b7FAD",
            "recipient": "0x1100000000000000000000000000000000000011"
        }}"#;

        let event: HostEvent = serde_json::from_str(line).unwrap();
        match event {
            HostEvent::Swap(log) => {
                assert_eq!(log.amount0, 2_500_000_000);
                assert_eq!(log.amount1, -1_000_000_000_000_000_000);
                assert_eq!(log.transaction_hash, "0xabc");
            }
            other => panic!("expected swap, got {:?}", other),
        }
    }

    #[test]
    fn test_unknown_host_event_rejected() {
        let result: Result<HostEvent, _> = serde_json::from_str(r#"{"approval":{}}"#);
        assert!(result.is_err());
    }
}
