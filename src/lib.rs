/// Error types for the swap watcher
pub mod error;

/// Alert events and host records
pub mod events;

/// Alert aggregation, digests and pacing
pub mod alerts;

/// Notification channels
pub mod notify;

/// Transaction debug links
pub mod explorer;

/// Runtime control file
pub mod control;

/// Host event handlers
pub mod handlers;

/// Configuration management
pub mod config;

// Re-export commonly used types
pub use error::{AlertError, BotError, ConfigError};
