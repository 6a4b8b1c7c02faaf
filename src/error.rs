use thiserror::Error;

/// Errors that can occur when submitting or delivering alerts
#[derive(Error, Debug)]
pub enum AlertError {
    #[error("Failed to send notification: {0}")]
    NotificationFailed(String),

    #[error("Malformed alert event: {0}")]
    MalformedEvent(String),

    #[error("Explorer lookup failed: {0}")]
    LookupFailed(String),

    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),
}

/// Errors that can occur during configuration loading
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(String),

    #[error("Failed to parse config: {0}")]
    ParseError(String),

    #[error("Invalid configuration value: {0}")]
    ValidationError(String),

    #[error("Missing required credential: {0}")]
    MissingCredential(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    TomlError(#[from] toml::de::Error),
}

/// Top-level errors surfaced to the host loop
///
/// `Stop` is the circuit breaker: the host must halt everything. The other
/// variants wrap failures of a single operation.
#[derive(Error, Debug)]
pub enum BotError {
    #[error("Circuit breaker tripped: {0}")]
    Stop(String),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Alert(#[from] AlertError),
}

impl BotError {
    /// Whether the host should stop instead of logging and continuing
    pub fn is_fatal(&self) -> bool {
        matches!(self, BotError::Stop(_) | BotError::Config(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stop_and_config_errors_are_fatal() {
        assert!(BotError::Stop("CCS Interrupted".to_string()).is_fatal());
        assert!(BotError::from(ConfigError::MissingCredential("token".to_string())).is_fatal());
    }

    #[test]
    fn test_alert_errors_are_recoverable() {
        let err = BotError::from(AlertError::NotificationFailed("timeout".to_string()));
        assert!(!err.is_fatal());
        assert_eq!(err.to_string(), "Failed to send notification: timeout");
    }
}
