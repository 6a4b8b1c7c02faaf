use crate::error::AlertError;
use log::{debug, info};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Formatting dialect the channel should apply to a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParseMode {
    /// Text is shown verbatim
    Plain,
    /// Telegram MarkdownV2; special characters must be escaped by the caller
    MarkdownV2,
}

impl ParseMode {
    fn as_telegram(self) -> Option<&'static str> {
        match self {
            ParseMode::Plain => None,
            ParseMode::MarkdownV2 => Some("MarkdownV2"),
        }
    }
}

/// Trait for notification channel implementations
pub trait NotificationChannel: Send + Sync {
    fn send<'a>(
        &'a self,
        text: &'a str,
        mode: ParseMode,
    ) -> Pin<Box<dyn Future<Output = Result<(), AlertError>> + Send + 'a>>;
}

/// Telegram Bot API channel
///
/// Posts to `sendMessage` for a single chat. The HTTP client carries the
/// channel timeout; failed sends are reported, never retried.
pub struct TelegramChannel {
    client: Client,
    token: String,
    chat_id: String,
    api_base: String,
}

/// Request body for `sendMessage`
#[derive(Debug, Serialize)]
struct SendMessageRequest<'a> {
    chat_id: &'a str,
    text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    parse_mode: Option<&'static str>,
}

/// Envelope returned by every Bot API method
#[derive(Debug, Deserialize)]
struct TelegramResponse {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
}

impl TelegramChannel {
    /// Create a channel against the public Bot API
    ///
    /// # Arguments
    /// * `token` - Bot token issued by BotFather
    /// * `chat_id` - Chat that receives every message
    /// * `timeout` - Per-request timeout
    pub fn new(token: String, chat_id: String, timeout: Duration) -> Result<Self, AlertError> {
        Self::with_api_base(
            token,
            chat_id,
            "https://api.telegram.org".to_string(),
            timeout,
        )
    }

    /// Create a channel against a custom Bot API server
    pub fn with_api_base(
        token: String,
        chat_id: String,
        api_base: String,
        timeout: Duration,
    ) -> Result<Self, AlertError> {
        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            token,
            chat_id,
            api_base,
        })
    }

    fn api_url(&self) -> String {
        format!(
            "{}/bot{}/sendMessage",
            self.api_base.trim_end_matches('/'),
            self.token
        )
    }
}

impl NotificationChannel for TelegramChannel {
    fn send<'a>(
        &'a self,
        text: &'a str,
        mode: ParseMode,
    ) -> Pin<Box<dyn Future<Output = Result<(), AlertError>> + Send + 'a>> {
        Box::pin(async move {
            let request = SendMessageRequest {
                chat_id: &self.chat_id,
                text,
                parse_mode: mode.as_telegram(),
            };

            let response = self
                .client
                .post(self.api_url())
                .json(&request)
                .send()
                .await?;

            let status = response.status();
            let body: TelegramResponse = response.json().await.map_err(|e| {
                AlertError::NotificationFailed(format!(
                    "Unreadable Telegram response (status {}): {}",
                    status, e
                ))
            })?;

            if !status.is_success() || !body.ok {
                return Err(AlertError::NotificationFailed(format!(
                    "Telegram API returned {}: {}",
                    status,
                    body.description
                        .unwrap_or_else(|| "no description".to_string())
                )));
            }

            debug!("Delivered Telegram message ({} bytes)", text.len());
            Ok(())
        })
    }
}

/// Channel that only writes messages to the log
///
/// Used when Telegram delivery is switched off in the configuration.
#[derive(Debug, Default)]
pub struct LogChannel;

impl NotificationChannel for LogChannel {
    fn send<'a>(
        &'a self,
        text: &'a str,
        mode: ParseMode,
    ) -> Pin<Box<dyn Future<Output = Result<(), AlertError>> + Send + 'a>> {
        Box::pin(async move {
            info!("Notification ({:?}):\n{}", mode, text);
            Ok(())
        })
    }
}

/// A message captured by `MockChannel`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMessage {
    pub text: String,
    pub mode: ParseMode,
}

/// Mock channel for testing and development
///
/// Records every message it is asked to send. It can be switched into a
/// failing mode to exercise delivery errors.
#[derive(Debug, Default)]
pub struct MockChannel {
    sent: Arc<Mutex<Vec<SentMessage>>>,
    failure: Arc<Mutex<Option<String>>>,
    delay: Option<Duration>,
}

impl MockChannel {
    /// Create a mock channel that accepts every message
    pub fn success() -> Self {
        Self::default()
    }

    /// Create a mock channel that rejects every message
    pub fn failing(error_message: &str) -> Self {
        let channel = Self::default();
        channel.set_failure(Some(error_message.to_string()));
        channel
    }

    /// Delay every send (useful for testing concurrent submissions)
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Switch failure mode on (`Some`) or off (`None`)
    pub fn set_failure(&self, error_message: Option<String>) {
        *self.failure.lock().unwrap() = error_message;
    }

    /// Messages accepted so far, in send order
    pub fn sent(&self) -> Vec<SentMessage> {
        self.sent.lock().unwrap().clone()
    }

    pub fn send_count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }
}

impl NotificationChannel for MockChannel {
    fn send<'a>(
        &'a self,
        text: &'a str,
        mode: ParseMode,
    ) -> Pin<Box<dyn Future<Output = Result<(), AlertError>> + Send + 'a>> {
        Box::pin(async move {
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }

            if let Some(error) = self.failure.lock().unwrap().clone() {
                return Err(AlertError::NotificationFailed(error));
            }

            info!("MOCK NOTIFICATION ({:?}): {}", mode, text);
            self.sent.lock().unwrap().push(SentMessage {
                text: text.to_string(),
                mode,
            });
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_telegram_api_url_formatting() {
        let channel = TelegramChannel::with_api_base(
            "123:abc".to_string(),
            "-10042".to_string(),
            "http://localhost:8081/".to_string(),
            Duration::from_secs(5),
        )
        .unwrap();
        assert_eq!(
            channel.api_url(),
            "http://localhost:8081/bot123:abc/sendMessage"
        );

        let public = TelegramChannel::new(
            "123:abc".to_string(),
            "-10042".to_string(),
            Duration::from_secs(5),
        )
        .unwrap();
        assert_eq!(
            public.api_url(),
            "https://api.telegram.org/bot123:abc/sendMessage"
        );
    }

    #[test]
    fn test_send_message_request_serialization() {
        let markdown = SendMessageRequest {
            chat_id: "42",
            text: "hi",
            parse_mode: ParseMode::MarkdownV2.as_telegram(),
        };
        assert_eq!(
            serde_json::to_string(&markdown).unwrap(),
            r#"{"chat_id":"42","text":"hi","parse_mode":"MarkdownV2"}"#
        );

        let plain = SendMessageRequest {
            chat_id: "42",
            text: "hi",
            parse_mode: ParseMode::Plain.as_telegram(),
        };
        assert_eq!(
            serde_json::to_string(&plain).unwrap(),
            r#"{"chat_id":"42","text":"hi"}"#
        );
    }

    #[test]
    fn test_telegram_error_response_parsing() {
        let body: TelegramResponse = serde_json::from_str(
            r#"{"ok":false,"error_code":400,"description":"Bad Request: can't parse entities"}"#,
        )
        .unwrap();
        assert!(!body.ok);
        assert_eq!(
            body.description.as_deref(),
            Some("Bad Request: can't parse entities")
        );
    }

    #[tokio::test]
    async fn test_telegram_unreachable_server_is_delivery_error() {
        let channel = TelegramChannel::with_api_base(
            "t".to_string(),
            "c".to_string(),
            "http://127.0.0.1:9".to_string(),
            Duration::from_millis(500),
        )
        .unwrap();

        let result = channel.send("hello", ParseMode::Plain).await;
        assert!(matches!(
            result,
            Err(AlertError::HttpError(_)) | Err(AlertError::NotificationFailed(_))
        ));
    }

    #[tokio::test]
    async fn test_log_channel_always_succeeds() {
        let channel = LogChannel;
        assert!(channel.send("*bold*", ParseMode::MarkdownV2).await.is_ok());
    }

    #[tokio::test]
    async fn test_mock_channel_records_messages() {
        let channel = MockChannel::success();
        channel.send("one", ParseMode::Plain).await.unwrap();
        channel.send("two", ParseMode::MarkdownV2).await.unwrap();

        assert_eq!(channel.send_count(), 2);
        assert_eq!(
            channel.sent()[1],
            SentMessage {
                text: "two".to_string(),
                mode: ParseMode::MarkdownV2,
            }
        );
    }

    #[tokio::test]
    async fn test_mock_channel_failure_mode() {
        let channel = MockChannel::failing("chat not found");
        let result = channel.send("lost", ParseMode::MarkdownV2).await;
        assert!(matches!(result, Err(AlertError::NotificationFailed(ref m)) if m == "chat not found"));
        assert_eq!(channel.send_count(), 0);

        channel.set_failure(None);
        assert!(channel.send("kept", ParseMode::MarkdownV2).await.is_ok());
        assert_eq!(channel.send_count(), 1);
    }
}
