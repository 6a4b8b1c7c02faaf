/// Notification channels and their formatting modes
pub mod channels;

pub use channels::{
    LogChannel, MockChannel, NotificationChannel, ParseMode, SentMessage, TelegramChannel,
};
