/// Alert aggregation, digest formatting and delivery pacing
pub mod alert_aggregator;
pub mod format;
pub mod rate_limiter;

pub use alert_aggregator::AlertAggregator;
pub use format::{divider, escape_markdown_v2, format_token, render_digest};
pub use rate_limiter::RateLimiter;
