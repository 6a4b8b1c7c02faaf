//! Telegram MarkdownV2 formatting for alerts and digests

use crate::events::{AlertEvent, Timestamp};

/// Characters that carry meaning in MarkdownV2 and must be backslash-escaped
pub const MARKDOWN_V2_SPECIAL: &[char] = &[
    '\\', '*', '_', '[', ']', '(', ')', '~', '`', '>', '#', '+', '-', '=', '|', '{', '}', '.',
    '!',
];

const DIGEST_TITLE: &str = "📋 New Alert Summary \\| Generated on";

/// Escape free text for a MarkdownV2 message
pub fn escape_markdown_v2(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len() * 2);
    for c in text.chars() {
        if MARKDOWN_V2_SPECIAL.contains(&c) {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// Format a raw token amount scaled by `decimals`
///
/// Amounts of 1000 units or more are shown without fractional digits,
/// smaller ones with four. The number is formatted first and escaped after,
/// so the decimal point is escaped exactly once.
///
/// # Examples
///
/// ```
/// use swapwatch::alerts::format::format_token;
///
/// assert_eq!(format_token(2_500_000_000, 6), "2500");
/// assert_eq!(format_token(1_234_000, 6), "1\\.2340");
/// ```
pub fn format_token(amount: i128, decimals: u32) -> String {
    let units = amount as f64 / 10f64.powi(decimals as i32);
    let formatted = if units >= 1000.0 {
        format!("{:.0}", units)
    } else {
        format!("{:.4}", units)
    };
    escape_markdown_v2(&formatted)
}

/// Escaped horizontal rule used to frame reports and close digests
pub fn divider() -> String {
    "\\-".repeat(20)
}

/// Render a digest for a captured batch of alerts
///
/// Alerts are grouped by category in first-seen order. Categories are plain
/// labels and get escaped here; short messages are already formatted by the
/// handler that produced them and go in as-is.
pub fn render_digest(alerts: &[AlertEvent], generated_at: Timestamp) -> String {
    let mut groups: Vec<(&str, Vec<&AlertEvent>)> = Vec::new();
    for alert in alerts {
        match groups
            .iter_mut()
            .find(|(category, _)| *category == alert.category)
        {
            Some((_, members)) => members.push(alert),
            None => groups.push((&alert.category, vec![alert])),
        }
    }

    let mut digest = format!(
        "{} {}\n\n",
        DIGEST_TITLE,
        generated_at.format("%B %d, %H:%M UTC")
    );

    for (category, members) in &groups {
        digest.push_str(&format!(
            "{}: {} alerts\n",
            escape_markdown_v2(category),
            members.len()
        ));
        for alert in members {
            digest.push_str(&alert.short_message);
            if let Some(ref url) = alert.explorer_url {
                digest.push_str(&format!(", [Debug Transaction]({})", url));
            }
            digest.push('\n');
        }
        digest.push('\n');
    }

    digest.push_str(&format!("\n{}\n", divider()));
    digest
}
