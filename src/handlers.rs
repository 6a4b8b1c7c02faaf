//! Handlers for records coming from the host runtime

use crate::alerts::{divider, escape_markdown_v2, format_token, AlertAggregator};
use crate::config::PoolConfig;
use crate::control::ControlSettings;
use crate::error::BotError;
use crate::events::{AlertEvent, HostEvent, SwapLog};
use crate::explorer::ExplorerLinks;
use log::{debug, info, warn};
use std::collections::HashMap;
use std::sync::Arc;

/// Turns swap logs from watched pools into alerts
pub struct SwapReporter {
    aggregator: Arc<AlertAggregator>,
    /// Watched pools keyed by lowercase address
    pools: HashMap<String, PoolConfig>,
    explorer: Option<Arc<dyn ExplorerLinks>>,
}

impl SwapReporter {
    pub fn new(
        aggregator: Arc<AlertAggregator>,
        pools: &[PoolConfig],
        explorer: Option<Arc<dyn ExplorerLinks>>,
    ) -> Self {
        let pools = pools
            .iter()
            .map(|pool| (pool.address.to_lowercase(), pool.clone()))
            .collect();

        Self {
            aggregator,
            pools,
            explorer,
        }
    }

    /// Dispatch one host record
    ///
    /// # Returns
    ///
    /// `Ok(true)` if an alert was submitted
    pub async fn handle_event(
        &self,
        event: HostEvent,
        settings: &ControlSettings,
    ) -> Result<bool, BotError> {
        match event {
            HostEvent::Block { number } => {
                if number % 5 == 0 {
                    info!("Block number: {}", number);
                }
                Ok(false)
            }
            HostEvent::Swap(log) => self.report_swap(&log, settings).await,
        }
    }

    /// Report a swap if its pool is watched and reporting is switched on
    pub async fn report_swap(
        &self,
        log: &SwapLog,
        settings: &ControlSettings,
    ) -> Result<bool, BotError> {
        let pool = match self.pools.get(&log.pool.to_lowercase()) {
            Some(pool) => pool,
            None => {
                debug!("Ignoring swap from unwatched pool {}", log.pool);
                return Ok(false);
            }
        };

        if is_usdc_pool(pool) && !settings.report_swap_usdc {
            debug!("USDC swap reporting is off, skipping {}", log.transaction_hash);
            return Ok(false);
        }

        let explorer_url = if settings.enable_tenderly_links {
            self.lookup_explorer_url(&log.transaction_hash).await
        } else {
            None
        };

        let alert = build_swap_alert(log, pool, explorer_url);
        debug!("{}", alert.message);
        self.aggregator.submit(alert).await?;
        Ok(true)
    }

    /// Lookup failures only cost the link, never the alert
    async fn lookup_explorer_url(&self, tx_hash: &str) -> Option<String> {
        let explorer = match &self.explorer {
            Some(explorer) => explorer,
            None => {
                warn!("Tenderly links are enabled but Tenderly is not configured");
                return None;
            }
        };

        match explorer.explorer_url(tx_hash).await {
            Ok(url) => url,
            Err(e) => {
                warn!("Could not resolve debug link for {}: {}", tx_hash, e);
                None
            }
        }
    }
}

fn is_usdc_pool(pool: &PoolConfig) -> bool {
    pool.symbol0.eq_ignore_ascii_case("USDC") || pool.symbol1.eq_ignore_ascii_case("USDC")
}

/// Build the alert for a swap
///
/// The pool pays out token1, so its amount is negated for display.
pub fn build_swap_alert(log: &SwapLog, pool: &PoolConfig, explorer_url: Option<String>) -> AlertEvent {
    let headline = format!(
        "🔁 Swap detected {} for {}",
        escape_markdown_v2(&pool.symbol0),
        escape_markdown_v2(&pool.symbol1)
    );

    let mut lines = vec![
        divider(),
        headline.clone(),
        format!(
            "{} for {}",
            format_token(log.amount0, pool.decimals0),
            format_token(log.amount1.saturating_neg(), pool.decimals1)
        ),
        format!("Sender: {}", escape_markdown_v2(&log.sender)),
        format!("Recipient: {}", escape_markdown_v2(&log.recipient)),
    ];
    if let Some(ref url) = explorer_url {
        lines.push(format!("[Debug Transaction]({})", url));
    }
    lines.push(divider());

    AlertEvent::new(lines.join("\n"), headline, pool.category.clone(), explorer_url)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AlertError;
    use crate::notify::MockChannel;
    use chrono::Duration;
    use std::future::Future;
    use std::pin::Pin;
    use std::sync::Mutex;

    /// Explorer stub returning a fixed answer and counting lookups
    struct StubExplorer {
        answer: Result<Option<String>, String>,
        lookups: Mutex<usize>,
    }

    impl StubExplorer {
        fn new(answer: Result<Option<String>, String>) -> Self {
            Self {
                answer,
                lookups: Mutex::new(0),
            }
        }

        fn lookups(&self) -> usize {
            *self.lookups.lock().unwrap()
        }
    }

    impl ExplorerLinks for StubExplorer {
        fn explorer_url<'a>(
            &'a self,
            _tx_hash: &'a str,
        ) -> Pin<Box<dyn Future<Output = Result<Option<String>, AlertError>> + Send + 'a>> {
            Box::pin(async move {
                *self.lookups.lock().unwrap() += 1;
                self.answer.clone().map_err(AlertError::LookupFailed)
            })
        }
    }

    fn swap_log(pool: &str) -> SwapLog {
        SwapLog {
            pool: pool.to_string(),
            transaction_hash: "0xfeed".to_string(),
            amount0: 2_500_000_000,
            amount1: -1_234_000_000_000_000_000,
            sender: "0x3fC91A3afd70395Cd496C647d5a6CC9D4B2b7FAD".to_string(),
            recipient: "0x1100000000000000000000000000000000000011".to_string(),
        }
    }

    fn reporter(
        channel: &Arc<MockChannel>,
        explorer: Option<Arc<dyn ExplorerLinks>>,
    ) -> SwapReporter {
        let aggregator = Arc::new(AlertAggregator::new(
            channel.clone(),
            false,
            Duration::seconds(30),
        ));
        SwapReporter::new(aggregator, &[PoolConfig::usdc_weth()], explorer)
    }

    #[test]
    fn test_build_swap_alert_without_link() {
        let pool = PoolConfig::usdc_weth();
        let alert = build_swap_alert(&swap_log(&pool.address), &pool, None);

        assert_eq!(alert.category, "Uniswap V3 Swap");
        assert_eq!(alert.short_message, "🔁 Swap detected USDC for WETH");
        assert_eq!(
            alert.message,
            format!(
                "{d}\n🔁 Swap detected USDC for WETH\n2500 for 1\\.2340\n\
                 Sender: 0x3fC91A3afd70395Cd496C647d5a6CC9D4B2b7FAD\n\
                 Recipient: 0x1100000000000000000000000000000000000011\n{d}",
                d = divider()
            )
        );
        assert!(alert.explorer_url.is_none());
        assert!(alert.validate().is_ok());
    }

    #[test]
    fn test_build_swap_alert_with_link() {
        let pool = PoolConfig::usdc_weth();
        let url = "https://dashboard.tenderly.co/acme/testnet/p/tx/mainnet/1".to_string();
        let alert = build_swap_alert(&swap_log(&pool.address), &pool, Some(url.clone()));

        assert!(alert
            .message
            .contains(&format!("[Debug Transaction]({})", url)));
        assert_eq!(alert.explorer_url, Some(url));
    }

    #[tokio::test]
    async fn test_swap_from_watched_pool_is_reported() {
        let channel = Arc::new(MockChannel::success());
        let reporter = reporter(&channel, None);
        let pool = PoolConfig::usdc_weth();

        let reported = reporter
            .report_swap(&swap_log(&pool.address.to_uppercase()), &ControlSettings::default())
            .await
            .unwrap();

        assert!(reported);
        assert_eq!(channel.send_count(), 1);
        assert!(channel.sent()[0].text.contains("2500 for 1\\.2340"));
    }

    #[tokio::test]
    async fn test_swap_from_unknown_pool_is_ignored() {
        let channel = Arc::new(MockChannel::success());
        let reporter = reporter(&channel, None);

        let reported = reporter
            .report_swap(&swap_log("0xdeadbeef"), &ControlSettings::default())
            .await
            .unwrap();

        assert!(!reported);
        assert_eq!(channel.send_count(), 0);
    }

    #[tokio::test]
    async fn test_usdc_reporting_switch() {
        let channel = Arc::new(MockChannel::success());
        let reporter = reporter(&channel, None);
        let settings = ControlSettings {
            report_swap_usdc: false,
            ..ControlSettings::default()
        };

        let reported = reporter
            .report_swap(&swap_log(&PoolConfig::usdc_weth().address), &settings)
            .await
            .unwrap();

        assert!(!reported);
        assert_eq!(channel.send_count(), 0);
    }

    #[tokio::test]
    async fn test_explorer_link_only_when_enabled() {
        let channel = Arc::new(MockChannel::success());
        let explorer = Arc::new(StubExplorer::new(Ok(Some("https://link/1".to_string()))));
        let reporter = reporter(&channel, Some(explorer.clone()));
        let log = swap_log(&PoolConfig::usdc_weth().address);

        reporter
            .report_swap(&log, &ControlSettings::default())
            .await
            .unwrap();
        assert_eq!(explorer.lookups(), 0);
        assert!(!channel.sent()[0].text.contains("Debug Transaction"));

        let settings = ControlSettings {
            enable_tenderly_links: true,
            ..ControlSettings::default()
        };
        reporter.report_swap(&log, &settings).await.unwrap();
        assert_eq!(explorer.lookups(), 1);
        assert!(channel.sent()[1]
            .text
            .contains("[Debug Transaction](https://link/1)"));
    }

    #[tokio::test]
    async fn test_explorer_failure_still_reports() {
        let channel = Arc::new(MockChannel::success());
        let explorer = Arc::new(StubExplorer::new(Err("503".to_string())));
        let reporter = reporter(&channel, Some(explorer));
        let settings = ControlSettings {
            enable_tenderly_links: true,
            ..ControlSettings::default()
        };

        let reported = reporter
            .report_swap(&swap_log(&PoolConfig::usdc_weth().address), &settings)
            .await
            .unwrap();

        assert!(reported);
        assert!(!channel.sent()[0].text.contains("Debug Transaction"));
    }

    #[tokio::test]
    async fn test_delivery_failure_is_recoverable_error() {
        let channel = Arc::new(MockChannel::failing("timeout"));
        let reporter = reporter(&channel, None);

        let result = reporter
            .report_swap(
                &swap_log(&PoolConfig::usdc_weth().address),
                &ControlSettings::default(),
            )
            .await;

        match result {
            Err(e) => assert!(!e.is_fatal()),
            Ok(_) => panic!("expected delivery error"),
        }
    }

    #[tokio::test]
    async fn test_block_events_never_alert() {
        let channel = Arc::new(MockChannel::success());
        let reporter = reporter(&channel, None);

        for number in 0..10 {
            let reported = reporter
                .handle_event(HostEvent::Block { number }, &ControlSettings::default())
                .await
                .unwrap();
            assert!(!reported);
        }
        assert_eq!(channel.send_count(), 0);
    }
}
