use anyhow::Context;
use chrono::Utc;
use clap::Parser;
use log::{debug, error, info, warn};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use swapwatch::alerts::AlertAggregator;
use swapwatch::config::Config;
use swapwatch::control::ControlHandle;
use swapwatch::error::{BotError, ConfigError};
use swapwatch::events::HostEvent;
use swapwatch::explorer::{ExplorerLinks, TenderlyExplorer};
use swapwatch::handlers::SwapReporter;
use swapwatch::notify::{LogChannel, NotificationChannel, ParseMode, TelegramChannel};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

/// Command-line arguments for the swap watcher
#[derive(Parser)]
#[command(
    name = "swapwatch",
    about = "Uniswap V3 swap watcher with batched Telegram alerts",
    long_about = "Reads block and swap records from the host runtime on stdin (one JSON \
                  object per line), reports swaps on watched pools and delivers the alerts \
                  to Telegram, optionally batched into periodic digests."
)]
struct Cli {
    /// Path to configuration file
    #[arg(
        short,
        long,
        value_name = "FILE",
        help = "Configuration file path (TOML format)"
    )]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(
        short,
        long,
        help = "Enable verbose logging output (sets RUST_LOG=debug)"
    )]
    verbose: bool,
}

impl Cli {
    /// Validate the CLI arguments
    ///
    /// # Returns
    ///
    /// `Ok(())` if all arguments are valid, `Err(String)` with error message otherwise
    fn validate(&self) -> Result<(), String> {
        if let Some(ref config_path) = self.config {
            // Missing files fall back to defaults in load_config
            if config_path.exists() {
                if !config_path.is_file() {
                    return Err(format!(
                        "Configuration path is not a file: {}",
                        config_path.display()
                    ));
                }

                if let Some(extension) = config_path.extension() {
                    if extension != "toml" {
                        warn!(
                            "Configuration file does not have .toml extension: {}",
                            config_path.display()
                        );
                    }
                }
            }
        }

        Ok(())
    }
}

/// Background task running the periodic flush check
///
/// Each tick releases deferred alerts once their interval has passed and
/// reloads the control file when it is stale. A fatal control result is
/// forwarded on the stop channel. Stopping waits for a tick that is already
/// delivering, so its batch is never cut off mid-send.
struct NotificationTask {
    stop: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl NotificationTask {
    fn spawn(
        aggregator: Arc<AlertAggregator>,
        control: Arc<ControlHandle>,
        period: Duration,
        stop_sender: mpsc::UnboundedSender<BotError>,
    ) -> Self {
        let (stop, mut stop_receiver) = watch::channel(false);

        let handle = tokio::spawn(async move {
            info!("Notification task started");
            let mut ticker = tokio::time::interval(period);

            loop {
                tokio::select! {
                    _ = stop_receiver.changed() => {
                        info!("Notification task received shutdown signal");
                        break;
                    }
                    _ = ticker.tick() => {
                        if let Err(e) = aggregator.tick().await {
                            error!("Periodic digest delivery failed: {}", e);
                        }

                        if let Err(e) = control.refresh_if_stale_at(Utc::now()) {
                            if stop_sender.send(e).is_err() {
                                break;
                            }
                        }
                    }
                }
            }

            info!("Notification task stopped");
        });

        Self { stop, handle }
    }

    /// Signal the task and wait for it to finish its current tick
    async fn stop(self) {
        let _ = self.stop.send(true);
        if let Err(e) = self.handle.await {
            error!("Notification task failed: {}", e);
        }
    }
}

/// Wires the aggregator, control file and handlers together
struct SwapWatcher {
    config: Config,
    channel: Arc<dyn NotificationChannel>,
    aggregator: Arc<AlertAggregator>,
    control: Arc<ControlHandle>,
    reporter: SwapReporter,
}

impl SwapWatcher {
    /// Load configuration from file or use defaults
    ///
    /// An unreadable file falls back to defaults with a warning. A file that
    /// parses but fails validation is an error.
    fn load_config(config_path: Option<&Path>) -> Result<Config, ConfigError> {
        match config_path {
            Some(path) => {
                info!("Loading configuration from: {}", path.display());
                match Config::from_file(path) {
                    Ok(config) => Ok(config),
                    Err(ConfigError::ReadError(e)) => {
                        warn!("Configuration file unreadable ({}), using defaults", e);
                        Ok(Config::with_default_pools())
                    }
                    Err(e) => Err(e),
                }
            }
            None => {
                info!("Using default configuration");
                Ok(Config::with_default_pools())
            }
        }
    }

    /// Check credentials, connect the channel and load the control file
    ///
    /// # Errors
    ///
    /// Every error here is fatal: missing credentials, an unusable channel,
    /// or a control file that is missing or asks for an interrupt.
    async fn start(config: Config) -> Result<Self, BotError> {
        config.require_credentials()?;

        let timeout = Duration::from_secs(config.telegram.timeout_seconds);
        let channel: Arc<dyn NotificationChannel> = if config.telegram.enabled {
            let token = config.telegram.token.clone().unwrap_or_default();
            let chat_id = config.telegram.chat_id.clone().unwrap_or_default();
            Arc::new(TelegramChannel::with_api_base(
                token,
                chat_id,
                config.telegram.api_base.clone(),
                timeout,
            )?)
        } else {
            info!("Telegram disabled, notifications go to the log");
            Arc::new(LogChannel)
        };

        Self::start_with_channel(config, channel).await
    }

    /// Announce startup on `channel` and wire up the remaining parts
    async fn start_with_channel(
        config: Config,
        channel: Arc<dyn NotificationChannel>,
    ) -> Result<Self, BotError> {
        let timeout = Duration::from_secs(config.telegram.timeout_seconds);

        channel
            .send("🤖 swapwatch started", ParseMode::Plain)
            .await?;

        let control = Arc::new(ControlHandle::open(&config.control, Utc::now())?);

        let explorer: Option<Arc<dyn ExplorerLinks>> =
            match TenderlyExplorer::from_config(&config.tenderly, timeout)? {
                Some(explorer) => Some(Arc::new(explorer) as Arc<dyn ExplorerLinks>),
                None => {
                    debug!("Tenderly not configured, alerts carry no debug links");
                    None
                }
            };

        let aggregator = Arc::new(AlertAggregator::from_config(
            Arc::clone(&channel),
            &config.alerts,
        ));
        info!(
            "Alert queueing {} (min interval {}s)",
            if aggregator.is_queueing_enabled() {
                "enabled"
            } else {
                "disabled"
            },
            config.alerts.min_interval_seconds
        );

        let reporter = SwapReporter::new(Arc::clone(&aggregator), &config.pools, explorer);
        info!("Watching {} pools", config.pools.len());

        channel.send("✅ Ready!", ParseMode::Plain).await?;

        Ok(Self {
            config,
            channel,
            aggregator,
            control,
            reporter,
        })
    }

    /// Handle one line from the host
    ///
    /// Only fatal errors are returned; everything else is logged.
    async fn handle_line(&self, line: &str) -> Result<(), BotError> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(());
        }

        let event: HostEvent = match serde_json::from_str(line) {
            Ok(event) => event,
            Err(e) => {
                warn!("Skipping unreadable host record: {}", e);
                return Ok(());
            }
        };

        let settings = self.control.settings();
        match self.reporter.handle_event(event, &settings).await {
            Ok(_) => Ok(()),
            Err(e) if e.is_fatal() => Err(e),
            Err(e) => {
                error!("Failed to handle host record: {}", e);
                Ok(())
            }
        }
    }

    /// Process host records until the stream ends, a signal arrives, or a
    /// stop is requested
    async fn run(&self, mut shutdown: watch::Receiver<bool>) -> Result<(), BotError> {
        let (stop_sender, mut stop_receiver) = mpsc::unbounded_channel();
        let notification_task = NotificationTask::spawn(
            Arc::clone(&self.aggregator),
            Arc::clone(&self.control),
            Duration::from_secs(self.config.alerts.tick_interval_seconds),
            stop_sender,
        );

        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        let result = loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    info!("Shutdown signal received");
                    break Ok(());
                }
                Some(stop) = stop_receiver.recv() => {
                    break Err(stop);
                }
                line = lines.next_line() => match line {
                    Ok(Some(line)) => {
                        if let Err(e) = self.handle_line(&line).await {
                            break Err(e);
                        }
                    }
                    Ok(None) => {
                        info!("Host closed the event stream");
                        break Ok(());
                    }
                    Err(e) => {
                        error!("Failed to read from host: {}", e);
                        break Ok(());
                    }
                },
            }
        };

        notification_task.stop().await;

        result
    }

    /// Deliver whatever is still queued
    async fn stop(&self) {
        match self.aggregator.flush().await {
            Ok(0) => {}
            Ok(count) => info!("Flushed {} queued alerts on shutdown", count),
            Err(e) => error!("Failed to flush queued alerts: {}", e),
        }

        if let Err(e) = self
            .channel
            .send("🛑 swapwatch stopped", ParseMode::Plain)
            .await
        {
            error!("Failed to send shutdown notice: {}", e);
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config = SwapWatcher::load_config(cli.config.as_deref())
        .context("Failed to load configuration")?;
    config.apply_env();

    let watcher = SwapWatcher::start(config)
        .await
        .context("Failed to start swapwatch")?;
    info!("swapwatch initialized successfully");

    // Set up signal handling for graceful shutdown
    let (shutdown_sender, shutdown_receiver) = watch::channel(false);
    ctrlc::set_handler(move || {
        info!("Received interrupt signal (SIGINT), shutting down gracefully...");
        let _ = shutdown_sender.send(true);
    })
    .context("Error setting SIGINT handler for graceful shutdown")?;

    let result = watcher.run(shutdown_receiver).await;
    watcher.stop().await;

    match result {
        Ok(()) => {
            info!("swapwatch shutdown complete");
            Ok(())
        }
        Err(e) => Err(e).context("swapwatch stopped"),
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if cli.verbose {
        std::env::set_var("RUST_LOG", "debug");
    }
    env_logger::init();

    info!("Starting swapwatch");

    if let Err(e) = cli.validate() {
        error!("Invalid arguments: {}", e);
        std::process::exit(1);
    }

    if let Err(e) = run(cli).await {
        error!("{:#}", e);
        std::process::exit(1);
    }
}
