//! Runtime control file
//!
//! A small JSON file operators edit while the bot runs. It can switch
//! features on and off and can halt the bot by setting `interrupt`.

use crate::config::ControlConfig;
use crate::error::BotError;
use crate::events::Timestamp;
use chrono::Duration;
use log::{error, info, warn};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::RwLock;

/// Contents of the control file
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ControlSettings {
    /// Halt the bot
    pub interrupt: bool,
    /// Resolve Tenderly debug links for reported transactions
    pub enable_tenderly_links: bool,
    /// Report swaps on the USDC pools
    pub report_swap_usdc: bool,
}

impl Default for ControlSettings {
    fn default() -> Self {
        Self {
            interrupt: false,
            enable_tenderly_links: false,
            report_swap_usdc: true,
        }
    }
}

impl ControlSettings {
    /// Read and check a control file
    ///
    /// # Errors
    ///
    /// Returns `BotError::Stop` when the file is unreadable or invalid, or
    /// when it asks for an interrupt.
    pub fn load(path: &Path) -> Result<Self, BotError> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            error!("Failed to read control file {}: {}", path.display(), e);
            BotError::Stop("CCS Error".to_string())
        })?;

        let settings: ControlSettings = serde_json::from_str(&contents).map_err(|e| {
            error!("Invalid control file {}: {}", path.display(), e);
            BotError::Stop("CCS Error".to_string())
        })?;

        if settings.interrupt {
            warn!("Control file requests interrupt");
            return Err(BotError::Stop("CCS Interrupted".to_string()));
        }

        Ok(settings)
    }
}

#[derive(Debug)]
struct ControlState {
    settings: ControlSettings,
    last_refresh: Option<Timestamp>,
}

/// Shared handle to the current control settings
///
/// Reads are cheap; `refresh_if_stale_at` reloads the file at most once per
/// refresh interval.
#[derive(Debug)]
pub struct ControlHandle {
    path: PathBuf,
    refresh_interval: Duration,
    state: RwLock<ControlState>,
}

impl ControlHandle {
    /// Load the control file for the first time
    pub fn open(config: &ControlConfig, now: Timestamp) -> Result<Self, BotError> {
        let path = PathBuf::from(&config.path);
        let settings = ControlSettings::load(&path)?;
        info!("Loaded control file {}", path.display());

        Ok(Self {
            path,
            refresh_interval: Duration::seconds(config.refresh_interval_seconds as i64),
            state: RwLock::new(ControlState {
                settings,
                last_refresh: Some(now),
            }),
        })
    }

    /// Snapshot of the current settings
    pub fn settings(&self) -> ControlSettings {
        self.state
            .read()
            .expect("control state lock poisoned")
            .settings
            .clone()
    }

    /// Reload the file if the refresh interval has passed by `now`
    ///
    /// # Returns
    ///
    /// `Ok(true)` if the file was reloaded
    pub fn refresh_if_stale_at(&self, now: Timestamp) -> Result<bool, BotError> {
        {
            let state = self.state.read().expect("control state lock poisoned");
            if let Some(last) = state.last_refresh {
                if now - last <= self.refresh_interval {
                    return Ok(false);
                }
            }
        }

        let settings = ControlSettings::load(&self.path)?;
        let mut state = self.state.write().expect("control state lock poisoned");
        if state.settings != settings {
            info!("Control settings changed: {:?}", settings);
        }
        state.settings = settings;
        state.last_refresh = Some(now);
        Ok(true)
    }
}
