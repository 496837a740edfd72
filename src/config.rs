//! Scheduler configuration.
//!
//! Delays are layered: programmed defaults < user config < explicit file.
//! Every field is optional in TOML; missing fields keep their default.

pub mod user;

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

pub use user::{load_user_config, user_config_path};

/// Default debounce for the model update (500ms).
///
/// Long enough to swallow a burst of keystrokes, short enough that derived
/// views feel live.
pub const DEFAULT_MODEL_UPDATE_DELAY_MS: u64 = 500;

/// Default delay between a successful model update and the view refresh.
pub const DEFAULT_POST_UPDATE_DELAY_MS: u64 = 0;

/// Default delay for re-publishing styling after a theme change.
pub const DEFAULT_PRESENTATION_RESYNC_DELAY_MS: u64 = 50;

/// Default delay for re-syncing the outline selection after a cursor move.
pub const DEFAULT_OUTLINE_RESYNC_DELAY_MS: u64 = 150;

const DEFAULT_WORKER_THREAD_NAME: &str = "reparse-worker";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Invalid configuration: {message}")]
    Invalid { message: String },
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Tuning for one update session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Debounce applied to the model update after each edit.
    pub model_update_delay_ms: u64,
    /// Delay for presentation and outline after a successful model update.
    pub post_update_delay_ms: u64,
    /// Delay for a presentation-only refresh (theme change).
    pub presentation_resync_delay_ms: u64,
    /// Delay for an outline-only refresh (cursor move).
    pub outline_resync_delay_ms: u64,
    /// Name given to the worker thread.
    pub worker_thread_name: String,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            model_update_delay_ms: DEFAULT_MODEL_UPDATE_DELAY_MS,
            post_update_delay_ms: DEFAULT_POST_UPDATE_DELAY_MS,
            presentation_resync_delay_ms: DEFAULT_PRESENTATION_RESYNC_DELAY_MS,
            outline_resync_delay_ms: DEFAULT_OUTLINE_RESYNC_DELAY_MS,
            worker_thread_name: DEFAULT_WORKER_THREAD_NAME.to_string(),
        }
    }
}

/// Partial configuration as read from one TOML layer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ConfigLayer {
    pub model_update_delay_ms: Option<u64>,
    pub post_update_delay_ms: Option<u64>,
    pub presentation_resync_delay_ms: Option<u64>,
    pub outline_resync_delay_ms: Option<u64>,
    pub worker_thread_name: Option<String>,
}

impl ConfigLayer {
    pub fn from_toml_str(content: &str) -> ConfigResult<Self> {
        Ok(toml::from_str(content)?)
    }

    pub fn from_path(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }
}

impl SchedulerConfig {
    pub fn model_update_delay(&self) -> Duration {
        Duration::from_millis(self.model_update_delay_ms)
    }

    pub fn post_update_delay(&self) -> Duration {
        Duration::from_millis(self.post_update_delay_ms)
    }

    pub fn presentation_resync_delay(&self) -> Duration {
        Duration::from_millis(self.presentation_resync_delay_ms)
    }

    pub fn outline_resync_delay(&self) -> Duration {
        Duration::from_millis(self.outline_resync_delay_ms)
    }

    /// Parse a complete configuration; missing fields take defaults.
    pub fn from_toml_str(content: &str) -> ConfigResult<Self> {
        let config: SchedulerConfig = toml::from_str(content)?;
        config.check()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> ConfigResult<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Apply the fields a layer sets, later layers winning.
    pub fn merge(mut self, layer: ConfigLayer) -> Self {
        if let Some(v) = layer.model_update_delay_ms {
            self.model_update_delay_ms = v;
        }
        if let Some(v) = layer.post_update_delay_ms {
            self.post_update_delay_ms = v;
        }
        if let Some(v) = layer.presentation_resync_delay_ms {
            self.presentation_resync_delay_ms = v;
        }
        if let Some(v) = layer.outline_resync_delay_ms {
            self.outline_resync_delay_ms = v;
        }
        if let Some(v) = layer.worker_thread_name {
            self.worker_thread_name = v;
        }
        self
    }

    /// Hard errors: values the scheduler cannot run with.
    fn check(&self) -> ConfigResult<()> {
        if self.worker_thread_name.trim().is_empty() {
            return Err(ConfigError::Invalid {
                message: "worker_thread_name must not be empty".to_string(),
            });
        }
        if self.worker_thread_name.contains('\0') {
            return Err(ConfigError::Invalid {
                message: "worker_thread_name must not contain NUL".to_string(),
            });
        }
        Ok(())
    }

    /// Soft warnings: values that work but defeat the debounce.
    ///
    /// View refreshes only run after a completed model update, so their
    /// delays should stay short relative to the model debounce.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        if self.post_update_delay_ms > self.model_update_delay_ms {
            warnings.push(format!(
                "post_update_delay_ms ({}) exceeds model_update_delay_ms ({})",
                self.post_update_delay_ms, self.model_update_delay_ms
            ));
        }
        if self.presentation_resync_delay_ms > self.model_update_delay_ms {
            warnings.push(format!(
                "presentation_resync_delay_ms ({}) exceeds model_update_delay_ms ({})",
                self.presentation_resync_delay_ms, self.model_update_delay_ms
            ));
        }
        if self.outline_resync_delay_ms > self.model_update_delay_ms {
            warnings.push(format!(
                "outline_resync_delay_ms ({}) exceeds model_update_delay_ms ({})",
                self.outline_resync_delay_ms, self.model_update_delay_ms
            ));
        }
        warnings
    }
}

/// Load the effective configuration.
///
/// Layers: defaults < user config < `explicit` file. A missing or broken user
/// config is logged and skipped; a broken explicit file is an error.
pub fn load_config(explicit: Option<&Path>) -> ConfigResult<SchedulerConfig> {
    let mut config = SchedulerConfig::default();

    match load_user_config() {
        Ok(Some(layer)) => {
            log::info!(target: "reparse_scheduler::config", "Loaded user config");
            config = config.merge(layer);
        }
        Ok(None) => {}
        Err(err) => {
            log::warn!(target: "reparse_scheduler::config", "Failed to load user config: {}", err);
        }
    }

    if let Some(path) = explicit {
        log::info!(
            target: "reparse_scheduler::config",
            "Loading config file: {}",
            path.display()
        );
        config = config.merge(ConfigLayer::from_path(path)?);
    }

    config.check()?;
    for warning in config.validate() {
        log::warn!(target: "reparse_scheduler::config", "{}", warning);
    }
    Ok(config)
}
