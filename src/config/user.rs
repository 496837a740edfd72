//! User configuration loading for reparse-scheduler.
//!
//! User config location: $XDG_CONFIG_HOME/reparse-scheduler/reparse-scheduler.toml
//! Fallback: the platform config directory reported by `dirs`.

use super::{ConfigLayer, ConfigResult};
use std::path::PathBuf;

const CONFIG_DIR_NAME: &str = "reparse-scheduler";
const CONFIG_FILE_NAME: &str = "reparse-scheduler.toml";

/// Returns the path to the user configuration file.
///
/// The path is determined by:
/// 1. If $XDG_CONFIG_HOME is set: $XDG_CONFIG_HOME/reparse-scheduler/reparse-scheduler.toml
/// 2. Otherwise: the platform config dir (e.g. ~/.config on Linux)
///
/// Returns None if no config directory can be determined.
pub fn user_config_path() -> Option<PathBuf> {
    if let Ok(xdg_config) = std::env::var("XDG_CONFIG_HOME")
        && !xdg_config.is_empty()
    {
        return Some(
            PathBuf::from(xdg_config)
                .join(CONFIG_DIR_NAME)
                .join(CONFIG_FILE_NAME),
        );
    }

    dirs::config_dir().map(|dir| dir.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
}

/// Load the user config layer, if the file exists.
pub fn load_user_config() -> ConfigResult<Option<ConfigLayer>> {
    let Some(path) = user_config_path() else {
        return Ok(None);
    };
    if !path.exists() {
        return Ok(None);
    }
    ConfigLayer::from_path(&path).map(Some)
}
