//! Path constants for configuration, token cache and log files.

use std::path::PathBuf;

/// The name of the configuration directory under ~/.config/
pub const CONFIG_DIR_NAME: &str = "spotcast";

/// The name of the main configuration file
pub const CONFIG_FILE_NAME: &str = "config.toml";

/// The name of the log file written when file logging is enabled
pub const LOG_FILE_NAME: &str = "spotcast.log";

/// Get the configuration directory path (~/.config/spotcast/)
#[must_use]
pub fn config_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config")
        .join(CONFIG_DIR_NAME)
}

/// Get the config file path (~/.config/spotcast/config.toml)
#[must_use]
pub fn config_path() -> PathBuf {
    config_dir().join(CONFIG_FILE_NAME)
}

/// Get the cache directory path (e.g. ~/.cache/spotcast/ on Linux)
#[must_use]
pub fn cache_dir() -> PathBuf {
    dirs::cache_dir().map_or_else(|| config_dir().join("cache"), |dir| dir.join(CONFIG_DIR_NAME))
}

/// Get the log file path inside the cache directory
#[must_use]
pub fn log_file_path() -> PathBuf {
    cache_dir().join(LOG_FILE_NAME)
}
