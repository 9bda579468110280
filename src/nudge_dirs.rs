//! Filesystem locations used by the bot.
//!
//! | Purpose | macOS | Linux |
//! |---------|-------|-------|
//! | Data | `~/Library/Application Support/nudge/` | `~/.local/share/nudge/` |
//! | Config | `~/Library/Application Support/nudge/` | `~/.config/nudge/` |
//!
//! Overrides: `NUDGE_DATA_DIR` for [`data_dir`], `NUDGE_CONFIG_DIR` for
//! [`config_dir`].

use std::path::PathBuf;

/// Application data root: database, ledger and logs.
#[must_use]
pub fn data_dir() -> PathBuf {
    if let Some(override_dir) = std::env::var_os("NUDGE_DATA_DIR") {
        return PathBuf::from(override_dir);
    }
    dirs::data_dir()
        .map(|d| d.join("nudge"))
        .unwrap_or_else(|| PathBuf::from("/tmp/nudge-data"))
}

/// Application config directory.
#[must_use]
pub fn config_dir() -> PathBuf {
    if let Some(override_dir) = std::env::var_os("NUDGE_CONFIG_DIR") {
        return PathBuf::from(override_dir);
    }
    dirs::config_dir()
        .map(|d| d.join("nudge"))
        .unwrap_or_else(|| PathBuf::from("/tmp/nudge-config"))
}

/// Log file directory (`data_dir()/logs/`).
#[must_use]
pub fn logs_dir() -> PathBuf {
    data_dir().join("logs")
}

/// Main config file path (`config_dir()/config.toml`).
#[must_use]
pub fn config_file() -> PathBuf {
    config_dir().join("config.toml")
}

/// Default task database (`data_dir()/tasks.db`).
#[must_use]
pub fn database_file() -> PathBuf {
    data_dir().join("tasks.db")
}

/// Default JSONL send ledger (`data_dir()/sends.jsonl`).
#[must_use]
pub fn ledger_file() -> PathBuf {
    data_dir().join("sends.jsonl")
}
