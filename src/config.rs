//! Configuration types for the reminder bot.
//!
//! Loaded from TOML (every section optional), then overlaid with the
//! deployment environment variables `TELEGRAM_BOT_TOKEN`, `DEFAULT_TZ` and
//! `DB_PATH`.

use crate::clock::parse_timezone;
use crate::error::{NudgeError, Result};
use crate::scheduler::SchedulePolicy;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NudgeConfig {
    /// Bot API credentials and transport tuning.
    pub telegram: TelegramConfig,
    /// Digest/prompt hours, default timezone and tick cadence.
    pub schedule: ScheduleConfig,
    /// Database and ledger locations.
    pub storage: StorageConfig,
    pub focus: FocusConfig,
    pub logging: LoggingConfig,
}

/// Telegram Bot API settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelegramConfig {
    /// Token from @BotFather. Usually supplied through `TELEGRAM_BOT_TOKEN`.
    pub bot_token: String,
    /// API root, overridable for tests and self-hosted Bot API servers.
    pub api_base: String,
    /// `getUpdates` long-poll window in seconds.
    pub poll_timeout_secs: u64,
    /// Extra attempts after a retryable `sendMessage` failure.
    pub send_retries: u32,
    /// Linear backoff step between retries, in milliseconds.
    pub retry_backoff_ms: u64,
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            bot_token: String::new(),
            api_base: "https://api.telegram.org".to_owned(),
            poll_timeout_secs: 30,
            send_retries: 3,
            retry_backoff_ms: 500,
        }
    }
}

/// Default leader lease lifetime (seconds).
pub const DEFAULT_LEASE_TTL_SECS: u64 = 120;

/// Shortest lease whose heartbeat (a third of it, at least a second) can
/// renew it in time.
const MIN_LEASE_TTL_SECS: u64 = 3;

/// Ticker schedule.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    /// Local hour of the morning digest and carry-over.
    pub digest_hour: u8,
    /// Local hours of the tomorrow-planning prompt.
    pub prompt_hours: Vec<u8>,
    /// Zone assigned to new users and used when a stored zone is unusable.
    pub default_timezone: String,
    /// Tick cadence in seconds; ticks align to epoch multiples.
    pub tick_interval_secs: u64,
    /// Run a tick immediately at startup.
    pub catch_up_on_start: bool,
    /// Share one database between processes: only the holder of the
    /// `ticker` lease row delivers.
    pub leader_lease: bool,
    /// Lease lifetime. Renewed every third of it; must be shorter than the
    /// tick interval so a crashed holder is replaced before the next tick.
    pub lease_ttl_secs: u64,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        let policy = SchedulePolicy::default();
        Self {
            digest_hour: policy.digest_hour,
            prompt_hours: policy.prompt_hours,
            default_timezone: "America/Los_Angeles".to_owned(),
            tick_interval_secs: policy.tick_interval.as_secs(),
            catch_up_on_start: policy.catch_up_on_start,
            leader_lease: false,
            lease_ttl_secs: DEFAULT_LEASE_TTL_SECS,
        }
    }
}

impl ScheduleConfig {
    /// Scheduler policy for these settings.
    #[must_use]
    pub fn policy(&self) -> SchedulePolicy {
        SchedulePolicy {
            digest_hour: self.digest_hour,
            prompt_hours: self.prompt_hours.clone(),
            tick_interval: Duration::from_secs(self.tick_interval_secs),
            catch_up_on_start: self.catch_up_on_start,
        }
    }
}

/// Which backend records delivered slots.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LedgerBackend {
    /// `sends` table in the task database.
    #[default]
    Sqlite,
    /// Append-only JSONL file next to the database.
    Jsonl,
}

/// Storage locations.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub database_path: PathBuf,
    pub ledger: LedgerBackend,
    /// JSONL ledger file; only read when `ledger = "jsonl"`.
    pub ledger_path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: crate::nudge_dirs::database_file(),
            ledger: LedgerBackend::default(),
            ledger_path: crate::nudge_dirs::ledger_file(),
        }
    }
}

/// Focus session lengths.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FocusConfig {
    pub work_minutes: u64,
    pub break_minutes: u64,
}

impl Default for FocusConfig {
    fn default() -> Self {
        Self {
            work_minutes: 25,
            break_minutes: 5,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Also write a daily-rolling log under `nudge_dirs::logs_dir()`.
    pub file_logs: bool,
}

impl NudgeConfig {
    /// Load configuration from a TOML file, falling back to defaults for missing fields.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| NudgeError::Config(e.to_string()))
    }

    /// Save configuration to a TOML file, creating parent directories as needed.
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| NudgeError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// `NUDGE_CONFIG` when set, else `config_dir()/config.toml`.
    pub fn default_config_path() -> PathBuf {
        std::env::var_os("NUDGE_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(crate::nudge_dirs::config_file)
    }

    /// Read the default config file when present, then apply the process
    /// environment. Does not validate.
    pub fn load() -> Result<Self> {
        let path = Self::default_config_path();
        let mut config = if path.exists() {
            Self::from_file(&path)?
        } else {
            Self::default()
        };
        config.apply_env_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Overlay deployment variables using `lookup` (normally `std::env::var`).
    /// Empty values are ignored.
    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        if let Some(token) = get("TELEGRAM_BOT_TOKEN") {
            self.telegram.bot_token = token;
        }
        if let Some(tz) = get("DEFAULT_TZ") {
            self.schedule.default_timezone = tz;
        }
        if let Some(path) = get("DB_PATH") {
            self.storage.database_path = PathBuf::from(path);
        }
    }

    /// Reject settings the bot cannot start with.
    pub fn validate(&self) -> Result<()> {
        if self.telegram.bot_token.trim().is_empty() {
            return Err(NudgeError::Config(
                "missing Telegram bot token; set TELEGRAM_BOT_TOKEN".to_owned(),
            ));
        }
        parse_timezone(&self.schedule.default_timezone).map_err(|_| {
            NudgeError::Config(format!(
                "default timezone `{}` is not a valid IANA zone",
                self.schedule.default_timezone
            ))
        })?;

        let schedule = &self.schedule;
        if schedule.digest_hour > 23 {
            return Err(NudgeError::Config(format!(
                "digest_hour {} is out of range 0-23",
                schedule.digest_hour
            )));
        }
        if let Some(hour) = schedule.prompt_hours.iter().find(|h| **h > 23) {
            return Err(NudgeError::Config(format!(
                "prompt hour {hour} is out of range 0-23"
            )));
        }
        // Coarser than an hour would skip local hours.
        if schedule.tick_interval_secs == 0 || schedule.tick_interval_secs > 3600 {
            return Err(NudgeError::Config(format!(
                "tick_interval_secs {} must be within 1-3600",
                schedule.tick_interval_secs
            )));
        }
        if schedule.leader_lease
            && (schedule.lease_ttl_secs < MIN_LEASE_TTL_SECS
                || schedule.lease_ttl_secs >= schedule.tick_interval_secs)
        {
            return Err(NudgeError::Config(format!(
                "lease_ttl_secs {} must be at least {MIN_LEASE_TTL_SECS} and shorter than \
                 tick_interval_secs {}",
                schedule.lease_ttl_secs, schedule.tick_interval_secs
            )));
        }
        if self.focus.work_minutes == 0 {
            return Err(NudgeError::Config(
                "focus work_minutes must be positive".to_owned(),
            ));
        }
        Ok(())
    }
}
