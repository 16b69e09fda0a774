//! Application configuration constants
//!
//! Centralized configuration for the reminder engine and its store.
use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Storage slot holding the JSON array of reminder entries
pub const REMINDERS_KEY: &str = "bt_meds";

/// Every application-owned key starts with this prefix (cleared on sign-out)
pub const NAMESPACE_PREFIX: &str = "bt_";

/// Theme lives outside the prefix but is still cleared on sign-out
pub const THEME_KEY: &str = "theme";

/// Profile keys that other views watch for external changes
pub const PROFILE_NAME_KEY: &str = "bt_name";
pub const PROFILE_AVATAR_KEY: &str = "bt_avatar";

/// Time used by Add when the caller gives none
pub const DEFAULT_REMINDER_TIME: &str = "08:00";

/// An entry due at most this many minutes ago is still "now", not tomorrow
pub const GRACE_WINDOW_MINUTES: i64 = 5;

/// Entries due within this many minutes are flagged as due soon
pub const DUE_SOON_MINUTES: i64 = 60;

/// Background re-evaluation period
pub const REFRESH_INTERVAL_SECS: u64 = 60;

/// Folder created under the platform's local data directory
pub const DATA_DIR_NAME: &str = "MedReminders";

/// Single file backing the key-value store
pub const STORE_FILE_NAME: &str = "store.json";

const DATA_DIR_ENV: &str = "MED_REMINDERS_DATA_DIR";
const REFRESH_SECS_ENV: &str = "MED_REMINDERS_REFRESH_SECS";
const LOG_LEVEL_ENV: &str = "MED_REMINDERS_LOG";

/// Runtime settings, read from the environment with fallbacks to the constants above
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub data_dir: PathBuf,
    pub refresh_interval: Duration,
    pub log_level: String,
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let data_dir = lookup(DATA_DIR_ENV)
            .filter(|v| !v.trim().is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(default_data_dir);

        let refresh_secs = lookup(REFRESH_SECS_ENV)
            .and_then(|v| v.trim().parse::<u64>().ok())
            .filter(|secs| *secs > 0)
            .unwrap_or(REFRESH_INTERVAL_SECS);

        let log_level = lookup(LOG_LEVEL_ENV)
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| "warn".to_string());

        Self {
            data_dir,
            refresh_interval: Duration::from_secs(refresh_secs),
            log_level,
        }
    }

    pub fn store_path(&self) -> PathBuf {
        self.data_dir.join(STORE_FILE_NAME)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::from_lookup(|_| None)
    }
}

fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(env::temp_dir)
        .join(DATA_DIR_NAME)
}
