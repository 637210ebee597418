// File: ./src/config.rs
// Handles engine configuration loading, saving, and defaults.
use crate::context::AppContext;
use crate::model::prayer::{Coordinates, parse_hhmm};
use crate::storage::LocalStorage;
use anyhow::{Error, Result};
use chrono::NaiveTime;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::PathBuf;
use strum::EnumIter;

fn default_tick_seconds() -> u64 {
    60
}
fn default_refresh_retry_minutes() -> u32 {
    15
}
fn default_true() -> bool {
    true
}
fn default_fajr() -> String {
    "05:30".to_string()
}
fn default_dhuhr() -> String {
    "12:15".to_string()
}
fn default_asr() -> String {
    "15:30".to_string()
}
fn default_maghrib() -> String {
    "18:00".to_string()
}
fn default_isha() -> String {
    "19:30".to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, EnumIter)]
#[serde(rename_all = "lowercase")]
pub enum NotifierKind {
    /// OS notifications (notify-rust). Falls back to `Log` without the `desktop` feature.
    #[default]
    Desktop,
    /// Notifications are only written to the log.
    Log,
}

impl fmt::Display for NotifierKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NotifierKind::Desktop => write!(f, "desktop"),
            NotifierKind::Log => write!(f, "log"),
        }
    }
}

/// Hard-coded schedule used when no provider data is available.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
pub struct FallbackTimes {
    #[serde(default = "default_fajr")]
    pub fajr: String,
    #[serde(default = "default_dhuhr")]
    pub dhuhr: String,
    #[serde(default = "default_asr")]
    pub asr: String,
    #[serde(default = "default_maghrib")]
    pub maghrib: String,
    #[serde(default = "default_isha")]
    pub isha: String,
}

impl Default for FallbackTimes {
    fn default() -> Self {
        Self {
            fajr: default_fajr(),
            dhuhr: default_dhuhr(),
            asr: default_asr(),
            maghrib: default_maghrib(),
            isha: default_isha(),
        }
    }
}

impl FallbackTimes {
    /// Parsed times in Fajr..Isha order. Unparseable entries use the built-in default.
    pub fn times(&self) -> [NaiveTime; 5] {
        let pick = |s: &str, default: fn() -> String| {
            parse_hhmm(s)
                .or_else(|| parse_hhmm(&default()))
                .unwrap_or(NaiveTime::MIN)
        };
        [
            pick(&self.fajr, default_fajr),
            pick(&self.dhuhr, default_dhuhr),
            pick(&self.asr, default_asr),
            pick(&self.maghrib, default_maghrib),
            pick(&self.isha, default_isha),
        ]
    }
}

#[derive(Deserialize, Serialize, Clone, Debug)]
pub struct Config {
    #[serde(default)]
    pub latitude: f64,
    #[serde(default)]
    pub longitude: f64,

    #[serde(default = "default_tick_seconds")]
    pub tick_seconds: u64,
    #[serde(default = "default_refresh_retry_minutes")]
    pub refresh_retry_minutes: u32,

    /// JSON timetable (`{"YYYY-MM-DD": ["HH:MM", x5]}`). Without one the fallback
    /// times are served every day.
    #[serde(default)]
    pub timetable_path: Option<PathBuf>,

    #[serde(default)]
    pub fallback: FallbackTimes,

    #[serde(default)]
    pub notifier: NotifierKind,

    /// Sleep until the next reminder deadline instead of waiting for the next poll.
    #[serde(default = "default_true")]
    pub precise_wakeups: bool,

    /// Keep the wake index file up to date for background workers.
    #[serde(default = "default_true")]
    pub write_wake_index: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            latitude: 0.0,
            longitude: 0.0,
            tick_seconds: 60,
            refresh_retry_minutes: 15,
            timetable_path: None,
            fallback: FallbackTimes::default(),
            notifier: NotifierKind::default(),
            precise_wakeups: true,
            write_wake_index: true,
        }
    }
}

impl Config {
    pub fn coordinates(&self) -> Coordinates {
        Coordinates::new(self.latitude, self.longitude)
    }

    /// Load the configuration from disk using an explicit context.
    /// Returns a contextualized error if reading or parsing fails.
    pub fn load(ctx: &dyn AppContext) -> Result<Self> {
        let path = ctx.get_config_file_path()?;

        if !path.exists() {
            return Err(anyhow::anyhow!("Config file not found"));
        }

        let contents = fs::read_to_string(&path).map_err(|e| {
            anyhow::anyhow!("Failed to read config file '{}': {}", path.display(), e)
        })?;

        let config: Config = toml::from_str(&contents).map_err(|e| {
            anyhow::anyhow!("Failed to parse config file '{}': {}", path.display(), e)
        })?;

        Ok(config)
    }

    /// Loads the config, using defaults when the file is missing.
    /// Parse errors are still reported.
    pub fn load_or_default(ctx: &dyn AppContext) -> Result<Self> {
        match Self::load(ctx) {
            Ok(cfg) => Ok(cfg),
            Err(e) if Self::is_missing_config_error(&e) => {
                log::info!("No config file found, using defaults");
                Ok(Self::default())
            }
            Err(e) => Err(e),
        }
    }

    /// Helper to detect whether an anyhow::Error indicates that the config file was missing.
    pub fn is_missing_config_error(err: &Error) -> bool {
        if err.to_string().contains("Config file not found") {
            return true;
        }

        for cause in err.chain() {
            if let Some(io_err) = cause.downcast_ref::<std::io::Error>()
                && io_err.kind() == std::io::ErrorKind::NotFound
            {
                return true;
            }
        }

        false
    }

    /// Save configuration using an explicit context.
    pub fn save(&self, ctx: &dyn AppContext) -> Result<()> {
        let path = ctx.get_config_file_path()?;
        LocalStorage::with_lock(&path, || {
            let toml_str = toml::to_string_pretty(self)?;
            LocalStorage::atomic_write(&path, toml_str)?;
            Ok(())
        })?;
        Ok(())
    }
}
