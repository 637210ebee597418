// File: ./src/error.rs
//! Error taxonomy for the reminder engine.
//!
//! Every variant is recoverable: the engine logs it, degrades to a no-op and keeps
//! ticking. Only the application edges (config loading, CLI) use `anyhow`.
use chrono::NaiveDate;
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EngineError {
    /// The schedule provider could not produce times (network, geolocation, bad file).
    #[error("schedule unavailable for {date}: {reason}")]
    ScheduleUnavailable { date: NaiveDate, reason: String },

    /// Notification permission was not granted by the user.
    #[error("notification permission denied")]
    PermissionDenied,

    /// The notification sink threw or the platform has no notification support.
    #[error("notification dispatch failed: {0}")]
    DispatchFailure(String),

    /// Reading or writing the persisted policy failed.
    #[error("policy persistence failed: {0}")]
    PersistenceFailure(String),

    /// A policy update carried an out-of-range value.
    #[error("invalid policy: {0}")]
    InvalidPolicy(String),

    /// Provider output violated the five-event ordering invariant.
    #[error("invalid schedule: {0}")]
    InvalidSchedule(String),
}

impl EngineError {
    pub fn schedule_unavailable(date: NaiveDate, reason: impl Into<String>) -> Self {
        EngineError::ScheduleUnavailable {
            date,
            reason: reason.into(),
        }
    }
}

pub type EngineResult<T> = Result<T, EngineError>;
