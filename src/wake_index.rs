// File: ./src/wake_index.rs
// Upcoming reminder deadlines for platform background workers.
//
// The foreground tick loop is the source of truth. This file only lets a
// background worker (systemd timer, mobile job scheduler, ...) wake the process
// or show an alert while no session is active. It is rewritten whenever the
// schedule or policy changes; failures are logged and otherwise ignored.
//
// ⚠️ VERSION BUMP REQUIRED:
// Changes to WakeIndex or WakeIndexEntry require incrementing WAKE_INDEX_VERSION.

use crate::context::AppContext;
use crate::dispatcher::NotificationDispatcher;
use crate::model::{DailySchedule, PrayerName, ReminderPolicy};
use crate::scheduler::upcoming_deadlines;
use crate::storage::LocalStorage;
use anyhow::Result;
use chrono::{Duration, Local, NaiveDateTime, TimeZone};
use serde::{Deserialize, Serialize};

const WAKE_INDEX_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WakeIndexEntry {
    /// Unix timestamp in milliseconds when the reminder is due
    pub trigger_ms: i64,
    pub event: PrayerName,
    /// 0 for the exact-time alert
    pub lead_minutes: u32,
    pub title: String,
    pub body: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WakeIndex {
    pub version: u32,
    /// Timestamp (seconds) of the last rebuild, for debugging
    pub last_updated: i64,
    /// Sorted by trigger_ms
    pub entries: Vec<WakeIndexEntry>,
}

impl Default for WakeIndex {
    fn default() -> Self {
        Self {
            version: WAKE_INDEX_VERSION,
            last_updated: 0,
            entries: Vec::new(),
        }
    }
}

fn local_millis(at: NaiveDateTime) -> Option<i64> {
    // DST gaps have no local instant; those deadlines are skipped.
    Local
        .from_local_datetime(&at)
        .earliest()
        .map(|dt| dt.timestamp_millis())
}

impl WakeIndex {
    /// Deadlines of the next 24 hours after `now`.
    pub fn rebuild(now: NaiveDateTime, schedule: &DailySchedule, policy: &ReminderPolicy) -> Self {
        let entries = upcoming_deadlines(now, schedule, policy, Duration::hours(24))
            .into_iter()
            .filter_map(|d| {
                let trigger_ms = local_millis(d.at)?;
                let (title, body) =
                    NotificationDispatcher::render(schedule.event(d.event), d.lead_minutes);
                Some(WakeIndexEntry {
                    trigger_ms,
                    event: d.event,
                    lead_minutes: d.lead_minutes,
                    title,
                    body,
                })
            })
            .collect();

        Self {
            version: WAKE_INDEX_VERSION,
            last_updated: local_millis(now).unwrap_or_default() / 1000,
            entries,
        }
    }

    /// Loads the index. Missing, corrupted or outdated files yield an empty index.
    pub fn load(ctx: &dyn AppContext) -> Self {
        let Some(path) = ctx.get_wake_index_path() else {
            return Self::default();
        };
        match LocalStorage::load_json::<WakeIndex>(&path) {
            Ok(Some(index)) if index.version == WAKE_INDEX_VERSION => index,
            Ok(_) => Self::default(),
            Err(e) => {
                log::debug!("Ignoring wake index: {:#}", e);
                Self::default()
            }
        }
    }

    pub fn save(&self, ctx: &dyn AppContext) -> Result<()> {
        let Some(path) = ctx.get_wake_index_path() else {
            anyhow::bail!("Could not determine wake index path");
        };
        LocalStorage::save_json(&path, self)
    }

    /// Timestamp (ms) of the next entry after `now_ms`.
    pub fn next_trigger_ms(&self, now_ms: i64) -> Option<i64> {
        self.entries
            .iter()
            .find(|e| e.trigger_ms > now_ms)
            .map(|e| e.trigger_ms)
    }

    /// Entries due at or before `now_ms` but no older than `grace_ms`.
    pub fn firing(&self, now_ms: i64, grace_ms: i64) -> Vec<&WakeIndexEntry> {
        self.entries
            .iter()
            .filter(|e| e.trigger_ms <= now_ms && now_ms - e.trigger_ms < grace_ms)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
