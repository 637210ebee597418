// File: ./src/provider.rs
// Schedule providers: where the five daily times come from.
use crate::error::{EngineError, EngineResult};
use crate::model::prayer::parse_hhmm;
use crate::model::{Coordinates, DailySchedule, ScheduleSource};
use chrono::{NaiveDate, NaiveTime};
use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::PathBuf;

/// Produces the prayer times of one date for one location.
///
/// Implementations may block on I/O. Under the background actor they run on
/// `spawn_blocking`, off the tick path.
pub trait ScheduleProvider: Send + Sync + fmt::Debug {
    fn fetch_schedule(&self, date: NaiveDate, coords: Coordinates)
    -> EngineResult<DailySchedule>;
}

/// Serves the same five times every day.
#[derive(Debug, Clone)]
pub struct FixedScheduleProvider {
    times: [NaiveTime; 5],
}

impl FixedScheduleProvider {
    pub fn new(times: [NaiveTime; 5]) -> Self {
        Self { times }
    }
}

impl ScheduleProvider for FixedScheduleProvider {
    fn fetch_schedule(
        &self,
        date: NaiveDate,
        coords: Coordinates,
    ) -> EngineResult<DailySchedule> {
        DailySchedule::from_times(date, coords, ScheduleSource::Provider, self.times)
    }
}

/// Reads a JSON timetable of the form `{"2026-03-14": ["05:12", "12:20", ...]}`.
///
/// The file is read on every fetch so edits are picked up on the next refresh.
/// Coordinates are recorded on the schedule but not used for lookup: a timetable
/// is published for one place.
#[derive(Debug, Clone)]
pub struct TimetableProvider {
    path: PathBuf,
}

impl TimetableProvider {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn parse_day(date: NaiveDate, raw: &[String]) -> EngineResult<[NaiveTime; 5]> {
        if raw.len() != 5 {
            return Err(EngineError::InvalidSchedule(format!(
                "{} has {} entries, expected 5",
                date,
                raw.len()
            )));
        }
        let mut times = [NaiveTime::MIN; 5];
        for (slot, s) in times.iter_mut().zip(raw) {
            *slot = parse_hhmm(s).ok_or_else(|| {
                EngineError::InvalidSchedule(format!("{}: '{}' is not HH:MM", date, s))
            })?;
        }
        Ok(times)
    }
}

impl ScheduleProvider for TimetableProvider {
    fn fetch_schedule(
        &self,
        date: NaiveDate,
        coords: Coordinates,
    ) -> EngineResult<DailySchedule> {
        let content = fs::read_to_string(&self.path).map_err(|e| {
            EngineError::schedule_unavailable(
                date,
                format!("cannot read timetable {}: {}", self.path.display(), e),
            )
        })?;
        let table: HashMap<NaiveDate, Vec<String>> = serde_json::from_str(&content)
            .map_err(|e| {
                EngineError::schedule_unavailable(
                    date,
                    format!("cannot parse timetable {}: {}", self.path.display(), e),
                )
            })?;
        let raw = table.get(&date).ok_or_else(|| {
            EngineError::schedule_unavailable(date, "date missing from timetable")
        })?;
        let times = Self::parse_day(date, raw)?;
        DailySchedule::from_times(date, coords, ScheduleSource::Provider, times)
    }
}
