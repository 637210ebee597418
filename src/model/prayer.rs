// File: ./src/model/prayer.rs
use chrono::{NaiveTime, Timelike};
use serde::{Deserialize, Serialize};
use std::fmt;
use strum::{EnumIter, IntoEnumIterator};

pub const MINUTES_PER_DAY: u32 = 1440;

/// The five daily prayers, in the order they occur.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, EnumIter,
)]
pub enum PrayerName {
    #[serde(alias = "fajr")]
    Fajr,
    #[serde(alias = "dhuhr", alias = "zuhr")]
    Dhuhr,
    #[serde(alias = "asr")]
    Asr,
    #[serde(alias = "maghrib")]
    Maghrib,
    #[serde(alias = "isha")]
    Isha,
}

impl PrayerName {
    pub const ALL: [PrayerName; 5] = [
        PrayerName::Fajr,
        PrayerName::Dhuhr,
        PrayerName::Asr,
        PrayerName::Maghrib,
        PrayerName::Isha,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            PrayerName::Fajr => "Fajr",
            PrayerName::Dhuhr => "Dhuhr",
            PrayerName::Asr => "Asr",
            PrayerName::Maghrib => "Maghrib",
            PrayerName::Isha => "Isha",
        }
    }

    /// Case-insensitive lookup used by the CLI (`asr.lead=10`).
    pub fn from_label(s: &str) -> Option<Self> {
        let needle = s.trim().to_lowercase();
        if needle == "zuhr" {
            return Some(PrayerName::Dhuhr);
        }
        PrayerName::iter().find(|p| p.label().to_lowercase() == needle)
    }
}

impl fmt::Display for PrayerName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// One scheduled prayer on a given day. Immutable once produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrayerEvent {
    pub name: PrayerName,
    pub time: NaiveTime,
    pub label: String,
}

impl PrayerEvent {
    pub fn new(name: PrayerName, time: NaiveTime) -> Self {
        // Minute granularity: seconds never take part in tick comparisons.
        let time = NaiveTime::from_hms_opt(time.hour(), time.minute(), 0).unwrap_or(time);
        Self {
            name,
            time,
            label: name.label().to_string(),
        }
    }

    pub fn minute_of_day(&self) -> u32 {
        minute_of_day(self.time)
    }
}

pub fn minute_of_day(time: NaiveTime) -> u32 {
    time.hour() * 60 + time.minute()
}

/// Parses "HH:MM" (24h). Used by the fallback table and timetable files.
pub fn parse_hhmm(s: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(s.trim(), "%H:%M").ok()
}

/// Latitude/longitude pair the schedule was derived for.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinates {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Coordinates rounded to 0.01 degree (about 1 km), for cache keys.
    pub fn rounded_key(&self) -> (i32, i32) {
        (
            (self.latitude * 100.0).round() as i32,
            (self.longitude * 100.0).round() as i32,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_label_is_case_insensitive() {
        assert_eq!(PrayerName::from_label("ASR"), Some(PrayerName::Asr));
        assert_eq!(PrayerName::from_label(" maghrib "), Some(PrayerName::Maghrib));
        assert_eq!(PrayerName::from_label("zuhr"), Some(PrayerName::Dhuhr));
        assert_eq!(PrayerName::from_label("tahajjud"), None);
    }

    #[test]
    fn test_event_drops_seconds() {
        let t = NaiveTime::from_hms_opt(15, 45, 59).unwrap();
        let ev = PrayerEvent::new(PrayerName::Asr, t);
        assert_eq!(ev.minute_of_day(), 15 * 60 + 45);
        assert_eq!(ev.time, NaiveTime::from_hms_opt(15, 45, 0).unwrap());
    }

    #[test]
    fn test_rounded_key_tolerates_gps_jitter() {
        let a = Coordinates::new(51.50721, -0.12758);
        let b = Coordinates::new(51.50699, -0.12801);
        assert_eq!(a.rounded_key(), b.rounded_key());
        assert_ne!(a.rounded_key(), Coordinates::new(51.6, -0.12).rounded_key());
    }
}
