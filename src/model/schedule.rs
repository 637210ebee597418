// File: ./src/model/schedule.rs
use crate::error::{EngineError, EngineResult};
use crate::model::prayer::{Coordinates, MINUTES_PER_DAY, PrayerEvent, PrayerName};
use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};

/// Where a schedule came from. Anything other than `Provider` is shown to the
/// user as "schedule unavailable, showing fallback times".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ScheduleSource {
    #[default]
    Provider,
    LastKnownGood,
    Fallback,
}

impl ScheduleSource {
    pub fn is_degraded(&self) -> bool {
        !matches!(self, ScheduleSource::Provider)
    }
}

/// Exactly five prayers for one calendar date, Fajr first, in non-decreasing time order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailySchedule {
    date: NaiveDate,
    coordinates: Coordinates,
    source: ScheduleSource,
    events: [PrayerEvent; 5],
}

/// The upcoming prayer relative to some `now`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NextEvent {
    pub name: PrayerName,
    pub time: NaiveTime,
    pub minutes_until: u32,
    /// True when every prayer of today has passed and this is tomorrow's Fajr.
    pub is_tomorrow: bool,
}

impl DailySchedule {
    /// Builds a schedule from five times given in Fajr..Isha order.
    pub fn from_times(
        date: NaiveDate,
        coordinates: Coordinates,
        source: ScheduleSource,
        times: [NaiveTime; 5],
    ) -> EngineResult<Self> {
        let events = PrayerName::ALL
            .map(|name| PrayerEvent::new(name, times[name as usize]));

        for pair in events.windows(2) {
            if pair[1].time < pair[0].time {
                return Err(EngineError::InvalidSchedule(format!(
                    "{} ({}) is earlier than {} ({}) on {}",
                    pair[1].name,
                    pair[1].time.format("%H:%M"),
                    pair[0].name,
                    pair[0].time.format("%H:%M"),
                    date
                )));
            }
        }

        Ok(Self {
            date,
            coordinates,
            source,
            events,
        })
    }

    /// Hard-coded schedule. Never fails: misordered times are sorted into place.
    pub fn fallback(date: NaiveDate, coordinates: Coordinates, mut times: [NaiveTime; 5]) -> Self {
        if times.windows(2).any(|w| w[1] < w[0]) {
            log::warn!("Fallback prayer times are out of order, sorting them");
            times.sort();
        }
        Self {
            date,
            coordinates,
            source: ScheduleSource::Fallback,
            events: PrayerName::ALL.map(|name| PrayerEvent::new(name, times[name as usize])),
        }
    }

    pub fn date(&self) -> NaiveDate {
        self.date
    }

    pub fn coordinates(&self) -> Coordinates {
        self.coordinates
    }

    pub fn source(&self) -> ScheduleSource {
        self.source
    }

    pub fn events(&self) -> &[PrayerEvent; 5] {
        &self.events
    }

    pub fn event(&self, name: PrayerName) -> &PrayerEvent {
        &self.events[name as usize]
    }

    pub fn fajr(&self) -> &PrayerEvent {
        self.event(PrayerName::Fajr)
    }

    /// Re-tags the same times for another date, e.g. when yesterday's schedule is
    /// all we have after midnight.
    pub fn reassigned(&self, date: NaiveDate, source: ScheduleSource) -> Self {
        Self {
            date,
            coordinates: self.coordinates,
            source,
            events: self.events.clone(),
        }
    }

    /// The first event strictly after `now_minute`, or tomorrow's Fajr.
    ///
    /// Tomorrow's Fajr is approximated with today's Fajr time.
    pub fn next_event(&self, now_minute: u32) -> NextEvent {
        let now_minute = now_minute.min(MINUTES_PER_DAY - 1);

        if let Some(ev) = self.events.iter().find(|e| e.minute_of_day() > now_minute) {
            return NextEvent {
                name: ev.name,
                time: ev.time,
                minutes_until: ev.minute_of_day() - now_minute,
                is_tomorrow: false,
            };
        }

        let fajr = self.fajr();
        NextEvent {
            name: fajr.name,
            time: fajr.time,
            minutes_until: (MINUTES_PER_DAY - now_minute) + fajr.minute_of_day(),
            is_tomorrow: true,
        }
    }

    /// Events whose scheduled minute is exactly `now_minute`.
    pub fn due_at(&self, now_minute: u32) -> impl Iterator<Item = &PrayerEvent> {
        self.events
            .iter()
            .filter(move |e| e.minute_of_day() == now_minute)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::prayer::parse_hhmm;

    fn sample(times: [&str; 5]) -> DailySchedule {
        let date = NaiveDate::from_ymd_opt(2026, 3, 14).unwrap();
        DailySchedule::from_times(
            date,
            Coordinates::default(),
            ScheduleSource::Provider,
            times.map(|t| parse_hhmm(t).unwrap()),
        )
        .unwrap()
    }

    fn m(hh: u32, mm: u32) -> u32 {
        hh * 60 + mm
    }

    #[test]
    fn test_rejects_out_of_order_times() {
        let date = NaiveDate::from_ymd_opt(2026, 3, 14).unwrap();
        let times = ["05:30", "12:15", "11:00", "18:00", "19:30"].map(|t| parse_hhmm(t).unwrap());
        let err = DailySchedule::from_times(
            date,
            Coordinates::default(),
            ScheduleSource::Provider,
            times,
        )
        .unwrap_err();
        assert!(matches!(err, EngineError::InvalidSchedule(_)));
    }

    #[test]
    fn test_equal_adjacent_times_are_allowed() {
        let s = sample(["05:30", "12:15", "12:15", "18:00", "19:30"]);
        // Both Dhuhr and Asr are due at 12:15.
        let due: Vec<_> = s.due_at(m(12, 15)).map(|e| e.name).collect();
        assert_eq!(due, vec![PrayerName::Dhuhr, PrayerName::Asr]);
        // Strictly-greater scan skips both once 12:15 is reached.
        assert_eq!(s.next_event(m(12, 15)).name, PrayerName::Maghrib);
    }

    #[test]
    fn test_next_event_picks_smallest_strictly_greater_time() {
        let s = sample(["05:30", "12:15", "15:30", "18:00", "19:30"]);
        for now in 0..MINUTES_PER_DAY {
            let next = s.next_event(now);
            let expected = s.events().iter().find(|e| e.minute_of_day() > now);
            match expected {
                Some(ev) => {
                    assert_eq!(next.name, ev.name, "now={}", now);
                    assert_eq!(next.minutes_until, ev.minute_of_day() - now);
                    assert!(!next.is_tomorrow);
                }
                None => {
                    assert_eq!(next.name, PrayerName::Fajr, "now={}", now);
                    assert!(next.is_tomorrow);
                }
            }
            assert!(next.minutes_until > 0);
        }
    }

    #[test]
    fn test_rollover_wraps_across_midnight() {
        let s = sample(["05:30", "12:15", "15:30", "18:00", "19:30"]);
        // 10 minutes to midnight, then 330 to 05:30.
        let next = s.next_event(m(23, 50));
        assert_eq!(next.name, PrayerName::Fajr);
        assert_eq!(next.minutes_until, 340);
        assert!(next.is_tomorrow);

        // Exactly at Isha: Isha is no longer "next".
        let at_isha = s.next_event(m(19, 30));
        assert_eq!(at_isha.name, PrayerName::Fajr);
        assert_eq!(at_isha.minutes_until, 270 + 330);
    }

    #[test]
    fn test_before_fajr_is_same_day() {
        let s = sample(["05:30", "12:15", "15:30", "18:00", "19:30"]);
        let next = s.next_event(m(0, 0));
        assert_eq!(next.name, PrayerName::Fajr);
        assert_eq!(next.minutes_until, 330);
        assert!(!next.is_tomorrow);
    }

    #[test]
    fn test_fallback_sorts_misordered_times() {
        let date = NaiveDate::from_ymd_opt(2026, 3, 14).unwrap();
        let times = ["05:30", "15:30", "12:15", "18:00", "19:30"].map(|t| parse_hhmm(t).unwrap());
        let s = DailySchedule::fallback(date, Coordinates::default(), times);
        assert_eq!(s.source(), ScheduleSource::Fallback);
        assert_eq!(s.event(PrayerName::Dhuhr).minute_of_day(), m(12, 15));
        assert_eq!(s.event(PrayerName::Asr).minute_of_day(), m(15, 30));
    }

    #[test]
    fn test_reassigned_keeps_times() {
        let s = sample(["05:30", "12:15", "15:30", "18:00", "19:30"]);
        let tomorrow = s.date().succ_opt().unwrap();
        let r = s.reassigned(tomorrow, ScheduleSource::LastKnownGood);
        assert_eq!(r.date(), tomorrow);
        assert_eq!(r.events(), s.events());
        assert!(r.source().is_degraded());
    }
}
