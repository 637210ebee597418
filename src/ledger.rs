// File: ./src/ledger.rs
// Tracks which (date, prayer, lead) reminders have already fired today.
use crate::model::PrayerName;
use chrono::NaiveDate;
use std::collections::HashSet;

/// Lead value used for the exact-time ("it's time for ...") alert.
pub const EXACT_TIME_LEAD: u32 = 0;

/// In-memory set of fired reminders scoped to a single date.
///
/// Entries of earlier dates are dropped the first time any operation sees a
/// different date, so no background sweep is needed.
#[derive(Debug, Default, Clone)]
pub struct FiredLedger {
    date: Option<NaiveDate>,
    fired: HashSet<(PrayerName, u32)>,
}

impl FiredLedger {
    pub fn new() -> Self {
        Self::default()
    }

    fn observe(&mut self, date: NaiveDate) {
        if self.date != Some(date) {
            if let Some(old) = self.date
                && !self.fired.is_empty()
            {
                log::debug!(
                    "Ledger rolled from {} to {}, dropping {} entries",
                    old,
                    date,
                    self.fired.len()
                );
            }
            self.fired.clear();
            self.date = Some(date);
        }
    }

    pub fn has_fired(&mut self, date: NaiveDate, event: PrayerName, lead: u32) -> bool {
        self.observe(date);
        self.fired.contains(&(event, lead))
    }

    /// Records the tuple. Returns `false` when it was already present.
    pub fn mark_fired(&mut self, date: NaiveDate, event: PrayerName, lead: u32) -> bool {
        self.observe(date);
        self.fired.insert((event, lead))
    }

    pub fn date(&self) -> Option<NaiveDate> {
        self.date
    }

    pub fn len(&self) -> usize {
        self.fired.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fired.is_empty()
    }

    /// Entries for the current date, sorted for stable output.
    pub fn entries(&self) -> Vec<(NaiveDate, PrayerName, u32)> {
        let Some(date) = self.date else {
            return Vec::new();
        };
        let mut out: Vec<_> = self.fired.iter().map(|(e, l)| (date, *e, *l)).collect();
        out.sort();
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 5, d).unwrap()
    }

    #[test]
    fn test_mark_then_has_fired() {
        let mut ledger = FiredLedger::new();
        assert!(!ledger.has_fired(day(1), PrayerName::Asr, 15));
        assert!(ledger.mark_fired(day(1), PrayerName::Asr, 15));
        assert!(ledger.has_fired(day(1), PrayerName::Asr, 15));
        // Different lead is a different tuple.
        assert!(!ledger.has_fired(day(1), PrayerName::Asr, EXACT_TIME_LEAD));
        assert!(!ledger.mark_fired(day(1), PrayerName::Asr, 15));
    }

    #[test]
    fn test_date_change_drops_previous_entries() {
        let mut ledger = FiredLedger::new();
        ledger.mark_fired(day(1), PrayerName::Fajr, 15);
        ledger.mark_fired(day(1), PrayerName::Fajr, 0);
        assert_eq!(ledger.len(), 2);

        assert!(!ledger.has_fired(day(2), PrayerName::Fajr, 15));
        assert_eq!(ledger.date(), Some(day(2)));
        assert!(ledger.is_empty());
    }

    #[test]
    fn test_entries_are_sorted() {
        let mut ledger = FiredLedger::new();
        ledger.mark_fired(day(3), PrayerName::Isha, 0);
        ledger.mark_fired(day(3), PrayerName::Asr, 15);
        ledger.mark_fired(day(3), PrayerName::Asr, 0);
        assert_eq!(
            ledger.entries(),
            vec![
                (day(3), PrayerName::Asr, 0),
                (day(3), PrayerName::Asr, 15),
                (day(3), PrayerName::Isha, 0),
            ]
        );
    }
}
