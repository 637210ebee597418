// File: ./src/scheduler.rs
//! The reminder state machine.
//!
//! `evaluate` is one tick: it finds the next prayer, fires the lead-time reminder
//! when `minutes_until` equals the resolved lead, fires the exact-time alert for
//! any prayer due this minute, and refreshes the countdown. Every dispatch is
//! preceded by a ledger entry, so re-running the same minute is harmless.
//!
//! Minutes skipped while the host slept are not replayed.
use crate::dispatcher::{DispatchOutcome, NotificationDispatcher};
use crate::ledger::{EXACT_TIME_LEAD, FiredLedger};
use crate::model::prayer::minute_of_day;
use crate::model::{CountdownDisplay, DailySchedule, NextEvent, PrayerEvent, PrayerName, ReminderPolicy};
use chrono::{Days, Duration, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use std::collections::BinaryHeap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SchedulerState {
    /// Reminders disabled or no schedule to work with.
    #[default]
    Idle,
    /// Enabled with a schedule, waiting for the next tick.
    Armed,
    /// Inside a tick.
    Evaluating,
}

/// A reminder the tick attempted, with what the dispatcher made of it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FiredReminder {
    pub date: NaiveDate,
    pub event: PrayerName,
    pub lead_minutes: u32,
    pub outcome: DispatchOutcome,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TickReport {
    pub state: SchedulerState,
    pub next: Option<NextEvent>,
    pub fired: Vec<FiredReminder>,
}

/// An instant at which a reminder (lead > 0) or exact-time alert (lead 0) is due.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Deadline {
    pub at: NaiveDateTime,
    pub event: PrayerName,
    pub lead_minutes: u32,
}

#[derive(Debug, Default)]
pub struct ReminderScheduler {
    ledger: FiredLedger,
    state: SchedulerState,
    next: Option<NextEvent>,
    countdown: String,
}

impl ReminderScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> SchedulerState {
        self.state
    }

    pub fn next_event(&self) -> Option<&NextEvent> {
        self.next.as_ref()
    }

    pub fn countdown_text(&self) -> &str {
        &self.countdown
    }

    pub fn ledger(&self) -> &FiredLedger {
        &self.ledger
    }

    /// Moves between `Idle` and `Armed` after a policy or schedule change.
    /// The next tick does the actual evaluation.
    pub fn sync_state(&mut self, policy: &ReminderPolicy, has_schedule: bool) {
        let target = if policy.enabled && has_schedule {
            SchedulerState::Armed
        } else {
            SchedulerState::Idle
        };
        if target != self.state {
            log::debug!("Scheduler {:?} -> {:?}", self.state, target);
            self.state = target;
        }
    }

    fn publish(&mut self, next: Option<NextEvent>) {
        self.countdown = next
            .as_ref()
            .map(|n| n.countdown_text())
            .unwrap_or_default();
        self.next = next;
    }

    /// One tick at wall-clock `now`.
    pub fn evaluate(
        &mut self,
        now: NaiveDateTime,
        schedule: Option<&DailySchedule>,
        policy: &ReminderPolicy,
        dispatcher: &mut NotificationDispatcher,
    ) -> TickReport {
        let Some(schedule) = schedule else {
            self.state = SchedulerState::Idle;
            self.publish(None);
            return TickReport::default();
        };

        let now_minute = minute_of_day(now.time());
        let next = schedule.next_event(now_minute);
        // The countdown is informational and stays current even with reminders off.
        self.publish(Some(next.clone()));

        if !policy.enabled {
            self.state = SchedulerState::Idle;
            return TickReport {
                state: self.state,
                next: Some(next),
                fired: Vec::new(),
            };
        }

        self.state = SchedulerState::Evaluating;
        let date = now.date();
        let mut fired = Vec::new();

        if let Some(lead) = policy.effective_lead(next.name)
            && next.minutes_until == lead
        {
            let event = schedule.event(next.name);
            if let Some(r) = self.fire(date, event, lead, policy, dispatcher) {
                fired.push(r);
            }
        }

        // Exact-time alerts ignore per-prayer reminder toggles: they mark the
        // prayer itself, not a reminder before it.
        for event in schedule.due_at(now_minute) {
            if let Some(r) = self.fire(date, event, EXACT_TIME_LEAD, policy, dispatcher) {
                fired.push(r);
            }
        }

        self.state = SchedulerState::Armed;
        TickReport {
            state: self.state,
            next: Some(next),
            fired,
        }
    }

    fn fire(
        &mut self,
        date: NaiveDate,
        event: &PrayerEvent,
        lead: u32,
        policy: &ReminderPolicy,
        dispatcher: &mut NotificationDispatcher,
    ) -> Option<FiredReminder> {
        if self.ledger.has_fired(date, event.name, lead) {
            return None;
        }
        // Recorded before dispatching, and kept even if dispatch fails, so a
        // denied permission cannot turn into one failed attempt per tick.
        self.ledger.mark_fired(date, event.name, lead);
        let outcome = dispatcher.dispatch(event, lead, policy);
        log::info!(
            "{} reminder for {} ({} min): {:?}",
            date,
            event.name,
            lead,
            outcome
        );
        Some(FiredReminder {
            date,
            event: event.name,
            lead_minutes: lead,
            outcome,
        })
    }
}

/// Deadlines after `now` and no later than `now + horizon`, earliest first.
///
/// Today's times are reused for tomorrow, matching how the tick treats
/// tomorrow's Fajr.
pub fn upcoming_deadlines(
    now: NaiveDateTime,
    schedule: &DailySchedule,
    policy: &ReminderPolicy,
    horizon: Duration,
) -> Vec<Deadline> {
    if !policy.enabled {
        return Vec::new();
    }
    let today = now.date();
    let until = now + horizon;
    let mut heap = BinaryHeap::new();

    for date in [Some(today), today.checked_add_days(Days::new(1))]
        .into_iter()
        .flatten()
    {
        for event in schedule.events() {
            let at = date.and_time(event.time);
            let mut push = |at: NaiveDateTime, lead_minutes: u32| {
                if at > now && at <= until {
                    heap.push(Reverse(Deadline {
                        at,
                        event: event.name,
                        lead_minutes,
                    }));
                }
            };
            push(at, EXACT_TIME_LEAD);
            if let Some(lead) = policy.effective_lead(event.name)
                && lead > 0
            {
                push(at - Duration::minutes(lead as i64), lead);
            }
        }
    }

    let mut out = Vec::with_capacity(heap.len());
    while let Some(Reverse(d)) = heap.pop() {
        out.push(d);
    }
    out
}

/// The earliest deadline after `now`, if any within the next two days.
pub fn next_deadline(
    now: NaiveDateTime,
    schedule: &DailySchedule,
    policy: &ReminderPolicy,
) -> Option<Deadline> {
    upcoming_deadlines(now, schedule, policy, Duration::days(2))
        .into_iter()
        .next()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::prayer::parse_hhmm;
    use crate::model::{Coordinates, ScheduleSource};
    use crate::sink::RecordingSink;

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 4, 2).unwrap()
    }

    fn at(hh: u32, mm: u32) -> NaiveDateTime {
        day().and_hms_opt(hh, mm, 0).unwrap()
    }

    fn schedule() -> DailySchedule {
        let times = ["05:30", "12:15", "15:45", "18:00", "19:30"].map(|t| parse_hhmm(t).unwrap());
        DailySchedule::from_times(day(), Coordinates::default(), ScheduleSource::Provider, times)
            .unwrap()
    }

    fn enabled() -> ReminderPolicy {
        ReminderPolicy {
            enabled: true,
            ..ReminderPolicy::default()
        }
    }

    #[test]
    fn test_no_schedule_is_idle() {
        let sink = RecordingSink::granted();
        let mut d = NotificationDispatcher::new(Box::new(sink.clone()));
        let mut s = ReminderScheduler::new();
        let report = s.evaluate(at(15, 30), None, &enabled(), &mut d);
        assert_eq!(report.state, SchedulerState::Idle);
        assert!(report.next.is_none());
        assert!(sink.shown().is_empty());
    }

    #[test]
    fn test_disabled_policy_still_updates_countdown() {
        let sink = RecordingSink::granted();
        let mut d = NotificationDispatcher::new(Box::new(sink.clone()));
        let mut s = ReminderScheduler::new();
        let report = s.evaluate(at(15, 45), Some(&schedule()), &ReminderPolicy::default(), &mut d);
        assert_eq!(report.state, SchedulerState::Idle);
        assert!(report.fired.is_empty());
        assert_eq!(s.next_event().map(|n| n.name), Some(PrayerName::Maghrib));
        assert_eq!(s.countdown_text(), "Maghrib in 2h 15m (18:00)");
        assert!(sink.shown().is_empty());
    }

    #[test]
    fn test_evaluating_returns_to_armed() {
        let sink = RecordingSink::granted();
        let mut d = NotificationDispatcher::new(Box::new(sink));
        let mut s = ReminderScheduler::new();
        let report = s.evaluate(at(9, 0), Some(&schedule()), &enabled(), &mut d);
        assert_eq!(report.state, SchedulerState::Armed);
        assert_eq!(s.state(), SchedulerState::Armed);

        s.sync_state(&ReminderPolicy::default(), true);
        assert_eq!(s.state(), SchedulerState::Idle);
    }

    #[test]
    fn test_deadlines_are_ordered_and_bounded() {
        let list = upcoming_deadlines(at(15, 0), &schedule(), &enabled(), Duration::hours(24));
        assert!(list.windows(2).all(|w| w[0].at <= w[1].at));
        assert_eq!(
            list.first().copied(),
            Some(Deadline {
                at: at(15, 30),
                event: PrayerName::Asr,
                lead_minutes: 15
            })
        );
        assert!(list.iter().all(|d| d.at > at(15, 0) && d.at <= at(15, 0) + Duration::hours(24)));
        // Tomorrow's Fajr lead (05:15) and exact (05:30) are inside the horizon.
        let tomorrow = day().succ_opt().unwrap();
        assert!(list.contains(&Deadline {
            at: tomorrow.and_hms_opt(5, 15, 0).unwrap(),
            event: PrayerName::Fajr,
            lead_minutes: 15
        }));
    }

    #[test]
    fn test_next_deadline_after_isha_wraps() {
        let next = next_deadline(at(23, 0), &schedule(), &enabled()).unwrap();
        assert_eq!(next.event, PrayerName::Fajr);
        assert_eq!(next.lead_minutes, 15);
        assert_eq!(next.at, day().succ_opt().unwrap().and_hms_opt(5, 15, 0).unwrap());
    }

    #[test]
    fn test_no_deadlines_when_disabled() {
        assert!(next_deadline(at(9, 0), &schedule(), &ReminderPolicy::default()).is_none());
    }
}
