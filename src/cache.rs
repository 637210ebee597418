// File: ./src/cache.rs
// Schedule cache keyed by (date, rounded coordinates).
//
// Lookups never block the scheduler when background fetching is on: a refresh is
// started with `request_refresh` and adopted by `poll_refresh` once it resolves.
// Until then `best_available` serves the cached, last-known-good or fallback
// schedule, in that order.
use crate::error::{EngineError, EngineResult};
use crate::model::{Coordinates, DailySchedule, ScheduleSource};
use crate::provider::ScheduleProvider;
use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::oneshot;

type CacheKey = (NaiveDate, (i32, i32));

fn key_for(date: NaiveDate, coords: Coordinates) -> CacheKey {
    (date, coords.rounded_key())
}

struct PendingFetch {
    key: CacheKey,
    rx: oneshot::Receiver<EngineResult<DailySchedule>>,
}

pub struct ScheduleCache {
    provider: Arc<dyn ScheduleProvider>,
    fallback_times: [NaiveTime; 5],
    entries: HashMap<CacheKey, DailySchedule>,
    last_good: Option<DailySchedule>,
    pending: Option<PendingFetch>,
    /// Key and time of the last failed fetch, used to throttle retries.
    last_failure: Option<(CacheKey, NaiveDateTime)>,
    retry_after: Duration,
    background: bool,
}

impl ScheduleCache {
    pub fn new(
        provider: Arc<dyn ScheduleProvider>,
        fallback_times: [NaiveTime; 5],
        retry_after_minutes: u32,
    ) -> Self {
        Self {
            provider,
            fallback_times,
            entries: HashMap::new(),
            last_good: None,
            pending: None,
            last_failure: None,
            retry_after: Duration::minutes(retry_after_minutes as i64),
            background: false,
        }
    }

    /// Run refreshes on tokio's blocking pool instead of inline.
    /// Requires a tokio runtime when `request_refresh` is called.
    pub fn set_background(&mut self, background: bool) {
        self.background = background;
    }

    fn evict_before(&mut self, date: NaiveDate) {
        let before = self.entries.len();
        self.entries.retain(|k, _| k.0 >= date);
        if self.entries.len() != before {
            log::debug!("Evicted {} stale schedule(s)", before - self.entries.len());
        }
    }

    fn store(&mut self, key: CacheKey, schedule: DailySchedule) {
        if self.last_failure.is_some_and(|(k, _)| k == key) {
            self.last_failure = None;
        }
        self.last_good = Some(schedule.clone());
        self.entries.insert(key, schedule);
    }

    /// Returns the schedule for `date` at `coords`, fetching synchronously on a miss.
    ///
    /// On failure the caller substitutes `best_available`.
    pub fn get_schedule(
        &mut self,
        date: NaiveDate,
        coords: Coordinates,
    ) -> EngineResult<DailySchedule> {
        self.evict_before(date);
        let key = key_for(date, coords);
        if let Some(s) = self.entries.get(&key) {
            return Ok(s.clone());
        }

        match self
            .provider
            .fetch_schedule(date, coords)
            .and_then(|s| matching_date(date, s))
        {
            Ok(s) => {
                self.store(key, s.clone());
                Ok(s)
            }
            Err(e) => {
                log::warn!("Schedule fetch failed: {}", e);
                Err(as_unavailable(date, e))
            }
        }
    }

    pub fn contains(&self, date: NaiveDate, coords: Coordinates) -> bool {
        self.entries.contains_key(&key_for(date, coords))
    }

    pub fn is_refreshing(&self) -> bool {
        self.pending.is_some()
    }

    /// Starts a fetch for (date, coords) unless it is cached, already in flight,
    /// or failed less than the retry interval ago.
    ///
    /// Inline mode fetches immediately; background mode hands the provider to
    /// `spawn_blocking` and returns at once.
    pub fn request_refresh(&mut self, date: NaiveDate, coords: Coordinates, now: NaiveDateTime) {
        self.evict_before(date);
        let key = key_for(date, coords);
        if self.entries.contains_key(&key) {
            return;
        }
        if self.pending.as_ref().is_some_and(|p| p.key == key) {
            return;
        }
        if let Some((failed_key, at)) = self.last_failure
            && failed_key == key
            && now - at < self.retry_after
        {
            return;
        }

        if !self.background {
            if let Err(e) = self.get_schedule(date, coords) {
                self.last_failure = Some((key, now));
                log::info!("Using best available schedule: {}", e);
            }
            return;
        }

        // A newer request supersedes one for an outdated key; its result is dropped.
        let (tx, rx) = oneshot::channel();
        let provider = self.provider.clone();
        tokio::task::spawn_blocking(move || {
            let _ = tx.send(provider.fetch_schedule(date, coords));
        });
        self.pending = Some(PendingFetch { key, rx });
        // Recorded up front so a slow provider is not hammered every tick.
        self.last_failure = Some((key, now));
        log::debug!("Schedule refresh started for {}", date);
    }

    /// Adopts a finished background fetch. Returns true when a new schedule landed.
    pub fn poll_refresh(&mut self) -> bool {
        let Some(mut pending) = self.pending.take() else {
            return false;
        };
        let date = pending.key.0;
        match pending.rx.try_recv() {
            Ok(Ok(schedule)) if schedule.date() != date => {
                log::warn!(
                    "Schedule refresh failed: {}",
                    wrong_date(date, schedule.date())
                );
                false
            }
            Ok(Ok(schedule)) => {
                log::info!("Schedule refreshed for {}", schedule.date());
                self.store(pending.key, schedule);
                true
            }
            Ok(Err(e)) => {
                log::warn!("Schedule refresh failed: {}", e);
                false
            }
            Err(oneshot::error::TryRecvError::Empty) => {
                self.pending = Some(pending);
                false
            }
            Err(oneshot::error::TryRecvError::Closed) => {
                log::warn!("Schedule refresh was abandoned");
                false
            }
        }
    }

    /// Best schedule for `date`: cached, then last-known-good re-tagged for `date`,
    /// then the hard-coded fallback.
    pub fn best_available(&mut self, date: NaiveDate, coords: Coordinates) -> DailySchedule {
        self.evict_before(date);
        if let Some(s) = self.entries.get(&key_for(date, coords)) {
            return s.clone();
        }
        if let Some(last) = &self.last_good {
            return last.reassigned(date, ScheduleSource::LastKnownGood);
        }
        DailySchedule::fallback(date, coords, self.fallback_times)
    }
}

fn wrong_date(requested: NaiveDate, got: NaiveDate) -> EngineError {
    EngineError::schedule_unavailable(requested, format!("provider returned schedule for {}", got))
}

/// A schedule for another day must not be cached under `date`.
fn matching_date(date: NaiveDate, schedule: DailySchedule) -> EngineResult<DailySchedule> {
    if schedule.date() == date {
        Ok(schedule)
    } else {
        Err(wrong_date(date, schedule.date()))
    }
}

fn as_unavailable(date: NaiveDate, e: EngineError) -> EngineError {
    match e {
        EngineError::ScheduleUnavailable { .. } => e,
        other => EngineError::schedule_unavailable(date, other.to_string()),
    }
}
