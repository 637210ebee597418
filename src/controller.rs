// File: src/controller.rs
//! Central engine for reminder operations.
//! This is the single owner of the policy store, schedule cache, dispatcher and
//! scheduler. Front-ends (the CLI, the background actor in `system`) must go
//! through it so that ticks, policy updates and permission requests are applied
//! one at a time and in order.
use crate::cache::ScheduleCache;
use crate::config::{Config, NotifierKind};
use crate::context::SharedContext;
use crate::dispatcher::{DispatchOutcome, NotificationDispatcher};
use crate::error::EngineResult;
use crate::ledger::FiredLedger;
use crate::model::prayer::minute_of_day;
use crate::model::{
    Coordinates, DailySchedule, NextEvent, ReminderPolicy, ReminderPolicyPatch, ScheduleSource,
};
use crate::provider::{FixedScheduleProvider, ScheduleProvider, TimetableProvider};
use crate::scheduler::{Deadline, ReminderScheduler, SchedulerState, TickReport, next_deadline};
use crate::sink::{LogSink, NotificationSink, PermissionState};
use crate::store::PolicyStore;
use crate::wake_index::WakeIndex;
use chrono::{Local, NaiveDateTime};
use serde::Serialize;
use std::sync::Arc;

/// Read-only view of the engine, published after every tick and command.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct EngineSnapshot {
    pub state: SchedulerState,
    pub next_event: Option<NextEvent>,
    pub countdown: String,
    /// The schedule in use did not come from the provider for today.
    pub degraded: bool,
    pub schedule_source: Option<ScheduleSource>,
    pub schedule: Option<DailySchedule>,
    pub permission: PermissionState,
    pub policy: ReminderPolicy,
    pub persist_pending: bool,
}

/// Picks the schedule provider named by the configuration.
pub fn provider_from_config(config: &Config) -> Arc<dyn ScheduleProvider> {
    match &config.timetable_path {
        Some(path) => Arc::new(TimetableProvider::new(path.clone())),
        None => Arc::new(FixedScheduleProvider::new(config.fallback.times())),
    }
}

/// Builds the notification sink for `kind`.
/// Without the `desktop` feature desktop notifications degrade to the log.
pub fn sink_for(kind: NotifierKind) -> Box<dyn NotificationSink> {
    match kind {
        #[cfg(feature = "desktop")]
        NotifierKind::Desktop => Box::new(crate::sink::DesktopSink::new()),
        #[cfg(not(feature = "desktop"))]
        NotifierKind::Desktop => {
            log::warn!("Built without desktop notifications, logging reminders instead");
            Box::new(LogSink)
        }
        NotifierKind::Log => Box::new(LogSink),
    }
}

pub struct ReminderEngine {
    ctx: SharedContext,
    coords: Coordinates,
    write_wake_index: bool,
    store: PolicyStore,
    cache: ScheduleCache,
    dispatcher: NotificationDispatcher,
    scheduler: ReminderScheduler,
    schedule: Option<DailySchedule>,
    /// Set when the schedule or policy changed since the wake index was written.
    index_stale: bool,
}

impl ReminderEngine {
    pub fn new(
        ctx: SharedContext,
        config: &Config,
        provider: Arc<dyn ScheduleProvider>,
        sink: Box<dyn NotificationSink>,
    ) -> Self {
        let store = PolicyStore::open(ctx.clone());
        let cache = ScheduleCache::new(
            provider,
            config.fallback.times(),
            config.refresh_retry_minutes,
        );
        let dispatcher = NotificationDispatcher::new(sink);
        let mut scheduler = ReminderScheduler::new();
        scheduler.sync_state(store.policy(), false);

        Self {
            ctx,
            coords: config.coordinates(),
            write_wake_index: config.write_wake_index,
            store,
            cache,
            dispatcher,
            scheduler,
            schedule: None,
            index_stale: true,
        }
    }

    /// Provider and sink both chosen from `config`.
    pub fn from_config(ctx: SharedContext, config: &Config) -> Self {
        let provider = provider_from_config(config);
        let sink = sink_for(config.notifier);
        Self::new(ctx, config, provider, sink)
    }

    /// Fetch schedules on tokio's blocking pool. Needs a running runtime.
    pub fn set_background_fetch(&mut self, background: bool) {
        self.cache.set_background(background);
    }

    /// Evaluates the current minute of local wall-clock time.
    pub fn tick(&mut self) -> TickReport {
        self.tick_at(Local::now().naive_local())
    }

    /// One tick at `now`.
    ///
    /// Never blocks on the provider in background mode: a stale or missing
    /// schedule triggers a refresh and this tick runs on the best one available.
    pub fn tick_at(&mut self, now: NaiveDateTime) -> TickReport {
        self.load_schedule(now);

        let report = self.scheduler.evaluate(
            now,
            self.schedule.as_ref(),
            self.store.policy(),
            &mut self.dispatcher,
        );

        if self.index_stale {
            self.refresh_wake_index(now);
        }
        report
    }

    fn load_schedule(&mut self, now: NaiveDateTime) {
        if self.cache.poll_refresh() {
            self.index_stale = true;
        }

        let today = now.date();
        if !self.cache.contains(today, self.coords) {
            self.cache.request_refresh(today, self.coords, now);
        }
        let schedule = self.cache.best_available(today, self.coords);
        self.adopt(schedule);
    }

    /// The upcoming prayer at `now`, loading the schedule if needed.
    /// Unlike a tick this never fires reminders.
    pub fn preview_at(&mut self, now: NaiveDateTime) -> Option<NextEvent> {
        self.load_schedule(now);
        let schedule = self.schedule.as_ref()?;
        Some(schedule.next_event(minute_of_day(now.time())))
    }

    fn adopt(&mut self, schedule: DailySchedule) {
        if self.schedule.as_ref() == Some(&schedule) {
            return;
        }
        let was_degraded = self.is_degraded();
        if schedule.source().is_degraded() && !was_degraded {
            log::warn!(
                "Using {:?} schedule for {}",
                schedule.source(),
                schedule.date()
            );
        } else if !schedule.source().is_degraded() && was_degraded {
            log::info!("Provider schedule restored for {}", schedule.date());
        }
        self.schedule = Some(schedule);
        self.index_stale = true;
    }

    fn refresh_wake_index(&mut self, now: NaiveDateTime) {
        self.index_stale = false;
        if !self.write_wake_index {
            return;
        }
        let Some(schedule) = &self.schedule else {
            return;
        };
        let index = WakeIndex::rebuild(now, schedule, self.store.policy());
        if let Err(e) = index.save(self.ctx.as_ref()) {
            log::warn!("Failed to write wake index: {:#}", e);
        }
    }

    pub fn next_event(&self) -> Option<NextEvent> {
        self.scheduler.next_event().cloned()
    }

    pub fn countdown_text(&self) -> String {
        self.scheduler.countdown_text().to_string()
    }

    pub fn state(&self) -> SchedulerState {
        self.scheduler.state()
    }

    pub fn ledger(&self) -> &FiredLedger {
        self.scheduler.ledger()
    }

    pub fn policy(&self) -> ReminderPolicy {
        self.store.policy().clone()
    }

    pub fn schedule(&self) -> Option<&DailySchedule> {
        self.schedule.as_ref()
    }

    pub fn is_degraded(&self) -> bool {
        self.schedule
            .as_ref()
            .is_some_and(|s| s.source().is_degraded())
    }

    pub fn permission(&self) -> PermissionState {
        self.dispatcher.permission()
    }

    /// Merges `patch` into the policy and persists it.
    ///
    /// The new policy takes effect at the next tick; nothing fires here.
    pub fn update_policy(&mut self, patch: &ReminderPolicyPatch) -> EngineResult<ReminderPolicy> {
        let policy = self.store.update(patch)?;
        self.scheduler
            .sync_state(&policy, self.schedule.is_some());
        self.index_stale = true;
        log::info!(
            "Reminder policy updated (enabled: {}, lead: {} min)",
            policy.enabled,
            policy.default_lead_minutes
        );
        Ok(policy)
    }

    pub fn request_permission(&mut self) -> PermissionState {
        self.dispatcher.request_permission()
    }

    /// Sends a sample reminder for the upcoming prayer, bypassing the ledger.
    pub fn trigger_test_notification(&mut self) -> DispatchOutcome {
        self.trigger_test_notification_at(Local::now().naive_local())
    }

    pub fn trigger_test_notification_at(&mut self, now: NaiveDateTime) -> DispatchOutcome {
        let schedule = match &self.schedule {
            Some(s) if s.date() == now.date() => s.clone(),
            _ => self.cache.best_available(now.date(), self.coords),
        };
        let next = schedule.next_event(minute_of_day(now.time()));
        let policy = self.store.policy();
        let lead = policy
            .effective_lead(next.name)
            .unwrap_or(policy.default_lead_minutes);
        self.dispatcher
            .dispatch_test(schedule.event(next.name), lead, policy)
    }

    /// Switches location. The next tick fetches the schedule for the new key.
    pub fn set_coordinates(&mut self, coords: Coordinates) {
        if coords.rounded_key() != self.coords.rounded_key() {
            log::info!(
                "Location changed to {:.2}, {:.2}",
                coords.latitude,
                coords.longitude
            );
        }
        self.coords = coords;
    }

    pub fn coordinates(&self) -> Coordinates {
        self.coords
    }

    /// Earliest reminder deadline after `now`, used to wake up on time.
    pub fn next_deadline(&self, now: NaiveDateTime) -> Option<Deadline> {
        let schedule = self.schedule.as_ref()?;
        next_deadline(now, schedule, self.store.policy())
    }

    pub fn snapshot(&self) -> EngineSnapshot {
        EngineSnapshot {
            state: self.scheduler.state(),
            next_event: self.next_event(),
            countdown: self.countdown_text(),
            degraded: self.is_degraded(),
            schedule_source: self.schedule.as_ref().map(|s| s.source()),
            schedule: self.schedule.clone(),
            permission: self.dispatcher.permission(),
            policy: self.policy(),
            persist_pending: self.store.persist_pending(),
        }
    }
}
