// File: ./src/system.rs
//! Background reminder actor.
//!
//! The engine is moved into a single task; everything else talks to it through
//! an `EngineHandle`. Ticks and commands are handled one at a time, so a policy
//! update can never interleave with an evaluation.
use crate::controller::{EngineSnapshot, ReminderEngine};
use crate::dispatcher::DispatchOutcome;
use crate::model::{Coordinates, NextEvent, ReminderPolicy, ReminderPolicyPatch};
use crate::sink::PermissionState;
use anyhow::{Result, anyhow};
use chrono::Local;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{Duration, Instant, MissedTickBehavior, sleep_until};

/// Slack added to deadline wake-ups so the tick lands inside the due minute.
const WAKE_SLACK: Duration = Duration::from_millis(500);

#[derive(Debug)]
pub enum EngineCommand {
    UpdatePolicy(
        ReminderPolicyPatch,
        oneshot::Sender<crate::error::EngineResult<ReminderPolicy>>,
    ),
    RequestPermission(oneshot::Sender<PermissionState>),
    TriggerTest(oneshot::Sender<DispatchOutcome>),
    SetCoordinates(Coordinates),
    Snapshot(oneshot::Sender<EngineSnapshot>),
    Stop,
}

#[derive(Debug, Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineCommand>,
    snapshot: watch::Receiver<EngineSnapshot>,
}

/// Spawns the reminder actor. Must be called inside a tokio runtime.
///
/// The engine ticks every `tick`, and with `precise_wakeups` also right at the
/// next reminder deadline. Late ticks are skipped, never replayed.
pub fn spawn_engine(
    mut engine: ReminderEngine,
    tick: Duration,
    precise_wakeups: bool,
) -> (EngineHandle, JoinHandle<()>) {
    let (tx, mut rx) = mpsc::channel(16);
    let (snapshot_tx, snapshot_rx) = watch::channel(engine.snapshot());

    engine.set_background_fetch(true);

    let task = tokio::spawn(async move {
        let mut interval = tokio::time::interval(tick);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            let wake_at = if precise_wakeups {
                let now = Local::now().naive_local();
                engine.next_deadline(now).map(|d| {
                    let wait = (d.at - now).to_std().unwrap_or_default();
                    Instant::now() + wait + WAKE_SLACK
                })
            } else {
                None
            };

            // Ticks first: the very first tick runs before any queued command.
            tokio::select! {
                biased;
                _ = interval.tick() => {
                    engine.tick();
                }
                _ = sleep_until(wake_at.unwrap_or_else(Instant::now)), if wake_at.is_some() => {
                    log::debug!("Woke for reminder deadline");
                    engine.tick();
                }
                cmd = rx.recv() => {
                    match cmd {
                        None | Some(EngineCommand::Stop) => break,
                        Some(cmd) => handle_command(&mut engine, cmd),
                    }
                }
            }

            // Receivers may all be gone; the actor keeps running until stopped.
            let _ = snapshot_tx.send(engine.snapshot());
        }
        log::info!("Reminder engine stopped");
    });

    (
        EngineHandle {
            tx,
            snapshot: snapshot_rx,
        },
        task,
    )
}

fn handle_command(engine: &mut ReminderEngine, cmd: EngineCommand) {
    match cmd {
        EngineCommand::UpdatePolicy(patch, reply) => {
            let _ = reply.send(engine.update_policy(&patch));
        }
        EngineCommand::RequestPermission(reply) => {
            let _ = reply.send(engine.request_permission());
        }
        EngineCommand::TriggerTest(reply) => {
            let _ = reply.send(engine.trigger_test_notification());
        }
        EngineCommand::SetCoordinates(coords) => engine.set_coordinates(coords),
        EngineCommand::Snapshot(reply) => {
            let _ = reply.send(engine.snapshot());
        }
        EngineCommand::Stop => {}
    }
}

impl EngineHandle {
    async fn call<T>(&self, make: impl FnOnce(oneshot::Sender<T>) -> EngineCommand) -> Result<T> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(make(reply))
            .await
            .map_err(|_| anyhow!("Reminder engine is not running"))?;
        rx.await
            .map_err(|_| anyhow!("Reminder engine dropped the request"))
    }

    /// Latest published snapshot, without waiting for the actor.
    pub fn latest(&self) -> EngineSnapshot {
        self.snapshot.borrow().clone()
    }

    /// A receiver notified after every tick or command.
    pub fn subscribe(&self) -> watch::Receiver<EngineSnapshot> {
        self.snapshot.clone()
    }

    pub fn next_event(&self) -> Option<NextEvent> {
        self.snapshot.borrow().next_event.clone()
    }

    pub fn countdown_text(&self) -> String {
        self.snapshot.borrow().countdown.clone()
    }

    pub fn policy(&self) -> ReminderPolicy {
        self.snapshot.borrow().policy.clone()
    }

    /// Fresh snapshot taken by the actor.
    pub async fn snapshot(&self) -> Result<EngineSnapshot> {
        self.call(EngineCommand::Snapshot).await
    }

    pub async fn update_policy(&self, patch: ReminderPolicyPatch) -> Result<ReminderPolicy> {
        let policy = self
            .call(|reply| EngineCommand::UpdatePolicy(patch, reply))
            .await??;
        Ok(policy)
    }

    pub async fn request_permission(&self) -> Result<PermissionState> {
        self.call(EngineCommand::RequestPermission).await
    }

    pub async fn trigger_test_notification(&self) -> Result<DispatchOutcome> {
        self.call(EngineCommand::TriggerTest).await
    }

    pub async fn set_coordinates(&self, coords: Coordinates) -> Result<()> {
        self.tx
            .send(EngineCommand::SetCoordinates(coords))
            .await
            .map_err(|_| anyhow!("Reminder engine is not running"))
    }

    /// Asks the actor to exit. Already stopped is not an error.
    pub async fn stop(&self) {
        let _ = self.tx.send(EngineCommand::Stop).await;
    }
}
