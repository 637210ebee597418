// The background actor: commands are serialized with ticks and reflected in snapshots.
use prayerbell::config::Config;
use prayerbell::context::{SharedContext, TestContext};
use prayerbell::controller::ReminderEngine;
use prayerbell::model::{Coordinates, ReminderPolicyPatch};
use prayerbell::provider::FixedScheduleProvider;
use prayerbell::sink::{PermissionState, RecordingSink};
use prayerbell::system::spawn_engine;
use std::sync::Arc;
use std::time::Duration;

fn engine(sink: RecordingSink) -> (ReminderEngine, Arc<TestContext>) {
    let ctx = Arc::new(TestContext::new());
    let shared: SharedContext = ctx.clone();
    let config = Config::default();
    let provider = Arc::new(FixedScheduleProvider::new(config.fallback.times()));
    (
        ReminderEngine::new(shared, &config, provider, Box::new(sink)),
        ctx,
    )
}

#[tokio::test]
async fn test_policy_update_goes_through_actor() {
    let (engine, _ctx) = engine(RecordingSink::granted());
    let (handle, task) = spawn_engine(engine, Duration::from_secs(60), true);

    let policy = handle
        .update_policy(ReminderPolicyPatch {
            enabled: Some(true),
            default_lead_minutes: Some(5),
            ..Default::default()
        })
        .await
        .unwrap();
    assert!(policy.enabled);
    assert_eq!(policy.default_lead_minutes, 5);

    let snap = handle.snapshot().await.unwrap();
    assert_eq!(snap.policy.default_lead_minutes, 5);
    assert!(snap.next_event.is_some(), "first tick ran on spawn");
    assert!(!snap.countdown.is_empty());
    assert_eq!(handle.policy().default_lead_minutes, 5);

    handle.stop().await;
    task.await.unwrap();
}

#[tokio::test]
async fn test_invalid_policy_is_rejected_and_actor_survives() {
    let (engine, _ctx) = engine(RecordingSink::granted());
    let (handle, task) = spawn_engine(engine, Duration::from_secs(60), false);

    let err = handle
        .update_policy(ReminderPolicyPatch {
            default_lead_minutes: Some(5000),
            ..Default::default()
        })
        .await;
    assert!(err.is_err());

    let snap = handle.snapshot().await.unwrap();
    assert_eq!(snap.policy.default_lead_minutes, 15);

    handle.stop().await;
    task.await.unwrap();
}

#[tokio::test]
async fn test_permission_and_test_notification_via_handle() {
    let sink = RecordingSink::new(PermissionState::Unknown);
    let (engine, _ctx) = engine(sink.clone());
    let (handle, task) = spawn_engine(engine, Duration::from_secs(60), false);

    assert_eq!(
        handle.request_permission().await.unwrap(),
        PermissionState::Granted
    );
    assert_eq!(
        handle.request_permission().await.unwrap(),
        PermissionState::Granted
    );
    assert_eq!(sink.prompt_count(), 1);

    let outcome = handle.trigger_test_notification().await.unwrap();
    assert!(outcome.is_delivered());
    assert!(sink.shown().iter().any(|n| n.title.starts_with("Test: ")));

    handle.stop().await;
    task.await.unwrap();
}

#[tokio::test]
async fn test_commands_fail_cleanly_after_stop() {
    let (engine, _ctx) = engine(RecordingSink::granted());
    let (handle, task) = spawn_engine(engine, Duration::from_secs(60), false);
    handle
        .set_coordinates(Coordinates::new(51.5, -0.12))
        .await
        .unwrap();

    handle.stop().await;
    task.await.unwrap();

    assert!(handle.snapshot().await.is_err());
    // Stopping twice is harmless.
    handle.stop().await;
}

#[tokio::test]
async fn test_dropping_every_handle_stops_the_actor() {
    let (engine, _ctx) = engine(RecordingSink::granted());
    let (handle, task) = spawn_engine(engine, Duration::from_secs(60), true);
    let clone = handle.clone();
    drop(handle);
    drop(clone);
    tokio::time::timeout(Duration::from_secs(5), task)
        .await
        .expect("actor did not exit")
        .unwrap();
}
