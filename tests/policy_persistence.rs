// Reminder policy survives restarts and tolerates bad or unwritable storage.
use prayerbell::config::Config;
use prayerbell::context::{AppContext, SharedContext, TestContext};
use prayerbell::controller::ReminderEngine;
use prayerbell::error::EngineError;
use prayerbell::model::{EventOverride, PrayerName, ReminderPolicy, ReminderPolicyPatch};
use prayerbell::sink::RecordingSink;
use prayerbell::store::PolicyStore;
use std::collections::BTreeMap;
use std::sync::Arc;

fn engine_on(ctx: &Arc<TestContext>) -> ReminderEngine {
    let shared: SharedContext = ctx.clone();
    let config = Config::default();
    let provider = prayerbell::controller::provider_from_config(&config);
    ReminderEngine::new(shared, &config, provider, Box::new(RecordingSink::granted()))
}

#[test]
fn test_policy_survives_restart() {
    let ctx = Arc::new(TestContext::new());
    {
        let mut engine = engine_on(&ctx);
        let mut overrides = BTreeMap::new();
        overrides.insert(
            PrayerName::Fajr,
            EventOverride {
                enabled: true,
                custom_lead_minutes: Some(45),
            },
        );
        engine
            .update_policy(&ReminderPolicyPatch {
                enabled: Some(true),
                sound_enabled: Some(false),
                per_event_override: Some(overrides),
                ..Default::default()
            })
            .unwrap();
    }

    let engine = engine_on(&ctx);
    let policy = engine.policy();
    assert!(policy.enabled);
    assert!(!policy.sound_enabled);
    assert_eq!(policy.effective_lead(PrayerName::Fajr), Some(45));
    assert_eq!(policy.effective_lead(PrayerName::Asr), Some(15));
}

#[test]
fn test_blob_uses_camel_case_keys() {
    let ctx = Arc::new(TestContext::new());
    let mut engine = engine_on(&ctx);
    engine
        .update_policy(&ReminderPolicyPatch {
            enabled: Some(true),
            ..Default::default()
        })
        .unwrap();

    let raw = std::fs::read_to_string(ctx.get_policy_path().unwrap()).unwrap();
    let json: serde_json::Value = serde_json::from_str(&raw).unwrap();
    assert_eq!(json["enabled"], true);
    assert_eq!(json["defaultLeadMinutes"], 15);
    assert!(json.get("perEventOverride").is_some());
}

#[test]
fn test_unknown_and_missing_keys_are_tolerated() {
    let ctx = Arc::new(TestContext::new());
    std::fs::write(
        ctx.get_policy_path().unwrap(),
        r#"{"enabled": true, "futureFeature": {"x": 1}}"#,
    )
    .unwrap();

    let store = PolicyStore::open(ctx.clone());
    let policy = store.policy();
    assert!(policy.enabled);
    assert_eq!(policy.default_lead_minutes, 15);
    assert!(policy.vibration_enabled);
}

#[test]
fn test_corrupt_blob_falls_back_to_defaults() {
    let ctx = Arc::new(TestContext::new());
    std::fs::write(ctx.get_policy_path().unwrap(), "{ not json").unwrap();
    let store = PolicyStore::open(ctx.clone());
    assert_eq!(store.policy(), &ReminderPolicy::default());
}

#[test]
fn test_write_failure_keeps_session_policy() {
    let ctx = Arc::new(TestContext::new());
    // A directory where the file should be makes every write fail.
    std::fs::create_dir_all(ctx.get_policy_path().unwrap()).unwrap();

    let mut engine = engine_on(&ctx);
    let policy = engine
        .update_policy(&ReminderPolicyPatch {
            enabled: Some(true),
            ..Default::default()
        })
        .unwrap();
    assert!(policy.enabled);
    assert!(engine.policy().enabled);
    assert!(engine.snapshot().persist_pending);
}

#[test]
fn test_invalid_update_changes_nothing() {
    let ctx = Arc::new(TestContext::new());
    let mut engine = engine_on(&ctx);
    let err = engine
        .update_policy(&ReminderPolicyPatch {
            enabled: Some(true),
            default_lead_minutes: Some(2000),
            ..Default::default()
        })
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidPolicy(_)));
    assert!(!engine.policy().enabled);
}

#[test]
fn test_unknown_prayer_in_overrides_keeps_saved_settings() {
    let ctx = Arc::new(TestContext::new());
    std::fs::write(
        ctx.get_policy_path().unwrap(),
        r#"{"enabled":true,"defaultLeadMinutes":25,
            "perEventOverride":{"Asr":{"enabled":false},"Sunrise":{"enabled":true}}}"#,
    )
    .unwrap();

    let mut engine = engine_on(&ctx);
    let policy = engine.policy();
    assert!(policy.enabled);
    assert_eq!(policy.default_lead_minutes, 25);
    assert_eq!(policy.effective_lead(PrayerName::Asr), None);
    assert_eq!(policy.per_event_override.len(), 1);

    // A later write keeps what was loaded.
    engine
        .update_policy(&ReminderPolicyPatch {
            sound_enabled: Some(false),
            ..Default::default()
        })
        .unwrap();
    let reloaded = PolicyStore::open(ctx.clone());
    assert!(reloaded.policy().enabled);
    assert_eq!(reloaded.policy().default_lead_minutes, 25);
    assert!(!reloaded.policy().per_event_override[&PrayerName::Asr].enabled);
}
