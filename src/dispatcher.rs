// File: ./src/dispatcher.rs
//! Notification dispatcher: permission handling, message rendering and the
//! sound/vibration policy on top of a `NotificationSink`.
//!
//! Dispatch never returns an error. Missing capabilities, missing permission and
//! sink failures are logged and reported as `DispatchOutcome::Skipped`.
use crate::error::EngineError;
use crate::model::display::format_minutes_long;
use crate::model::{PrayerEvent, ReminderPolicy};
use crate::sink::{Notice, NoticeOptions, NotificationSink, PermissionState, SinkCapabilities};
use std::time::Duration;

/// How long a lead-time reminder stays on screen.
pub const AUTO_DISMISS_AFTER: Duration = Duration::from_secs(10);
pub const VIBRATION_PATTERN: [u64; 3] = [200, 100, 200];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    Delivered,
    Skipped(EngineError),
}

impl DispatchOutcome {
    pub fn is_delivered(&self) -> bool {
        matches!(self, DispatchOutcome::Delivered)
    }
}

pub struct NotificationDispatcher {
    sink: Box<dyn NotificationSink>,
    capabilities: SinkCapabilities,
    permission: PermissionState,
}

impl NotificationDispatcher {
    /// Reads capabilities and, where the platform allows it, the current permission.
    pub fn new(sink: Box<dyn NotificationSink>) -> Self {
        let capabilities = sink.capabilities();
        let permission = if capabilities.permission_query {
            sink.query_permission()
        } else {
            PermissionState::Unknown
        };
        log::debug!(
            "Notification sink: {:?}, permission {:?}",
            capabilities,
            permission
        );
        Self {
            sink,
            capabilities,
            permission,
        }
    }

    pub fn capabilities(&self) -> SinkCapabilities {
        self.capabilities
    }

    pub fn permission(&self) -> PermissionState {
        self.permission
    }

    /// User-initiated permission request.
    ///
    /// Once a decision is known the platform is only re-queried (the user may have
    /// changed it in system settings); the prompt is shown only while undecided.
    pub fn request_permission(&mut self) -> PermissionState {
        if !self.capabilities.notifications {
            log::info!("Notifications unsupported, not prompting");
            return self.permission;
        }

        if self.capabilities.permission_query {
            let current = self.sink.query_permission();
            if current != PermissionState::Unknown {
                if current != self.permission {
                    log::info!("Notification permission is now {:?}", current);
                }
                self.permission = current;
                return current;
            }
        } else if self.permission != PermissionState::Unknown {
            return self.permission;
        }

        self.permission = self.sink.request_permission();
        log::info!("Notification permission answered: {:?}", self.permission);
        self.permission
    }

    /// Title and body for a reminder `lead_minutes` before `event` (0 = "now").
    pub fn render(event: &PrayerEvent, lead_minutes: u32) -> (String, String) {
        let at = event.time.format("%H:%M");
        if lead_minutes == 0 {
            (
                format!("Time for {}", event.label),
                format!("It is {} time now ({}).", event.label, at),
            )
        } else {
            let span = format_minutes_long(lead_minutes);
            (
                format!("{} in {}", event.label, span),
                format!("{} to {} ({}).", span, event.label, at),
            )
        }
    }

    fn notice_for(
        event: &PrayerEvent,
        lead_minutes: u32,
        policy: &ReminderPolicy,
        tag: String,
    ) -> Notice {
        let (title, body) = Self::render(event, lead_minutes);
        let exact = lead_minutes == 0;
        Notice {
            title,
            body,
            options: NoticeOptions {
                silent: !policy.sound_enabled,
                require_interaction: exact,
                tag,
                timeout: if exact { None } else { Some(AUTO_DISMISS_AFTER) },
            },
        }
    }

    /// Shows the reminder for `event`. Failures are logged, never raised.
    pub fn dispatch(
        &mut self,
        event: &PrayerEvent,
        lead_minutes: u32,
        policy: &ReminderPolicy,
    ) -> DispatchOutcome {
        let tag = format!(
            "prayer-{}-{}",
            event.name.label().to_lowercase(),
            lead_minutes
        );
        let notice = Self::notice_for(event, lead_minutes, policy, tag);
        self.deliver(notice, policy)
    }

    /// Same rendering as a real reminder, marked as a test.
    pub fn dispatch_test(
        &mut self,
        event: &PrayerEvent,
        lead_minutes: u32,
        policy: &ReminderPolicy,
    ) -> DispatchOutcome {
        let mut notice =
            Self::notice_for(event, lead_minutes, policy, "prayer-test".to_string());
        notice.title = format!("Test: {}", notice.title);
        self.deliver(notice, policy)
    }

    fn deliver(&mut self, notice: Notice, policy: &ReminderPolicy) -> DispatchOutcome {
        if !self.capabilities.notifications {
            log::debug!("Skipping {}: notifications unsupported", notice.options.tag);
            return DispatchOutcome::Skipped(EngineError::DispatchFailure(
                "notifications unsupported".to_string(),
            ));
        }
        if self.permission != PermissionState::Granted {
            log::debug!(
                "Skipping {}: permission {:?}",
                notice.options.tag,
                self.permission
            );
            return DispatchOutcome::Skipped(EngineError::PermissionDenied);
        }

        if let Err(e) = self.sink.show(&notice) {
            log::warn!("Notification {} not shown: {}", notice.options.tag, e);
            return DispatchOutcome::Skipped(e);
        }

        if policy.vibration_enabled
            && self.capabilities.vibration
            && !self.sink.vibrate(&VIBRATION_PATTERN)
        {
            log::debug!("Vibration refused for {}", notice.options.tag);
        }

        DispatchOutcome::Delivered
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::PrayerName;
    use crate::sink::RecordingSink;
    use chrono::NaiveTime;

    fn asr() -> PrayerEvent {
        PrayerEvent::new(PrayerName::Asr, NaiveTime::from_hms_opt(15, 45, 0).unwrap())
    }

    fn policy() -> ReminderPolicy {
        ReminderPolicy {
            enabled: true,
            ..ReminderPolicy::default()
        }
    }

    #[test]
    fn test_render_lead_and_exact() {
        let (title, body) = NotificationDispatcher::render(&asr(), 15);
        assert_eq!(title, "Asr in 15 minutes");
        assert!(body.contains("15 minutes to Asr"));

        let (title, body) = NotificationDispatcher::render(&asr(), 0);
        assert_eq!(title, "Time for Asr");
        assert!(body.contains("now"));
    }

    #[test]
    fn test_lead_reminder_auto_dismisses_and_exact_requires_interaction() {
        let sink = RecordingSink::granted();
        let mut d = NotificationDispatcher::new(Box::new(sink.clone()));

        assert!(d.dispatch(&asr(), 15, &policy()).is_delivered());
        assert!(d.dispatch(&asr(), 0, &policy()).is_delivered());

        let shown = sink.shown();
        assert_eq!(shown.len(), 2);
        assert!(!shown[0].options.require_interaction);
        assert_eq!(shown[0].options.timeout, Some(AUTO_DISMISS_AFTER));
        assert_eq!(shown[0].options.tag, "prayer-asr-15");
        assert!(shown[1].options.require_interaction);
        assert_eq!(shown[1].options.timeout, None);
    }

    #[test]
    fn test_sound_and_vibration_policy() {
        let sink = RecordingSink::granted();
        let mut d = NotificationDispatcher::new(Box::new(sink.clone()));

        let mut quiet = policy();
        quiet.sound_enabled = false;
        quiet.vibration_enabled = false;
        d.dispatch(&asr(), 15, &quiet);
        assert!(sink.shown()[0].options.silent);
        assert!(sink.vibrations().is_empty());

        d.dispatch(&asr(), 15, &policy());
        assert!(!sink.shown()[1].options.silent);
        assert_eq!(sink.vibrations(), vec![VIBRATION_PATTERN.to_vec()]);
    }

    #[test]
    fn test_vibration_skipped_without_capability() {
        let sink = RecordingSink::granted().with_capabilities(SinkCapabilities {
            notifications: true,
            vibration: false,
            sound: true,
            permission_query: true,
        });
        let mut d = NotificationDispatcher::new(Box::new(sink.clone()));
        assert!(d.dispatch(&asr(), 15, &policy()).is_delivered());
        assert!(sink.vibrations().is_empty());
    }

    #[test]
    fn test_denied_permission_is_silent_noop() {
        let sink = RecordingSink::new(PermissionState::Denied);
        let mut d = NotificationDispatcher::new(Box::new(sink.clone()));
        let outcome = d.dispatch(&asr(), 15, &policy());
        assert_eq!(outcome, DispatchOutcome::Skipped(EngineError::PermissionDenied));
        assert!(sink.shown().is_empty());
    }

    #[test]
    fn test_sink_failure_is_reported_not_raised() {
        let sink = RecordingSink::granted();
        sink.set_failing(true);
        let mut d = NotificationDispatcher::new(Box::new(sink.clone()));
        let outcome = d.dispatch(&asr(), 15, &policy());
        assert!(matches!(
            outcome,
            DispatchOutcome::Skipped(EngineError::DispatchFailure(_))
        ));
    }

    #[test]
    fn test_unsupported_platform_never_prompts() {
        let sink = RecordingSink::new(PermissionState::Unknown).with_capabilities(
            SinkCapabilities::default(),
        );
        let mut d = NotificationDispatcher::new(Box::new(sink.clone()));
        assert_eq!(d.request_permission(), PermissionState::Unknown);
        assert_eq!(sink.prompt_count(), 0);
        assert!(!d.dispatch(&asr(), 0, &policy()).is_delivered());
    }

    #[test]
    fn test_request_permission_is_idempotent() {
        let sink = RecordingSink::new(PermissionState::Unknown);
        let mut d = NotificationDispatcher::new(Box::new(sink.clone()));
        assert_eq!(d.permission(), PermissionState::Unknown);

        assert_eq!(d.request_permission(), PermissionState::Granted);
        assert_eq!(d.request_permission(), PermissionState::Granted);
        assert_eq!(sink.prompt_count(), 1);
    }

    #[test]
    fn test_denied_is_requeried_not_reprompted() {
        let sink = RecordingSink::new(PermissionState::Unknown);
        sink.set_prompt_answer(PermissionState::Denied);
        let mut d = NotificationDispatcher::new(Box::new(sink.clone()));
        assert_eq!(d.request_permission(), PermissionState::Denied);
        assert_eq!(d.request_permission(), PermissionState::Denied);
        assert_eq!(sink.prompt_count(), 1);

        // User flips it in system settings, then retries from the UI.
        sink.set_platform_permission(PermissionState::Granted);
        assert_eq!(d.request_permission(), PermissionState::Granted);
        assert_eq!(sink.prompt_count(), 1);
    }

    #[test]
    fn test_without_permission_query_cached_decision_is_kept() {
        let sink = RecordingSink::new(PermissionState::Unknown).with_capabilities(
            SinkCapabilities {
                notifications: true,
                vibration: false,
                sound: true,
                permission_query: false,
            },
        );
        let mut d = NotificationDispatcher::new(Box::new(sink.clone()));
        assert_eq!(d.request_permission(), PermissionState::Granted);
        assert_eq!(d.request_permission(), PermissionState::Granted);
        assert_eq!(sink.prompt_count(), 1);
    }
}
