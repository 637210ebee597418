// File: ./src/sink.rs
//! Notification sinks: the platform side of the dispatcher.
//!
//! A sink reports its capabilities once, up front, instead of being queried at
//! every call site. Three sinks ship with the crate:
//! - `DesktopSink`: OS notifications through `notify-rust` (feature `desktop`).
//! - `LogSink`: writes notifications to the log, for headless hosts.
//! - `RecordingSink`: keeps everything in memory, for tests and `--dry-run`.
use crate::error::{EngineError, EngineResult};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PermissionState {
    #[default]
    Unknown,
    Granted,
    Denied,
}

/// What the platform can do, queried once when the dispatcher is built.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SinkCapabilities {
    pub notifications: bool,
    pub vibration: bool,
    pub sound: bool,
    /// The current permission can be read without prompting the user.
    pub permission_query: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NoticeOptions {
    /// Ask the platform not to play a sound.
    pub silent: bool,
    /// Keep the alert until the user dismisses it.
    pub require_interaction: bool,
    /// Replaces an earlier alert with the same tag where supported.
    pub tag: String,
    /// Auto-dismiss delay; `None` when `require_interaction` is set.
    pub timeout: Option<Duration>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub title: String,
    pub body: String,
    pub options: NoticeOptions,
}

pub trait NotificationSink: Send {
    fn capabilities(&self) -> SinkCapabilities;
    fn query_permission(&self) -> PermissionState;
    /// Shows the platform permission prompt. May wait for the user.
    fn request_permission(&mut self) -> PermissionState;
    fn show(&mut self, notice: &Notice) -> EngineResult<()>;
    /// Returns false when the device refused or cannot vibrate.
    fn vibrate(&mut self, pattern: &[u64]) -> bool;
}

// --- Desktop ---

/// OS notifications via notify-rust. Desktop platforms need no permission.
#[cfg(feature = "desktop")]
#[derive(Debug, Clone)]
pub struct DesktopSink {
    appname: String,
}

#[cfg(feature = "desktop")]
impl DesktopSink {
    pub fn new() -> Self {
        Self {
            appname: "Prayerbell".to_string(),
        }
    }
}

#[cfg(feature = "desktop")]
impl Default for DesktopSink {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(feature = "desktop")]
impl NotificationSink for DesktopSink {
    fn capabilities(&self) -> SinkCapabilities {
        SinkCapabilities {
            notifications: true,
            vibration: false,
            sound: cfg!(all(unix, not(target_os = "macos"))),
            permission_query: true,
        }
    }

    fn query_permission(&self) -> PermissionState {
        PermissionState::Granted
    }

    fn request_permission(&mut self) -> PermissionState {
        PermissionState::Granted
    }

    fn show(&mut self, notice: &Notice) -> EngineResult<()> {
        use notify_rust::{Notification, Timeout};

        let mut n = Notification::new();
        n.summary(&notice.title)
            .body(&notice.body)
            .appname(&self.appname);
        n.timeout(match notice.options.timeout {
            Some(d) => Timeout::Milliseconds(d.as_millis().min(u32::MAX as u128) as u32),
            None => Timeout::Never,
        });

        #[cfg(all(unix, not(target_os = "macos")))]
        {
            use notify_rust::{Hint, Urgency};
            n.hint(Hint::SuppressSound(notice.options.silent));
            if notice.options.require_interaction {
                n.urgency(Urgency::Critical);
            }
        }

        let tag = notice.options.tag.clone();
        // The notification daemon can be slow; keep it off the evaluation path.
        std::thread::Builder::new()
            .name("prayerbell-notify".to_string())
            .spawn(move || {
                if let Err(e) = n.show() {
                    log::warn!("Desktop notification {} failed: {}", tag, e);
                }
            })
            .map(|_| ())
            .map_err(|e| EngineError::DispatchFailure(e.to_string()))
    }

    fn vibrate(&mut self, _pattern: &[u64]) -> bool {
        false
    }
}

// --- Log ---

#[derive(Debug, Clone, Default)]
pub struct LogSink;

impl NotificationSink for LogSink {
    fn capabilities(&self) -> SinkCapabilities {
        SinkCapabilities {
            notifications: true,
            vibration: false,
            sound: false,
            permission_query: true,
        }
    }

    fn query_permission(&self) -> PermissionState {
        PermissionState::Granted
    }

    fn request_permission(&mut self) -> PermissionState {
        PermissionState::Granted
    }

    fn show(&mut self, notice: &Notice) -> EngineResult<()> {
        log::info!("[{}] {}: {}", notice.options.tag, notice.title, notice.body);
        Ok(())
    }

    fn vibrate(&mut self, _pattern: &[u64]) -> bool {
        false
    }
}

// --- Recording ---

#[derive(Debug)]
struct RecordingState {
    capabilities: SinkCapabilities,
    platform_permission: PermissionState,
    prompt_answer: PermissionState,
    prompts: usize,
    shown: Vec<Notice>,
    vibrations: Vec<Vec<u64>>,
    fail_show: bool,
}

/// In-memory sink. Clones share state, so a test can keep one clone and hand
/// the other to the dispatcher.
#[derive(Debug, Clone)]
pub struct RecordingSink {
    state: Arc<Mutex<RecordingState>>,
}

impl RecordingSink {
    /// A sink with every capability, starting in `permission`.
    /// Prompts answer `Granted` unless changed with `set_prompt_answer`.
    pub fn new(permission: PermissionState) -> Self {
        Self {
            state: Arc::new(Mutex::new(RecordingState {
                capabilities: SinkCapabilities {
                    notifications: true,
                    vibration: true,
                    sound: true,
                    permission_query: true,
                },
                platform_permission: permission,
                prompt_answer: PermissionState::Granted,
                prompts: 0,
                shown: Vec::new(),
                vibrations: Vec::new(),
                fail_show: false,
            })),
        }
    }

    pub fn granted() -> Self {
        Self::new(PermissionState::Granted)
    }

    fn lock(&self) -> MutexGuard<'_, RecordingState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn with_capabilities(self, capabilities: SinkCapabilities) -> Self {
        self.lock().capabilities = capabilities;
        self
    }

    pub fn set_prompt_answer(&self, answer: PermissionState) {
        self.lock().prompt_answer = answer;
    }

    /// Simulates the user changing the permission in system settings.
    pub fn set_platform_permission(&self, permission: PermissionState) {
        self.lock().platform_permission = permission;
    }

    /// Makes every `show` fail with a dispatch error.
    pub fn set_failing(&self, fail: bool) {
        self.lock().fail_show = fail;
    }

    pub fn shown(&self) -> Vec<Notice> {
        self.lock().shown.clone()
    }

    pub fn prompt_count(&self) -> usize {
        self.lock().prompts
    }

    pub fn vibrations(&self) -> Vec<Vec<u64>> {
        self.lock().vibrations.clone()
    }
}

impl NotificationSink for RecordingSink {
    fn capabilities(&self) -> SinkCapabilities {
        self.lock().capabilities
    }

    fn query_permission(&self) -> PermissionState {
        let state = self.lock();
        if state.capabilities.permission_query {
            state.platform_permission
        } else {
            PermissionState::Unknown
        }
    }

    fn request_permission(&mut self) -> PermissionState {
        let mut state = self.lock();
        state.prompts += 1;
        state.platform_permission = state.prompt_answer;
        state.platform_permission
    }

    fn show(&mut self, notice: &Notice) -> EngineResult<()> {
        let mut state = self.lock();
        if state.fail_show {
            return Err(EngineError::DispatchFailure("sink rejected notice".into()));
        }
        log::info!("[{}] {}: {}", notice.options.tag, notice.title, notice.body);
        state.shown.push(notice.clone());
        Ok(())
    }

    fn vibrate(&mut self, pattern: &[u64]) -> bool {
        let mut state = self.lock();
        if !state.capabilities.vibration {
            return false;
        }
        state.vibrations.push(pattern.to_vec());
        true
    }
}
