// File: ./src/model/policy.rs
// Reminder configuration as persisted in reminders.json.
use crate::error::{EngineError, EngineResult};
use crate::model::prayer::{MINUTES_PER_DAY, PrayerName};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;

pub const MAX_LEAD_MINUTES: u32 = MINUTES_PER_DAY;

fn default_true() -> bool {
    true
}
fn default_lead_minutes() -> u32 {
    15
}

/// Reads the override map entry by entry. Unknown prayer names and malformed
/// entries are dropped instead of failing the whole policy.
fn lenient_overrides<'de, D>(deserializer: D) -> Result<BTreeMap<PrayerName, EventOverride>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<BTreeMap<String, serde_json::Value>>::deserialize(deserializer)?
        .unwrap_or_default();
    let mut out = BTreeMap::new();
    for (key, value) in raw {
        let Some(name) = PrayerName::from_label(&key) else {
            log::debug!("Ignoring override for unknown prayer '{}'", key);
            continue;
        };
        match serde_json::from_value::<EventOverride>(value) {
            Ok(ov) => {
                out.insert(name, ov);
            }
            Err(e) => log::debug!("Ignoring malformed override for {}: {}", name, e),
        }
    }
    Ok(out)
}

/// Per-prayer override of the global reminder settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventOverride {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub custom_lead_minutes: Option<u32>,
}

impl Default for EventOverride {
    fn default() -> Self {
        Self {
            enabled: true,
            custom_lead_minutes: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReminderPolicy {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_lead_minutes")]
    pub default_lead_minutes: u32,
    #[serde(default = "default_true")]
    pub sound_enabled: bool,
    #[serde(default = "default_true")]
    pub vibration_enabled: bool,
    #[serde(default, deserialize_with = "lenient_overrides")]
    pub per_event_override: BTreeMap<PrayerName, EventOverride>,
}

impl Default for ReminderPolicy {
    fn default() -> Self {
        Self {
            // Match the serde defaults
            enabled: false,
            default_lead_minutes: 15,
            sound_enabled: true,
            vibration_enabled: true,
            per_event_override: BTreeMap::new(),
        }
    }
}

/// Partial update: every `Some` field replaces the current value.
/// `per_event_override` is replaced as a whole (shallow merge).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReminderPolicyPatch {
    #[serde(default)]
    pub enabled: Option<bool>,
    #[serde(default)]
    pub default_lead_minutes: Option<u32>,
    #[serde(default)]
    pub sound_enabled: Option<bool>,
    #[serde(default)]
    pub vibration_enabled: Option<bool>,
    #[serde(default)]
    pub per_event_override: Option<BTreeMap<PrayerName, EventOverride>>,
}

impl ReminderPolicyPatch {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

impl ReminderPolicy {
    /// Lead time to use for `event`, or `None` when the event is excluded from
    /// reminder evaluation (globally disabled or individually switched off).
    pub fn effective_lead(&self, event: PrayerName) -> Option<u32> {
        if !self.enabled {
            return None;
        }
        let ov = self.per_event_override.get(&event);
        if !ov.map(|o| o.enabled).unwrap_or(true) {
            return None;
        }
        Some(
            ov.and_then(|o| o.custom_lead_minutes)
                .unwrap_or(self.default_lead_minutes),
        )
    }

    /// Returns a new policy with `patch` applied. Out-of-range leads are rejected
    /// and `self` is left untouched.
    pub fn merged(&self, patch: &ReminderPolicyPatch) -> EngineResult<Self> {
        let mut next = self.clone();
        if let Some(v) = patch.enabled {
            next.enabled = v;
        }
        if let Some(v) = patch.default_lead_minutes {
            next.default_lead_minutes = v;
        }
        if let Some(v) = patch.sound_enabled {
            next.sound_enabled = v;
        }
        if let Some(v) = patch.vibration_enabled {
            next.vibration_enabled = v;
        }
        if let Some(map) = &patch.per_event_override {
            next.per_event_override = map.clone();
        }
        next.validate()?;
        Ok(next)
    }

    pub fn validate(&self) -> EngineResult<()> {
        if self.default_lead_minutes > MAX_LEAD_MINUTES {
            return Err(EngineError::InvalidPolicy(format!(
                "default lead {} exceeds {} minutes",
                self.default_lead_minutes, MAX_LEAD_MINUTES
            )));
        }
        for (name, ov) in &self.per_event_override {
            if let Some(lead) = ov.custom_lead_minutes
                && lead > MAX_LEAD_MINUTES
            {
                return Err(EngineError::InvalidPolicy(format!(
                    "{} lead {} exceeds {} minutes",
                    name, lead, MAX_LEAD_MINUTES
                )));
            }
        }
        Ok(())
    }

    /// Clamps out-of-range leads read from disk instead of discarding the file.
    pub fn sanitized(mut self) -> Self {
        self.default_lead_minutes = self.default_lead_minutes.min(MAX_LEAD_MINUTES);
        for ov in self.per_event_override.values_mut() {
            if let Some(lead) = ov.custom_lead_minutes.as_mut() {
                *lead = (*lead).min(MAX_LEAD_MINUTES);
            }
        }
        self
    }
}
