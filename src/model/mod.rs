// File: ./src/model/mod.rs
pub mod display;
pub mod policy;
pub mod prayer;
pub mod schedule;

pub use display::CountdownDisplay;
pub use policy::{EventOverride, ReminderPolicy, ReminderPolicyPatch};
pub use prayer::{Coordinates, PrayerEvent, PrayerName};
pub use schedule::{DailySchedule, NextEvent, ScheduleSource};
