// File: ./src/cli.rs
//! Shared command-line interface logic: argument parsing and help output.
use crate::config::NotifierKind;
use crate::model::{EventOverride, PrayerName, ReminderPolicy, ReminderPolicyPatch};
use anyhow::{Context, Result, bail};
use std::path::PathBuf;
use strum::IntoEnumIterator;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Run the reminder loop until interrupted.
    Run,
    /// Print today's schedule and the countdown.
    Next,
    /// Print the reminder policy as JSON.
    Policy,
    /// Update the reminder policy from `key=value` pairs.
    Set(Vec<String>),
    /// Show a sample reminder.
    Test,
    /// Ask for notification permission.
    Permission,
    Help,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub root: Option<PathBuf>,
    pub dry_run: bool,
    pub command: Command,
}

/// Parses `args` without the binary name.
pub fn parse_args<I, S>(args: I) -> Result<Invocation>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let mut root = None;
    let mut dry_run = false;
    let mut command = None;
    let mut rest = Vec::new();

    let mut iter = args.into_iter().map(Into::into);
    while let Some(arg) = iter.next() {
        if command.is_some() {
            rest.push(arg);
            continue;
        }
        match arg.as_str() {
            "-h" | "--help" | "help" => command = Some("help".to_string()),
            "-r" | "--root" => {
                let path = iter.next().context("--root requires a path")?;
                root = Some(PathBuf::from(path));
            }
            "--dry-run" => dry_run = true,
            s if s.starts_with('-') => bail!("Unknown option: {}", s),
            _ => command = Some(arg),
        }
    }

    let command = match command.as_deref().unwrap_or("run") {
        "run" => Command::Run,
        "next" => Command::Next,
        "policy" => Command::Policy,
        "set" => {
            if rest.is_empty() {
                bail!("set requires at least one key=value pair");
            }
            Command::Set(std::mem::take(&mut rest))
        }
        "test" => Command::Test,
        "permission" => Command::Permission,
        "help" => Command::Help,
        other => bail!("Unknown command: {}", other),
    };
    if !rest.is_empty() {
        bail!("Unexpected arguments: {}", rest.join(" "));
    }

    Ok(Invocation {
        root,
        dry_run,
        command,
    })
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "on" | "yes" | "1" => Ok(true),
        "false" | "off" | "no" | "0" => Ok(false),
        _ => bail!("{}: expected on/off, got '{}'", key, value),
    }
}

fn parse_minutes(key: &str, value: &str) -> Result<u32> {
    value
        .trim_end_matches('m')
        .parse()
        .with_context(|| format!("{}: expected minutes, got '{}'", key, value))
}

/// Builds a patch from `key=value` pairs.
///
/// Per-prayer keys (`asr.enabled`, `asr.lead`) start from the overrides in
/// `current`, since the override map is replaced as a whole. `asr.lead=default`
/// removes a custom lead.
pub fn parse_set(pairs: &[String], current: &ReminderPolicy) -> Result<ReminderPolicyPatch> {
    let mut patch = ReminderPolicyPatch::default();
    let mut overrides = current.per_event_override.clone();
    let mut overrides_changed = false;

    for pair in pairs {
        let (key, value) = pair
            .split_once('=')
            .with_context(|| format!("Expected key=value, got '{}'", pair))?;
        let key = key.trim();
        let value = value.trim();

        match key {
            "enabled" => patch.enabled = Some(parse_bool(key, value)?),
            "lead" => patch.default_lead_minutes = Some(parse_minutes(key, value)?),
            "sound" => patch.sound_enabled = Some(parse_bool(key, value)?),
            "vibration" => patch.vibration_enabled = Some(parse_bool(key, value)?),
            _ => {
                let Some((event, field)) = key.split_once('.') else {
                    bail!("Unknown setting: {}", key);
                };
                let name = PrayerName::from_label(event)
                    .with_context(|| format!("Unknown prayer: {}", event))?;
                let entry = overrides.entry(name).or_insert_with(EventOverride::default);
                match field {
                    "enabled" => entry.enabled = parse_bool(key, value)?,
                    "lead" if value.eq_ignore_ascii_case("default") => {
                        entry.custom_lead_minutes = None
                    }
                    "lead" => entry.custom_lead_minutes = Some(parse_minutes(key, value)?),
                    _ => bail!("Unknown setting: {}", key),
                }
                overrides_changed = true;
            }
        }
    }

    if overrides_changed {
        // Entries back at their defaults carry no information.
        overrides.retain(|_, o| *o != EventOverride::default());
        patch.per_event_override = Some(overrides);
    }
    Ok(patch)
}

pub fn print_help(binary_name: &str) {
    println!(
        "Prayerbell v{} - Prayer time reminders",
        env!("CARGO_PKG_VERSION")
    );
    println!();
    println!("USAGE:");
    println!("    {} [--root <path>] [--dry-run] [command]", binary_name);
    println!();
    println!("COMMANDS:");
    println!("    run                    Run the reminder loop (default).");
    println!("    next                   Show today's times and the next prayer.");
    println!("    policy                 Print the reminder settings as JSON.");
    println!("    set <key=value>...     Change reminder settings.");
    println!("    test                   Show a sample reminder.");
    println!("    permission             Ask for notification permission.");
    println!();
    println!("OPTIONS:");
    println!("    -r, --root <path>      Use a different directory for config and data.");
    println!("    --dry-run              Record notifications in the log instead of showing them.");
    println!("    -h, --help             Show this help message.");
    println!();
    println!("SETTINGS:");
    println!("    enabled=on|off         Master switch for reminders.");
    println!("    lead=<minutes>         Default minutes before each prayer (0-1440).");
    println!("    sound=on|off           Play the notification sound.");
    println!("    vibration=on|off       Vibrate where supported.");
    println!("    <prayer>.enabled=on|off");
    println!("    <prayer>.lead=<minutes>|default");
    println!();
    println!("EXAMPLES:");
    println!("    {} set enabled=on lead=10", binary_name);
    println!("    {} set fajr.lead=30 isha.enabled=off", binary_name);
    println!();
    let notifiers: Vec<String> = NotifierKind::iter().map(|k| k.to_string()).collect();
    println!("CONFIG (config.toml in the config directory, see --root):");
    println!("    latitude, longitude    Location used to look up the schedule.");
    println!("    timetable_path         JSON timetable; fallback times are used without one.");
    println!("    notifier               {}", notifiers.join(" | "));
    println!("    tick_seconds           Poll period of the reminder loop (default 60).");
}
