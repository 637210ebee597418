// File: ./src/model/display.rs
use crate::model::schedule::NextEvent;

/// Formats a minute count the way the countdown shows it: "45m", "2h 05m".
pub fn format_minutes_short(minutes: u32) -> String {
    if minutes >= 60 {
        format!("{}h {:02}m", minutes / 60, minutes % 60)
    } else {
        format!("{}m", minutes)
    }
}

/// "1 minute", "15 minutes", "1 hour", "1 hour 30 minutes".
pub fn format_minutes_long(minutes: u32) -> String {
    fn plural(n: u32, unit: &str) -> String {
        format!("{} {}{}", n, unit, if n == 1 { "" } else { "s" })
    }
    let (h, m) = (minutes / 60, minutes % 60);
    match (h, m) {
        (0, m) => plural(m, "minute"),
        (h, 0) => plural(h, "hour"),
        (h, m) => format!("{} {}", plural(h, "hour"), plural(m, "minute")),
    }
}

pub trait CountdownDisplay {
    fn countdown_text(&self) -> String;
}

impl CountdownDisplay for NextEvent {
    fn countdown_text(&self) -> String {
        let mut out = format!(
            "{} in {} ({})",
            self.name,
            format_minutes_short(self.minutes_until),
            self.time.format("%H:%M")
        );
        if self.is_tomorrow {
            out.push_str(" tomorrow");
        }
        out
    }
}
