//! Rendering of available slots as a plain-text report.

use std::collections::BTreeMap;

use chrono::{Datelike, Duration, NaiveDate, Weekday};

use crate::model::{Availability, CenterId, DisplayWindow, Slot};

/// Text returned when a center has no free slots.
pub const NO_APPOINTMENTS: &str = "No hay citas disponibles";

/// Flat offset from the UTC timestamps to local time. No DST handling.
const LOCAL_OFFSET_HOURS: i64 = 2;
const RULE_WIDTH: usize = 40;
const TIME_SEPARATOR: &str = " │ ";

/// Render the answer for one center.
///
/// Errors are passed through unchanged and an empty answer yields
/// [`NO_APPOINTMENTS`]. Otherwise the slots are shifted to local time,
/// grouped by day, and listed in chronological order.
#[must_use]
pub fn format_report(availability: &Availability, centers: &[CenterId]) -> String {
    let (window, slots) = match availability {
        Availability::Error(message) => return message.clone(),
        Availability::Slots { slots, .. } if slots.is_empty() => {
            return NO_APPOINTMENTS.to_owned();
        }
        Availability::Slots { window, slots } => (window, slots),
    };

    let by_day = group_by_day(slots);
    let rule = "─".repeat(RULE_WIDTH);

    let mut lines = vec![header(window), rule.clone()];

    for (day, times) in &by_day {
        lines.push(format!(
            "{} {}:",
            weekday_label(day.weekday()),
            day.format("%d/%m")
        ));
        lines.push(format!("  {}", times.join(TIME_SEPARATOR)));
        lines.push(String::new());
    }

    let total: usize = by_day.values().map(Vec::len).sum();
    lines.push(rule);
    lines.push(format!("Total: {total} citas"));
    lines.push(format!("Centros: {}", centers_label(centers)));

    lines.join("\n")
}

/// Group slot times (`HH:MM`, local) by local calendar day, both sorted.
#[must_use]
pub fn group_by_day(slots: &[Slot]) -> BTreeMap<NaiveDate, Vec<String>> {
    let mut by_day: BTreeMap<NaiveDate, Vec<String>> = BTreeMap::new();

    for slot in slots {
        let local = slot.starts_at + Duration::hours(LOCAL_OFFSET_HOURS);
        by_day
            .entry(local.date())
            .or_default()
            .push(local.format("%H:%M").to_string());
    }

    for times in by_day.values_mut() {
        times.sort_unstable();
    }

    by_day
}

/// Comma-separated list of center ids.
#[must_use]
pub fn centers_label(centers: &[CenterId]) -> String {
    centers
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(",")
}

fn header(window: &DisplayWindow) -> String {
    format!("CITAS ITV ({}-{})", window.start, window.end)
}

fn weekday_label(weekday: Weekday) -> &'static str {
    match weekday {
        Weekday::Mon => "LUN",
        Weekday::Tue => "MAR",
        Weekday::Wed => "MIE",
        Weekday::Thu => "JUE",
        Weekday::Fri => "VIE",
        Weekday::Sat => "SAB",
        Weekday::Sun => "DOM",
    }
}
