use super::models::{CalendarEvent, EventDateTime};
use chrono::DateTime;
use rust_i18n::t;

/// What happened to the event a receipt describes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiptKind {
    Added,
    Updated,
    Deleted,
}

impl ReceiptKind {
    fn headline(self) -> String {
        match self {
            ReceiptKind::Added => t!("receipt_added").to_string(),
            ReceiptKind::Updated => t!("receipt_updated").to_string(),
            ReceiptKind::Deleted => t!("receipt_deleted").to_string(),
        }
    }
}

/// Human-readable summary of a mutated event.
///
/// Dates and times are shown in the wall clock the event was stored with;
/// `zone` labels the time range.
pub fn receipt(kind: ReceiptKind, event: &CalendarEvent, zone: &str) -> String {
    let none = t!("receipt_none").to_string();
    let title = if event.title().is_empty() {
        t!("receipt_untitled").to_string()
    } else {
        event.title().to_string()
    };

    let lines = [
        kind.headline(),
        t!("receipt_name", value = title).to_string(),
        t!("receipt_date", value = display_date(&event.start)).to_string(),
        t!(
            "receipt_time",
            start = display_time(&event.start),
            end = display_time(&event.end),
            zone = zone
        )
        .to_string(),
        t!(
            "receipt_description",
            value = event.description.as_deref().unwrap_or(&none)
        )
        .to_string(),
        t!(
            "receipt_location",
            value = event.location.as_deref().unwrap_or(&none)
        )
        .to_string(),
        t!("receipt_event_id", id = event.id.as_str()).to_string(),
    ];

    lines.join("\n")
}

fn display_date(boundary: &EventDateTime) -> String {
    if let Some(date_time) = boundary
        .date_time
        .as_deref()
        .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
    {
        return date_time.format("%B %d, %Y").to_string();
    }
    boundary
        .raw()
        .map(str::to_string)
        .unwrap_or_else(|| t!("receipt_none").to_string())
}

fn display_time(boundary: &EventDateTime) -> String {
    match boundary
        .date_time
        .as_deref()
        .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
    {
        Some(date_time) => date_time.format("%H:%M").to_string(),
        None if boundary.date.is_some() => t!("receipt_all_day").to_string(),
        None => t!("receipt_none").to_string(),
    }
}
