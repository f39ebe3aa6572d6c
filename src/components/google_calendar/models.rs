use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Calendar event in the Calendar API v3 wire shape.
///
/// Fields this crate does not model are kept in `extra` so that an event read
/// from the backend can be written back as a full body without losing data.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct CalendarEvent {
    /// Backend-assigned identifier, empty until inserted
    #[serde(skip_serializing_if = "String::is_empty")]
    pub id: String,
    /// Event title
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    pub start: EventDateTime,
    pub end: EventDateTime,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Start or end of an event; timed events use `date_time`, all-day ones `date`
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct EventDateTime {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date_time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_zone: Option<String>,
}

impl EventDateTime {
    /// A timed boundary with an offset-bearing timestamp and its zone name
    pub fn timed(date_time: impl Into<String>, time_zone: impl Into<String>) -> Self {
        Self {
            date_time: Some(date_time.into()),
            date: None,
            time_zone: Some(time_zone.into()),
        }
    }

    /// Parse the boundary into an instant; all-day dates start at midnight UTC
    pub fn instant(&self) -> Option<DateTime<Utc>> {
        if let Some(date_time) = &self.date_time {
            return DateTime::parse_from_rfc3339(date_time)
                .ok()
                .map(|dt| dt.with_timezone(&Utc));
        }
        self.date
            .as_deref()
            .and_then(|date| NaiveDate::parse_from_str(date, "%Y-%m-%d").ok())
            .map(|date| date.and_time(NaiveTime::MIN).and_utc())
    }

    /// Raw textual value, preferring the timestamp over the date
    pub fn raw(&self) -> Option<&str> {
        self.date_time.as_deref().or(self.date.as_deref())
    }
}

impl CalendarEvent {
    /// Title of the event, empty when the event has none
    pub fn title(&self) -> &str {
        self.summary.as_deref().unwrap_or("")
    }

    /// Case-insensitive exact comparison of the title with `name`
    pub fn title_matches(&self, name: &str) -> bool {
        self.title().to_lowercase() == name.to_lowercase()
    }

    pub fn start_instant(&self) -> Option<DateTime<Utc>> {
        self.start.instant()
    }

    pub fn end_instant(&self) -> Option<DateTime<Utc>> {
        self.end.instant()
    }

    /// Whether the event carries a usable backend identifier
    pub fn has_id(&self) -> bool {
        !self.id.trim().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn test_unknown_fields_survive_round_trip() {
        let raw = json!({
            "id": "abc123",
            "summary": "Standup",
            "status": "confirmed",
            "htmlLink": "https://calendar.google.com/event?eid=abc",
            "start": {"dateTime": "2025-05-20T09:00:00+05:00", "timeZone": "Asia/Karachi"},
            "end": {"dateTime": "2025-05-20T09:15:00+05:00", "timeZone": "Asia/Karachi"},
            "reminders": {"useDefault": true}
        });

        let event: CalendarEvent = serde_json::from_value(raw.clone()).unwrap();
        assert_eq!(event.id, "abc123");
        assert_eq!(event.extra.get("status"), Some(&json!("confirmed")));

        let back = serde_json::to_value(&event).unwrap();
        assert_eq!(back, raw);
    }

    #[test]
    fn test_start_instant_for_timed_and_all_day() {
        let timed = EventDateTime::timed("2025-05-20T15:00:00+05:00", "Asia/Karachi");
        assert_eq!(
            timed.instant(),
            Some(Utc.with_ymd_and_hms(2025, 5, 20, 10, 0, 0).unwrap())
        );

        let all_day = EventDateTime {
            date: Some("2025-05-21".to_string()),
            ..Default::default()
        };
        assert_eq!(
            all_day.instant(),
            Some(Utc.with_ymd_and_hms(2025, 5, 21, 0, 0, 0).unwrap())
        );
        assert_eq!(all_day.raw(), Some("2025-05-21"));
    }

    #[test]
    fn test_title_matching_is_case_insensitive_and_exact() {
        let event = CalendarEvent {
            summary: Some("Team Standup".to_string()),
            ..Default::default()
        };
        assert!(event.title_matches("team standup"));
        assert!(event.title_matches("TEAM STANDUP"));
        assert!(!event.title_matches("standup"));
        assert!(!CalendarEvent::default().title_matches("standup"));
    }
}
