use super::backend::{CalendarBackend, ListQuery};
use super::models::CalendarEvent;
use super::time::TimeWindow;
use crate::error::{backend_error, config_error, event_name_not_found, CalendarResult, Error};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use tracing::debug;

/// What to do when a name lookup matches more than one event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum NameMatchPolicy {
    /// Take the chronologically earliest match
    #[default]
    #[serde(rename = "earliest")]
    Earliest,
    /// Fail with `AmbiguousEventName`
    #[serde(rename = "reject")]
    RejectAmbiguous,
}

impl FromStr for NameMatchPolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "earliest" | "first" => Ok(NameMatchPolicy::Earliest),
            "reject" | "fail" => Ok(NameMatchPolicy::RejectAmbiguous),
            other => Err(config_error(&format!("Unknown name match policy: {}", other))),
        }
    }
}

/// Identifier or name of the event to act on; neither means "list"
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolutionRequest {
    pub event_id: Option<String>,
    pub name: Option<String>,
}

impl ResolutionRequest {
    /// Build a request, treating blank strings as absent
    pub fn new(event_id: Option<String>, name: Option<String>) -> Self {
        Self {
            event_id: non_blank(event_id),
            name: non_blank(name),
        }
    }

    pub fn by_id(event_id: impl Into<String>) -> Self {
        Self::new(Some(event_id.into()), None)
    }

    pub fn by_name(name: impl Into<String>) -> Self {
        Self::new(None, Some(name.into()))
    }

    pub fn is_listing(&self) -> bool {
        self.event_id.is_none() && self.name.is_none()
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// Outcome of a resolution: a listing, or exactly one event
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    Listing(Vec<CalendarEvent>),
    Resolved(CalendarEvent),
}

/// Turns an identifier or a name into one concrete event
pub struct EventResolver<'a> {
    backend: &'a dyn CalendarBackend,
    policy: NameMatchPolicy,
}

impl<'a> EventResolver<'a> {
    pub fn new(backend: &'a dyn CalendarBackend, policy: NameMatchPolicy) -> Self {
        Self { backend, policy }
    }

    /// Resolve `request` against the backend.
    ///
    /// With neither id nor name, returns the events of `window`. An id is
    /// fetched directly; a name is matched case-insensitively against the
    /// titles of the events in `window`. Every call re-queries the backend.
    pub async fn resolve(
        &self,
        request: &ResolutionRequest,
        window: TimeWindow,
    ) -> CalendarResult<Resolution> {
        match (&request.event_id, &request.name) {
            (Some(event_id), _) => {
                debug!("Resolving event by id {}", event_id);
                let mut event = self.backend.get_event(event_id).await?;
                if !event.has_id() {
                    event.id = event_id.clone();
                }
                Ok(Resolution::Resolved(event))
            }
            (None, Some(name)) => {
                debug!("Resolving event by name '{}'", name);
                self.find_by_name(name, window).await.map(Resolution::Resolved)
            }
            (None, None) => {
                debug!("No id or name given, listing {} - {}", window.start, window.end);
                self.list(window).await.map(Resolution::Listing)
            }
        }
    }

    /// Events in `window`, ascending by start time
    pub async fn list(&self, window: TimeWindow) -> CalendarResult<Vec<CalendarEvent>> {
        let mut events = self.backend.list_events(&ListQuery::window(window)).await?;
        // stable, so equal starts keep backend order; undated events go last
        events.sort_by_key(|event| {
            let start = event.start_instant();
            (start.is_none(), start)
        });
        Ok(events)
    }

    async fn find_by_name(&self, name: &str, window: TimeWindow) -> CalendarResult<CalendarEvent> {
        let mut matches: Vec<CalendarEvent> = self
            .list(window)
            .await?
            .into_iter()
            .filter(|event| event.title_matches(name))
            .collect();

        debug!("{} event(s) titled '{}'", matches.len(), name);

        if matches.is_empty() {
            return Err(event_name_not_found(name));
        }

        if matches.len() > 1 && self.policy == NameMatchPolicy::RejectAmbiguous {
            return Err(Error::AmbiguousEventName {
                name: name.to_string(),
                candidates: matches.into_iter().map(|event| event.id).collect(),
            });
        }

        let event = matches.remove(0);
        if !event.has_id() {
            return Err(backend_error(&format!(
                "Event '{}' was listed without an id",
                name
            )));
        }
        Ok(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::google_calendar::memory::InMemoryCalendar;
    use crate::components::google_calendar::models::EventDateTime;
    use chrono::{TimeZone, Utc};

    fn event(id: &str, title: &str, start: &str, end: &str) -> CalendarEvent {
        CalendarEvent {
            id: id.to_string(),
            summary: Some(title.to_string()),
            start: EventDateTime::timed(start, "UTC"),
            end: EventDateTime::timed(end, "UTC"),
            ..Default::default()
        }
    }

    fn may_2025() -> TimeWindow {
        TimeWindow::month_containing(Utc.with_ymd_and_hms(2025, 5, 15, 0, 0, 0).unwrap())
    }

    fn calendar() -> InMemoryCalendar {
        InMemoryCalendar::with_events(vec![
            event("standup-pm", "Standup", "2025-05-20T14:00:00+00:00", "2025-05-20T14:15:00+00:00"),
            event("review", "Review", "2025-05-02T10:00:00+00:00", "2025-05-02T11:00:00+00:00"),
            event("standup-am", "standup", "2025-05-20T09:00:00+00:00", "2025-05-20T09:15:00+00:00"),
            event("june", "Standup", "2025-06-03T09:00:00+00:00", "2025-06-03T09:15:00+00:00"),
        ])
    }

    #[test]
    fn test_blank_fields_mean_listing() {
        let request = ResolutionRequest::new(Some("  ".to_string()), Some(String::new()));
        assert!(request.is_listing());
        assert!(!ResolutionRequest::by_name("x").is_listing());
    }

    #[test]
    fn test_policy_from_str() {
        assert_eq!("earliest".parse::<NameMatchPolicy>().unwrap(), NameMatchPolicy::Earliest);
        assert_eq!(
            "REJECT".parse::<NameMatchPolicy>().unwrap(),
            NameMatchPolicy::RejectAmbiguous
        );
        assert!("sometimes".parse::<NameMatchPolicy>().is_err());
    }

    #[tokio::test]
    async fn test_listing_is_window_scoped_and_ordered() {
        let backend = calendar();
        let resolver = EventResolver::new(&backend, NameMatchPolicy::Earliest);

        let resolution = resolver
            .resolve(&ResolutionRequest::default(), may_2025())
            .await
            .unwrap();
        let Resolution::Listing(events) = resolution else {
            panic!("expected a listing");
        };
        let ids: Vec<&str> = events.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["review", "standup-am", "standup-pm"]);
    }

    #[tokio::test]
    async fn test_name_resolves_to_earliest_match() {
        let backend = calendar();
        let resolver = EventResolver::new(&backend, NameMatchPolicy::Earliest);

        let resolution = resolver
            .resolve(&ResolutionRequest::by_name("STANDUP"), may_2025())
            .await
            .unwrap();
        match resolution {
            Resolution::Resolved(event) => assert_eq!(event.id, "standup-am"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_reject_policy_reports_candidates() {
        let backend = calendar();
        let resolver = EventResolver::new(&backend, NameMatchPolicy::RejectAmbiguous);

        let err = resolver
            .resolve(&ResolutionRequest::by_name("standup"), may_2025())
            .await
            .unwrap_err();
        match err {
            Error::AmbiguousEventName { name, candidates } => {
                assert_eq!(name, "standup");
                assert_eq!(candidates, vec!["standup-am", "standup-pm"]);
            }
            other => panic!("unexpected {:?}", other),
        }

        // a unique name still resolves under the strict policy
        let resolution = resolver
            .resolve(&ResolutionRequest::by_name("review"), may_2025())
            .await
            .unwrap();
        assert!(matches!(resolution, Resolution::Resolved(e) if e.id == "review"));
    }

    #[tokio::test]
    async fn test_unmatched_name_and_missing_id_are_not_found() {
        let backend = calendar();
        let resolver = EventResolver::new(&backend, NameMatchPolicy::Earliest);

        let err = resolver
            .resolve(&ResolutionRequest::by_name("Stand"), may_2025())
            .await
            .unwrap_err();
        assert!(matches!(&err, Error::EventNotFound { lookup } if lookup.contains("Stand")));

        let err = resolver
            .resolve(&ResolutionRequest::by_id("missing-id"), may_2025())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::EventNotFound { .. }));
    }

    #[tokio::test]
    async fn test_id_wins_over_name_and_ignores_window() {
        let backend = calendar();
        let resolver = EventResolver::new(&backend, NameMatchPolicy::Earliest);

        let request = ResolutionRequest::new(Some("june".to_string()), Some("Review".to_string()));
        let resolution = resolver.resolve(&request, may_2025()).await.unwrap();
        assert!(matches!(resolution, Resolution::Resolved(e) if e.id == "june"));
    }
}
