use super::backend::{CalendarBackend, ListQuery};
use super::models::CalendarEvent;
use crate::error::{event_id_not_found, CalendarResult};
use async_trait::async_trait;
use tokio::sync::RwLock;

/// In-memory calendar backend, used for demos and tests
#[derive(Debug, Default)]
pub struct InMemoryCalendar {
    events: RwLock<Vec<CalendarEvent>>,
}

impl InMemoryCalendar {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a calendar pre-filled with `events`; events without an id get one
    pub fn with_events(events: Vec<CalendarEvent>) -> Self {
        let events = events
            .into_iter()
            .map(|mut event| {
                if !event.has_id() {
                    event.id = new_event_id();
                }
                event
            })
            .collect();
        Self {
            events: RwLock::new(events),
        }
    }

    /// Copy of every stored event in insertion order
    pub async fn snapshot(&self) -> Vec<CalendarEvent> {
        self.events.read().await.clone()
    }
}

fn new_event_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

#[async_trait]
impl CalendarBackend for InMemoryCalendar {
    async fn list_events(&self, query: &ListQuery) -> CalendarResult<Vec<CalendarEvent>> {
        let events = self.events.read().await;

        let mut matching: Vec<CalendarEvent> = events
            .iter()
            .filter(|event| {
                let ends_after_min = match (query.time_min, event.end_instant()) {
                    (Some(min), Some(end)) => end > min,
                    (Some(_), None) => false,
                    (None, _) => true,
                };
                let starts_before_max = match (query.time_max, event.start_instant()) {
                    (Some(max), Some(start)) => start < max,
                    (Some(_), None) => false,
                    (None, _) => true,
                };
                ends_after_min && starts_before_max
            })
            .cloned()
            .collect();

        matching.sort_by_key(|event| event.start_instant());

        if let Some(max) = query.max_results {
            matching.truncate(max as usize);
        }

        Ok(matching)
    }

    async fn get_event(&self, event_id: &str) -> CalendarResult<CalendarEvent> {
        let events = self.events.read().await;
        events
            .iter()
            .find(|event| event.id == event_id)
            .cloned()
            .ok_or_else(|| event_id_not_found(event_id))
    }

    async fn insert_event(&self, event: &CalendarEvent) -> CalendarResult<CalendarEvent> {
        let mut stored = event.clone();
        stored.id = new_event_id();

        let mut events = self.events.write().await;
        events.push(stored.clone());
        Ok(stored)
    }

    async fn update_event(
        &self,
        event_id: &str,
        event: &CalendarEvent,
    ) -> CalendarResult<CalendarEvent> {
        let mut events = self.events.write().await;
        let slot = events
            .iter_mut()
            .find(|stored| stored.id == event_id)
            .ok_or_else(|| event_id_not_found(event_id))?;

        let mut updated = event.clone();
        updated.id = event_id.to_string();
        *slot = updated.clone();
        Ok(updated)
    }

    async fn delete_event(&self, event_id: &str) -> CalendarResult<()> {
        let mut events = self.events.write().await;
        let before = events.len();
        events.retain(|event| event.id != event_id);

        if events.len() == before {
            return Err(event_id_not_found(event_id));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::google_calendar::models::EventDateTime;
    use crate::error::Error;
    use chrono::{TimeZone, Utc};

    fn event(id: &str, start: &str, end: &str) -> CalendarEvent {
        CalendarEvent {
            id: id.to_string(),
            summary: Some(id.to_string()),
            start: EventDateTime::timed(start, "UTC"),
            end: EventDateTime::timed(end, "UTC"),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_list_filters_and_orders() {
        let calendar = InMemoryCalendar::with_events(vec![
            event("late", "2025-05-20T14:00:00+00:00", "2025-05-20T15:00:00+00:00"),
            event("june", "2025-06-02T09:00:00+00:00", "2025-06-02T10:00:00+00:00"),
            event("early", "2025-05-20T09:00:00+00:00", "2025-05-20T10:00:00+00:00"),
            event("april", "2025-04-02T09:00:00+00:00", "2025-04-02T10:00:00+00:00"),
        ]);

        let query = ListQuery {
            time_min: Some(Utc.with_ymd_and_hms(2025, 5, 1, 0, 0, 0).unwrap()),
            time_max: Some(Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap()),
            max_results: None,
        };
        let ids: Vec<String> = calendar
            .list_events(&query)
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.id)
            .collect();
        assert_eq!(ids, vec!["early", "late"]);
    }

    #[tokio::test]
    async fn test_insert_assigns_id_and_delete_removes() {
        let calendar = InMemoryCalendar::new();
        let stored = calendar
            .insert_event(&event("", "2025-05-20T09:00:00+00:00", "2025-05-20T10:00:00+00:00"))
            .await
            .unwrap();
        assert!(stored.has_id());
        assert_eq!(calendar.get_event(&stored.id).await.unwrap(), stored);

        calendar.delete_event(&stored.id).await.unwrap();
        assert!(matches!(
            calendar.delete_event(&stored.id).await,
            Err(Error::EventNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_update_unknown_id_is_not_found() {
        let calendar = InMemoryCalendar::new();
        let result = calendar
            .update_event("nope", &CalendarEvent::default())
            .await;
        assert!(matches!(result, Err(Error::EventNotFound { .. })));
    }
}
