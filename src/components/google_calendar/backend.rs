use super::models::CalendarEvent;
use super::time::TimeWindow;
use crate::error::CalendarResult;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Parameters of a listing query.
///
/// Listings always expand recurring events into single instances and order
/// them by start time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListQuery {
    /// Only events ending after this instant
    pub time_min: Option<DateTime<Utc>>,
    /// Only events starting before this instant
    pub time_max: Option<DateTime<Utc>>,
    /// Stop after this many events; `None` fetches every page
    pub max_results: Option<u32>,
}

impl ListQuery {
    /// Events overlapping `window`
    pub fn window(window: TimeWindow) -> Self {
        Self {
            time_min: Some(window.start),
            time_max: Some(window.end),
            max_results: None,
        }
    }

    /// The next `max_results` events from `from` onwards
    pub fn upcoming(from: DateTime<Utc>, max_results: u32) -> Self {
        Self {
            time_min: Some(from),
            time_max: None,
            max_results: Some(max_results),
        }
    }
}

/// CRUD capability over calendar events
#[async_trait]
pub trait CalendarBackend: Send + Sync + 'static {
    /// List events matching `query`, ordered by start time
    async fn list_events(&self, query: &ListQuery) -> CalendarResult<Vec<CalendarEvent>>;

    /// Fetch one event, failing with `EventNotFound` for unknown ids
    async fn get_event(&self, event_id: &str) -> CalendarResult<CalendarEvent>;

    /// Create an event and return it with its assigned id
    async fn insert_event(&self, event: &CalendarEvent) -> CalendarResult<CalendarEvent>;

    /// Replace the stored event with the full `event` body
    async fn update_event(&self, event_id: &str, event: &CalendarEvent)
        -> CalendarResult<CalendarEvent>;

    async fn delete_event(&self, event_id: &str) -> CalendarResult<()>;
}
