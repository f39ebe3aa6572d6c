use crate::components::google_calendar::backend::{CalendarBackend, ListQuery};
use crate::components::google_calendar::format::{receipt, ReceiptKind};
use crate::components::google_calendar::models::{CalendarEvent, EventDateTime};
use crate::components::google_calendar::resolver::{
    EventResolver, NameMatchPolicy, Resolution, ResolutionRequest,
};
use crate::components::google_calendar::time::{normalize_at, parse_zone, TimeWindow};
use crate::config::Config;
use crate::error::{CalendarResult, Error};
use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, info};

pub const LIST_UPCOMING_EVENTS: &str = "list_upcoming_events";
pub const ADD_NEW_EVENT: &str = "add_new_event";
pub const UPDATE_EVENT: &str = "update_event";
pub const DELETE_EVENT: &str = "delete_event";
pub const MANAGE_CALENDAR: &str = "manage_calendar";

pub const DEFAULT_MAX_RESULTS: u32 = 10;
/// Upper bound accepted by the events endpoint for one page
pub const MAX_RESULTS_LIMIT: u32 = 2500;

fn default_max_results() -> u32 {
    DEFAULT_MAX_RESULTS
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct ListUpcomingArgs {
    /// Maximum number of events to return (1-2500). Defaults to 10.
    #[serde(default = "default_max_results")]
    pub max_results: u32,
}

impl Default for ListUpcomingArgs {
    fn default() -> Self {
        Self {
            max_results: DEFAULT_MAX_RESULTS,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, JsonSchema)]
pub struct AddEventArgs {
    /// Event title.
    #[serde(alias = "title")]
    pub summary: String,
    #[serde(default)]
    pub description: Option<String>,
    /// Start date and time, e.g. "2025-05-20 3pm" or "2025-05-20T15:00:00".
    #[serde(default, alias = "start")]
    pub start_datetime_str: Option<String>,
    /// End date and time, same formats as the start.
    #[serde(default, alias = "end")]
    pub end_datetime_str: Option<String>,
    /// IANA timezone for times without an explicit zone. Defaults to the configured zone.
    #[serde(default, alias = "zone")]
    pub timezone: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, JsonSchema)]
pub struct UpdateEventArgs {
    /// Identifier of the event to update.
    #[serde(default)]
    pub event_id: Option<String>,
    /// Title of the event to update, matched case-insensitively within the current month.
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub new_summary: Option<String>,
    #[serde(default)]
    pub new_description: Option<String>,
    #[serde(default)]
    pub new_start: Option<String>,
    #[serde(default)]
    pub new_end: Option<String>,
    #[serde(default)]
    pub new_location: Option<String>,
    /// IANA timezone for the new start and end. Defaults to the configured zone.
    #[serde(default)]
    pub timezone: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, JsonSchema)]
pub struct DeleteEventArgs {
    /// Identifier of the event to delete.
    #[serde(default)]
    pub event_id: Option<String>,
    /// Title of the event to delete, matched case-insensitively within the current month.
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, JsonSchema)]
pub struct ManageCalendarArgs {
    /// One of "list", "add", "update" or "delete".
    pub action: String,
    #[serde(default)]
    pub event_id: Option<String>,
    /// Title used to find the event for "update" and "delete".
    #[serde(default)]
    pub name: Option<String>,
    /// Title of a new event, or the new title on "update".
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub start_datetime_str: Option<String>,
    #[serde(default)]
    pub end_datetime_str: Option<String>,
    #[serde(default)]
    pub timezone: Option<String>,
    /// Only used by "list". Defaults to 10.
    #[serde(default)]
    pub max_results: Option<u32>,
}

/// Result of `add_new_event`
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct AddedEvent {
    pub id: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum UpdateOutcome {
    /// No event was named; the current month is returned instead
    Listing { events: Vec<CalendarEvent> },
    Updated {
        id: String,
        summary: Option<String>,
        message: String,
    },
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum DeleteOutcome {
    /// No event was named; the current month is returned instead
    Listing { events: Vec<CalendarEvent> },
    Deleted {
        deleted: bool,
        id: String,
        message: String,
    },
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(untagged)]
pub enum ManageOutcome {
    Listed(Vec<CalendarEvent>),
    Added(AddedEvent),
    Updated(UpdateOutcome),
    Deleted(DeleteOutcome),
}

/// Actions understood by `manage_calendar`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalendarAction {
    List,
    Add,
    Update,
    Delete,
}

impl FromStr for CalendarAction {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "list" => Ok(CalendarAction::List),
            "add" => Ok(CalendarAction::Add),
            "update" => Ok(CalendarAction::Update),
            "delete" => Ok(CalendarAction::Delete),
            _ => Err(Error::UnsupportedAction(s.to_string())),
        }
    }
}

impl fmt::Display for CalendarAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CalendarAction::List => "list",
            CalendarAction::Add => "add",
            CalendarAction::Update => "update",
            CalendarAction::Delete => "delete",
        };
        f.write_str(name)
    }
}

type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// The calendar tool operations over one backend
#[derive(Clone)]
pub struct CalendarTools {
    backend: Arc<dyn CalendarBackend>,
    default_timezone: String,
    policy: NameMatchPolicy,
    clock: Clock,
}

impl CalendarTools {
    pub fn new(
        backend: Arc<dyn CalendarBackend>,
        default_timezone: impl Into<String>,
        policy: NameMatchPolicy,
    ) -> Self {
        Self {
            backend,
            default_timezone: default_timezone.into(),
            policy,
            clock: Arc::new(Utc::now),
        }
    }

    pub fn from_config(backend: Arc<dyn CalendarBackend>, config: &Config) -> Self {
        Self::new(backend, config.timezone.clone(), config.name_match_policy)
    }

    /// Replace the source of "now", used for listing windows and relative dates
    pub fn with_clock<F>(mut self, clock: F) -> Self
    where
        F: Fn() -> DateTime<Utc> + Send + Sync + 'static,
    {
        self.clock = Arc::new(clock);
        self
    }

    pub fn default_timezone(&self) -> &str {
        &self.default_timezone
    }

    fn now(&self) -> DateTime<Utc> {
        (self.clock)()
    }

    fn zone_or_default(&self, zone: Option<&str>) -> String {
        match zone.map(str::trim) {
            Some(zone) if !zone.is_empty() => zone.to_string(),
            _ => self.default_timezone.clone(),
        }
    }

    fn resolver(&self) -> EventResolver<'_> {
        EventResolver::new(self.backend.as_ref(), self.policy)
    }

    /// Upcoming events from now on, ascending by start
    pub async fn list_upcoming_events(
        &self,
        args: ListUpcomingArgs,
    ) -> CalendarResult<Vec<CalendarEvent>> {
        let max_results = args.max_results.clamp(1, MAX_RESULTS_LIMIT);
        let events = self
            .backend
            .list_events(&ListQuery::upcoming(self.now(), max_results))
            .await?;
        debug!("Found {} upcoming event(s)", events.len());
        Ok(events)
    }

    /// Create an event; summary, start and end are required
    pub async fn add_event(&self, args: AddEventArgs) -> CalendarResult<AddedEvent> {
        if args.summary.trim().is_empty() {
            return Err(Error::MissingRequiredField("summary"));
        }
        let zone = self.zone_or_default(args.timezone.as_deref());
        let now = self.now();

        let start = normalize_at(args.start_datetime_str.as_deref(), &zone, now)?
            .ok_or(Error::MissingRequiredField("start_datetime_str"))?;
        let end = normalize_at(args.end_datetime_str.as_deref(), &zone, now)?
            .ok_or(Error::MissingRequiredField("end_datetime_str"))?;

        let event = CalendarEvent {
            summary: Some(args.summary),
            description: args.description.filter(|d| !d.is_empty()),
            location: args.location.filter(|l| !l.is_empty()),
            start: EventDateTime::timed(start, zone.as_str()),
            end: EventDateTime::timed(end, zone.as_str()),
            ..Default::default()
        };

        let created = self.backend.insert_event(&event).await?;
        info!("Created event {} ({})", created.id, created.title());

        let message = receipt(ReceiptKind::Added, &created, &zone_label(&created, &zone));
        Ok(AddedEvent {
            id: created.id,
            message,
        })
    }

    /// Merge-patch an event found by id or name; with neither, list the current month
    pub async fn update_event(&self, args: UpdateEventArgs) -> CalendarResult<UpdateOutcome> {
        let request = ResolutionRequest::new(args.event_id.clone(), args.name.clone());
        let window = TimeWindow::month_containing(self.now());

        let event = match self.resolver().resolve(&request, window).await? {
            Resolution::Listing(events) => return Ok(UpdateOutcome::Listing { events }),
            Resolution::Resolved(event) => event,
        };

        let zone = self.zone_or_default(args.timezone.as_deref());
        let patched = apply_patch(event, &args, &zone, self.now())?;

        let updated = self.backend.update_event(&patched.id, &patched).await?;
        info!("Updated event {} ({})", updated.id, updated.title());

        let message = receipt(ReceiptKind::Updated, &updated, &zone_label(&updated, &zone));
        Ok(UpdateOutcome::Updated {
            id: if updated.has_id() { updated.id.clone() } else { patched.id },
            summary: updated.summary,
            message,
        })
    }

    /// Delete an event found by id or name; with neither, list the current month
    pub async fn delete_event(&self, args: DeleteEventArgs) -> CalendarResult<DeleteOutcome> {
        let request = ResolutionRequest::new(args.event_id, args.name);
        let window = TimeWindow::month_containing(self.now());

        let event = match self.resolver().resolve(&request, window).await? {
            Resolution::Listing(events) => return Ok(DeleteOutcome::Listing { events }),
            Resolution::Resolved(event) => event,
        };

        self.backend.delete_event(&event.id).await?;
        info!("Deleted event {} ({})", event.id, event.title());

        let message = receipt(
            ReceiptKind::Deleted,
            &event,
            &zone_label(&event, &self.default_timezone),
        );
        Ok(DeleteOutcome::Deleted {
            deleted: true,
            id: event.id,
            message,
        })
    }

    /// Single entry point forwarding to the other operations by action name
    pub async fn manage_calendar(&self, args: ManageCalendarArgs) -> CalendarResult<ManageOutcome> {
        let action: CalendarAction = args.action.parse()?;
        debug!("manage_calendar action {}", action);

        match action {
            CalendarAction::List => {
                let list_args = ListUpcomingArgs {
                    max_results: args.max_results.unwrap_or(DEFAULT_MAX_RESULTS),
                };
                self.list_upcoming_events(list_args)
                    .await
                    .map(ManageOutcome::Listed)
            }
            CalendarAction::Add => {
                let summary = args
                    .summary
                    .filter(|s| !s.trim().is_empty())
                    .ok_or(Error::MissingRequiredField("summary"))?;
                let add_args = AddEventArgs {
                    summary,
                    description: args.description,
                    start_datetime_str: args.start_datetime_str,
                    end_datetime_str: args.end_datetime_str,
                    timezone: args.timezone,
                    location: args.location,
                };
                self.add_event(add_args).await.map(ManageOutcome::Added)
            }
            CalendarAction::Update => {
                let update_args = UpdateEventArgs {
                    event_id: args.event_id,
                    name: args.name,
                    new_summary: args.summary,
                    new_description: args.description,
                    new_start: args.start_datetime_str,
                    new_end: args.end_datetime_str,
                    new_location: args.location,
                    timezone: args.timezone,
                };
                self.update_event(update_args)
                    .await
                    .map(ManageOutcome::Updated)
            }
            CalendarAction::Delete => {
                let delete_args = DeleteEventArgs {
                    event_id: args.event_id,
                    name: args.name,
                };
                self.delete_event(delete_args)
                    .await
                    .map(ManageOutcome::Deleted)
            }
        }
    }

    /// Run a tool by name with a JSON argument object
    pub async fn invoke(&self, tool: &str, args: Value) -> CalendarResult<Value> {
        info!("Invoking tool {}", tool);

        match tool {
            LIST_UPCOMING_EVENTS => to_value(self.list_upcoming_events(parse_args(args)?).await?),
            ADD_NEW_EVENT => to_value(self.add_event(parse_args(args)?).await?),
            UPDATE_EVENT => to_value(self.update_event(parse_args(args)?).await?),
            DELETE_EVENT => to_value(self.delete_event(parse_args(args)?).await?),
            MANAGE_CALENDAR => to_value(self.manage_calendar(parse_args(args)?).await?),
            other => Err(Error::UnknownTool(other.to_string())),
        }
    }
}

/// Overwrite the fields that carry a non-empty new value.
///
/// Dates are normalized before anything is touched, so a bad date leaves the
/// event unchanged. A new start or end moves both boundaries to `zone`.
fn apply_patch(
    mut event: CalendarEvent,
    args: &UpdateEventArgs,
    zone: &str,
    now: DateTime<Utc>,
) -> CalendarResult<CalendarEvent> {
    let new_start = normalize_at(args.new_start.as_deref(), zone, now)?;
    let new_end = normalize_at(args.new_end.as_deref(), zone, now)?;
    let retimed = new_start.is_some() || new_end.is_some();

    if let Some(summary) = non_empty(&args.new_summary) {
        event.summary = Some(summary);
    }
    if let Some(description) = non_empty(&args.new_description) {
        event.description = Some(description);
    }
    if let Some(location) = non_empty(&args.new_location) {
        event.location = Some(location);
    }

    if let Some(start) = new_start {
        event.start.date_time = Some(start);
        event.start.date = None;
    }
    if let Some(end) = new_end {
        event.end.date_time = Some(end);
        event.end.date = None;
    }
    if retimed {
        event.start.time_zone = Some(zone.to_string());
        event.end.time_zone = Some(zone.to_string());
    }

    Ok(event)
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value.as_ref().filter(|v| !v.trim().is_empty()).cloned()
}

/// Zone shown in receipts: the event's own start zone when it has one
fn zone_label(event: &CalendarEvent, fallback: &str) -> String {
    event
        .start
        .time_zone
        .clone()
        .filter(|zone| parse_zone(zone).is_ok())
        .unwrap_or_else(|| fallback.to_string())
}

fn parse_args<T: DeserializeOwned>(args: Value) -> CalendarResult<T> {
    let args = match args {
        Value::Null => Value::Object(Default::default()),
        other => other,
    };
    serde_json::from_value(args).map_err(|e| Error::InvalidArguments(e.to_string()))
}

fn to_value<T: Serialize>(value: T) -> CalendarResult<Value> {
    Ok(serde_json::to_value(value)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::google_calendar::memory::InMemoryCalendar;
    use chrono::TimeZone;
    use serde_json::json;

    fn may_15() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 5, 15, 12, 0, 0).unwrap()
    }

    fn tools(events: Vec<CalendarEvent>) -> (Arc<InMemoryCalendar>, CalendarTools) {
        let backend = Arc::new(InMemoryCalendar::with_events(events));
        let tools = CalendarTools::new(backend.clone(), "Asia/Karachi", NameMatchPolicy::Earliest)
            .with_clock(may_15);
        (backend, tools)
    }

    fn standup() -> CalendarEvent {
        CalendarEvent {
            id: "standup".to_string(),
            summary: Some("Standup".to_string()),
            description: Some("Daily sync".to_string()),
            start: EventDateTime::timed("2025-05-20T09:00:00+05:00", "Asia/Karachi"),
            end: EventDateTime::timed("2025-05-20T09:15:00+05:00", "Asia/Karachi"),
            ..Default::default()
        }
    }

    #[test]
    fn test_action_parsing() {
        assert_eq!("LIST".parse::<CalendarAction>().unwrap(), CalendarAction::List);
        let err = "archive".parse::<CalendarAction>().unwrap_err();
        assert_eq!(
            err.to_string(),
            "Unknown action 'archive'. Use 'list', 'add', 'update', or 'delete'."
        );
    }

    #[test]
    fn test_patch_with_bad_date_changes_nothing() {
        let args = UpdateEventArgs {
            new_summary: Some("Renamed".to_string()),
            new_start: Some("not a date".to_string()),
            ..Default::default()
        };
        let result = apply_patch(standup(), &args, "Asia/Karachi", may_15());
        assert!(matches!(result, Err(Error::InvalidDateFormat { .. })));
    }

    #[test]
    fn test_patch_rewrites_both_zones_on_new_start() {
        let args = UpdateEventArgs {
            new_start: Some("2025-05-20 10am".to_string()),
            ..Default::default()
        };
        let patched = apply_patch(standup(), &args, "Europe/Helsinki", may_15()).unwrap();
        assert_eq!(
            patched.start.date_time.as_deref(),
            Some("2025-05-20T10:00:00+03:00")
        );
        assert_eq!(patched.start.time_zone.as_deref(), Some("Europe/Helsinki"));
        assert_eq!(patched.end.time_zone.as_deref(), Some("Europe/Helsinki"));
        assert_eq!(patched.end.date_time, standup().end.date_time);
    }

    #[tokio::test]
    async fn test_add_event_uses_default_zone() {
        let (backend, tools) = tools(vec![]);
        let added = tools
            .add_event(AddEventArgs {
                summary: "Lunch".to_string(),
                start_datetime_str: Some("2025-05-20 1pm".to_string()),
                end_datetime_str: Some("2025-05-20 2pm".to_string()),
                ..Default::default()
            })
            .await
            .unwrap();

        let stored = backend.get_event(&added.id).await.unwrap();
        assert_eq!(stored.start.date_time.as_deref(), Some("2025-05-20T13:00:00+05:00"));
        assert_eq!(stored.start.time_zone.as_deref(), Some("Asia/Karachi"));
        assert!(added.message.contains("Time: 13:00 - 14:00 (Asia/Karachi)"));
    }

    #[tokio::test]
    async fn test_add_event_without_end_is_missing_field() {
        let (backend, tools) = tools(vec![]);
        let err = tools
            .add_event(AddEventArgs {
                summary: "Lunch".to_string(),
                start_datetime_str: Some("2025-05-20 1pm".to_string()),
                end_datetime_str: Some("   ".to_string()),
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert!(matches!(err, Error::MissingRequiredField("end_datetime_str")));
        assert!(backend.snapshot().await.is_empty());
    }

    #[tokio::test]
    async fn test_add_event_with_blank_summary_is_missing_field() {
        let (backend, tools) = tools(vec![]);
        let err = tools
            .add_event(AddEventArgs {
                summary: "  ".to_string(),
                start_datetime_str: Some("2025-05-20 1pm".to_string()),
                end_datetime_str: Some("2025-05-20 2pm".to_string()),
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert!(matches!(err, Error::MissingRequiredField("summary")));
        assert!(backend.snapshot().await.is_empty());
    }

    #[tokio::test]
    async fn test_invoke_rejects_unknown_tool_and_bad_args() {
        let (_, tools) = tools(vec![]);
        assert!(matches!(
            tools.invoke("rename_calendar", json!({})).await,
            Err(Error::UnknownTool(_))
        ));
        assert!(matches!(
            tools.invoke(LIST_UPCOMING_EVENTS, json!({"max_results": "ten"})).await,
            Err(Error::InvalidArguments(_))
        ));
    }

    #[tokio::test]
    async fn test_invoke_list_with_null_args_uses_default() {
        let (_, tools) = tools(vec![standup()]);
        let value = tools.invoke(LIST_UPCOMING_EVENTS, Value::Null).await.unwrap();
        assert_eq!(value.as_array().map(Vec::len), Some(1));
    }

    #[tokio::test]
    async fn test_manage_add_requires_summary() {
        let (_, tools) = tools(vec![]);
        let err = tools
            .manage_calendar(ManageCalendarArgs {
                action: "add".to_string(),
                start_datetime_str: Some("2025-05-20 1pm".to_string()),
                end_datetime_str: Some("2025-05-20 2pm".to_string()),
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert!(matches!(err, Error::MissingRequiredField("summary")));
    }
}
