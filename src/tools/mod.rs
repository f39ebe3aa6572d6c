mod calendar;

pub use calendar::*;

use schemars::{schema_for, JsonSchema};
use serde::Serialize;
use serde_json::Value;

/// Name, description and argument schema of one tool
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ToolDefinition {
    pub name: &'static str,
    pub description: &'static str,
    pub input_schema: Value,
}

impl ToolDefinition {
    fn new<T: JsonSchema>(name: &'static str, description: &'static str) -> Self {
        let input_schema = serde_json::to_value(schema_for!(T)).unwrap_or(Value::Null);
        Self {
            name,
            description,
            input_schema,
        }
    }
}

/// Every tool exposed by the server
pub fn definitions() -> Vec<ToolDefinition> {
    vec![
        ToolDefinition::new::<ListUpcomingArgs>(
            LIST_UPCOMING_EVENTS,
            "List upcoming calendar events with optional max results",
        ),
        ToolDefinition::new::<AddEventArgs>(
            ADD_NEW_EVENT,
            "Add a new calendar event and return its ID",
        ),
        ToolDefinition::new::<UpdateEventArgs>(
            UPDATE_EVENT,
            "Update an event by ID or name; lists current month if no identifier given",
        ),
        ToolDefinition::new::<DeleteEventArgs>(
            DELETE_EVENT,
            "Delete an event by ID or name; lists current month if no identifier given",
        ),
        ToolDefinition::new::<ManageCalendarArgs>(
            MANAGE_CALENDAR,
            "Manage the calendar with one action: list, add, update or delete",
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_definitions_cover_every_tool() {
        let names: Vec<&str> = definitions().iter().map(|d| d.name).collect();
        assert_eq!(
            names,
            vec![
                LIST_UPCOMING_EVENTS,
                ADD_NEW_EVENT,
                UPDATE_EVENT,
                DELETE_EVENT,
                MANAGE_CALENDAR
            ]
        );
    }

    #[test]
    fn test_add_event_schema_requires_summary() {
        let definition = definitions()
            .into_iter()
            .find(|d| d.name == ADD_NEW_EVENT)
            .unwrap();
        let required = definition.input_schema["required"].as_array().unwrap();
        assert!(required.iter().any(|v| v == "summary"));
        assert!(definition.input_schema["properties"]["start_datetime_str"].is_object());
    }
}
