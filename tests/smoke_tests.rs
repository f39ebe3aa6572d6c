use calendar_tools::components::google_calendar::{normalize, NameMatchPolicy};
use calendar_tools::config::{BackendKind, Config};
use calendar_tools::startup::build_backend;
use calendar_tools::tools::{definitions, CalendarTools, ListUpcomingArgs};

/// Smoke test to verify the defaults of the config
#[test]
fn test_config_defaults() {
    let config = Config::default();

    assert_eq!(config.timezone, "Asia/Karachi");
    assert_eq!(config.google_calendar_id, "primary");
    assert_eq!(config.token_file.to_str(), Some("token.json"));
    assert_eq!(config.name_match_policy, NameMatchPolicy::Earliest);
    assert_eq!(config.backend, BackendKind::Google);
}

/// Smoke test for the memory backend wiring
#[tokio::test]
async fn test_memory_backend_starts_empty() {
    let config = Config {
        backend: BackendKind::Memory,
        ..Config::default()
    };
    let backend = build_backend(&config).unwrap();
    let tools = CalendarTools::from_config(backend, &config);

    let events = tools
        .list_upcoming_events(ListUpcomingArgs::default())
        .await
        .unwrap();
    assert!(events.is_empty());
}

/// Smoke test for building the Google backend without touching the network
#[test]
fn test_google_backend_builds_lazily() {
    let dir = tempfile::tempdir().unwrap();
    let config = Config {
        token_file: dir.path().join("token.json"),
        ..Config::default()
    };
    assert!(build_backend(&config).is_ok());
}

#[test]
fn test_normalize_examples() {
    assert_eq!(
        normalize(Some("2025-05-20 3pm"), "Asia/Karachi").unwrap().as_deref(),
        Some("2025-05-20T15:00:00+05:00")
    );
    assert_eq!(normalize(Some(""), "Asia/Karachi").unwrap(), None);
    assert_eq!(normalize(None, "Asia/Karachi").unwrap(), None);
}

#[test]
fn test_every_tool_has_an_object_schema() {
    for definition in definitions() {
        assert_eq!(definition.input_schema["type"], "object", "{}", definition.name);
    }
}
