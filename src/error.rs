use miette::Diagnostic;
use thiserror::Error;

/// Main error type for the calendar tools
#[derive(Debug, Error, Diagnostic)]
pub enum Error {
    #[error("Invalid date format '{input}': {reason}")]
    #[diagnostic(code(calendar_tools::invalid_date_format))]
    InvalidDateFormat { input: String, reason: String },

    #[error("Unknown timezone: {0}")]
    #[diagnostic(
        code(calendar_tools::invalid_timezone),
        help("Use an IANA zone name such as 'Europe/Helsinki' or 'Asia/Karachi'")
    )]
    InvalidTimezone(String),

    #[error("Missing required field: {0}")]
    #[diagnostic(code(calendar_tools::missing_required_field))]
    MissingRequiredField(&'static str),

    #[error("No event found {lookup}")]
    #[diagnostic(code(calendar_tools::event_not_found))]
    EventNotFound { lookup: String },

    #[error("Event name '{name}' is ambiguous, {} events match", .candidates.len())]
    #[diagnostic(
        code(calendar_tools::ambiguous_event_name),
        help("Pass the event id instead of the name")
    )]
    AmbiguousEventName { name: String, candidates: Vec<String> },

    #[error("Unknown action '{0}'. Use 'list', 'add', 'update', or 'delete'.")]
    #[diagnostic(code(calendar_tools::unsupported_action))]
    UnsupportedAction(String),

    #[error("Unknown tool: {0}")]
    #[diagnostic(code(calendar_tools::unknown_tool))]
    UnknownTool(String),

    #[error("Invalid tool arguments: {0}")]
    #[diagnostic(code(calendar_tools::invalid_arguments))]
    InvalidArguments(String),

    #[error("Authentication error: {0}")]
    #[diagnostic(
        code(calendar_tools::auth),
        help("Run the get_calendar_token binary to authorize again")
    )]
    Auth(String),

    #[error("Google Calendar API error: {0}")]
    #[diagnostic(code(calendar_tools::backend))]
    Backend(String),

    #[error("Environment error: {0}")]
    #[diagnostic(code(calendar_tools::environment))]
    Environment(String),

    #[error("Configuration error: {0}")]
    #[diagnostic(code(calendar_tools::config))]
    Config(String),

    #[error(transparent)]
    #[diagnostic(code(calendar_tools::io))]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    #[diagnostic(code(calendar_tools::serialization))]
    Serialization(String),

    #[error("Other error: {0}")]
    #[diagnostic(code(calendar_tools::other))]
    Other(String),
}

impl Error {
    /// Short machine-readable name of the error kind
    pub fn kind(&self) -> &'static str {
        match self {
            Error::InvalidDateFormat { .. } => "InvalidDateFormat",
            Error::InvalidTimezone(_) => "InvalidTimezone",
            Error::MissingRequiredField(_) => "MissingRequiredField",
            Error::EventNotFound { .. } => "EventNotFound",
            Error::AmbiguousEventName { .. } => "AmbiguousEventName",
            Error::UnsupportedAction(_) => "UnsupportedAction",
            Error::UnknownTool(_) => "UnknownTool",
            Error::InvalidArguments(_) => "InvalidArguments",
            Error::Auth(_) => "AuthError",
            Error::Backend(_) => "BackendError",
            Error::Environment(_) => "EnvironmentError",
            Error::Config(_) => "ConfigError",
            Error::Io(_) => "IoError",
            Error::Serialization(_) => "SerializationError",
            Error::Other(_) => "Other",
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

// Implement From for TOML deserialization errors
impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Error::Config(err.to_string())
    }
}

/// Type alias for Result with our Error type
pub type CalendarResult<T> = Result<T, Error>;

/// Helper to create environment errors
pub fn env_error(var: &str) -> Error {
    Error::Environment(format!("Missing environment variable: {}", var))
}

/// Helper to create configuration errors
pub fn config_error(message: &str) -> Error {
    Error::Config(message.to_string())
}

/// Helper to create authentication errors
pub fn auth_error(message: &str) -> Error {
    Error::Auth(message.to_string())
}

/// Helper to create Google Calendar errors
pub fn backend_error(message: &str) -> Error {
    Error::Backend(message.to_string())
}

/// Helper to create "not found" errors for an event id
pub fn event_id_not_found(id: &str) -> Error {
    Error::EventNotFound {
        lookup: format!("with id '{}'", id),
    }
}

/// Helper to create "not found" errors for an event name
pub fn event_name_not_found(name: &str) -> Error {
    Error::EventNotFound {
        lookup: format!("with name '{}'", name),
    }
}

/// Helper to create other errors
pub fn other_error(message: &str) -> Error {
    Error::Other(message.to_string())
}
