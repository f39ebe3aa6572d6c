use crate::components::google_calendar::resolver::NameMatchPolicy;
use crate::error::{config_error, env_error, CalendarResult};
use chrono_tz::Tz;
use dotenvy::dotenv;
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Default timezone used when a tool call does not name one
pub const DEFAULT_TIMEZONE: &str = "Asia/Karachi";
/// Default config file, overridable with `CALENDAR_TOOLS_CONFIG`
pub const DEFAULT_CONFIG_FILE: &str = "config/calendar_tools.toml";
pub const DEFAULT_API_BASE_URL: &str = "https://www.googleapis.com/calendar/v3";
pub const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
pub const DEFAULT_AUTH_URI: &str = "https://accounts.google.com/o/oauth2/v2/auth";
/// Scope requested for read/write calendar access
pub const CALENDAR_SCOPE: &str = "https://www.googleapis.com/auth/calendar";

/// Which calendar backend the tool server talks to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    #[default]
    Google,
    /// Process-local calendar, useful for demos and tests
    Memory,
}

impl std::str::FromStr for BackendKind {
    type Err = crate::error::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "google" => Ok(BackendKind::Google),
            "memory" => Ok(BackendKind::Memory),
            other => Err(config_error(&format!("Unknown calendar backend: {}", other))),
        }
    }
}

/// Main configuration structure for the calendar tools
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Google OAuth client ID
    pub google_client_id: String,
    /// Google OAuth client secret
    pub google_client_secret: String,
    /// Installed-app client secrets file downloaded from the Cloud Console
    pub credentials_file: PathBuf,
    /// Calendar to operate on
    pub google_calendar_id: String,
    /// Where the OAuth token record is persisted
    pub token_file: PathBuf,
    /// Default timezone for date normalization
    pub timezone: String,
    /// How a name lookup that matches several events is resolved
    pub name_match_policy: NameMatchPolicy,
    /// Address the tool server binds to
    pub listen_addr: String,
    /// Local port receiving the OAuth redirect
    pub oauth_redirect_port: u16,
    pub api_base_url: String,
    pub token_uri: String,
    pub auth_uri: String,
    pub backend: BackendKind,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            google_client_id: String::new(),
            google_client_secret: String::new(),
            credentials_file: PathBuf::from("credentials.json"),
            google_calendar_id: "primary".to_string(),
            token_file: PathBuf::from("token.json"),
            timezone: DEFAULT_TIMEZONE.to_string(),
            name_match_policy: NameMatchPolicy::default(),
            listen_addr: "127.0.0.1:8000".to_string(),
            oauth_redirect_port: 8080,
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            token_uri: DEFAULT_TOKEN_URI.to_string(),
            auth_uri: DEFAULT_AUTH_URI.to_string(),
            backend: BackendKind::Google,
        }
    }
}

/// Optional values read from the TOML config file
#[derive(Debug, Default, Deserialize)]
struct FileConfig {
    google_client_id: Option<String>,
    google_client_secret: Option<String>,
    credentials_file: Option<PathBuf>,
    google_calendar_id: Option<String>,
    token_file: Option<PathBuf>,
    timezone: Option<String>,
    name_match_policy: Option<NameMatchPolicy>,
    listen_addr: Option<String>,
    oauth_redirect_port: Option<u16>,
    api_base_url: Option<String>,
    token_uri: Option<String>,
    backend: Option<BackendKind>,
}

/// OAuth client entry of a Google client secrets file
#[derive(Debug, Clone, Deserialize)]
pub struct ClientSecret {
    pub client_id: String,
    pub client_secret: String,
    pub auth_uri: Option<String>,
    pub token_uri: Option<String>,
}

/// Google client secrets file, either for an installed or a web app
#[derive(Debug, Deserialize)]
struct ClientSecretsFile {
    installed: Option<ClientSecret>,
    web: Option<ClientSecret>,
}

impl Config {
    /// Load configuration from environment and config file
    pub fn load() -> CalendarResult<Self> {
        // Load .env file if it exists
        dotenv().ok();

        let config_path =
            env::var("CALENDAR_TOOLS_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_FILE.to_string());
        let file = load_file_config(Path::new(&config_path))?;

        let defaults = Config::default();

        let backend = match env::var("CALENDAR_BACKEND") {
            Ok(value) => value.parse()?,
            Err(_) => file.backend.unwrap_or(defaults.backend),
        };

        let name_match_policy = match env::var("NAME_MATCH_POLICY") {
            Ok(value) => value.parse()?,
            Err(_) => file.name_match_policy.unwrap_or(defaults.name_match_policy),
        };

        let oauth_redirect_port = match env::var("OAUTH_REDIRECT_PORT") {
            Ok(value) => value
                .parse::<u16>()
                .map_err(|_| env_error("Invalid OAUTH_REDIRECT_PORT format"))?,
            Err(_) => file.oauth_redirect_port.unwrap_or(defaults.oauth_redirect_port),
        };

        let mut config = Config {
            google_client_id: env_or("GOOGLE_CLIENT_ID", file.google_client_id)
                .unwrap_or_default(),
            google_client_secret: env_or("GOOGLE_CLIENT_SECRET", file.google_client_secret)
                .unwrap_or_default(),
            credentials_file: env_or("GOOGLE_CREDENTIALS_FILE", None)
                .map(PathBuf::from)
                .or(file.credentials_file)
                .unwrap_or(defaults.credentials_file),
            google_calendar_id: env_or("GOOGLE_CALENDAR_ID", file.google_calendar_id)
                .unwrap_or(defaults.google_calendar_id),
            token_file: env_or("TOKEN_FILE", None)
                .map(PathBuf::from)
                .or(file.token_file)
                .unwrap_or(defaults.token_file),
            timezone: env_or("TIMEZONE", file.timezone).unwrap_or(defaults.timezone),
            name_match_policy,
            listen_addr: env_or("LISTEN_ADDR", file.listen_addr).unwrap_or(defaults.listen_addr),
            oauth_redirect_port,
            api_base_url: env_or("GOOGLE_API_BASE_URL", file.api_base_url)
                .unwrap_or(defaults.api_base_url),
            token_uri: env_or("GOOGLE_TOKEN_URI", file.token_uri).unwrap_or(defaults.token_uri),
            auth_uri: defaults.auth_uri,
            backend,
        };

        config.validate_timezone()?;

        if config.backend == BackendKind::Google {
            config.fill_client_credentials()?;
        }

        Ok(config)
    }

    /// Parse the configured default timezone
    pub fn default_tz(&self) -> CalendarResult<Tz> {
        self.timezone
            .parse::<Tz>()
            .map_err(|_| config_error(&format!("Invalid TIMEZONE: {}", self.timezone)))
    }

    fn validate_timezone(&self) -> CalendarResult<()> {
        self.default_tz().map(|_| ())
    }

    /// Fill in missing client credentials from the client secrets file
    pub fn fill_client_credentials(&mut self) -> CalendarResult<()> {
        if !self.google_client_id.is_empty() && !self.google_client_secret.is_empty() {
            return Ok(());
        }

        match read_client_secret(&self.credentials_file)? {
            Some(secret) => {
                debug!(
                    "Using client credentials from {}",
                    self.credentials_file.display()
                );
                if self.google_client_id.is_empty() {
                    self.google_client_id = secret.client_id;
                }
                if self.google_client_secret.is_empty() {
                    self.google_client_secret = secret.client_secret;
                }
                if let Some(auth_uri) = secret.auth_uri {
                    self.auth_uri = auth_uri;
                }
                Ok(())
            }
            None if self.google_client_id.is_empty() => Err(env_error("GOOGLE_CLIENT_ID")),
            None => Err(env_error("GOOGLE_CLIENT_SECRET")),
        }
    }
}

fn env_or(key: &str, fallback: Option<String>) -> Option<String> {
    env::var(key)
        .ok()
        .filter(|value| !value.trim().is_empty())
        .or(fallback)
}

fn load_file_config(path: &Path) -> CalendarResult<FileConfig> {
    match fs::read_to_string(path) {
        Ok(content) => Ok(toml::from_str::<FileConfig>(&content)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(FileConfig::default()),
        Err(e) => {
            warn!("Could not read config file {}: {}", path.display(), e);
            Err(e.into())
        }
    }
}

/// Read the OAuth client entry from a client secrets file, if the file exists
pub fn read_client_secret(path: &Path) -> CalendarResult<Option<ClientSecret>> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };

    let secrets: ClientSecretsFile = serde_json::from_str(&content).map_err(|e| {
        config_error(&format!(
            "Failed to parse client secrets {}: {}",
            path.display(),
            e
        ))
    })?;

    secrets
        .installed
        .or(secrets.web)
        .map(Some)
        .ok_or_else(|| {
            config_error(&format!(
                "{} has neither an 'installed' nor a 'web' entry",
                path.display()
            ))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_read_installed_client_secret() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"installed": {{"client_id": "abc.apps.googleusercontent.com", "client_secret": "s3cret", "token_uri": "https://oauth2.googleapis.com/token"}}}}"#
        )
        .unwrap();

        let secret = read_client_secret(file.path()).unwrap().unwrap();
        assert_eq!(secret.client_id, "abc.apps.googleusercontent.com");
        assert_eq!(secret.client_secret, "s3cret");
        assert!(secret.auth_uri.is_none());
    }

    #[test]
    fn test_missing_client_secret_file_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let result = read_client_secret(&dir.path().join("credentials.json")).unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn test_fill_client_credentials_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"web": {{"client_id": "web-id", "client_secret": "web-secret"}}}}"#
        )
        .unwrap();

        let mut config = Config {
            credentials_file: file.path().to_path_buf(),
            ..Config::default()
        };
        config.fill_client_credentials().unwrap();
        assert_eq!(config.google_client_id, "web-id");
        assert_eq!(config.google_client_secret, "web-secret");
    }

    #[test]
    fn test_file_config_parses_policy_and_backend() {
        let parsed: FileConfig = toml::from_str(
            r#"
            timezone = "Europe/Helsinki"
            name_match_policy = "reject"
            backend = "memory"
            "#,
        )
        .unwrap();
        assert_eq!(parsed.timezone.as_deref(), Some("Europe/Helsinki"));
        assert_eq!(parsed.name_match_policy, Some(NameMatchPolicy::RejectAmbiguous));
        assert_eq!(parsed.backend, Some(BackendKind::Memory));
    }

    #[test]
    fn test_default_tz_rejects_unknown_zone() {
        let config = Config {
            timezone: "Mars/Olympus".to_string(),
            ..Config::default()
        };
        assert!(config.default_tz().is_err());
        assert_eq!(Config::default().default_tz().unwrap(), chrono_tz::Asia::Karachi);
    }
}
