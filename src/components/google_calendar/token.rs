use crate::config::Config;
use crate::error::{auth_error, CalendarResult};
use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Seconds before the recorded expiry at which a token counts as expired
pub const EXPIRY_SKEW_SECS: i64 = 60;

const REAUTHORIZE_HINT: &str = "run the get_calendar_token binary to authorize again";

/// OAuth token record persisted in the token file
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StoredToken {
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    /// Unix timestamp in seconds
    pub expires_at: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    #[serde(default = "default_token_type")]
    pub token_type: String,
}

fn default_token_type() -> String {
    "Bearer".to_string()
}

impl StoredToken {
    pub fn is_expired_at(&self, now: i64) -> bool {
        self.expires_at - EXPIRY_SKEW_SECS <= now
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now().timestamp())
    }
}

/// Response of the OAuth token endpoint
#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<i64>,
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(default)]
    pub token_type: Option<String>,
}

impl TokenResponse {
    /// Turn the response into a stored record, keeping `previous_refresh`
    /// when the endpoint did not issue a new refresh token
    pub fn into_stored(self, previous_refresh: Option<String>, now: i64) -> StoredToken {
        StoredToken {
            access_token: self.access_token,
            refresh_token: self.refresh_token.or(previous_refresh),
            expires_at: now + self.expires_in.unwrap_or(3600),
            scope: self.scope,
            token_type: self.token_type.unwrap_or_else(default_token_type),
        }
    }
}

/// Source of bearer tokens for the calendar API
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    /// A currently valid access token, refreshing once if it has expired
    async fn get_valid_credential(&self) -> CalendarResult<String>;

    /// Force a refresh, used when the API rejects the current token
    async fn refresh_credential(&self) -> CalendarResult<String>;
}

/// File-backed OAuth token lifecycle
pub struct TokenManager {
    token_file: PathBuf,
    client_id: String,
    client_secret: String,
    token_uri: String,
    client: Client,
    cached: Mutex<Option<StoredToken>>,
    /// Held across the expiry check and the refresh so only one caller refreshes
    refresh_lock: Mutex<()>,
}

impl TokenManager {
    pub fn new(config: &Config) -> Self {
        Self {
            token_file: config.token_file.clone(),
            client_id: config.google_client_id.clone(),
            client_secret: config.google_client_secret.clone(),
            token_uri: config.token_uri.clone(),
            client: Client::new(),
            cached: Mutex::new(None),
            refresh_lock: Mutex::new(()),
        }
    }

    pub fn token_file(&self) -> &Path {
        &self.token_file
    }

    /// Read the token file, `None` when it does not exist
    pub async fn load_token(&self) -> CalendarResult<Option<StoredToken>> {
        let content = match fs::read_to_string(&self.token_file).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let token = serde_json::from_str(&content).map_err(|e| {
            auth_error(&format!(
                "Token file {} is unreadable ({}); {}",
                self.token_file.display(),
                e,
                REAUTHORIZE_HINT
            ))
        })?;
        Ok(Some(token))
    }

    /// Write the token file, replacing any previous record
    pub async fn save_token(&self, token: &StoredToken) -> CalendarResult<()> {
        if let Some(parent) = self.token_file.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }

        let content = serde_json::to_string_pretty(token)?;
        let tmp = self.token_file.with_extension("json.tmp");
        fs::write(&tmp, content).await?;
        fs::rename(&tmp, &self.token_file).await?;

        debug!("Saved token to {}", self.token_file.display());
        *self.cached.lock().await = Some(token.clone());
        Ok(())
    }

    /// Exchange a refresh token for a new access token and persist it
    pub async fn refresh(&self, token: &StoredToken) -> CalendarResult<StoredToken> {
        let refresh_token = token.refresh_token.clone().ok_or_else(|| {
            auth_error(&format!("No refresh token available; {}", REAUTHORIZE_HINT))
        })?;

        info!("Refreshing Google access token");

        let params = [
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("refresh_token", refresh_token.as_str()),
            ("grant_type", "refresh_token"),
        ];
        let response = self.request_token(&params).await?;
        let refreshed = response.into_stored(Some(refresh_token), Utc::now().timestamp());

        self.save_token(&refreshed).await?;
        Ok(refreshed)
    }

    /// Exchange an authorization code from the consent flow and persist the result
    pub async fn exchange_code(&self, code: &str, redirect_uri: &str) -> CalendarResult<StoredToken> {
        let params = [
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("code", code),
            ("redirect_uri", redirect_uri),
            ("grant_type", "authorization_code"),
        ];
        let response = self.request_token(&params).await?;
        let token = response.into_stored(None, Utc::now().timestamp());

        if token.refresh_token.is_none() {
            warn!("Token endpoint returned no refresh token; the token cannot be refreshed");
        }

        self.save_token(&token).await?;
        Ok(token)
    }

    async fn request_token(&self, params: &[(&str, &str)]) -> CalendarResult<TokenResponse> {
        let response = self
            .client
            .post(&self.token_uri)
            .form(params)
            .send()
            .await
            .map_err(|e| auth_error(&format!("Failed to reach token endpoint: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Could not read error response".to_string());
            warn!("Token endpoint returned HTTP {}", status);
            return Err(auth_error(&format!(
                "Token request failed: HTTP {} - {}; {}",
                status, body, REAUTHORIZE_HINT
            )));
        }

        response
            .json::<TokenResponse>()
            .await
            .map_err(|e| auth_error(&format!("Failed to parse token response: {}", e)))
    }

    async fn current_token(&self) -> CalendarResult<StoredToken> {
        if let Some(token) = self.cached.lock().await.clone() {
            return Ok(token);
        }

        let token = self.load_token().await?.ok_or_else(|| {
            auth_error(&format!(
                "No token found at {}; {}",
                self.token_file.display(),
                REAUTHORIZE_HINT
            ))
        })?;
        *self.cached.lock().await = Some(token.clone());
        Ok(token)
    }
}

#[async_trait]
impl CredentialProvider for TokenManager {
    async fn get_valid_credential(&self) -> CalendarResult<String> {
        let _guard = self.refresh_lock.lock().await;
        let token = self.current_token().await?;
        if !token.is_expired() {
            return Ok(token.access_token);
        }

        debug!("Access token expired at {}", token.expires_at);
        let refreshed = self.refresh(&token).await?;
        Ok(refreshed.access_token)
    }

    async fn refresh_credential(&self) -> CalendarResult<String> {
        let rejected = self.current_token().await?.access_token;
        let _guard = self.refresh_lock.lock().await;

        let token = self.current_token().await?;
        if token.access_token != rejected && !token.is_expired() {
            debug!("Access token was already refreshed by another caller");
            return Ok(token.access_token);
        }

        let refreshed = self.refresh(&token).await?;
        Ok(refreshed.access_token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    fn manager_for(path: PathBuf) -> TokenManager {
        let config = Config {
            token_file: path,
            google_client_id: "client".to_string(),
            google_client_secret: "secret".to_string(),
            token_uri: "http://127.0.0.1:9/token".to_string(),
            ..Config::default()
        };
        TokenManager::new(&config)
    }

    fn token(expires_at: i64, refresh: Option<&str>) -> StoredToken {
        StoredToken {
            access_token: "access".to_string(),
            refresh_token: refresh.map(str::to_string),
            expires_at,
            scope: Some(crate::config::CALENDAR_SCOPE.to_string()),
            token_type: "Bearer".to_string(),
        }
    }

    #[test]
    fn test_expiry_uses_skew() {
        let t = token(1_000, None);
        assert!(!t.is_expired_at(900));
        assert!(t.is_expired_at(941));
        assert!(t.is_expired_at(1_000));
    }

    #[test]
    fn test_response_keeps_previous_refresh_token() {
        let response: TokenResponse =
            serde_json::from_str(r#"{"access_token": "new", "expires_in": 120}"#).unwrap();
        let stored = response.into_stored(Some("old-refresh".to_string()), 1_000);
        assert_eq!(stored.access_token, "new");
        assert_eq!(stored.refresh_token.as_deref(), Some("old-refresh"));
        assert_eq!(stored.expires_at, 1_120);
        assert_eq!(stored.token_type, "Bearer");
    }

    #[tokio::test]
    async fn test_save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager_for(dir.path().join("nested").join("token.json"));

        assert!(manager.load_token().await.unwrap().is_none());

        let stored = token(4_000_000_000, Some("refresh"));
        manager.save_token(&stored).await.unwrap();
        assert_eq!(manager.load_token().await.unwrap(), Some(stored));
    }

    #[tokio::test]
    async fn test_valid_token_is_returned_without_refresh() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager_for(dir.path().join("token.json"));
        manager
            .save_token(&token(Utc::now().timestamp() + 3600, None))
            .await
            .unwrap();

        assert_eq!(manager.get_valid_credential().await.unwrap(), "access");
    }

    #[tokio::test]
    async fn test_missing_token_file_is_auth_error() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager_for(dir.path().join("token.json"));

        let err = manager.get_valid_credential().await.unwrap_err();
        assert!(matches!(err, Error::Auth(message) if message.contains("get_calendar_token")));
    }

    #[tokio::test]
    async fn test_expired_token_without_refresh_token_is_auth_error() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager_for(dir.path().join("token.json"));
        manager.save_token(&token(0, None)).await.unwrap();

        let err = manager.get_valid_credential().await.unwrap_err();
        assert!(matches!(err, Error::Auth(_)));
        // the stale record is left in place
        assert!(manager.load_token().await.unwrap().is_some());
    }
}
