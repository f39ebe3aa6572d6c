use super::backend::{CalendarBackend, ListQuery};
use super::models::CalendarEvent;
use super::token::CredentialProvider;
use crate::config::Config;
use crate::error::{auth_error, backend_error, config_error, event_id_not_found, CalendarResult};
use async_trait::async_trait;
use chrono::SecondsFormat;
use reqwest::{Client, Method, Response, StatusCode};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, warn};
use url::Url;

/// Largest page the events endpoint serves
const MAX_PAGE_SIZE: u32 = 2500;

/// One page of the events listing
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct EventsPage {
    items: Vec<CalendarEvent>,
    next_page_token: Option<String>,
}

/// Calendar backend speaking the Google Calendar API v3
pub struct GoogleCalendarClient {
    client: Client,
    base_url: Url,
    calendar_id: String,
    credentials: Arc<dyn CredentialProvider>,
}

impl GoogleCalendarClient {
    pub fn new(config: &Config, credentials: Arc<dyn CredentialProvider>) -> CalendarResult<Self> {
        let base_url = Url::parse(&config.api_base_url).map_err(|e| {
            config_error(&format!(
                "Invalid GOOGLE_API_BASE_URL {}: {}",
                config.api_base_url, e
            ))
        })?;

        if base_url.cannot_be_a_base() {
            return Err(config_error(&format!(
                "GOOGLE_API_BASE_URL cannot be a base URL: {}",
                config.api_base_url
            )));
        }

        Ok(Self {
            client: Client::new(),
            base_url,
            calendar_id: config.google_calendar_id.clone(),
            credentials,
        })
    }

    /// `{base}/calendars/{calendar_id}/events[/{event_id}]`, with each segment escaped
    fn events_url(&self, event_id: Option<&str>) -> CalendarResult<Url> {
        let mut url = self.base_url.clone();
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| config_error("API base URL cannot be a base"))?;
            segments
                .pop_if_empty()
                .extend(["calendars", self.calendar_id.as_str(), "events"]);
            if let Some(event_id) = event_id {
                segments.push(event_id);
            }
        }
        Ok(url)
    }

    async fn execute(
        &self,
        method: &Method,
        url: &Url,
        body: Option<&CalendarEvent>,
        access_token: &str,
    ) -> CalendarResult<Response> {
        let mut request = self
            .client
            .request(method.clone(), url.clone())
            .bearer_auth(access_token);
        if let Some(body) = body {
            request = request.json(body);
        }

        request
            .send()
            .await
            .map_err(|e| backend_error(&format!("{} {} failed: {}", method, url.path(), e)))
    }

    /// Send a request, refreshing the credential and replaying once on `401`
    async fn send(
        &self,
        method: Method,
        url: Url,
        body: Option<&CalendarEvent>,
        event_id: Option<&str>,
    ) -> CalendarResult<Response> {
        let token = self.credentials.get_valid_credential().await?;
        let mut response = self.execute(&method, &url, body, &token).await?;

        if response.status() == StatusCode::UNAUTHORIZED {
            warn!("Calendar API rejected the access token, refreshing once");
            let token = self.credentials.refresh_credential().await?;
            response = self.execute(&method, &url, body, &token).await?;
        }

        check_status(response, event_id).await
    }

    async fn fetch_page(&self, query: &ListQuery, page_token: Option<&str>, fetched: usize) -> CalendarResult<EventsPage> {
        let mut url = self.events_url(None)?;
        {
            let mut pairs = url.query_pairs_mut();
            pairs
                .append_pair("singleEvents", "true")
                .append_pair("orderBy", "startTime");
            if let Some(time_min) = query.time_min {
                pairs.append_pair("timeMin", &time_min.to_rfc3339_opts(SecondsFormat::Secs, true));
            }
            if let Some(time_max) = query.time_max {
                pairs.append_pair("timeMax", &time_max.to_rfc3339_opts(SecondsFormat::Secs, true));
            }
            if let Some(max) = query.max_results {
                let remaining = max.saturating_sub(fetched as u32).clamp(1, MAX_PAGE_SIZE);
                pairs.append_pair("maxResults", &remaining.to_string());
            }
            if let Some(page_token) = page_token {
                pairs.append_pair("pageToken", page_token);
            }
        }

        self.send(Method::GET, url, None, None)
            .await?
            .json::<EventsPage>()
            .await
            .map_err(|e| backend_error(&format!("Failed to parse events response: {}", e)))
    }
}

async fn check_status(response: Response, event_id: Option<&str>) -> CalendarResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    if let Some(event_id) = event_id {
        if status == StatusCode::NOT_FOUND || status == StatusCode::GONE {
            debug!("Event {} not found (HTTP {})", event_id, status);
            return Err(event_id_not_found(event_id));
        }
    }

    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "Could not read error response".to_string());
    warn!("Calendar API returned HTTP {}", status);

    if status == StatusCode::UNAUTHORIZED {
        return Err(auth_error(&format!(
            "Calendar API rejected the refreshed token: {}",
            body
        )));
    }
    Err(backend_error(&format!("HTTP {} - {}", status, body)))
}

#[async_trait]
impl CalendarBackend for GoogleCalendarClient {
    async fn list_events(&self, query: &ListQuery) -> CalendarResult<Vec<CalendarEvent>> {
        let mut events = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let page = self
                .fetch_page(query, page_token.as_deref(), events.len())
                .await?;
            events.extend(page.items);

            if let Some(max) = query.max_results {
                if events.len() >= max as usize {
                    events.truncate(max as usize);
                    break;
                }
            }

            match page.next_page_token {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        debug!("Listed {} event(s)", events.len());
        Ok(events)
    }

    async fn get_event(&self, event_id: &str) -> CalendarResult<CalendarEvent> {
        let url = self.events_url(Some(event_id))?;
        self.send(Method::GET, url, None, Some(event_id))
            .await?
            .json::<CalendarEvent>()
            .await
            .map_err(|e| backend_error(&format!("Failed to parse event {}: {}", event_id, e)))
    }

    async fn insert_event(&self, event: &CalendarEvent) -> CalendarResult<CalendarEvent> {
        let url = self.events_url(None)?;
        self.send(Method::POST, url, Some(event), None)
            .await?
            .json::<CalendarEvent>()
            .await
            .map_err(|e| backend_error(&format!("Failed to parse created event: {}", e)))
    }

    async fn update_event(
        &self,
        event_id: &str,
        event: &CalendarEvent,
    ) -> CalendarResult<CalendarEvent> {
        let url = self.events_url(Some(event_id))?;
        self.send(Method::PUT, url, Some(event), Some(event_id))
            .await?
            .json::<CalendarEvent>()
            .await
            .map_err(|e| backend_error(&format!("Failed to parse updated event {}: {}", event_id, e)))
    }

    async fn delete_event(&self, event_id: &str) -> CalendarResult<()> {
        let url = self.events_url(Some(event_id))?;
        self.send(Method::DELETE, url, None, Some(event_id)).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct StaticToken;

    #[async_trait]
    impl CredentialProvider for StaticToken {
        async fn get_valid_credential(&self) -> CalendarResult<String> {
            Ok("token".to_string())
        }

        async fn refresh_credential(&self) -> CalendarResult<String> {
            Ok("token".to_string())
        }
    }

    fn client(base: &str, calendar_id: &str) -> GoogleCalendarClient {
        let config = Config {
            api_base_url: base.to_string(),
            google_calendar_id: calendar_id.to_string(),
            ..Config::default()
        };
        GoogleCalendarClient::new(&config, Arc::new(StaticToken)).unwrap()
    }

    #[test]
    fn test_events_url_escapes_segments() {
        let client = client("https://www.googleapis.com/calendar/v3", "team#cal@group.calendar.google.com");
        let url = client.events_url(Some("abc 1")).unwrap();
        assert_eq!(
            url.as_str(),
            "https://www.googleapis.com/calendar/v3/calendars/team%23cal@group.calendar.google.com/events/abc%201"
        );
    }

    #[test]
    fn test_events_url_tolerates_trailing_slash() {
        let client = client("http://127.0.0.1:9000/v3/", "primary");
        assert_eq!(
            client.events_url(None).unwrap().as_str(),
            "http://127.0.0.1:9000/v3/calendars/primary/events"
        );
    }

    #[test]
    fn test_invalid_base_url_is_config_error() {
        let config = Config {
            api_base_url: "not a url".to_string(),
            ..Config::default()
        };
        let result = GoogleCalendarClient::new(&config, Arc::new(StaticToken));
        assert!(matches!(result, Err(crate::error::Error::Config(_))));
    }

    #[test]
    fn test_events_page_parses_items_and_token() {
        let page: EventsPage = serde_json::from_str(
            r#"{
                "kind": "calendar#events",
                "items": [{"id": "a", "summary": "Standup", "start": {"dateTime": "2025-05-20T09:00:00Z"}, "end": {"dateTime": "2025-05-20T09:15:00Z"}}],
                "nextPageToken": "page-2"
            }"#,
        )
        .unwrap();
        assert_eq!(page.items.len(), 1);
        assert_eq!(page.items[0].title(), "Standup");
        assert_eq!(page.next_page_token.as_deref(), Some("page-2"));

        let empty: EventsPage = serde_json::from_str(r#"{"kind": "calendar#events"}"#).unwrap();
        assert!(empty.items.is_empty());
        assert!(empty.next_page_token.is_none());
    }
}
