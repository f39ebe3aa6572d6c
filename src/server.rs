use crate::components::google_calendar::CalendarHandle;
use crate::error::{CalendarResult, Error};
use crate::mcp::{self, MCP_PATH};
use crate::tools::{definitions, ToolDefinition};
use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use std::future::Future;
use tower_http::trace::TraceLayer;
use tracing::info;

#[derive(Clone)]
pub struct AppState {
    /// Serialised access to the calendar tools
    pub handle: CalendarHandle,
}

/// Build the tool router: MCP on `/mcp`, plain JSON routes under `/tools`
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/tools", get(list_tools_handler))
        .route("/tools/{name}", post(invoke_handler))
        .route_service(MCP_PATH, mcp::service(state.handle.clone()))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve `router` on `listen_addr` until `shutdown` completes
pub async fn serve<F>(listen_addr: &str, state: AppState, shutdown: F) -> CalendarResult<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let listener = tokio::net::TcpListener::bind(listen_addr).await?;
    let local_addr = listener.local_addr()?;
    info!("Tool server listening on {}", local_addr);
    info!("MCP endpoint available at http://{}{}", local_addr, MCP_PATH);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}

async fn health_handler() -> impl IntoResponse {
    Json(json!({"status": "ok"}))
}

async fn list_tools_handler() -> Json<Vec<ToolDefinition>> {
    Json(definitions())
}

async fn invoke_handler(
    State(state): State<AppState>,
    Path(name): Path<String>,
    body: Bytes,
) -> Result<Json<Value>, Error> {
    let args = if body.iter().all(u8::is_ascii_whitespace) {
        Value::Null
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| Error::InvalidArguments(format!("Request body is not JSON: {}", e)))?
    };

    let result = state.handle.invoke(&name, args).await?;
    Ok(Json(json!({ "result": result })))
}

impl Error {
    /// HTTP status reported for this error by the tool server
    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::InvalidArguments(_) | Error::UnsupportedAction(_) => StatusCode::BAD_REQUEST,
            Error::InvalidDateFormat { .. }
            | Error::InvalidTimezone(_)
            | Error::MissingRequiredField(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Error::EventNotFound { .. } | Error::UnknownTool(_) => StatusCode::NOT_FOUND,
            Error::AmbiguousEventName { .. } => StatusCode::CONFLICT,
            Error::Auth(_) => StatusCode::UNAUTHORIZED,
            Error::Backend(_) => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let mut error = json!({
            "kind": self.kind(),
            "message": self.to_string(),
        });
        if let Error::AmbiguousEventName { candidates, .. } = &self {
            error["candidates"] = json!(candidates);
        }
        (status, Json(json!({ "error": error }))).into_response()
    }
}
