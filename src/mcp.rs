//! Model Context Protocol surface for the calendar tools.
//!
//! Tool calls are forwarded to the [`CalendarHandle`], so MCP sessions and the
//! plain HTTP routes share the same one-at-a-time execution.

use crate::components::google_calendar::CalendarHandle;
use crate::error::Error;
use crate::tools::{definitions, ToolDefinition};
use rmcp::model::{
    CallToolRequestParam, CallToolResult, Content, Implementation, JsonObject, ListToolsResult,
    PaginatedRequestParam, ProtocolVersion, ServerCapabilities, ServerInfo, Tool,
};
use rmcp::service::RequestContext;
use rmcp::transport::streamable_http_server::session::local::LocalSessionManager;
use rmcp::transport::streamable_http_server::tower::{
    StreamableHttpServerConfig, StreamableHttpService,
};
use rmcp::{ErrorData as McpError, RoleServer, ServerHandler};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

/// Path of the streamable HTTP endpoint
pub const MCP_PATH: &str = "/mcp";

/// MCP server handler for the calendar tools
#[derive(Clone)]
pub struct CalendarMcp {
    handle: CalendarHandle,
}

impl CalendarMcp {
    pub fn new(handle: CalendarHandle) -> Self {
        Self { handle }
    }

    /// Tools advertised in `tools/list`
    pub fn tools() -> Vec<Tool> {
        definitions().into_iter().map(into_tool).collect()
    }

    /// Run one tool call.
    ///
    /// Unknown tools and malformed arguments are protocol errors; calendar
    /// failures come back as a tool result flagged as an error so the agent
    /// can read the message.
    pub async fn call(
        &self,
        name: &str,
        arguments: Option<JsonObject>,
    ) -> Result<CallToolResult, McpError> {
        let args = arguments.map(Value::Object).unwrap_or(Value::Null);

        match self.handle.invoke(name, args).await {
            Ok(value) => Ok(CallToolResult::success(vec![Content::text(render(&value))])),
            Err(Error::UnknownTool(tool)) => Err(McpError::invalid_params(
                format!("Unknown tool: {}", tool),
                None,
            )),
            Err(Error::InvalidArguments(reason)) => Err(McpError::invalid_params(reason, None)),
            Err(e) => {
                warn!("Tool {} failed: {}", name, e);
                Ok(CallToolResult::error(vec![Content::text(error_text(&e))]))
            }
        }
    }
}

impl ServerHandler for CalendarMcp {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::LATEST,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation::from_build_env(),
            instructions: Some(
                "Google Calendar tools. Update and delete take an event id or an exact event \
                 name; called without either they list the events of the current month."
                    .to_string(),
            ),
        }
    }

    async fn list_tools(
        &self,
        _request: Option<PaginatedRequestParam>,
        _context: RequestContext<RoleServer>,
    ) -> Result<ListToolsResult, McpError> {
        Ok(ListToolsResult::with_all_items(Self::tools()))
    }

    async fn call_tool(
        &self,
        request: CallToolRequestParam,
        _context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, McpError> {
        debug!("MCP call to {}", request.name);
        self.call(&request.name, request.arguments).await
    }
}

/// Streamable HTTP service; each session gets a handler sharing `handle`
pub fn service(handle: CalendarHandle) -> StreamableHttpService<CalendarMcp, LocalSessionManager> {
    StreamableHttpService::new(
        move || Ok(CalendarMcp::new(handle.clone())),
        Arc::new(LocalSessionManager::default()),
        StreamableHttpServerConfig::default(),
    )
}

fn into_tool(definition: ToolDefinition) -> Tool {
    let schema = match definition.input_schema {
        Value::Object(map) => map,
        _ => JsonObject::new(),
    };
    Tool::new(definition.name, definition.description, Arc::new(schema))
}

fn render(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => serde_json::to_string_pretty(other).unwrap_or_else(|_| other.to_string()),
    }
}

fn error_text(error: &Error) -> String {
    match error {
        Error::AmbiguousEventName { candidates, .. } => format!(
            "{}: {} (candidates: {})",
            error.kind(),
            error,
            candidates.join(", ")
        ),
        _ => format!("{}: {}", error.kind(), error),
    }
}
