use crate::error::{other_error, CalendarResult};
use crate::tools::CalendarTools;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tracing::{info, warn};

/// Commands that can be sent to the calendar actor
pub enum CalendarCommand {
    Invoke {
        tool: String,
        args: Value,
        respond_to: oneshot::Sender<CalendarResult<Value>>,
    },
    Shutdown,
}

/// Handle for communicating with the calendar actor
#[derive(Clone)]
pub struct CalendarActorHandle {
    command_tx: mpsc::Sender<CalendarCommand>,
}

impl CalendarActorHandle {
    /// Queue a tool call and wait for its result
    pub async fn invoke(&self, tool: &str, args: Value) -> CalendarResult<Value> {
        let (respond_to, response_rx) = oneshot::channel();
        self.command_tx
            .send(CalendarCommand::Invoke {
                tool: tool.to_string(),
                args,
                respond_to,
            })
            .await
            .map_err(|e| other_error(&format!("Actor mailbox error: {}", e)))?;

        response_rx
            .await
            .map_err(|_| other_error("Response channel closed"))?
    }

    /// Shutdown the actor
    pub async fn shutdown(&self) -> CalendarResult<()> {
        let _ = self.command_tx.send(CalendarCommand::Shutdown).await;
        Ok(())
    }
}

/// Runs tool calls one at a time, in arrival order
pub struct CalendarActor {
    tools: CalendarTools,
    command_rx: mpsc::Receiver<CalendarCommand>,
}

impl CalendarActor {
    /// Create a new actor and return its handle
    pub fn new(tools: CalendarTools) -> (Self, CalendarActorHandle) {
        let (command_tx, command_rx) = mpsc::channel(32);

        let actor = Self { tools, command_rx };
        let handle = CalendarActorHandle { command_tx };

        (actor, handle)
    }

    /// Start the actor's processing loop
    pub async fn run(&mut self) {
        info!("Calendar actor started");

        while let Some(cmd) = self.command_rx.recv().await {
            match cmd {
                CalendarCommand::Invoke {
                    tool,
                    args,
                    respond_to,
                } => {
                    let result = self.tools.invoke(&tool, args).await;
                    if let Err(e) = &result {
                        warn!("Tool {} failed: {}", tool, e);
                    }
                    let _ = respond_to.send(result);
                }
                CalendarCommand::Shutdown => {
                    info!("Calendar actor shutting down");
                    break;
                }
            }
        }

        info!("Calendar actor shut down");
    }
}
