use super::actor::{CalendarActor, CalendarActorHandle};
use crate::error::CalendarResult;
use crate::tools::CalendarTools;
use serde_json::Value;
use std::sync::Arc;
use tokio::task::JoinHandle;

/// Handle for interacting with the calendar actor
#[derive(Clone)]
pub struct CalendarHandle {
    actor_handle: CalendarActorHandle,
    _actor_task: Arc<JoinHandle<()>>,
}

impl CalendarHandle {
    /// Create a new CalendarHandle and spawn the actor
    pub fn new(tools: CalendarTools) -> Self {
        // Create the actor and get its handle
        let (mut actor, handle) = CalendarActor::new(tools);

        // Spawn a task to run the actor
        let actor_task = tokio::spawn(async move {
            actor.run().await;
        });

        Self {
            actor_handle: handle,
            _actor_task: Arc::new(actor_task),
        }
    }

    /// Run a tool by name; calls are executed one at a time
    pub async fn invoke(&self, tool: &str, args: Value) -> CalendarResult<Value> {
        self.actor_handle.invoke(tool, args).await
    }

    /// Shutdown the actor
    pub async fn shutdown(&self) -> CalendarResult<()> {
        self.actor_handle.shutdown().await
    }
}
