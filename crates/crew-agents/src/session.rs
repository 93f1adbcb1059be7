use async_trait::async_trait;

use crate::error::AgentError;
use crate::types::{SessionConfig, SessionEvent};

/// Opens conversational sessions with an external coding agent.
#[async_trait]
pub trait AgentClient: Send + Sync {
    async fn create_session(
        &self,
        config: SessionConfig,
    ) -> Result<Box<dyn AgentSession>, AgentError>;
}

/// One agent conversation. Each `send` is answered by a stream of events
/// ending in `Idle` or `Error`.
#[async_trait]
pub trait AgentSession: Send {
    async fn send(&mut self, prompt: &str) -> Result<(), AgentError>;

    /// Next event for the last prompt, or `None` once its stream is exhausted.
    async fn next_event(&mut self) -> Option<SessionEvent>;

    async fn destroy(&mut self) -> Result<(), AgentError>;
}
