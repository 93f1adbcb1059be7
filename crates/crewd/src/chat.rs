//! Conversation with the planning agent.
//!
//! Messages submitted while the agent is busy wait in a [`ChatQueue`] and
//! are sent one at a time, in order, through a single long-lived session.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crew_agents::{AgentClient, AgentSession, SessionConfig};
use crew_core::{ChatQueue, Settings};
use tokio::sync::{mpsc, Mutex};

use crate::tools::TaskTools;
use crate::turn::{await_turn, TurnOutcome};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatEvent {
    /// Streamed agent text for the message being processed.
    Delta { text: String },
    /// The agent finished answering one message.
    Reply { text: String },
    Warning { message: String },
    /// The queue drained and the agent is free.
    Idle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    Started,
    /// Another message is being processed; this one waits its turn.
    Queued,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatConfig {
    pub workdir: PathBuf,
    pub model: String,
    pub timeout: Duration,
}

impl ChatConfig {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            workdir: settings.core.workdir.clone(),
            model: settings.chat.default_model.clone(),
            timeout: Duration::from_secs(settings.agent.dispatch_timeout_secs),
        }
    }
}

#[derive(Clone)]
pub struct ChatRunner {
    agents: Arc<dyn AgentClient>,
    config: ChatConfig,
    queue: Arc<Mutex<ChatQueue>>,
    session: Arc<Mutex<Option<Box<dyn AgentSession>>>>,
    events: mpsc::UnboundedSender<ChatEvent>,
}

impl std::fmt::Debug for ChatRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatRunner")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl ChatRunner {
    pub fn new(
        agents: Arc<dyn AgentClient>,
        config: ChatConfig,
        events: mpsc::UnboundedSender<ChatEvent>,
    ) -> Self {
        Self {
            agents,
            config,
            queue: Arc::new(Mutex::new(ChatQueue::new())),
            session: Arc::new(Mutex::new(None)),
            events,
        }
    }

    /// Queue `message`. Starts the drain loop when the agent is free.
    pub async fn submit(&self, message: impl Into<String>) -> SubmitOutcome {
        let mut queue = self.queue.lock().await;
        if queue.enqueue(message) {
            tracing::debug!(pending = queue.len(), "chat message queued");
            return SubmitOutcome::Queued;
        }
        queue.set_processing(true);
        drop(queue);

        let runner = self.clone();
        tokio::spawn(async move { runner.drain().await });
        SubmitOutcome::Started
    }

    pub async fn is_processing(&self) -> bool {
        self.queue.lock().await.is_processing()
    }

    /// Destroy the agent session, if one was opened.
    pub async fn shutdown(&self) {
        if let Some(mut session) = self.session.lock().await.take() {
            if let Err(err) = session.destroy().await {
                tracing::warn!(error = %err, "failed to destroy chat session");
            }
        }
    }

    async fn drain(&self) {
        loop {
            let message = {
                let mut queue = self.queue.lock().await;
                match queue.next_message() {
                    Some(message) => message,
                    None => {
                        queue.set_processing(false);
                        break;
                    }
                }
            };
            self.process(&message).await;
        }
        self.emit(ChatEvent::Idle);
    }

    async fn process(&self, message: &str) {
        let mut slot = self.session.lock().await;
        if slot.is_none() {
            match self.open_session().await {
                Ok(session) => *slot = Some(session),
                Err(message) => {
                    self.warn(message);
                    return;
                }
            }
        }
        let Some(session) = slot.as_mut() else {
            return;
        };

        let outcome = match session.send(message).await {
            Ok(()) => {
                await_turn(session.as_mut(), self.config.timeout, |text| {
                    self.emit(ChatEvent::Delta {
                        text: text.to_string(),
                    })
                })
                .await
            }
            Err(err) => TurnOutcome::Failed {
                message: err.to_string(),
            },
        };

        match outcome {
            TurnOutcome::Completed { text } => self.emit(ChatEvent::Reply { text }),
            TurnOutcome::Failed { message } => {
                self.warn(format!("agent error: {message}"));
                self.reset(&mut slot).await;
            }
            TurnOutcome::TimedOut => {
                self.warn(format!(
                    "agent did not respond within {}s",
                    self.config.timeout.as_secs()
                ));
                self.reset(&mut slot).await;
            }
        }
    }

    async fn open_session(&self) -> Result<Box<dyn AgentSession>, String> {
        let config = SessionConfig::new(&self.config.workdir)
            .with_model(self.config.model.clone())
            .with_system_prompt(system_prompt());
        self.agents
            .create_session(config)
            .await
            .map_err(|err| format!("could not start agent session: {err}"))
    }

    /// Drop a session that failed or stalled so the next message starts fresh.
    async fn reset(&self, slot: &mut Option<Box<dyn AgentSession>>) {
        if let Some(mut session) = slot.take() {
            if let Err(err) = session.destroy().await {
                tracing::warn!(error = %err, "failed to destroy chat session");
            }
        }
    }

    fn warn(&self, message: String) {
        tracing::warn!(%message, "chat warning");
        self.emit(ChatEvent::Warning { message });
    }

    fn emit(&self, event: ChatEvent) {
        let _ = self.events.send(event);
    }
}

fn system_prompt() -> String {
    format!(
        "You help plan work as stories and tasks. When the `crew mcp` server is attached \
         to your tools it offers {} for reading and changing them; otherwise answer in text \
         and describe the stories and tasks to create. Every task needs a name and \
         description; link tasks to a story with story_id.",
        TaskTools::names().join(", ")
    )
}
