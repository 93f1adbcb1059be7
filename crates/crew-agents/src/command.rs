//! Agent sessions backed by a command-line agent.
//!
//! Every prompt spawns the configured executable in the session's working
//! directory with the prompt as the final argument. Stdout is streamed back
//! line by line as `MessageDelta`; a zero exit yields `MessageComplete` with
//! the full text followed by `Idle`, anything else yields `Error`.

use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, oneshot};

use crate::error::AgentError;
use crate::session::{AgentClient, AgentSession};
use crate::types::{SessionConfig, SessionEvent};

const STDERR_TAIL_CHARS: usize = 400;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandAgentClient {
    pub executable: String,
    pub args: Vec<String>,
    /// Flag used to pass an explicit model, e.g. `--model`.
    pub model_flag: Option<String>,
}

impl CommandAgentClient {
    pub fn new(executable: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            executable: executable.into(),
            args,
            model_flag: Some("--model".to_string()),
        }
    }

    pub fn without_model_flag(mut self) -> Self {
        self.model_flag = None;
        self
    }

    fn build_args(&self, config: &SessionConfig, prompt: &str) -> Vec<String> {
        let mut args = Vec::with_capacity(self.args.len() + 3);
        if let (Some(flag), Some(model)) = (&self.model_flag, config.explicit_model()) {
            args.push(flag.clone());
            args.push(model.to_string());
        }
        args.extend(self.args.iter().cloned());
        let prompt = match &config.system_prompt {
            Some(system) if !system.trim().is_empty() => format!("{system}\n\n{prompt}"),
            _ => prompt.to_string(),
        };
        args.push(prompt);
        args
    }
}

#[async_trait]
impl AgentClient for CommandAgentClient {
    async fn create_session(
        &self,
        config: SessionConfig,
    ) -> Result<Box<dyn AgentSession>, AgentError> {
        if self.executable.trim().is_empty() {
            return Err(AgentError::MissingCommand);
        }
        if !config.working_directory.is_dir() {
            return Err(AgentError::MissingWorkdir {
                path: config.working_directory.clone(),
            });
        }

        Ok(Box::new(CommandSession {
            client: self.clone(),
            config,
            current: None,
        }))
    }
}

struct RunningPrompt {
    events: mpsc::UnboundedReceiver<SessionEvent>,
    cancel: Option<oneshot::Sender<()>>,
}

pub struct CommandSession {
    client: CommandAgentClient,
    config: SessionConfig,
    current: Option<RunningPrompt>,
}

#[async_trait]
impl AgentSession for CommandSession {
    async fn send(&mut self, prompt: &str) -> Result<(), AgentError> {
        if prompt.trim().is_empty() {
            return Err(AgentError::EmptyPrompt);
        }
        self.destroy().await?;

        let (tx, rx) = mpsc::unbounded_channel();
        let (cancel_tx, cancel_rx) = oneshot::channel();

        let args = self.client.build_args(&self.config, prompt);
        let spawned = Command::new(&self.client.executable)
            .args(&args)
            .current_dir(&self.config.working_directory)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn();

        match spawned {
            Ok(child) => {
                tracing::debug!(
                    executable = %self.client.executable,
                    cwd = %self.config.working_directory.display(),
                    "agent process started"
                );
                tokio::spawn(drive_child(child, tx, cancel_rx));
            }
            Err(err) => {
                let message = AgentError::Spawn {
                    command: self.client.executable.clone(),
                    message: err.to_string(),
                }
                .to_string();
                tracing::warn!(%message, "agent process failed to start");
                let _ = tx.send(SessionEvent::Error { message });
            }
        }

        self.current = Some(RunningPrompt {
            events: rx,
            cancel: Some(cancel_tx),
        });
        Ok(())
    }

    async fn next_event(&mut self) -> Option<SessionEvent> {
        let running = self.current.as_mut()?;
        let event = running.events.recv().await;
        if event.is_none() {
            self.current = None;
        }
        event
    }

    async fn destroy(&mut self) -> Result<(), AgentError> {
        if let Some(mut running) = self.current.take() {
            if let Some(cancel) = running.cancel.take() {
                let _ = cancel.send(());
            }
        }
        Ok(())
    }
}

async fn drive_child(
    mut child: Child,
    tx: mpsc::UnboundedSender<SessionEvent>,
    mut cancel: oneshot::Receiver<()>,
) {
    let stderr_task = child.stderr.take().map(|stderr| tokio::spawn(read_all(stderr)));
    let Some(stdout) = child.stdout.take() else {
        let _ = child.kill().await;
        let _ = tx.send(SessionEvent::Error {
            message: "agent stdout was not captured".to_string(),
        });
        return;
    };

    let mut lines = BufReader::new(stdout).lines();
    let mut full_text = String::new();
    loop {
        tokio::select! {
            _ = &mut cancel => {
                let _ = child.kill().await;
                tracing::debug!("agent process killed");
                return;
            }
            line = lines.next_line() => match line {
                Ok(Some(line)) => {
                    let chunk = format!("{line}\n");
                    full_text.push_str(&chunk);
                    let _ = tx.send(SessionEvent::MessageDelta { text: chunk });
                }
                Ok(None) => break,
                Err(err) => {
                    let _ = child.kill().await;
                    let _ = tx.send(SessionEvent::Error {
                        message: AgentError::Output {
                            message: err.to_string(),
                        }
                        .to_string(),
                    });
                    return;
                }
            }
        }
    }

    let status = tokio::select! {
        _ = &mut cancel => {
            let _ = child.kill().await;
            return;
        }
        status = child.wait() => status,
    };
    let stderr = match stderr_task {
        Some(handle) => handle.await.unwrap_or_default(),
        None => String::new(),
    };

    match status {
        Ok(status) if status.success() => {
            let _ = tx.send(SessionEvent::MessageComplete { text: full_text });
            let _ = tx.send(SessionEvent::Idle);
        }
        Ok(status) => {
            let _ = tx.send(SessionEvent::Error {
                message: AgentError::Exited {
                    status: status.to_string(),
                    stderr: stderr_tail(&stderr),
                }
                .to_string(),
            });
        }
        Err(err) => {
            let _ = tx.send(SessionEvent::Error {
                message: AgentError::Output {
                    message: err.to_string(),
                }
                .to_string(),
            });
        }
    }
}

async fn read_all<R: AsyncRead + Unpin>(mut reader: R) -> String {
    let mut buf = String::new();
    let _ = reader.read_to_string(&mut buf).await;
    buf
}

fn stderr_tail(stderr: &str) -> String {
    let trimmed = stderr.trim();
    let count = trimmed.chars().count();
    if count <= STDERR_TAIL_CHARS {
        return trimmed.to_string();
    }
    trimmed.chars().skip(count - STDERR_TAIL_CHARS).collect()
}
