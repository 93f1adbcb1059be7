//! Executes [`AppAction`]s against the service layer off the UI loop.

use crew_core::TaskId;
use crewd::{ChatRunner, ServiceError, SubmitOutcome, TaskDispatcher, TaskFilter, TaskService};

use crate::action::AppAction;
use crate::event::TuiEvent;
use crate::forms::FormSubmission;
use crate::notifications::NotificationLevel;

#[derive(Debug, Clone)]
pub struct Backend {
    service: TaskService,
    dispatcher: TaskDispatcher,
    chat: ChatRunner,
}

impl Backend {
    pub fn new(service: TaskService, dispatcher: TaskDispatcher, chat: ChatRunner) -> Self {
        Self {
            service,
            dispatcher,
            chat,
        }
    }

    pub fn chat(&self) -> &ChatRunner {
        &self.chat
    }

    pub async fn execute(&self, action: AppAction) -> Vec<TuiEvent> {
        tracing::debug!(action = action.label(), "executing ui action");
        match action {
            AppAction::Refresh => vec![self.refresh().await],
            AppAction::LoadStory(id) => match self.service.get_story(&id).await {
                Ok(story) => vec![TuiEvent::StoryLoaded { story }],
                Err(err) => vec![TuiEvent::notify(NotificationLevel::Error, err.to_string())],
            },
            AppAction::LoadTask(id) => match self.service.get_task(&id).await {
                Ok(task) => vec![TuiEvent::TaskLoaded { task }],
                Err(err) => vec![TuiEvent::notify(NotificationLevel::Error, err.to_string())],
            },
            AppAction::Submit(submission) => self.submit(submission).await,
            AppAction::Dispatch(id) => vec![self.dispatch(&id).await],
            AppAction::SendChat(message) => match self.chat.submit(message).await {
                SubmitOutcome::Started => vec![TuiEvent::StatusLine {
                    message: "agent is working".to_string(),
                }],
                SubmitOutcome::Queued => vec![TuiEvent::ChatQueued],
            },
        }
    }

    async fn refresh(&self) -> TuiEvent {
        let stories = match self.service.list_stories(None).await {
            Ok(stories) => stories,
            Err(err) => return load_failed(err),
        };
        match self.service.list_tasks(&TaskFilter::all()).await {
            Ok(tasks) => TuiEvent::TreeReplaced { stories, tasks },
            Err(err) => load_failed(err),
        }
    }

    async fn submit(&self, submission: FormSubmission) -> Vec<TuiEvent> {
        let result = match submission {
            FormSubmission::CreateStory(draft) => self
                .service
                .create_story(draft)
                .await
                .map(|story| format!("story '{}' created", story.name)),
            FormSubmission::UpdateStory(id, patch) => self
                .service
                .update_story(&id, patch)
                .await
                .map(|story| format!("story '{}' saved", story.name)),
            FormSubmission::CreateTask(draft) => self
                .service
                .create_task(draft)
                .await
                .map(|task| format!("task '{}' created", task.name)),
            FormSubmission::UpdateTask(id, patch) => self
                .service
                .update_task(&id, patch)
                .await
                .map(|task| format!("task '{}' saved", task.name)),
        };

        match result {
            Ok(message) => vec![TuiEvent::FormSaved { message }],
            Err(err) if err.is_validation() => vec![TuiEvent::FormRejected {
                message: err.to_string(),
            }],
            // The record vanished underneath the form; nothing left to edit.
            Err(err) if err.is_not_found() => vec![
                TuiEvent::FormClosed,
                TuiEvent::notify(NotificationLevel::Error, err.to_string()),
            ],
            Err(err) => {
                tracing::error!(error = %err, "failed to save form");
                vec![
                    TuiEvent::FormRejected {
                        message: err.to_string(),
                    },
                    TuiEvent::notify(NotificationLevel::Error, err.to_string()),
                ]
            }
        }
    }

    /// Progress and failures reach the app through dispatch events; the
    /// return value only updates the status line.
    async fn dispatch(&self, id: &TaskId) -> TuiEvent {
        let message = match self.dispatcher.dispatch(id).await {
            Ok(report) => format!("task {} finished on {}", report.task_id, report.branch),
            Err(err) => format!("dispatch failed: {err}"),
        };
        TuiEvent::StatusLine { message }
    }
}

fn load_failed(err: ServiceError) -> TuiEvent {
    tracing::error!(error = %err, "failed to load stories and tasks");
    TuiEvent::notify(
        NotificationLevel::Error,
        format!("failed to load tasks: {err}"),
    )
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use crew_agents::{AgentClient, AgentError, AgentSession, SessionConfig, SessionEvent};
    use crew_core::{Status, StoryDraft, StoryId, StoryPatch, TaskDraft, TaskId, TaskPatch};
    use crew_git::{GitError, WorktreeProvider};
    use crewd::{
        ChatConfig, ChatEvent, ChatRunner, DispatchConfig, DispatchEvent, MemoryTaskStore,
        TaskDispatcher, TaskService,
    };
    use tokio::sync::mpsc;

    use super::Backend;
    use crate::forms::FormSubmission;
    use crate::notifications::NotificationLevel;
    use crate::{AppAction, TuiEvent};

    struct EchoAgent;

    struct EchoSession {
        pending: Vec<SessionEvent>,
    }

    #[async_trait]
    impl AgentClient for EchoAgent {
        async fn create_session(
            &self,
            _config: SessionConfig,
        ) -> Result<Box<dyn AgentSession>, AgentError> {
            Ok(Box::new(EchoSession {
                pending: Vec::new(),
            }))
        }
    }

    #[async_trait]
    impl AgentSession for EchoSession {
        async fn send(&mut self, prompt: &str) -> Result<(), AgentError> {
            let first_line = prompt.lines().next().unwrap_or_default().to_string();
            // Popped from the back.
            self.pending = vec![
                SessionEvent::Idle,
                SessionEvent::MessageComplete { text: first_line },
            ];
            Ok(())
        }

        async fn next_event(&mut self) -> Option<SessionEvent> {
            self.pending.pop()
        }

        async fn destroy(&mut self) -> Result<(), AgentError> {
            Ok(())
        }
    }

    struct FixedWorktrees;

    impl WorktreeProvider for FixedWorktrees {
        fn worktree_path(&self, _repo_url: &str, branch: &str) -> Result<PathBuf, GitError> {
            Ok(PathBuf::from("/work").join(branch))
        }
    }

    struct Fixture {
        backend: Backend,
        service: TaskService,
        chat_events: mpsc::UnboundedReceiver<ChatEvent>,
        dispatch_events: mpsc::UnboundedReceiver<DispatchEvent>,
    }

    fn fixture() -> Fixture {
        let service = TaskService::new(Arc::new(MemoryTaskStore::new()));
        let agents: Arc<dyn AgentClient> = Arc::new(EchoAgent);
        let (dispatch_tx, dispatch_events) = mpsc::unbounded_channel();
        let dispatcher = TaskDispatcher::new(
            service.clone(),
            Arc::new(FixedWorktrees),
            Arc::clone(&agents),
            DispatchConfig {
                repositories: Default::default(),
                timeout: Duration::from_secs(5),
                model: "auto".to_string(),
                max_concurrent: 1,
            },
        )
        .with_events(dispatch_tx);
        let (chat_tx, chat_events) = mpsc::unbounded_channel();
        let chat = ChatRunner::new(
            agents,
            ChatConfig {
                workdir: PathBuf::from("/work"),
                model: "auto".to_string(),
                timeout: Duration::from_secs(5),
            },
            chat_tx,
        );
        Fixture {
            backend: Backend::new(service.clone(), dispatcher, chat),
            service,
            chat_events,
            dispatch_events,
        }
    }

    #[tokio::test]
    async fn refresh_returns_the_whole_tree() {
        let fx = fixture();
        let story = fx
            .service
            .create_story(StoryDraft::new("Auth", ""))
            .await
            .expect("story");
        let mut draft = TaskDraft::new("Login form", "");
        draft.story_id = Some(story.id.clone());
        fx.service.create_task(draft).await.expect("task");
        fx.service
            .create_task(TaskDraft::new("Docs", ""))
            .await
            .expect("task");

        let events = fx.backend.execute(AppAction::Refresh).await;
        let [TuiEvent::TreeReplaced { stories, tasks }] = events.as_slice() else {
            panic!("expected tree, got {events:?}");
        };
        assert_eq!(stories.len(), 1);
        assert_eq!(tasks.len(), 2);
    }

    #[tokio::test]
    async fn submit_saves_or_rejects_inline() {
        let fx = fixture();
        let saved = fx
            .backend
            .execute(AppAction::Submit(FormSubmission::CreateStory(
                StoryDraft::new("Auth", ""),
            )))
            .await;
        assert_eq!(
            saved,
            vec![TuiEvent::FormSaved {
                message: "story 'Auth' created".to_string()
            }]
        );

        let rejected = fx
            .backend
            .execute(AppAction::Submit(FormSubmission::CreateTask(
                TaskDraft::new("  ", ""),
            )))
            .await;
        assert!(matches!(
            rejected.as_slice(),
            [TuiEvent::FormRejected { message }] if message.starts_with("validation failed")
        ));
    }

    #[tokio::test]
    async fn editing_a_vanished_record_closes_the_form() {
        let fx = fixture();
        let events = fx
            .backend
            .execute(AppAction::Submit(FormSubmission::UpdateStory(
                StoryId::new("gone"),
                StoryPatch::status(Status::Ready),
            )))
            .await;
        assert_eq!(events.len(), 2);
        assert_eq!(events[0], TuiEvent::FormClosed);
        assert!(matches!(
            &events[1],
            TuiEvent::Notify { level: NotificationLevel::Error, message } if message.contains("gone")
        ));

        let events = fx
            .backend
            .execute(AppAction::LoadTask(TaskId::new("missing")))
            .await;
        assert!(matches!(
            events.as_slice(),
            [TuiEvent::Notify { level: NotificationLevel::Error, .. }]
        ));
    }

    #[tokio::test]
    async fn load_task_returns_the_stored_record() {
        let fx = fixture();
        let task = fx
            .service
            .create_task(TaskDraft::new("Docs", ""))
            .await
            .expect("task");
        fx.service
            .update_task(&task.id, TaskPatch::status(Status::Ready))
            .await
            .expect("update");

        let events = fx.backend.execute(AppAction::LoadTask(task.id.clone())).await;
        let [TuiEvent::TaskLoaded { task: loaded }] = events.as_slice() else {
            panic!("expected task, got {events:?}");
        };
        assert_eq!(loaded.status, Status::Ready);
    }

    #[tokio::test]
    async fn dispatch_runs_the_agent_and_streams_events() {
        let mut fx = fixture();
        let mut draft = TaskDraft::new("Login form", "");
        draft.repository_url = Some("https://example.com/api.git".to_string());
        let task = fx.service.create_task(draft).await.expect("task");

        let events = fx.backend.execute(AppAction::Dispatch(task.id.clone())).await;
        let [TuiEvent::StatusLine { message }] = events.as_slice() else {
            panic!("expected status line, got {events:?}");
        };
        assert!(message.contains("finished"));

        let mut seen = Vec::new();
        while let Ok(event) = fx.dispatch_events.try_recv() {
            seen.push(event);
        }
        assert!(matches!(seen.first(), Some(DispatchEvent::Started { .. })));
        assert!(matches!(seen.last(), Some(DispatchEvent::Finished { .. })));

        let stored = fx.service.get_task(&task.id).await.expect("task");
        assert_eq!(stored.status, Status::InProgress);
    }

    #[tokio::test]
    async fn send_chat_replies_then_goes_idle() {
        let mut fx = fixture();
        let first = fx
            .backend
            .execute(AppAction::SendChat("plan auth".to_string()))
            .await;
        assert!(matches!(first.as_slice(), [TuiEvent::StatusLine { .. }]));

        let mut replies = Vec::new();
        loop {
            let event = tokio::time::timeout(Duration::from_secs(5), fx.chat_events.recv())
                .await
                .expect("chat event in time")
                .expect("channel open");
            if event == ChatEvent::Idle {
                break;
            }
            replies.push(event);
        }
        assert_eq!(
            replies,
            vec![ChatEvent::Reply {
                text: "plan auth".to_string()
            }]
        );
        assert!(!fx.backend.chat().is_processing().await);
    }
}
