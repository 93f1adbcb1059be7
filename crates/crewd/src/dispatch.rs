//! Hand a task to an external coding agent in its own git worktree.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crew_agents::{AgentClient, AgentSession, SessionConfig};
use crew_core::{Settings, Status, Task, TaskId, TaskPatch};
use crew_git::WorktreeProvider;
use tokio::sync::{mpsc, Semaphore};

use crate::service::{ServiceError, TaskService};
use crate::turn::{await_turn, TurnOutcome};

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error(transparent)]
    Service(#[from] ServiceError),
    #[error("dispatch setup failed for task {task_id}: {message}")]
    Setup { task_id: TaskId, message: String },
    #[error("agent did not finish task {task_id} within {timeout_secs}s")]
    AgentDispatchTimeout { task_id: TaskId, timeout_secs: u64 },
    #[error("agent failed on task {task_id}: {message}")]
    AgentDispatchError { task_id: TaskId, message: String },
}

impl DispatchError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, DispatchError::AgentDispatchTimeout { .. })
    }
}

/// Progress reported while a dispatch runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchEvent {
    Started { task_id: TaskId, worktree: PathBuf },
    Output { task_id: TaskId, text: String },
    Finished { task_id: TaskId },
    Failed { task_id: TaskId, message: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchConfig {
    /// Repository name to clone URL.
    pub repositories: BTreeMap<String, String>,
    pub timeout: Duration,
    pub model: String,
    pub max_concurrent: usize,
}

impl DispatchConfig {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            repositories: settings.core.repositories.clone(),
            timeout: Duration::from_secs(settings.agent.dispatch_timeout_secs),
            model: settings.chat.default_model.clone(),
            max_concurrent: settings.agent.max_background_agents,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchReport {
    pub task_id: TaskId,
    pub worktree: PathBuf,
    pub branch: String,
    pub output: String,
}

#[derive(Clone)]
pub struct TaskDispatcher {
    service: TaskService,
    worktrees: Arc<dyn WorktreeProvider>,
    agents: Arc<dyn AgentClient>,
    config: DispatchConfig,
    slots: Arc<Semaphore>,
    events: Option<mpsc::UnboundedSender<DispatchEvent>>,
}

impl std::fmt::Debug for TaskDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskDispatcher")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl TaskDispatcher {
    pub fn new(
        service: TaskService,
        worktrees: Arc<dyn WorktreeProvider>,
        agents: Arc<dyn AgentClient>,
        config: DispatchConfig,
    ) -> Self {
        let slots = Arc::new(Semaphore::new(config.max_concurrent.max(1)));
        Self {
            service,
            worktrees,
            agents,
            config,
            slots,
            events: None,
        }
    }

    pub fn with_events(mut self, events: mpsc::UnboundedSender<DispatchEvent>) -> Self {
        self.events = Some(events);
        self
    }

    /// Run `task_id` through the agent and wait for it to finish.
    ///
    /// The task is marked `in_progress` before the agent starts and is not
    /// rolled back if the agent fails or times out.
    pub async fn dispatch(&self, task_id: &TaskId) -> Result<DispatchReport, DispatchError> {
        let result = self.run(task_id).await;
        match &result {
            Ok(_) => self.emit(DispatchEvent::Finished {
                task_id: task_id.clone(),
            }),
            Err(err) => {
                tracing::warn!(task_id = %task_id, error = %err, "dispatch failed");
                self.emit(DispatchEvent::Failed {
                    task_id: task_id.clone(),
                    message: err.to_string(),
                });
            }
        }
        result
    }

    async fn run(&self, task_id: &TaskId) -> Result<DispatchReport, DispatchError> {
        let task = self.service.get_task(task_id).await?;
        let url = self.repository_url(&task)?;
        let (branch, defaulted_branch) = match task.branch_name.as_deref().map(str::trim) {
            Some(branch) if !branch.is_empty() => (branch.to_string(), false),
            _ => (default_branch(&task.id), true),
        };

        let _slot = self
            .slots
            .acquire()
            .await
            .map_err(|err| self.setup_error(task_id, err.to_string()))?;

        let worktree = {
            let provider = Arc::clone(&self.worktrees);
            let url = url.clone();
            let branch = branch.clone();
            tokio::task::spawn_blocking(move || provider.worktree_path(&url, &branch))
                .await
                .map_err(|err| self.setup_error(task_id, err.to_string()))?
                .map_err(|err| self.setup_error(task_id, err.to_string()))?
        };
        tracing::info!(task_id = %task_id, worktree = %worktree.display(), "worktree ready");

        let mut patch = TaskPatch::status(Status::InProgress);
        if defaulted_branch {
            patch.branch_name = Some(Some(branch.clone()));
        }
        self.service.update_task(task_id, patch).await?;
        self.emit(DispatchEvent::Started {
            task_id: task_id.clone(),
            worktree: worktree.clone(),
        });

        let session_config = SessionConfig::new(&worktree).with_model(self.config.model.clone());
        let mut session = self
            .agents
            .create_session(session_config)
            .await
            .map_err(|err| DispatchError::AgentDispatchError {
                task_id: task_id.clone(),
                message: err.to_string(),
            })?;

        let outcome = self.drive(session.as_mut(), task_id, &task).await;
        if let Err(err) = session.destroy().await {
            tracing::warn!(task_id = %task_id, error = %err, "failed to destroy agent session");
        }

        match outcome {
            TurnOutcome::Completed { text } => {
                tracing::info!(task_id = %task_id, "agent finished");
                Ok(DispatchReport {
                    task_id: task_id.clone(),
                    worktree,
                    branch,
                    output: text,
                })
            }
            TurnOutcome::Failed { message } => Err(DispatchError::AgentDispatchError {
                task_id: task_id.clone(),
                message,
            }),
            TurnOutcome::TimedOut => Err(DispatchError::AgentDispatchTimeout {
                task_id: task_id.clone(),
                timeout_secs: self.config.timeout.as_secs(),
            }),
        }
    }

    async fn drive(
        &self,
        session: &mut dyn AgentSession,
        task_id: &TaskId,
        task: &Task,
    ) -> TurnOutcome {
        if let Err(err) = session.send(&build_prompt(task)).await {
            return TurnOutcome::Failed {
                message: err.to_string(),
            };
        }
        await_turn(session, self.config.timeout, |text| {
            self.emit(DispatchEvent::Output {
                task_id: task_id.clone(),
                text: text.to_string(),
            })
        })
        .await
    }

    fn repository_url(&self, task: &Task) -> Result<String, DispatchError> {
        if let Some(url) = task
            .repository_url
            .as_deref()
            .map(str::trim)
            .filter(|url| !url.is_empty())
        {
            return Ok(url.to_string());
        }
        match task.repository_name.as_deref() {
            Some(name) => self
                .config
                .repositories
                .get(name)
                .cloned()
                .ok_or_else(|| {
                    self.setup_error(&task.id, format!("repository '{name}' is not configured"))
                }),
            None => Err(self.setup_error(
                &task.id,
                "task has neither a repository url nor a repository name".to_string(),
            )),
        }
    }

    fn setup_error(&self, task_id: &TaskId, message: String) -> DispatchError {
        DispatchError::Setup {
            task_id: task_id.clone(),
            message,
        }
    }

    fn emit(&self, event: DispatchEvent) {
        if let Some(events) = &self.events {
            let _ = events.send(event);
        }
    }
}

fn default_branch(task_id: &TaskId) -> String {
    let prefix: String = task_id.0.chars().take(8).collect();
    format!("crew/{prefix}")
}

/// Prompt handed to the agent for a task.
pub fn build_prompt(task: &Task) -> String {
    let mut prompt = format!("Task: {}\n", task.name);
    if !task.description.trim().is_empty() {
        prompt.push('\n');
        prompt.push_str(task.description.trim());
        prompt.push('\n');
    }
    if !task.checklist.is_empty() {
        prompt.push_str("\nChecklist:\n");
        for item in &task.checklist {
            let mark = if item.completed { 'x' } else { ' ' };
            prompt.push_str(&format!("- [{mark}] {}\n", item.description));
        }
    }
    prompt.push_str(&format!(
        "\nWhen the work is done, set the status of task {} to completed.\n",
        task.id
    ));
    prompt
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::persistence::MemoryTaskStore;
    use crate::turn::fake::{FakeAgent, Reply};
    use crew_core::{ChecklistItem, TaskDraft};
    use crew_git::GitError;

    #[derive(Debug, Default)]
    struct FakeWorktrees {
        root: PathBuf,
        fail: bool,
        calls: Mutex<Vec<(String, String)>>,
    }

    impl WorktreeProvider for FakeWorktrees {
        fn worktree_path(&self, repo_url: &str, branch: &str) -> Result<PathBuf, GitError> {
            self.calls
                .lock()
                .expect("calls")
                .push((repo_url.to_string(), branch.to_string()));
            if self.fail {
                return Err(GitError::InvalidBranch {
                    branch: branch.to_string(),
                });
            }
            Ok(self.root.join(branch))
        }
    }

    struct Fixture {
        service: TaskService,
        worktrees: Arc<FakeWorktrees>,
        agent: FakeAgent,
        dispatcher: TaskDispatcher,
        events: mpsc::UnboundedReceiver<DispatchEvent>,
    }

    fn fixture(agent: FakeAgent, fail_worktree: bool) -> Fixture {
        let service = TaskService::new(Arc::new(MemoryTaskStore::new()));
        let worktrees = Arc::new(FakeWorktrees {
            root: PathBuf::from("/work"),
            fail: fail_worktree,
            calls: Mutex::new(Vec::new()),
        });
        let mut repositories = BTreeMap::new();
        repositories.insert("api".to_string(), "https://example.com/api.git".to_string());
        let config = DispatchConfig {
            repositories,
            timeout: Duration::from_secs(60),
            model: "auto".to_string(),
            max_concurrent: 2,
        };
        let (tx, events) = mpsc::unbounded_channel();
        let dispatcher = TaskDispatcher::new(
            service.clone(),
            worktrees.clone(),
            Arc::new(agent.clone()),
            config,
        )
        .with_events(tx);
        Fixture {
            service,
            worktrees,
            agent,
            dispatcher,
            events,
        }
    }

    async fn repo_task(service: &TaskService) -> Task {
        let mut draft = TaskDraft::new("Login form", "Email and password");
        draft.repository_name = Some("api".to_string());
        draft.checklist = Some(vec![ChecklistItem::new("markup")]);
        service.create_task(draft).await.expect("create task")
    }

    fn drain(events: &mut mpsc::UnboundedReceiver<DispatchEvent>) -> Vec<DispatchEvent> {
        let mut out = Vec::new();
        while let Ok(event) = events.try_recv() {
            out.push(event);
        }
        out
    }

    #[tokio::test]
    async fn dispatch_resolves_worktree_marks_in_progress_and_prompts_agent() {
        let mut fx = fixture(FakeAgent::with_replies(vec![Reply::text("all done")]), false);
        let task = repo_task(&fx.service).await;

        let report = fx.dispatcher.dispatch(&task.id).await.expect("dispatch");
        let branch = format!("crew/{}", &task.id.0[..8]);
        assert_eq!(report.branch, branch);
        assert_eq!(report.worktree, PathBuf::from("/work").join(&branch));
        assert_eq!(report.output, "all done");

        assert_eq!(
            fx.worktrees.calls.lock().expect("calls").clone(),
            vec![("https://example.com/api.git".to_string(), branch.clone())]
        );
        assert_eq!(fx.agent.session_dirs(), vec![report.worktree.clone()]);
        let prompts = fx.agent.prompts();
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].contains("Login form"));
        assert!(prompts[0].contains("- [ ] markup"));
        assert_eq!(fx.agent.destroyed(), 1);

        let stored = fx.service.get_task(&task.id).await.expect("get");
        assert_eq!(stored.status, Status::InProgress);
        assert_eq!(stored.branch_name.as_deref(), Some(branch.as_str()));

        let events = drain(&mut fx.events);
        assert!(matches!(events.first(), Some(DispatchEvent::Started { .. })));
        assert!(events.contains(&DispatchEvent::Output {
            task_id: task.id.clone(),
            text: "all done".to_string()
        }));
        assert_eq!(
            events.last(),
            Some(&DispatchEvent::Finished {
                task_id: task.id.clone()
            })
        );
    }

    #[tokio::test]
    async fn explicit_url_and_branch_win_over_defaults() {
        let fx = fixture(FakeAgent::default(), false);
        let mut draft = TaskDraft::new("Fix", "");
        draft.repository_url = Some("git@example.com:web.git".to_string());
        draft.repository_name = Some("api".to_string());
        draft.branch_name = Some("feature/fix".to_string());
        let task = fx.service.create_task(draft).await.expect("create");

        let report = fx.dispatcher.dispatch(&task.id).await.expect("dispatch");
        assert_eq!(report.branch, "feature/fix");
        assert_eq!(
            fx.worktrees.calls.lock().expect("calls")[0].0,
            "git@example.com:web.git"
        );
    }

    #[tokio::test]
    async fn missing_repository_or_worktree_failure_is_setup_error() {
        let fx = fixture(FakeAgent::default(), false);
        let task = fx
            .service
            .create_task(TaskDraft::new("No repo", ""))
            .await
            .expect("create");
        let err = fx.dispatcher.dispatch(&task.id).await.expect_err("no repo");
        assert!(matches!(err, DispatchError::Setup { .. }));
        assert_eq!(
            fx.service.get_task(&task.id).await.expect("get").status,
            Status::Created
        );

        let fx = fixture(FakeAgent::default(), true);
        let task = repo_task(&fx.service).await;
        let err = fx.dispatcher.dispatch(&task.id).await.expect_err("worktree");
        assert!(matches!(err, DispatchError::Setup { .. }));
        assert!(fx.agent.prompts().is_empty());
    }

    #[tokio::test]
    async fn unknown_task_is_not_found() {
        let fx = fixture(FakeAgent::default(), false);
        let err = fx
            .dispatcher
            .dispatch(&TaskId::new("nonexistent"))
            .await
            .expect_err("missing");
        assert!(matches!(err, DispatchError::Service(ref inner) if inner.is_not_found()));
    }

    #[tokio::test]
    async fn agent_error_keeps_in_progress_status() {
        let reply = Reply::Events(vec![crew_agents::SessionEvent::Error {
            message: "exit status 1".to_string(),
        }]);
        let fx = fixture(FakeAgent::with_replies(vec![reply]), false);
        let task = repo_task(&fx.service).await;

        let err = fx.dispatcher.dispatch(&task.id).await.expect_err("agent error");
        assert!(matches!(err, DispatchError::AgentDispatchError { ref message, .. } if message == "exit status 1"));
        assert_eq!(
            fx.service.get_task(&task.id).await.expect("get").status,
            Status::InProgress
        );
        assert_eq!(fx.agent.destroyed(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn hanging_agent_times_out_without_rollback() {
        let mut fx = fixture(FakeAgent::with_replies(vec![Reply::Hang]), false);
        let task = repo_task(&fx.service).await;

        let err = fx.dispatcher.dispatch(&task.id).await.expect_err("timeout");
        assert!(err.is_timeout());
        assert_eq!(err.to_string(), format!("agent did not finish task {} within 60s", task.id));
        assert_eq!(
            fx.service.get_task(&task.id).await.expect("get").status,
            Status::InProgress
        );
        assert!(matches!(
            drain(&mut fx.events).last(),
            Some(DispatchEvent::Failed { .. })
        ));
    }

    #[test]
    fn prompt_lists_checklist_state() {
        let task = Task::new("Ship", "Release v1").with_checklist(vec![
            ChecklistItem {
                description: "tag".to_string(),
                completed: true,
            },
            ChecklistItem::new("publish"),
        ]);
        let prompt = build_prompt(&task);
        assert!(prompt.starts_with("Task: Ship\n\nRelease v1\n"));
        assert!(prompt.contains("- [x] tag\n- [ ] publish\n"));
        assert!(prompt.contains(&task.id.0));
    }
}
