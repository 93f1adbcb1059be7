//! Story and task storage.
//!
//! [`TaskStore`] is the only component that touches persistent state. Writes
//! are upserts keyed by id; reads either fetch one record or list with
//! optional filters. Listing order is whatever the backend enumerates.

mod memory;
pub mod queries;
mod sqlite;

pub use memory::MemoryTaskStore;
pub use queries::{list_non_completed_stories, next_task};
pub use sqlite::SqliteTaskStore;

use async_trait::async_trait;
use crew_core::{Status, Story, StoryId, Task, TaskId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Story,
    Task,
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EntityKind::Story => f.write_str("story"),
            EntityKind::Task => f.write_str("task"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StorageFailure {
    #[error("sqlite error: {source}")]
    Sql {
        #[from]
        source: rusqlite::Error,
    },
    #[error("json serialization error: {source}")]
    Json {
        #[from]
        source: serde_json::Error,
    },
    #[error("failed to create database directory {path}: {source}")]
    CreateDir {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("storage worker failed: {message}")]
    Worker { message: String },
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("{kind} with id '{id}' not found")]
    NotFound { kind: EntityKind, id: String },
    #[error("storage failure: {source}")]
    Storage {
        #[from]
        source: StorageFailure,
    },
}

impl StoreError {
    pub fn story_not_found(id: &StoryId) -> Self {
        StoreError::NotFound {
            kind: EntityKind::Story,
            id: id.0.clone(),
        }
    }

    pub fn task_not_found(id: &TaskId) -> Self {
        StoreError::NotFound {
            kind: EntityKind::Task,
            id: id.0.clone(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }
}

/// AND-combined filters for [`TaskStore::list_tasks`]. The default matches every task.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskFilter {
    pub status: Option<Status>,
    pub story_id: Option<StoryId>,
}

impl TaskFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn with_status(mut self, status: Status) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_story(mut self, story_id: StoryId) -> Self {
        self.story_id = Some(story_id);
        self
    }

    pub fn matches(&self, task: &Task) -> bool {
        self.status.map_or(true, |status| task.status == status)
            && self
                .story_id
                .as_ref()
                .map_or(true, |story_id| task.story_id.as_ref() == Some(story_id))
    }
}

#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Insert or fully replace the story at `story.id`.
    async fn put_story(&self, story: &Story) -> Result<(), StoreError>;
    async fn get_story(&self, id: &StoryId) -> Result<Story, StoreError>;
    /// All stories, or only those with `status`.
    async fn list_stories(&self, status: Option<Status>) -> Result<Vec<Story>, StoreError>;

    /// Insert or fully replace the task at `task.id`.
    async fn put_task(&self, task: &Task) -> Result<(), StoreError>;
    async fn get_task(&self, id: &TaskId) -> Result<Task, StoreError>;
    async fn list_tasks(&self, filter: &TaskFilter) -> Result<Vec<Task>, StoreError>;
}

#[cfg(test)]
pub(crate) mod contract {
    //! Behaviour every backend must share.

    use super::*;
    use crew_core::ChecklistItem;

    pub async fn story_round_trip_and_upsert(store: &dyn TaskStore) {
        let story = Story::new("Auth", "Login flows");
        store.put_story(&story).await.expect("put story");
        assert_eq!(store.get_story(&story.id).await.expect("get story"), story);

        let replaced = story.clone().with_status(Status::Ready);
        store.put_story(&replaced).await.expect("replace story");
        let stories = store.list_stories(None).await.expect("list stories");
        assert_eq!(stories, vec![replaced]);
    }

    pub async fn missing_records_are_not_found(store: &dyn TaskStore) {
        let err = store
            .get_story(&StoryId::new("nonexistent"))
            .await
            .expect_err("missing story");
        assert!(matches!(
            err,
            StoreError::NotFound {
                kind: EntityKind::Story,
                ..
            }
        ));

        let err = store
            .get_task(&TaskId::new("nonexistent"))
            .await
            .expect_err("missing task");
        assert_eq!(err.to_string(), "task with id 'nonexistent' not found");
    }

    pub async fn list_stories_filters_by_status(store: &dyn TaskStore) {
        let created = Story::new("a", "");
        let ready = Story::new("b", "").with_status(Status::Ready);
        store.put_story(&created).await.expect("put");
        store.put_story(&ready).await.expect("put");

        let only_ready = store
            .list_stories(Some(Status::Ready))
            .await
            .expect("list ready");
        assert_eq!(only_ready, vec![ready]);
        assert_eq!(store.list_stories(None).await.expect("list").len(), 2);
        assert!(store
            .list_stories(Some(Status::Completed))
            .await
            .expect("list completed")
            .is_empty());
    }

    pub async fn task_fields_and_checklist_round_trip(store: &dyn TaskStore) {
        let mut done = ChecklistItem::new("markup");
        done.completed = true;
        let mut task = Task::new("Login form", "Build the form")
            .with_status(Status::InProgress)
            .with_story(StoryId::new("dangling"))
            .with_checklist(vec![done, ChecklistItem::new("validation")]);
        task.agent = Some("coder".to_string());
        task.repository_name = Some("web".to_string());
        task.repository_url = Some("https://github.com/acme/web.git".to_string());
        task.branch_name = Some("feature/login".to_string());

        store.put_task(&task).await.expect("put task");
        assert_eq!(store.get_task(&task.id).await.expect("get task"), task);

        let bare = Task::new("Bare", "");
        store.put_task(&bare).await.expect("put bare");
        let loaded = store.get_task(&bare.id).await.expect("get bare");
        assert!(loaded.checklist.is_empty());
        assert_eq!(loaded.agent, None);
    }

    pub async fn list_tasks_combines_filters(store: &dyn TaskStore) {
        let story = StoryId::new("S1");
        let in_story = Task::new("a", "").with_story(story.clone());
        let in_story_ready = Task::new("b", "")
            .with_story(story.clone())
            .with_status(Status::Ready);
        let unassigned_ready = Task::new("c", "").with_status(Status::Ready);
        for task in [&in_story, &in_story_ready, &unassigned_ready] {
            store.put_task(task).await.expect("put task");
        }

        let by_story = store
            .list_tasks(&TaskFilter::all().with_story(story.clone()))
            .await
            .expect("by story");
        let mut names: Vec<_> = by_story.iter().map(|t| t.name.as_str()).collect();
        names.sort_unstable();
        assert_eq!(names, vec!["a", "b"]);

        let both = store
            .list_tasks(&TaskFilter::all().with_story(story).with_status(Status::Ready))
            .await
            .expect("both filters");
        assert_eq!(both, vec![in_story_ready]);

        assert_eq!(
            store.list_tasks(&TaskFilter::all()).await.expect("all").len(),
            3
        );
    }
}
