//! Story and task operations shared by the UI, the CLI and the agent tools.
//!
//! Creation merges client fields with generated defaults; updates fetch the
//! current record, overlay the supplied fields and write the result back.
//! The read-then-write is not atomic, so concurrent updates to the same
//! record resolve as last writer wins.

use std::sync::Arc;

use crew_core::{
    ModelError, Status, Story, StoryDraft, StoryId, StoryPatch, Task, TaskDraft, TaskId,
    TaskPatch,
};

use crate::persistence::{
    list_non_completed_stories, next_task, EntityKind, StorageFailure, StoreError, TaskFilter,
    TaskStore,
};

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("{kind} with id '{id}' not found")]
    NotFound { kind: EntityKind, id: String },
    #[error("validation failed: {source}")]
    Validation {
        #[from]
        source: ModelError,
    },
    #[error("storage failure: {source}")]
    Storage {
        #[source]
        source: StorageFailure,
    },
}

impl From<StoreError> for ServiceError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { kind, id } => ServiceError::NotFound { kind, id },
            StoreError::Storage { source } => ServiceError::Storage { source },
        }
    }
}

impl ServiceError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, ServiceError::NotFound { .. })
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, ServiceError::Validation { .. })
    }
}

#[derive(Clone)]
pub struct TaskService {
    store: Arc<dyn TaskStore>,
}

impl std::fmt::Debug for TaskService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskService").finish_non_exhaustive()
    }
}

impl TaskService {
    pub fn new(store: Arc<dyn TaskStore>) -> Self {
        Self { store }
    }

    pub async fn list_stories(&self, status: Option<Status>) -> Result<Vec<Story>, ServiceError> {
        Ok(self.store.list_stories(status).await?)
    }

    pub async fn get_story(&self, id: &StoryId) -> Result<Story, ServiceError> {
        Ok(self.store.get_story(id).await?)
    }

    pub async fn create_story(&self, draft: StoryDraft) -> Result<Story, ServiceError> {
        let story = Story::from_draft(draft)?;
        self.store.put_story(&story).await?;
        tracing::info!(story_id = %story.id, name = %story.name, "created story");
        Ok(story)
    }

    pub async fn update_story(
        &self,
        id: &StoryId,
        patch: StoryPatch,
    ) -> Result<Story, ServiceError> {
        let mut story = self.store.get_story(id).await?;
        patch.apply(&mut story)?;
        self.store.put_story(&story).await?;
        tracing::info!(story_id = %story.id, status = %story.status, "updated story");
        Ok(story)
    }

    /// Unconditional upsert of a fully formed story.
    pub async fn save_story(&self, story: Story) -> Result<Story, ServiceError> {
        self.store.put_story(&story).await?;
        Ok(story)
    }

    pub async fn list_non_completed_stories(&self) -> Result<Vec<Story>, ServiceError> {
        Ok(list_non_completed_stories(self.store.as_ref()).await?)
    }

    pub async fn list_tasks(&self, filter: &TaskFilter) -> Result<Vec<Task>, ServiceError> {
        Ok(self.store.list_tasks(filter).await?)
    }

    /// Every task without a story.
    pub async fn list_unassigned_tasks(&self) -> Result<Vec<Task>, ServiceError> {
        let tasks = self.store.list_tasks(&TaskFilter::all()).await?;
        Ok(tasks.into_iter().filter(Task::is_unassigned).collect())
    }

    pub async fn get_task(&self, id: &TaskId) -> Result<Task, ServiceError> {
        Ok(self.store.get_task(id).await?)
    }

    pub async fn next_task(&self, status: Status) -> Result<Option<Task>, ServiceError> {
        Ok(next_task(self.store.as_ref(), status).await?)
    }

    pub async fn create_task(&self, draft: TaskDraft) -> Result<Task, ServiceError> {
        let task = Task::from_draft(draft)?;
        self.store.put_task(&task).await?;
        tracing::info!(task_id = %task.id, name = %task.name, "created task");
        Ok(task)
    }

    pub async fn update_task(&self, id: &TaskId, patch: TaskPatch) -> Result<Task, ServiceError> {
        let mut task = self.store.get_task(id).await?;
        patch.apply(&mut task)?;
        self.store.put_task(&task).await?;
        tracing::info!(task_id = %task.id, status = %task.status, "updated task");
        Ok(task)
    }

    pub async fn save_task(&self, task: Task) -> Result<Task, ServiceError> {
        self.store.put_task(&task).await?;
        Ok(task)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::{MemoryTaskStore, SqliteTaskStore};
    use crew_core::{from_value, ChecklistItem};
    use serde_json::json;

    fn memory_service() -> TaskService {
        TaskService::new(Arc::new(MemoryTaskStore::new()))
    }

    #[tokio::test]
    async fn auth_login_form_scenario() {
        let dir = tempfile::tempdir().expect("tempdir");
        let service = TaskService::new(Arc::new(SqliteTaskStore::new(dir.path().join("crew.db"))));

        let story = service
            .create_story(StoryDraft::new("Auth", "Authentication flows"))
            .await
            .expect("create story");
        let mut draft = TaskDraft::new("Login form", "Email and password form");
        draft.story_id = Some(story.id.clone());
        draft.checklist = Some(vec![ChecklistItem::new("markup")]);
        let task = service.create_task(draft).await.expect("create task");

        let in_story = service
            .list_tasks(&TaskFilter::all().with_story(story.id.clone()))
            .await
            .expect("list by story");
        assert_eq!(in_story, vec![task.clone()]);

        let updated = service
            .update_task(&task.id, TaskPatch::status(Status::Completed))
            .await
            .expect("update");
        assert_eq!(updated.status, Status::Completed);
        assert_eq!(updated.name, task.name);
        assert_eq!(updated.description, task.description);
        assert_eq!(updated.story_id, task.story_id);
        assert_eq!(updated.checklist, task.checklist);
        assert_eq!(service.get_task(&task.id).await.expect("get"), updated);
    }

    #[tokio::test]
    async fn update_merges_and_is_idempotent() {
        let service = memory_service();
        let story = service
            .create_story(StoryDraft::new("Auth", "Login flows"))
            .await
            .expect("create");
        let patch: StoryPatch =
            from_value(json!({"name": "Authentication", "status": "planning"})).expect("patch");

        let once = service
            .update_story(&story.id, patch.clone())
            .await
            .expect("first update");
        let twice = service
            .update_story(&story.id, patch)
            .await
            .expect("second update");

        assert_eq!(once, twice);
        assert_eq!(once.name, "Authentication");
        assert_eq!(once.status, Status::Planning);
        assert_eq!(once.description, "Login flows");
        assert_eq!(service.get_story(&story.id).await.expect("get"), once);
    }

    #[tokio::test]
    async fn explicit_null_clears_nullable_task_fields() {
        let service = memory_service();
        let mut draft = TaskDraft::new("Deploy", "Ship it");
        draft.agent = Some("coder".to_string());
        draft.story_id = Some(StoryId::new("S1"));
        let task = service.create_task(draft).await.expect("create");

        let patch: TaskPatch =
            from_value(json!({"agent": null, "story_id": null})).expect("patch");
        let updated = service.update_task(&task.id, patch).await.expect("update");
        assert_eq!(updated.agent, None);
        assert!(updated.is_unassigned());
    }

    #[tokio::test]
    async fn created_entities_get_unique_ids_and_round_trip() {
        let service = memory_service();
        let a = service
            .create_task(TaskDraft::new("a", "first"))
            .await
            .expect("create a");
        let b = service
            .create_task(TaskDraft::new("b", "second"))
            .await
            .expect("create b");
        assert_ne!(a.id, b.id);
        assert!(!a.id.0.is_empty());
        assert_eq!(service.get_task(&a.id).await.expect("get"), a);
    }

    #[tokio::test]
    async fn unassigned_tasks_are_the_complement_of_assigned() {
        let service = memory_service();
        let mut assigned = TaskDraft::new("assigned", "");
        assigned.story_id = Some(StoryId::new("S1"));
        service.create_task(assigned).await.expect("create");
        let loose = service
            .create_task(TaskDraft::new("loose", ""))
            .await
            .expect("create");

        let unassigned = service.list_unassigned_tasks().await.expect("list");
        assert_eq!(unassigned, vec![loose]);
        assert_eq!(
            service.list_tasks(&TaskFilter::all()).await.expect("all").len(),
            2
        );
    }

    #[tokio::test]
    async fn missing_and_invalid_inputs_map_to_error_kinds() {
        let service = memory_service();

        let err = service
            .get_story(&StoryId::new("nonexistent"))
            .await
            .expect_err("missing story");
        assert!(err.is_not_found());

        let err = service
            .update_task(&TaskId::new("nonexistent"), TaskPatch::default())
            .await
            .expect_err("missing task");
        assert!(err.is_not_found());

        let err = service
            .create_story(StoryDraft::new("", "empty name"))
            .await
            .expect_err("empty name");
        assert!(err.is_validation());
        assert!(service.list_stories(None).await.expect("list").is_empty());
    }

    #[tokio::test]
    async fn save_upserts_formed_records() {
        let service = memory_service();
        let story = Story::new("Billing", "Invoices").with_id(StoryId::new("S-billing"));
        service.save_story(story.clone()).await.expect("save");
        service
            .save_story(story.clone().with_status(Status::Completed))
            .await
            .expect("save again");

        let stories = service.list_stories(None).await.expect("list");
        assert_eq!(stories.len(), 1);
        assert_eq!(stories[0].status, Status::Completed);
        assert!(service
            .list_non_completed_stories()
            .await
            .expect("non completed")
            .is_empty());
    }
}
