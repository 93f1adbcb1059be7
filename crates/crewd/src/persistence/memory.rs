use async_trait::async_trait;
use crew_core::{Status, Story, StoryId, Task, TaskId};
use tokio::sync::Mutex;

use super::{StoreError, TaskFilter, TaskStore};

/// Process-local store. Listing returns records in first-insertion order;
/// replacing a record keeps its position.
#[derive(Debug, Default)]
pub struct MemoryTaskStore {
    stories: Mutex<Vec<Story>>,
    tasks: Mutex<Vec<Task>>,
}

impl MemoryTaskStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TaskStore for MemoryTaskStore {
    async fn put_story(&self, story: &Story) -> Result<(), StoreError> {
        let mut stories = self.stories.lock().await;
        match stories.iter_mut().find(|existing| existing.id == story.id) {
            Some(existing) => *existing = story.clone(),
            None => stories.push(story.clone()),
        }
        tracing::debug!(story_id = %story.id, "stored story in memory");
        Ok(())
    }

    async fn get_story(&self, id: &StoryId) -> Result<Story, StoreError> {
        self.stories
            .lock()
            .await
            .iter()
            .find(|story| &story.id == id)
            .cloned()
            .ok_or_else(|| StoreError::story_not_found(id))
    }

    async fn list_stories(&self, status: Option<Status>) -> Result<Vec<Story>, StoreError> {
        Ok(self
            .stories
            .lock()
            .await
            .iter()
            .filter(|story| status.map_or(true, |status| story.status == status))
            .cloned()
            .collect())
    }

    async fn put_task(&self, task: &Task) -> Result<(), StoreError> {
        let mut tasks = self.tasks.lock().await;
        match tasks.iter_mut().find(|existing| existing.id == task.id) {
            Some(existing) => *existing = task.clone(),
            None => tasks.push(task.clone()),
        }
        tracing::debug!(task_id = %task.id, "stored task in memory");
        Ok(())
    }

    async fn get_task(&self, id: &TaskId) -> Result<Task, StoreError> {
        self.tasks
            .lock()
            .await
            .iter()
            .find(|task| &task.id == id)
            .cloned()
            .ok_or_else(|| StoreError::task_not_found(id))
    }

    async fn list_tasks(&self, filter: &TaskFilter) -> Result<Vec<Task>, StoreError> {
        Ok(self
            .tasks
            .lock()
            .await
            .iter()
            .filter(|task| filter.matches(task))
            .cloned()
            .collect())
    }
}
