//! Read helpers composed from [`TaskStore`] listings.

use crew_core::{Status, Story, Task};

use super::{StoreError, TaskFilter, TaskStore};

/// First task with `status` in the backend's enumeration order.
pub async fn next_task<S>(store: &S, status: Status) -> Result<Option<Task>, StoreError>
where
    S: TaskStore + ?Sized,
{
    let tasks = store
        .list_tasks(&TaskFilter::all().with_status(status))
        .await?;
    Ok(tasks.into_iter().next())
}

/// Stories in every non-terminal status, grouped by status in enumeration
/// order. Not deduplicated and not sorted within a group.
pub async fn list_non_completed_stories<S>(store: &S) -> Result<Vec<Story>, StoreError>
where
    S: TaskStore + ?Sized,
{
    let mut stories = Vec::new();
    for status in Status::non_terminal() {
        stories.extend(store.list_stories(Some(status)).await?);
    }
    Ok(stories)
}
