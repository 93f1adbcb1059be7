use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use crew_core::{ChecklistItem, Status, Story, StoryId, Task, TaskId};
use rusqlite::types::Type;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};

use super::{StorageFailure, StoreError, TaskFilter, TaskStore};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS story (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    description TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'created'
);

CREATE TABLE IF NOT EXISTS task (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    description TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'created',
    agent TEXT,
    repository_name TEXT,
    repository_url TEXT,
    branch_name TEXT,
    story_id TEXT REFERENCES story(id),
    checklist TEXT
);

CREATE INDEX IF NOT EXISTS idx_story_status ON story(status);
CREATE INDEX IF NOT EXISTS idx_task_status ON task(status);
CREATE INDEX IF NOT EXISTS idx_task_story ON task(story_id);
"#;

const TASK_COLUMNS: &str = "id, name, description, status, agent, repository_name, \
                            repository_url, branch_name, story_id, checklist";

#[derive(Debug, Clone, PartialEq, Eq)]
enum Location {
    File(PathBuf),
    Memory,
}

/// SQLite-backed store over a single connection.
///
/// The connection is opened, and the schema created, on the first call.
/// Every statement runs on the blocking pool while holding the connection
/// mutex, so calls are serialized and each write is committed before the
/// call returns.
#[derive(Debug, Clone)]
pub struct SqliteTaskStore {
    location: Location,
    conn: Arc<Mutex<Option<Connection>>>,
}

impl SqliteTaskStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            location: Location::File(path.into()),
            conn: Arc::new(Mutex::new(None)),
        }
    }

    pub fn in_memory() -> Self {
        Self {
            location: Location::Memory,
            conn: Arc::new(Mutex::new(None)),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        match &self.location {
            Location::File(path) => Some(path),
            Location::Memory => None,
        }
    }

    async fn run_blocking<F, R>(&self, f: F) -> Result<R, StorageFailure>
    where
        F: FnOnce(&mut Connection) -> Result<R, StorageFailure> + Send + 'static,
        R: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        let location = self.location.clone();
        let outcome = tokio::task::spawn_blocking(move || -> Result<R, StorageFailure> {
            let mut guard = conn.lock().map_err(|_| StorageFailure::Worker {
                message: "connection mutex poisoned".to_string(),
            })?;
            if guard.is_none() {
                *guard = Some(open_connection(&location)?);
            }
            match guard.as_mut() {
                Some(conn) => f(conn),
                None => Err(StorageFailure::Worker {
                    message: "connection unavailable".to_string(),
                }),
            }
        })
        .await
        .map_err(|err| StorageFailure::Worker {
            message: err.to_string(),
        })
        .and_then(|result| result);

        if let Err(err) = &outcome {
            tracing::error!(error = %err, "sqlite task store operation failed");
        }
        outcome
    }
}

fn open_connection(location: &Location) -> Result<Connection, StorageFailure> {
    let conn = match location {
        Location::File(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent).map_err(|source| StorageFailure::CreateDir {
                    path: parent.to_path_buf(),
                    source,
                })?;
            }
            tracing::info!(path = %path.display(), "opening task database");
            Connection::open(path)?
        }
        Location::Memory => Connection::open_in_memory()?,
    };
    conn.execute_batch(SCHEMA)?;
    Ok(conn)
}

fn status_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<Status> {
    let raw: String = row.get(idx)?;
    raw.parse::<Status>()
        .map_err(|message| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, message.into()))
}

fn read_story(row: &Row<'_>) -> rusqlite::Result<Story> {
    Ok(Story {
        id: StoryId(row.get(0)?),
        name: row.get(1)?,
        description: row.get(2)?,
        status: status_column(row, 3)?,
    })
}

fn read_task(row: &Row<'_>) -> rusqlite::Result<Task> {
    let checklist_json: Option<String> = row.get(9)?;
    let checklist = match checklist_json.as_deref() {
        Some(raw) if !raw.trim().is_empty() => serde_json::from_str::<Vec<ChecklistItem>>(raw)
            .map_err(|err| rusqlite::Error::FromSqlConversionFailure(9, Type::Text, Box::new(err)))?,
        _ => Vec::new(),
    };

    Ok(Task {
        id: TaskId(row.get(0)?),
        name: row.get(1)?,
        description: row.get(2)?,
        status: status_column(row, 3)?,
        agent: row.get(4)?,
        repository_name: row.get(5)?,
        repository_url: row.get(6)?,
        branch_name: row.get(7)?,
        story_id: row.get::<_, Option<String>>(8)?.map(StoryId),
        checklist,
    })
}

/// Empty checklists are stored as NULL.
fn checklist_column(checklist: &[ChecklistItem]) -> Result<Option<String>, serde_json::Error> {
    if checklist.is_empty() {
        return Ok(None);
    }
    serde_json::to_string(checklist).map(Some)
}

#[async_trait]
impl TaskStore for SqliteTaskStore {
    async fn put_story(&self, story: &Story) -> Result<(), StoreError> {
        let story = story.clone();
        tracing::info!(story_id = %story.id, name = %story.name, "saving story");
        self.run_blocking(move |conn| {
            conn.execute(
                r#"
INSERT INTO story (id, name, description, status)
VALUES (?1, ?2, ?3, ?4)
ON CONFLICT(id) DO UPDATE SET
  name = excluded.name,
  description = excluded.description,
  status = excluded.status
"#,
                params![story.id.0, story.name, story.description, story.status.as_str()],
            )?;
            Ok(())
        })
        .await?;
        Ok(())
    }

    async fn get_story(&self, id: &StoryId) -> Result<Story, StoreError> {
        tracing::debug!(story_id = %id, "fetching story");
        let key = id.0.clone();
        let story = self
            .run_blocking(move |conn| {
                Ok(conn
                    .query_row(
                        "SELECT id, name, description, status FROM story WHERE id = ?1",
                        params![key],
                        read_story,
                    )
                    .optional()?)
            })
            .await?;
        story.ok_or_else(|| {
            tracing::warn!(story_id = %id, "story not found");
            StoreError::story_not_found(id)
        })
    }

    async fn list_stories(&self, status: Option<Status>) -> Result<Vec<Story>, StoreError> {
        tracing::debug!(status = ?status, "listing stories");
        let stories = self
            .run_blocking(move |conn| {
                let mut sql =
                    String::from("SELECT id, name, description, status FROM story");
                let mut args: Vec<&'static str> = Vec::new();
                if let Some(status) = status {
                    sql.push_str(" WHERE status = ?1");
                    args.push(status.as_str());
                }
                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt.query_map(params_from_iter(args.iter()), read_story)?;
                let mut stories = Vec::new();
                for row in rows {
                    stories.push(row?);
                }
                Ok(stories)
            })
            .await?;
        Ok(stories)
    }

    async fn put_task(&self, task: &Task) -> Result<(), StoreError> {
        let task = task.clone();
        tracing::info!(task_id = %task.id, name = %task.name, "saving task");
        self.run_blocking(move |conn| {
            let checklist = checklist_column(&task.checklist)?;
            conn.execute(
                r#"
INSERT INTO task (id, name, description, status, agent, repository_name,
                  repository_url, branch_name, story_id, checklist)
VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
ON CONFLICT(id) DO UPDATE SET
  name = excluded.name,
  description = excluded.description,
  status = excluded.status,
  agent = excluded.agent,
  repository_name = excluded.repository_name,
  repository_url = excluded.repository_url,
  branch_name = excluded.branch_name,
  story_id = excluded.story_id,
  checklist = excluded.checklist
"#,
                params![
                    task.id.0,
                    task.name,
                    task.description,
                    task.status.as_str(),
                    task.agent,
                    task.repository_name,
                    task.repository_url,
                    task.branch_name,
                    task.story_id.as_ref().map(|id| id.0.as_str()),
                    checklist,
                ],
            )?;
            Ok(())
        })
        .await?;
        Ok(())
    }

    async fn get_task(&self, id: &TaskId) -> Result<Task, StoreError> {
        tracing::debug!(task_id = %id, "fetching task");
        let key = id.0.clone();
        let task = self
            .run_blocking(move |conn| {
                let sql = format!("SELECT {TASK_COLUMNS} FROM task WHERE id = ?1");
                Ok(conn.query_row(&sql, params![key], read_task).optional()?)
            })
            .await?;
        task.ok_or_else(|| {
            tracing::warn!(task_id = %id, "task not found");
            StoreError::task_not_found(id)
        })
    }

    async fn list_tasks(&self, filter: &TaskFilter) -> Result<Vec<Task>, StoreError> {
        tracing::debug!(status = ?filter.status, story_id = ?filter.story_id, "listing tasks");
        let filter = filter.clone();
        let tasks = self
            .run_blocking(move |conn| {
                let mut conditions = Vec::new();
                let mut args: Vec<String> = Vec::new();
                if let Some(status) = filter.status {
                    args.push(status.as_str().to_string());
                    conditions.push(format!("status = ?{}", args.len()));
                }
                if let Some(story_id) = filter.story_id {
                    args.push(story_id.0);
                    conditions.push(format!("story_id = ?{}", args.len()));
                }

                let mut sql = format!("SELECT {TASK_COLUMNS} FROM task");
                if !conditions.is_empty() {
                    sql.push_str(" WHERE ");
                    sql.push_str(&conditions.join(" AND "));
                }

                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt.query_map(params_from_iter(args.iter()), read_task)?;
                let mut tasks = Vec::new();
                for row in rows {
                    tasks.push(row?);
                }
                Ok(tasks)
            })
            .await?;
        Ok(tasks)
    }
}
