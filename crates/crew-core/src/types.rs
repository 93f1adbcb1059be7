//! Story and task records shared by the store, the service layer and the UI.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Lifecycle status shared by stories and tasks.
///
/// Variant order is the display priority: `Created` sorts first and
/// `Completed` last.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord, Default,
)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    #[default]
    #[serde(alias = "pending")]
    Created,
    Planning,
    Ready,
    InProgress,
    Completed,
}

impl Status {
    pub const ALL: [Status; 5] = [
        Status::Created,
        Status::Planning,
        Status::Ready,
        Status::InProgress,
        Status::Completed,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Status::Created => "created",
            Status::Planning => "planning",
            Status::Ready => "ready",
            Status::InProgress => "in_progress",
            Status::Completed => "completed",
        }
    }

    /// Position in the enumeration, used as the primary sort key.
    pub fn priority(self) -> u8 {
        match self {
            Status::Created => 0,
            Status::Planning => 1,
            Status::Ready => 2,
            Status::InProgress => 3,
            Status::Completed => 4,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Status::Completed)
    }

    /// Every status a story or task can still move on from, in enumeration order.
    pub fn non_terminal() -> impl Iterator<Item = Status> {
        Status::ALL.into_iter().filter(|status| !status.is_terminal())
    }

    /// The following status, wrapping from `Completed` back to `Created`.
    pub fn cycle_next(self) -> Status {
        let idx = usize::from(self.priority());
        Status::ALL[(idx + 1) % Status::ALL.len()]
    }

    pub fn cycle_previous(self) -> Status {
        let idx = usize::from(self.priority());
        Status::ALL[(idx + Status::ALL.len() - 1) % Status::ALL.len()]
    }

    /// Wire labels accepted by the tool schemas.
    pub fn labels() -> Vec<&'static str> {
        Status::ALL.iter().map(|status| status.as_str()).collect()
    }
}

impl std::str::FromStr for Status {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "created" | "pending" => Ok(Status::Created),
            "planning" => Ok(Status::Planning),
            "ready" => Ok(Status::Ready),
            "in_progress" => Ok(Status::InProgress),
            "completed" => Ok(Status::Completed),
            other => Err(format!(
                "invalid status '{other}'. valid values: created, planning, ready, in_progress, completed"
            )),
        }
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StoryId(pub String);

impl StoryId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

impl std::fmt::Display for StoryId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for StoryId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TaskId(pub String);

impl TaskId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for TaskId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// A top-level unit of work grouping zero or more tasks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Story {
    pub id: StoryId,
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub status: Status,
}

impl Story {
    /// Create a story with a freshly generated id in `Created` status.
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: StoryId::generate(),
            name: name.into(),
            description: description.into(),
            status: Status::default(),
        }
    }

    pub fn with_id(mut self, id: StoryId) -> Self {
        self.id = id;
        self
    }

    pub fn with_status(mut self, status: Status) -> Self {
        self.status = status;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChecklistItem {
    pub description: String,
    #[serde(default)]
    pub completed: bool,
}

impl ChecklistItem {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            completed: false,
        }
    }
}

/// A unit of work, optionally grouped under a story and optionally
/// dispatched to an agent against a repository branch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub status: Status,
    #[serde(default)]
    pub agent: Option<String>,
    #[serde(default)]
    pub repository_name: Option<String>,
    #[serde(default)]
    pub repository_url: Option<String>,
    #[serde(default)]
    pub branch_name: Option<String>,
    #[serde(default)]
    pub story_id: Option<StoryId>,
    #[serde(default)]
    pub checklist: Vec<ChecklistItem>,
}

impl Task {
    /// Create an unassigned task with a freshly generated id in `Created` status.
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: TaskId::generate(),
            name: name.into(),
            description: description.into(),
            status: Status::default(),
            agent: None,
            repository_name: None,
            repository_url: None,
            branch_name: None,
            story_id: None,
            checklist: Vec::new(),
        }
    }

    pub fn with_id(mut self, id: TaskId) -> Self {
        self.id = id;
        self
    }

    pub fn with_status(mut self, status: Status) -> Self {
        self.status = status;
        self
    }

    pub fn with_story(mut self, story_id: StoryId) -> Self {
        self.story_id = Some(story_id);
        self
    }

    pub fn with_checklist(mut self, checklist: Vec<ChecklistItem>) -> Self {
        self.checklist = checklist;
        self
    }

    /// `(completed, total)` checklist counts.
    pub fn checklist_progress(&self) -> (usize, usize) {
        let done = self.checklist.iter().filter(|item| item.completed).count();
        (done, self.checklist.len())
    }

    pub fn is_unassigned(&self) -> bool {
        self.story_id.is_none()
    }
}

/// Records that sort by `(status priority, name)`.
pub trait Prioritized {
    fn status(&self) -> Status;
    fn name(&self) -> &str;

    fn cmp_priority(&self, other: &Self) -> Ordering {
        self.status()
            .priority()
            .cmp(&other.status().priority())
            .then_with(|| self.name().cmp(other.name()))
    }
}

impl Prioritized for Story {
    fn status(&self) -> Status {
        self.status
    }

    fn name(&self) -> &str {
        &self.name
    }
}

impl Prioritized for Task {
    fn status(&self) -> Status {
        self.status
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Stable sort by `(status priority, name)` ascending.
pub fn sort_by_priority<T: Prioritized>(items: &mut [T]) {
    items.sort_by(|a, b| a.cmp_priority(b));
}
