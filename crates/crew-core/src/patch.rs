//! Partial documents used to create and merge-update stories and tasks.
//!
//! A draft carries the client-supplied fields for a new record; the missing
//! ones are filled with generated defaults. A patch carries only the fields
//! to overlay on an existing record. Nullable task fields distinguish
//! "absent" (keep) from an explicit `null` (clear).

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::ModelError;
use crate::types::{ChecklistItem, Status, Story, StoryId, Task, TaskId};

/// Decode a JSON object into a draft or patch. Unknown keys are ignored.
pub fn from_value<T: DeserializeOwned>(value: serde_json::Value) -> Result<T, ModelError> {
    serde_json::from_value(value).map_err(|err| ModelError::InvalidDocument {
        message: err.to_string(),
    })
}

/// Maps a present field to `Some(value)` so that `Option<Option<T>>` can
/// tell an explicit `null` from an absent key.
fn deserialize_some<'de, T, D>(deserializer: D) -> Result<Option<T>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Deserialize::deserialize(deserializer).map(Some)
}

fn require_name(name: Option<String>) -> Result<String, ModelError> {
    let name = name.ok_or(ModelError::MissingField { field: "name" })?;
    if name.trim().is_empty() {
        return Err(ModelError::EmptyField { field: "name" });
    }
    Ok(name)
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoryDraft {
    pub id: Option<StoryId>,
    pub name: Option<String>,
    pub description: Option<String>,
    pub status: Option<Status>,
}

impl StoryDraft {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            description: Some(description.into()),
            ..Self::default()
        }
    }
}

impl Story {
    /// Build a story from client fields, generating `id` and defaulting
    /// `status` when absent.
    pub fn from_draft(draft: StoryDraft) -> Result<Self, ModelError> {
        let name = require_name(draft.name)?;
        let description = draft.description.ok_or(ModelError::MissingField {
            field: "description",
        })?;
        Ok(Story {
            id: draft.id.unwrap_or_else(StoryId::generate),
            name,
            description,
            status: draft.status.unwrap_or_default(),
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskDraft {
    pub id: Option<TaskId>,
    pub name: Option<String>,
    pub description: Option<String>,
    pub status: Option<Status>,
    pub agent: Option<String>,
    pub repository_name: Option<String>,
    pub repository_url: Option<String>,
    pub branch_name: Option<String>,
    pub story_id: Option<StoryId>,
    pub checklist: Option<Vec<ChecklistItem>>,
}

impl TaskDraft {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            description: Some(description.into()),
            ..Self::default()
        }
    }
}

impl Task {
    pub fn from_draft(draft: TaskDraft) -> Result<Self, ModelError> {
        let name = require_name(draft.name)?;
        let description = draft.description.ok_or(ModelError::MissingField {
            field: "description",
        })?;
        Ok(Task {
            id: draft.id.unwrap_or_else(TaskId::generate),
            name,
            description,
            status: draft.status.unwrap_or_default(),
            agent: draft.agent,
            repository_name: draft.repository_name,
            repository_url: draft.repository_url,
            branch_name: draft.branch_name,
            story_id: draft.story_id,
            checklist: draft.checklist.unwrap_or_default(),
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoryPatch {
    pub name: Option<String>,
    pub description: Option<String>,
    pub status: Option<Status>,
}

impl StoryPatch {
    pub fn status(status: Status) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.description.is_none() && self.status.is_none()
    }

    /// Overlay the present fields onto `story`. The merged name must stay non-empty.
    pub fn apply(&self, story: &mut Story) -> Result<(), ModelError> {
        if let Some(name) = &self.name {
            if name.trim().is_empty() {
                return Err(ModelError::EmptyField { field: "name" });
            }
            story.name = name.clone();
        }
        if let Some(description) = &self.description {
            story.description = description.clone();
        }
        if let Some(status) = self.status {
            story.status = status;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskPatch {
    pub name: Option<String>,
    pub description: Option<String>,
    pub status: Option<Status>,
    #[serde(deserialize_with = "deserialize_some", skip_serializing_if = "Option::is_none")]
    pub agent: Option<Option<String>>,
    #[serde(deserialize_with = "deserialize_some", skip_serializing_if = "Option::is_none")]
    pub repository_name: Option<Option<String>>,
    #[serde(deserialize_with = "deserialize_some", skip_serializing_if = "Option::is_none")]
    pub repository_url: Option<Option<String>>,
    #[serde(deserialize_with = "deserialize_some", skip_serializing_if = "Option::is_none")]
    pub branch_name: Option<Option<String>>,
    #[serde(deserialize_with = "deserialize_some", skip_serializing_if = "Option::is_none")]
    pub story_id: Option<Option<StoryId>>,
    /// `null` clears the checklist.
    #[serde(deserialize_with = "deserialize_some", skip_serializing_if = "Option::is_none")]
    pub checklist: Option<Option<Vec<ChecklistItem>>>,
}

impl TaskPatch {
    pub fn status(status: Status) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    pub fn apply(&self, task: &mut Task) -> Result<(), ModelError> {
        if let Some(name) = &self.name {
            if name.trim().is_empty() {
                return Err(ModelError::EmptyField { field: "name" });
            }
            task.name = name.clone();
        }
        if let Some(description) = &self.description {
            task.description = description.clone();
        }
        if let Some(status) = self.status {
            task.status = status;
        }
        if let Some(agent) = &self.agent {
            task.agent = agent.clone();
        }
        if let Some(repository_name) = &self.repository_name {
            task.repository_name = repository_name.clone();
        }
        if let Some(repository_url) = &self.repository_url {
            task.repository_url = repository_url.clone();
        }
        if let Some(branch_name) = &self.branch_name {
            task.branch_name = branch_name.clone();
        }
        if let Some(story_id) = &self.story_id {
            task.story_id = story_id.clone();
        }
        if let Some(checklist) = &self.checklist {
            task.checklist = checklist.clone().unwrap_or_default();
        }
        Ok(())
    }
}
