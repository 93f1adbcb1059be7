//! Story and task operations exposed to an agent as named tools.
//!
//! Each tool declares a JSON parameter schema. Calls are checked against
//! that schema before they reach [`TaskService`]; results are the entity or
//! entity list as plain JSON.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crew_core::{from_value, ModelError, Status, StoryDraft, StoryId, StoryPatch, TaskDraft, TaskId, TaskPatch};

use crate::persistence::TaskFilter;
use crate::service::{ServiceError, TaskService};

#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("unknown tool '{name}'")]
    UnknownTool { name: String },
    #[error("invalid arguments for {tool}: {message}")]
    InvalidArguments { tool: &'static str, message: String },
    #[error(transparent)]
    Service(#[from] ServiceError),
    #[error("failed to encode result: {source}")]
    Encode {
        #[from]
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    #[serde(rename = "inputSchema")]
    pub input_schema: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ParamKind {
    String,
    /// A string, or `null` to clear the field on update.
    NullableString,
    Status,
    Checklist,
}

impl ParamKind {
    fn null_is_absent(self) -> bool {
        matches!(self, ParamKind::String | ParamKind::Status)
    }
}

#[derive(Debug, Clone, Copy)]
struct Param {
    name: &'static str,
    kind: ParamKind,
    required: bool,
    description: &'static str,
}

const fn required(name: &'static str, description: &'static str) -> Param {
    Param {
        name,
        kind: ParamKind::String,
        required: true,
        description,
    }
}

const fn optional(name: &'static str, kind: ParamKind, description: &'static str) -> Param {
    Param {
        name,
        kind,
        required: false,
        description,
    }
}

struct ToolSpec {
    name: &'static str,
    description: &'static str,
    params: &'static [Param],
}

const STATUS: Param = optional("status", ParamKind::Status, "Lifecycle status");
const TASK_FIELDS: [Param; 6] = [
    optional("story_id", ParamKind::NullableString, "Story the task belongs to"),
    optional("agent", ParamKind::NullableString, "Agent assigned to the task"),
    optional("repository_name", ParamKind::NullableString, "Configured repository name"),
    optional("repository_url", ParamKind::NullableString, "Repository clone URL"),
    optional("branch_name", ParamKind::NullableString, "Branch the agent works on"),
    optional("checklist", ParamKind::Checklist, "Ordered checklist items"),
];

const TOOLS: &[ToolSpec] = &[
    ToolSpec {
        name: "list_stories",
        description: "List stories, optionally filtered by status",
        params: &[STATUS],
    },
    ToolSpec {
        name: "get_story",
        description: "Get a story by id",
        params: &[required("id", "Story id")],
    },
    ToolSpec {
        name: "create_story",
        description: "Create a story",
        params: &[
            required("name", "Story name"),
            required("description", "Story description"),
            STATUS,
        ],
    },
    ToolSpec {
        name: "update_story",
        description: "Update the given fields of a story",
        params: &[
            required("id", "Story id"),
            optional("name", ParamKind::String, "Story name"),
            optional("description", ParamKind::String, "Story description"),
            STATUS,
        ],
    },
    ToolSpec {
        name: "list_tasks",
        description: "List tasks, optionally filtered by status and story",
        params: &[STATUS, optional("story_id", ParamKind::String, "Story id")],
    },
    ToolSpec {
        name: "get_task",
        description: "Get a task by id",
        params: &[required("id", "Task id")],
    },
    ToolSpec {
        name: "create_task",
        description: "Create a task, optionally inside a story",
        params: &[
            required("name", "Task name"),
            required("description", "Task description"),
            STATUS,
            TASK_FIELDS[0],
            TASK_FIELDS[1],
            TASK_FIELDS[2],
            TASK_FIELDS[3],
            TASK_FIELDS[4],
            TASK_FIELDS[5],
        ],
    },
    ToolSpec {
        name: "update_task",
        description: "Update the given fields of a task; null clears an optional field",
        params: &[
            required("id", "Task id"),
            optional("name", ParamKind::String, "Task name"),
            optional("description", ParamKind::String, "Task description"),
            STATUS,
            TASK_FIELDS[0],
            TASK_FIELDS[1],
            TASK_FIELDS[2],
            TASK_FIELDS[3],
            TASK_FIELDS[4],
            TASK_FIELDS[5],
        ],
    },
];

impl ToolSpec {
    fn definition(&self) -> ToolDefinition {
        let mut properties = Map::new();
        let mut required = Vec::new();
        for param in self.params {
            properties.insert(param.name.to_string(), param_schema(param));
            if param.required {
                required.push(param.name);
            }
        }

        let mut schema = json!({
            "type": "object",
            "properties": properties,
        });
        if !required.is_empty() {
            schema["required"] = json!(required);
        }

        ToolDefinition {
            name: self.name.to_string(),
            description: self.description.to_string(),
            input_schema: schema,
        }
    }

    fn check(&self, arguments: Value) -> Result<Map<String, Value>, ToolError> {
        let invalid = |message: String| ToolError::InvalidArguments {
            tool: self.name,
            message,
        };

        let mut object = match arguments {
            Value::Object(object) => object,
            Value::Null => Map::new(),
            other => {
                return Err(invalid(format!(
                    "arguments must be an object, got {}",
                    json_type(&other)
                )))
            }
        };

        for param in self.params {
            match object.get(param.name) {
                None | Some(Value::Null) if param.required => {
                    return Err(invalid(format!("missing required field '{}'", param.name)));
                }
                None => {}
                // An unused optional field sent as null counts as absent.
                Some(Value::Null) if param.kind.null_is_absent() => {
                    object.remove(param.name);
                }
                Some(value) => check_value(param, value).map_err(invalid)?,
            }
        }
        Ok(object)
    }
}

fn param_schema(param: &Param) -> Value {
    match param.kind {
        ParamKind::String => json!({ "type": "string", "description": param.description }),
        ParamKind::NullableString => {
            json!({ "type": ["string", "null"], "description": param.description })
        }
        ParamKind::Status => json!({
            "type": "string",
            "enum": accepted_status_labels(),
            "description": param.description,
        }),
        ParamKind::Checklist => json!({
            "type": ["array", "null"],
            "description": param.description,
            "items": {
                "type": "object",
                "required": ["description"],
                "properties": {
                    "description": { "type": "string" },
                    "completed": { "type": "boolean" }
                }
            }
        }),
    }
}

fn check_value(param: &Param, value: &Value) -> Result<(), String> {
    match (param.kind, value) {
        (ParamKind::String, Value::String(_)) => Ok(()),
        (ParamKind::NullableString, Value::String(_) | Value::Null) => Ok(()),
        (ParamKind::Status, Value::String(raw)) => {
            if accepted_status_labels().contains(&raw.as_str()) {
                Ok(())
            } else {
                Err(format!(
                    "field 'status' must be one of {}, got '{raw}'",
                    Status::labels().join(", ")
                ))
            }
        }
        (ParamKind::Checklist, Value::Null) => Ok(()),
        (ParamKind::Checklist, Value::Array(items)) => {
            for (idx, item) in items.iter().enumerate() {
                let valid = item
                    .get("description")
                    .map(Value::is_string)
                    .unwrap_or(false)
                    && item
                        .get("completed")
                        .map_or(true, |done| done.is_boolean());
                if !valid {
                    return Err(format!(
                        "checklist item {idx} must have a string 'description' and optional boolean 'completed'"
                    ));
                }
            }
            Ok(())
        }
        (kind, other) => Err(format!(
            "field '{}' must be {}, got {}",
            param.name,
            expected_type(kind),
            json_type(other)
        )),
    }
}

/// Output labels plus the `pending` input alias for `created`.
fn accepted_status_labels() -> Vec<&'static str> {
    let mut labels = Status::labels();
    labels.push("pending");
    labels
}

fn expected_type(kind: ParamKind) -> &'static str {
    match kind {
        ParamKind::String | ParamKind::Status => "a string",
        ParamKind::NullableString => "a string or null",
        ParamKind::Checklist => "an array or null",
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn take_id(args: &mut Map<String, Value>) -> String {
    match args.remove("id") {
        Some(Value::String(id)) => id,
        _ => String::new(),
    }
}

fn optional_status(args: &Map<String, Value>) -> Option<Status> {
    args.get("status")
        .and_then(Value::as_str)
        .and_then(|raw| raw.parse().ok())
}

fn decode<T: serde::de::DeserializeOwned>(
    tool: &'static str,
    args: Map<String, Value>,
) -> Result<T, ToolError> {
    from_value(Value::Object(args)).map_err(|err: ModelError| ToolError::InvalidArguments {
        tool,
        message: err.to_string(),
    })
}

/// Story and task tools backed by a [`TaskService`].
#[derive(Debug, Clone)]
pub struct TaskTools {
    service: TaskService,
}

impl TaskTools {
    pub fn new(service: TaskService) -> Self {
        Self { service }
    }

    pub fn names() -> Vec<&'static str> {
        TOOLS.iter().map(|tool| tool.name).collect()
    }

    pub fn definitions(&self) -> Vec<ToolDefinition> {
        TOOLS.iter().map(ToolSpec::definition).collect()
    }

    /// Validate `arguments` against the tool's schema, run it and return the
    /// result as JSON.
    pub async fn call(&self, name: &str, arguments: Value) -> Result<Value, ToolError> {
        let spec = TOOLS
            .iter()
            .find(|tool| tool.name == name)
            .ok_or_else(|| ToolError::UnknownTool {
                name: name.to_string(),
            })?;
        let mut args = spec.check(arguments)?;
        tracing::debug!(tool = spec.name, "tool call");

        let result = match spec.name {
            "list_stories" => {
                serde_json::to_value(self.service.list_stories(optional_status(&args)).await?)?
            }
            "get_story" => {
                let id = StoryId(take_id(&mut args));
                serde_json::to_value(self.service.get_story(&id).await?)?
            }
            "create_story" => {
                let draft: StoryDraft = decode(spec.name, args)?;
                serde_json::to_value(self.service.create_story(draft).await?)?
            }
            "update_story" => {
                let id = StoryId(take_id(&mut args));
                let patch: StoryPatch = decode(spec.name, args)?;
                serde_json::to_value(self.service.update_story(&id, patch).await?)?
            }
            "list_tasks" => {
                let filter = TaskFilter {
                    status: optional_status(&args),
                    story_id: args
                        .get("story_id")
                        .and_then(Value::as_str)
                        .map(StoryId::new),
                };
                serde_json::to_value(self.service.list_tasks(&filter).await?)?
            }
            "get_task" => {
                let id = TaskId(take_id(&mut args));
                serde_json::to_value(self.service.get_task(&id).await?)?
            }
            "create_task" => {
                let draft: TaskDraft = decode(spec.name, args)?;
                serde_json::to_value(self.service.create_task(draft).await?)?
            }
            "update_task" => {
                let id = TaskId(take_id(&mut args));
                let patch: TaskPatch = decode(spec.name, args)?;
                serde_json::to_value(self.service.update_task(&id, patch).await?)?
            }
            other => {
                return Err(ToolError::UnknownTool {
                    name: other.to_string(),
                })
            }
        };
        Ok(result)
    }
}
