use std::path::PathBuf;

/// Parameters for opening an agent session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    pub working_directory: PathBuf,
    /// `None` or `"auto"` lets the agent pick.
    pub model: Option<String>,
    pub system_prompt: Option<String>,
}

impl SessionConfig {
    pub fn new(working_directory: impl Into<PathBuf>) -> Self {
        Self {
            working_directory: working_directory.into(),
            model: None,
            system_prompt: None,
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    /// The model to request explicitly, if any.
    pub fn explicit_model(&self) -> Option<&str> {
        self.model
            .as_deref()
            .map(str::trim)
            .filter(|model| !model.is_empty() && !model.eq_ignore_ascii_case("auto"))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// A chunk of streamed assistant text.
    MessageDelta { text: String },
    /// The full assistant message for the last prompt.
    MessageComplete { text: String },
    /// The session finished handling the last prompt.
    Idle,
    Error { message: String },
}
