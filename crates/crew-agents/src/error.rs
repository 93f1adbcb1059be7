use std::path::PathBuf;

/// Why a session could not be opened or a prompt could not run.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AgentError {
    #[error("agent command is not configured")]
    MissingCommand,
    #[error("working directory {} does not exist", .path.display())]
    MissingWorkdir { path: PathBuf },
    #[error("prompt must not be empty")]
    EmptyPrompt,
    #[error("could not start agent '{command}': {message}")]
    Spawn { command: String, message: String },
    #[error("agent exited with {status}{}", stderr_suffix(.stderr))]
    Exited { status: String, stderr: String },
    #[error("agent output failed: {message}")]
    Output { message: String },
}

impl AgentError {
    /// The request itself was bad; retrying it unchanged will fail again.
    pub fn is_request_error(&self) -> bool {
        matches!(
            self,
            AgentError::MissingCommand
                | AgentError::MissingWorkdir { .. }
                | AgentError::EmptyPrompt
        )
    }
}

fn stderr_suffix(stderr: &str) -> String {
    if stderr.is_empty() {
        String::new()
    } else {
        format!(": {stderr}")
    }
}

#[cfg(test)]
mod tests {
    use super::AgentError;
    use std::path::PathBuf;

    #[test]
    fn exit_message_includes_stderr_only_when_present() {
        let err = AgentError::Exited {
            status: "exit status: 3".to_string(),
            stderr: "rate limited".to_string(),
        };
        assert_eq!(err.to_string(), "agent exited with exit status: 3: rate limited");

        let err = AgentError::Exited {
            status: "signal: 9".to_string(),
            stderr: String::new(),
        };
        assert_eq!(err.to_string(), "agent exited with signal: 9");
    }

    #[test]
    fn request_errors_are_distinguished_from_runtime_failures() {
        let missing = AgentError::MissingWorkdir {
            path: PathBuf::from("/nowhere"),
        };
        assert_eq!(missing.to_string(), "working directory /nowhere does not exist");
        assert!(missing.is_request_error());
        assert!(AgentError::EmptyPrompt.is_request_error());

        let spawn = AgentError::Spawn {
            command: "copilot".to_string(),
            message: "No such file or directory".to_string(),
        };
        assert_eq!(
            spawn.to_string(),
            "could not start agent 'copilot': No such file or directory"
        );
        assert!(!spawn.is_request_error());
    }
}
