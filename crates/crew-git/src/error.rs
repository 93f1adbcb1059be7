use std::path::PathBuf;
use std::string::FromUtf8Error;

#[derive(Debug, thiserror::Error)]
pub enum GitError {
    #[error("could not run `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },
    #[error("`{command}` exited with {}: {stderr}", exit_code(.code))]
    Failed {
        command: String,
        code: Option<i32>,
        stderr: String,
    },
    #[error("`{command}` printed non-UTF-8 output: {source}")]
    Utf8 {
        command: String,
        #[source]
        source: FromUtf8Error,
    },
    #[error("failed to create directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid branch name '{branch}'")]
    InvalidBranch { branch: String },
    #[error("repository at {path} has no remote branches to start '{branch}' from")]
    NoRemoteBranches { path: PathBuf, branch: String },
}

impl GitError {
    /// Git ran and said no, as opposed to not running at all.
    pub fn is_exit_failure(&self) -> bool {
        matches!(self, GitError::Failed { .. })
    }
}

fn exit_code(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("code {code}"),
        None => "a signal".to_string(),
    }
}
