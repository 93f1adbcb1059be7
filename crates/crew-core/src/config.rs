//! TOML settings for the `crew` workspace.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_CONFIG_FILE: &str = "crew.toml";
pub const DATABASE_FILE: &str = "crew.db";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file at {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("failed to serialize config at {path}: {source}")]
    Serialize {
        path: PathBuf,
        #[source]
        source: toml::ser::Error,
    },
    #[error("failed to create config parent directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write config file at {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub app_name: String,
    pub core: CoreSettings,
    pub logger: LoggerSettings,
    pub chat: ChatSettings,
    pub agent: AgentSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            app_name: "crew".to_string(),
            core: CoreSettings::default(),
            logger: LoggerSettings::default(),
            chat: ChatSettings::default(),
            agent: AgentSettings::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreSettings {
    /// Root for the database, logs, bare clones and worktrees.
    pub workdir: PathBuf,
    /// Repository name to clone URL.
    pub repositories: BTreeMap<String, String>,
}

impl Default for CoreSettings {
    fn default() -> Self {
        Self {
            workdir: PathBuf::from(".crew"),
            repositories: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggerSettings {
    pub level: String,
}

impl Default for LoggerSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatSettings {
    pub default_model: String,
}

impl Default for ChatSettings {
    fn default() -> Self {
        Self {
            default_model: "auto".to_string(),
        }
    }
}

/// External agent CLI. The prompt is passed as the final argument.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentSettings {
    pub command: String,
    pub args: Vec<String>,
    pub dispatch_timeout_secs: u64,
    pub max_background_agents: usize,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            command: "copilot".to_string(),
            args: vec!["--allow-all-tools".to_string(), "-p".to_string()],
            dispatch_timeout_secs: 600,
            max_background_agents: 2,
        }
    }
}

impl Settings {
    pub fn database_path(&self) -> PathBuf {
        self.core.workdir.join(DATABASE_FILE)
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.core.workdir.join("logs")
    }

    pub fn repositories_dir(&self) -> PathBuf {
        self.core.workdir.join("repositories")
    }

    pub fn worktrees_dir(&self) -> PathBuf {
        self.core.workdir.join("worktrees")
    }

    /// Clone URL configured for a repository name.
    pub fn repository_url(&self, name: &str) -> Option<&str> {
        self.core.repositories.get(name).map(String::as_str)
    }
}

pub fn parse_settings(contents: &str) -> Result<Settings, toml::de::Error> {
    toml::from_str(contents)
}

/// Load settings from `path`. A missing file yields the defaults.
pub fn load_settings(path: impl AsRef<Path>) -> Result<Settings, ConfigError> {
    let path_ref = path.as_ref();
    let body = match fs::read_to_string(path_ref) {
        Ok(body) => body,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            return Ok(Settings::default());
        }
        Err(source) => {
            return Err(ConfigError::Read {
                path: path_ref.to_path_buf(),
                source,
            })
        }
    };
    parse_settings(&body).map_err(|source| ConfigError::Parse {
        path: path_ref.to_path_buf(),
        source,
    })
}

pub fn save_settings(path: impl AsRef<Path>, settings: &Settings) -> Result<(), ConfigError> {
    let path_ref = path.as_ref();
    if let Some(parent_dir) = path_ref.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent_dir).map_err(|source| ConfigError::CreateDir {
            path: parent_dir.to_path_buf(),
            source,
        })?;
    }

    let body = toml::to_string_pretty(settings).map_err(|source| ConfigError::Serialize {
        path: path_ref.to_path_buf(),
        source,
    })?;
    fs::write(path_ref, body).map_err(|source| ConfigError::Write {
        path: path_ref.to_path_buf(),
        source,
    })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_partial_settings_and_fills_defaults() {
        let settings = parse_settings(
            r#"
app_name = "team"

[core]
workdir = "/tmp/crew-work"

[core.repositories]
web = "https://github.com/acme/web.git"

[agent]
dispatch_timeout_secs = 30
"#,
        )
        .expect("parse settings");

        assert_eq!(settings.app_name, "team");
        assert_eq!(settings.core.workdir, PathBuf::from("/tmp/crew-work"));
        assert_eq!(
            settings.repository_url("web"),
            Some("https://github.com/acme/web.git")
        );
        assert_eq!(settings.agent.dispatch_timeout_secs, 30);
        assert_eq!(settings.agent.command, "copilot");
        assert_eq!(settings.logger.level, "info");
        assert_eq!(settings.chat.default_model, "auto");
        assert_eq!(
            settings.database_path(),
            PathBuf::from("/tmp/crew-work/crew.db")
        );
    }

    #[test]
    fn missing_file_loads_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let settings = load_settings(dir.path().join("absent.toml")).expect("load");
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn save_then_load_preserves_settings() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("nested").join(DEFAULT_CONFIG_FILE);

        let mut settings = Settings::default();
        settings
            .core
            .repositories
            .insert("api".to_string(), "https://example.com/api.git".to_string());
        settings.logger.level = "debug".to_string();

        save_settings(&path, &settings).expect("save");
        let loaded = load_settings(&path).expect("load");
        assert_eq!(loaded, settings);
    }

    #[test]
    fn malformed_file_reports_parse_error_with_path() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join(DEFAULT_CONFIG_FILE);
        fs::write(&path, "[agent\ncommand = ").expect("write");

        let err = load_settings(&path).expect_err("should fail");
        assert!(matches!(err, ConfigError::Parse { path: ref p, .. } if p == &path));
    }
}
