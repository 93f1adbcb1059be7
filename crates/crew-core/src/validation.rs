//! Static checks over loaded settings.

use serde::{Deserialize, Serialize};

use crate::config::Settings;

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationLevel {
    Error,
    Warning,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationIssue {
    pub level: ValidationLevel,
    pub code: &'static str,
    pub message: String,
}

impl ValidationIssue {
    pub fn is_error(&self) -> bool {
        self.level == ValidationLevel::Error
    }
}

pub trait Validate {
    fn validate(&self) -> Vec<ValidationIssue>;
}

impl Validate for Settings {
    fn validate(&self) -> Vec<ValidationIssue> {
        let mut issues = Vec::new();

        if self.app_name.trim().is_empty() {
            issues.push(ValidationIssue {
                level: ValidationLevel::Warning,
                code: "app_name.empty",
                message: "app_name is empty".to_string(),
            });
        }

        if self.core.workdir.as_os_str().is_empty() {
            issues.push(ValidationIssue {
                level: ValidationLevel::Error,
                code: "core.workdir.empty",
                message: "workdir must not be empty".to_string(),
            });
        }

        for (name, url) in &self.core.repositories {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                issues.push(ValidationIssue {
                    level: ValidationLevel::Error,
                    code: "core.repositories.url.invalid",
                    message: format!("repository '{name}' URL should start with http:// or https://"),
                });
            }
        }

        if !LOG_LEVELS.contains(&self.logger.level.to_lowercase().as_str()) {
            issues.push(ValidationIssue {
                level: ValidationLevel::Warning,
                code: "logger.level.unknown",
                message: format!(
                    "unknown log level '{}'. valid values: {}",
                    self.logger.level,
                    LOG_LEVELS.join(", ")
                ),
            });
        }

        if self.agent.command.trim().is_empty() {
            issues.push(ValidationIssue {
                level: ValidationLevel::Error,
                code: "agent.command.empty",
                message: "agent command is empty; tasks cannot be dispatched".to_string(),
            });
        }

        if self.agent.dispatch_timeout_secs == 0 {
            issues.push(ValidationIssue {
                level: ValidationLevel::Error,
                code: "agent.dispatch_timeout.zero",
                message: "dispatch timeout cannot be 0".to_string(),
            });
        } else if self.agent.dispatch_timeout_secs < 30 {
            issues.push(ValidationIssue {
                level: ValidationLevel::Warning,
                code: "agent.dispatch_timeout.low",
                message: format!(
                    "dispatch timeout {}s is very low; agents may be cut off before finishing",
                    self.agent.dispatch_timeout_secs
                ),
            });
        }

        if self.agent.max_background_agents == 0 {
            issues.push(ValidationIssue {
                level: ValidationLevel::Error,
                code: "agent.max_background_agents.zero",
                message: "max_background_agents must be greater than zero".to_string(),
            });
        }

        issues
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn codes(settings: &Settings) -> Vec<&'static str> {
        settings.validate().into_iter().map(|issue| issue.code).collect()
    }

    #[test]
    fn default_settings_are_valid() {
        assert!(Settings::default().validate().is_empty());
    }

    #[test]
    fn reports_agent_problems() {
        let mut settings = Settings::default();
        settings.agent.command = "  ".to_string();
        settings.agent.dispatch_timeout_secs = 0;

        let issues = settings.validate();
        assert!(issues.iter().all(ValidationIssue::is_error));
        assert_eq!(
            codes(&settings),
            vec!["agent.command.empty", "agent.dispatch_timeout.zero"]
        );
    }

    #[test]
    fn low_timeout_is_only_a_warning() {
        let mut settings = Settings::default();
        settings.agent.dispatch_timeout_secs = 5;
        let issues = settings.validate();
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].level, ValidationLevel::Warning);
    }

    #[test]
    fn flags_non_http_repository_urls_and_unknown_log_level() {
        let mut settings = Settings::default();
        settings
            .core
            .repositories
            .insert("web".to_string(), "git@github.com:acme/web.git".to_string());
        settings.logger.level = "loud".to_string();

        assert_eq!(
            codes(&settings),
            vec!["core.repositories.url.invalid", "logger.level.unknown"]
        );
    }
}
