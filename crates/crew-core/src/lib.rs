pub mod chat_queue;
pub mod config;
pub mod error;
pub mod patch;
pub mod types;
pub mod validation;

pub use chat_queue::*;
pub use config::*;
pub use error::*;
pub use patch::*;
pub use types::*;
pub use validation::*;

#[cfg(test)]
mod tests {
    use super::{parse_settings, Status, Story, StoryDraft, Validate};

    #[test]
    fn crate_root_reexports_parse_and_validate_helpers() {
        let mut settings = parse_settings(
            r#"
[agent]
command = "copilot"
dispatch_timeout_secs = 120
"#,
        )
        .expect("parse settings");
        assert!(settings.validate().is_empty());

        settings.agent.max_background_agents = 0;
        assert!(settings
            .validate()
            .iter()
            .any(|issue| issue.code == "agent.max_background_agents.zero"));

        let story = Story::from_draft(StoryDraft::new("Auth", "")).expect("story");
        assert_eq!(story.status, Status::Created);
    }
}
