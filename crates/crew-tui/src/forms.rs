//! Story and task edit forms.
//!
//! A form collects text input and converts it into a draft (create) or a
//! patch (edit). Validation happens in the service; the form only carries
//! the inline error it reports back.

use crew_core::{
    ChecklistItem, Status, Story, StoryDraft, StoryId, StoryPatch, Task, TaskDraft, TaskId,
    TaskPatch,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKey {
    Name,
    Description,
    Status,
    Story,
    Agent,
    RepositoryName,
    RepositoryUrl,
    Branch,
    Checklist,
}

impl FieldKey {
    pub fn label(self) -> &'static str {
        match self {
            FieldKey::Name => "Name",
            FieldKey::Description => "Description",
            FieldKey::Status => "Status",
            FieldKey::Story => "Story",
            FieldKey::Agent => "Agent",
            FieldKey::RepositoryName => "Repository",
            FieldKey::RepositoryUrl => "Repository URL",
            FieldKey::Branch => "Branch",
            FieldKey::Checklist => "Checklist",
        }
    }
}

const STORY_FIELDS: [FieldKey; 3] = [FieldKey::Name, FieldKey::Description, FieldKey::Status];
const TASK_FIELDS: [FieldKey; 9] = [
    FieldKey::Name,
    FieldKey::Description,
    FieldKey::Status,
    FieldKey::Story,
    FieldKey::Agent,
    FieldKey::RepositoryName,
    FieldKey::RepositoryUrl,
    FieldKey::Branch,
    FieldKey::Checklist,
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormTarget {
    NewStory,
    EditStory(StoryId),
    NewTask,
    EditTask(TaskId),
}

/// What a submitted form asks the service to do.
#[derive(Debug, Clone, PartialEq)]
pub enum FormSubmission {
    CreateStory(StoryDraft),
    UpdateStory(StoryId, StoryPatch),
    CreateTask(TaskDraft),
    UpdateTask(TaskId, TaskPatch),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Form {
    pub target: FormTarget,
    pub name: String,
    pub description: String,
    pub status: Status,
    pub story_id: Option<StoryId>,
    pub agent: String,
    pub repository_name: String,
    pub repository_url: String,
    pub branch: String,
    /// Items separated by `;`, completed ones prefixed with `[x]`.
    pub checklist: String,
    /// Stories the task can be linked to, in display order.
    pub story_choices: Vec<(StoryId, String)>,
    pub focus: usize,
    pub error: Option<String>,
    pub saving: bool,
}

impl Form {
    fn blank(target: FormTarget) -> Self {
        Self {
            target,
            name: String::new(),
            description: String::new(),
            status: Status::Created,
            story_id: None,
            agent: String::new(),
            repository_name: String::new(),
            repository_url: String::new(),
            branch: String::new(),
            checklist: String::new(),
            story_choices: Vec::new(),
            focus: 0,
            error: None,
            saving: false,
        }
    }

    pub fn new_story() -> Self {
        Self::blank(FormTarget::NewStory)
    }

    pub fn edit_story(story: &Story) -> Self {
        Self {
            name: story.name.clone(),
            description: story.description.clone(),
            status: story.status,
            ..Self::blank(FormTarget::EditStory(story.id.clone()))
        }
    }

    /// New task, preselecting `story_id` when the cursor is inside a story.
    pub fn new_task(stories: &[Story], story_id: Option<StoryId>) -> Self {
        Self {
            story_id,
            story_choices: story_choices(stories),
            ..Self::blank(FormTarget::NewTask)
        }
    }

    pub fn edit_task(task: &Task, stories: &[Story]) -> Self {
        Self {
            name: task.name.clone(),
            description: task.description.clone(),
            status: task.status,
            story_id: task.story_id.clone(),
            agent: task.agent.clone().unwrap_or_default(),
            repository_name: task.repository_name.clone().unwrap_or_default(),
            repository_url: task.repository_url.clone().unwrap_or_default(),
            branch: task.branch_name.clone().unwrap_or_default(),
            checklist: format_checklist(&task.checklist),
            story_choices: story_choices(stories),
            ..Self::blank(FormTarget::EditTask(task.id.clone()))
        }
    }

    pub fn title(&self) -> &'static str {
        match self.target {
            FormTarget::NewStory => "New story",
            FormTarget::EditStory(_) => "Edit story",
            FormTarget::NewTask => "New task",
            FormTarget::EditTask(_) => "Edit task",
        }
    }

    pub fn fields(&self) -> &'static [FieldKey] {
        match self.target {
            FormTarget::NewStory | FormTarget::EditStory(_) => &STORY_FIELDS,
            FormTarget::NewTask | FormTarget::EditTask(_) => &TASK_FIELDS,
        }
    }

    pub fn focused(&self) -> FieldKey {
        let fields = self.fields();
        fields[self.focus.min(fields.len() - 1)]
    }

    pub fn focus_next(&mut self) {
        self.focus = (self.focus + 1) % self.fields().len();
    }

    pub fn focus_previous(&mut self) {
        let len = self.fields().len();
        self.focus = (self.focus + len - 1) % len;
    }

    /// Text shown for `key`.
    pub fn display_value(&self, key: FieldKey) -> String {
        match key {
            FieldKey::Status => self.status.to_string(),
            FieldKey::Story => match &self.story_id {
                None => "(none)".to_string(),
                Some(id) => self
                    .story_choices
                    .iter()
                    .find(|(choice, _)| choice == id)
                    .map(|(_, name)| name.clone())
                    .unwrap_or_else(|| id.to_string()),
            },
            other => self.text(other).map(String::clone).unwrap_or_default(),
        }
    }

    fn text(&self, key: FieldKey) -> Option<&String> {
        match key {
            FieldKey::Name => Some(&self.name),
            FieldKey::Description => Some(&self.description),
            FieldKey::Agent => Some(&self.agent),
            FieldKey::RepositoryName => Some(&self.repository_name),
            FieldKey::RepositoryUrl => Some(&self.repository_url),
            FieldKey::Branch => Some(&self.branch),
            FieldKey::Checklist => Some(&self.checklist),
            FieldKey::Status | FieldKey::Story => None,
        }
    }

    fn text_mut(&mut self, key: FieldKey) -> Option<&mut String> {
        match key {
            FieldKey::Name => Some(&mut self.name),
            FieldKey::Description => Some(&mut self.description),
            FieldKey::Agent => Some(&mut self.agent),
            FieldKey::RepositoryName => Some(&mut self.repository_name),
            FieldKey::RepositoryUrl => Some(&mut self.repository_url),
            FieldKey::Branch => Some(&mut self.branch),
            FieldKey::Checklist => Some(&mut self.checklist),
            FieldKey::Status | FieldKey::Story => None,
        }
    }

    pub fn insert_char(&mut self, ch: char) {
        let key = self.focused();
        match key {
            FieldKey::Status | FieldKey::Story if ch == ' ' => self.cycle(true),
            _ => {
                if let Some(text) = self.text_mut(key) {
                    text.push(ch);
                }
            }
        }
    }

    pub fn backspace(&mut self) {
        let key = self.focused();
        if let Some(text) = self.text_mut(key) {
            text.pop();
        }
    }

    /// Cycle the focused choice field. No-op on text fields.
    pub fn cycle(&mut self, forward: bool) {
        match self.focused() {
            FieldKey::Status => {
                self.status = if forward {
                    self.status.cycle_next()
                } else {
                    self.status.cycle_previous()
                };
            }
            FieldKey::Story => self.cycle_story(forward),
            _ => {}
        }
    }

    fn cycle_story(&mut self, forward: bool) {
        // Position 0 is "no story", then each choice in order.
        let slots = self.story_choices.len() + 1;
        let current = match &self.story_id {
            None => 0,
            Some(id) => self
                .story_choices
                .iter()
                .position(|(choice, _)| choice == id)
                .map_or(0, |idx| idx + 1),
        };
        let next = if forward {
            (current + 1) % slots
        } else {
            (current + slots - 1) % slots
        };
        self.story_id = match next {
            0 => None,
            idx => Some(self.story_choices[idx - 1].0.clone()),
        };
    }

    pub fn submission(&self) -> FormSubmission {
        match &self.target {
            FormTarget::NewStory => {
                let mut draft = StoryDraft::new(self.name.trim(), self.description.trim());
                draft.status = Some(self.status);
                FormSubmission::CreateStory(draft)
            }
            FormTarget::EditStory(id) => FormSubmission::UpdateStory(
                id.clone(),
                StoryPatch {
                    name: Some(self.name.trim().to_string()),
                    description: Some(self.description.trim().to_string()),
                    status: Some(self.status),
                },
            ),
            FormTarget::NewTask => {
                let mut draft = TaskDraft::new(self.name.trim(), self.description.trim());
                draft.status = Some(self.status);
                draft.story_id = self.story_id.clone();
                draft.agent = non_empty(&self.agent);
                draft.repository_name = non_empty(&self.repository_name);
                draft.repository_url = non_empty(&self.repository_url);
                draft.branch_name = non_empty(&self.branch);
                draft.checklist = Some(parse_checklist(&self.checklist));
                FormSubmission::CreateTask(draft)
            }
            FormTarget::EditTask(id) => FormSubmission::UpdateTask(
                id.clone(),
                TaskPatch {
                    name: Some(self.name.trim().to_string()),
                    description: Some(self.description.trim().to_string()),
                    status: Some(self.status),
                    agent: Some(non_empty(&self.agent)),
                    repository_name: Some(non_empty(&self.repository_name)),
                    repository_url: Some(non_empty(&self.repository_url)),
                    branch_name: Some(non_empty(&self.branch)),
                    story_id: Some(self.story_id.clone()),
                    checklist: Some(Some(parse_checklist(&self.checklist))),
                },
            ),
        }
    }
}

fn story_choices(stories: &[Story]) -> Vec<(StoryId, String)> {
    stories
        .iter()
        .map(|story| (story.id.clone(), story.name.clone()))
        .collect()
}

fn non_empty(value: &str) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

pub fn format_checklist(items: &[ChecklistItem]) -> String {
    items
        .iter()
        .map(|item| {
            if item.completed {
                format!("[x] {}", item.description)
            } else {
                item.description.clone()
            }
        })
        .collect::<Vec<_>>()
        .join("; ")
}

pub fn parse_checklist(raw: &str) -> Vec<ChecklistItem> {
    raw.split(';')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(|item| match item.strip_prefix("[x]").or_else(|| item.strip_prefix("[X]")) {
            Some(rest) => ChecklistItem {
                description: rest.trim().to_string(),
                completed: true,
            },
            None => ChecklistItem::new(item),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checklist_text_round_trips_completion_marks() {
        let items = parse_checklist(" markup ; [x] styles;; [X] tests ");
        assert_eq!(
            items,
            vec![
                ChecklistItem::new("markup"),
                ChecklistItem {
                    description: "styles".to_string(),
                    completed: true
                },
                ChecklistItem {
                    description: "tests".to_string(),
                    completed: true
                },
            ]
        );
        assert_eq!(format_checklist(&items), "markup; [x] styles; [x] tests");
        assert!(parse_checklist("  ").is_empty());
    }

    #[test]
    fn focus_wraps_and_typing_edits_focused_text() {
        let mut form = Form::new_story();
        assert_eq!(form.focused(), FieldKey::Name);
        for ch in "Auth".chars() {
            form.insert_char(ch);
        }
        form.backspace();
        form.focus_previous();
        assert_eq!(form.focused(), FieldKey::Status);
        form.focus_next();
        assert_eq!(form.focused(), FieldKey::Name);
        assert_eq!(form.name, "Aut");
    }

    #[test]
    fn status_and_story_fields_cycle() {
        let stories = vec![
            Story::new("Auth", "").with_id(StoryId::new("S1")),
            Story::new("Billing", "").with_id(StoryId::new("S2")),
        ];
        let mut form = Form::new_task(&stories, None);
        form.focus = 2;
        form.insert_char(' ');
        assert_eq!(form.status, Status::Planning);
        form.cycle(false);
        form.cycle(false);
        assert_eq!(form.status, Status::Completed);

        form.focus_next();
        assert_eq!(form.focused(), FieldKey::Story);
        form.cycle(true);
        assert_eq!(form.display_value(FieldKey::Story), "Auth");
        form.cycle(true);
        form.cycle(true);
        assert_eq!(form.story_id, None);
        form.cycle(false);
        assert_eq!(form.story_id, Some(StoryId::new("S2")));
    }

    #[test]
    fn new_task_submission_builds_draft_without_empty_fields() {
        let mut form = Form::new_task(&[], Some(StoryId::new("S1")));
        form.name = " Login form ".to_string();
        form.description = "Email and password".to_string();
        form.repository_name = "api".to_string();
        form.checklist = "markup".to_string();

        let FormSubmission::CreateTask(draft) = form.submission() else {
            panic!("expected create");
        };
        assert_eq!(draft.name.as_deref(), Some("Login form"));
        assert_eq!(draft.story_id, Some(StoryId::new("S1")));
        assert_eq!(draft.repository_name.as_deref(), Some("api"));
        assert_eq!(draft.agent, None);
        assert_eq!(draft.checklist, Some(vec![ChecklistItem::new("markup")]));
    }

    #[test]
    fn edit_task_submission_clears_emptied_fields() {
        let task = Task::new("Deploy", "Ship it")
            .with_story(StoryId::new("S1"))
            .with_checklist(vec![ChecklistItem::new("tag")]);
        let mut form = Form::edit_task(
            &Task {
                agent: Some("coder".to_string()),
                ..task.clone()
            },
            &[],
        );
        assert_eq!(form.agent, "coder");
        assert_eq!(form.checklist, "tag");
        form.agent.clear();
        form.story_id = None;

        let FormSubmission::UpdateTask(id, patch) = form.submission() else {
            panic!("expected update");
        };
        assert_eq!(id, task.id);
        let mut updated = task.clone();
        patch.apply(&mut updated).expect("apply");
        assert_eq!(updated.agent, None);
        assert_eq!(updated.story_id, None);
        assert_eq!(updated.checklist, task.checklist);
        assert_eq!(updated.name, "Deploy");
    }

    #[test]
    fn edit_story_carries_current_values() {
        let story = Story::new("Auth", "Login flows").with_status(Status::Ready);
        let form = Form::edit_story(&story);
        assert_eq!(form.title(), "Edit story");
        assert_eq!(
            form.submission(),
            FormSubmission::UpdateStory(
                story.id.clone(),
                StoryPatch {
                    name: Some("Auth".to_string()),
                    description: Some("Login flows".to_string()),
                    status: Some(Status::Ready),
                }
            )
        );
    }
}
