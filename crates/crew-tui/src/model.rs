use std::collections::{HashSet, VecDeque};

use crew_core::{sort_by_priority, Status, Story, StoryId, Task, TaskId};

const MAX_CHAT_LINES: usize = 1_000;

pub fn status_icon(status: Status) -> &'static str {
    match status {
        Status::Created => "○",
        Status::Planning => "◎",
        Status::Ready => "●",
        Status::InProgress => "▸",
        Status::Completed => "✓",
    }
}

/// One visible line of the task tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TreeRow {
    Story {
        story: Story,
        collapsed: bool,
        done: usize,
        total: usize,
    },
    UnassignedHeader {
        count: usize,
    },
    Task {
        task: Task,
        nested: bool,
    },
}

/// Identity of a row that survives a refresh.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RowKey {
    Story(StoryId),
    Unassigned,
    Task(TaskId),
}

impl TreeRow {
    pub fn key(&self) -> RowKey {
        match self {
            TreeRow::Story { story, .. } => RowKey::Story(story.id.clone()),
            TreeRow::UnassignedHeader { .. } => RowKey::Unassigned,
            TreeRow::Task { task, .. } => RowKey::Task(task.id.clone()),
        }
    }
}

/// Stories with their tasks, flattened into rows for display.
///
/// Tasks whose `story_id` names no known story are listed as unassigned so
/// they stay reachable.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskTree {
    stories: Vec<Story>,
    tasks: Vec<Task>,
    collapsed: HashSet<StoryId>,
    rows: Vec<TreeRow>,
    selected: usize,
}

impl TaskTree {
    pub fn new(stories: Vec<Story>, tasks: Vec<Task>) -> Self {
        let mut tree = Self::default();
        tree.replace(stories, tasks);
        tree
    }

    /// Swap in fresh data, keeping the selected row when it still exists.
    pub fn replace(&mut self, mut stories: Vec<Story>, mut tasks: Vec<Task>) {
        let previous = self.selected_row().map(TreeRow::key);
        sort_by_priority(&mut stories);
        sort_by_priority(&mut tasks);
        self.collapsed
            .retain(|id| stories.iter().any(|story| &story.id == id));
        self.stories = stories;
        self.tasks = tasks;
        self.rebuild(previous);
    }

    pub fn rows(&self) -> &[TreeRow] {
        &self.rows
    }

    pub fn stories(&self) -> &[Story] {
        &self.stories
    }

    pub fn selected_index(&self) -> usize {
        self.selected
    }

    pub fn selected_row(&self) -> Option<&TreeRow> {
        self.rows.get(self.selected)
    }

    pub fn selected_task(&self) -> Option<&Task> {
        match self.selected_row()? {
            TreeRow::Task { task, .. } => Some(task),
            _ => None,
        }
    }

    pub fn select_next(&mut self) {
        if self.rows.is_empty() {
            return;
        }
        self.selected = (self.selected + 1) % self.rows.len();
    }

    pub fn select_previous(&mut self) {
        if self.rows.is_empty() {
            return;
        }
        self.selected = if self.selected == 0 {
            self.rows.len() - 1
        } else {
            self.selected - 1
        };
    }

    /// Collapse or expand the selected story. Returns false on other rows.
    pub fn toggle_selected(&mut self) -> bool {
        let Some(TreeRow::Story { story, .. }) = self.selected_row() else {
            return false;
        };
        let id = story.id.clone();
        if !self.collapsed.remove(&id) {
            self.collapsed.insert(id.clone());
        }
        self.rebuild(Some(RowKey::Story(id)));
        true
    }

    fn rebuild(&mut self, keep: Option<RowKey>) {
        let mut rows = Vec::with_capacity(self.stories.len() + self.tasks.len() + 1);
        for story in &self.stories {
            let children: Vec<&Task> = self
                .tasks
                .iter()
                .filter(|task| task.story_id.as_ref() == Some(&story.id))
                .collect();
            let collapsed = self.collapsed.contains(&story.id);
            rows.push(TreeRow::Story {
                story: story.clone(),
                collapsed,
                done: children
                    .iter()
                    .filter(|task| task.status == Status::Completed)
                    .count(),
                total: children.len(),
            });
            if !collapsed {
                rows.extend(children.into_iter().map(|task| TreeRow::Task {
                    task: task.clone(),
                    nested: true,
                }));
            }
        }

        let unassigned: Vec<&Task> = self
            .tasks
            .iter()
            .filter(|task| match &task.story_id {
                None => true,
                Some(id) => !self.stories.iter().any(|story| &story.id == id),
            })
            .collect();
        if !unassigned.is_empty() {
            rows.push(TreeRow::UnassignedHeader {
                count: unassigned.len(),
            });
            rows.extend(unassigned.into_iter().map(|task| TreeRow::Task {
                task: task.clone(),
                nested: false,
            }));
        }

        self.rows = rows;
        self.selected = keep
            .and_then(|key| self.rows.iter().position(|row| row.key() == key))
            .unwrap_or_else(|| self.selected.min(self.rows.len().saturating_sub(1)));
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatLineKind {
    You,
    Agent,
    Warning,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatLine {
    pub kind: ChatLineKind,
    pub text: String,
}

/// Conversation transcript plus the input line.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChatLog {
    lines: VecDeque<ChatLine>,
    pub input: String,
    /// Deltas arrived for the reply in progress.
    streaming: bool,
    pub busy: bool,
}

impl ChatLog {
    pub fn lines(&self) -> impl Iterator<Item = &ChatLine> {
        self.lines.iter()
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn push_user(&mut self, text: &str) {
        self.push(ChatLineKind::You, format!("You: {text}"));
    }

    pub fn push_delta(&mut self, text: &str) {
        self.streaming = true;
        for line in text.lines() {
            self.push(ChatLineKind::Agent, line.to_string());
        }
    }

    /// A finished reply is only shown when nothing was streamed for it.
    pub fn finish_reply(&mut self, text: &str) {
        if !self.streaming {
            for line in text.lines() {
                self.push(ChatLineKind::Agent, line.to_string());
            }
        }
        self.streaming = false;
    }

    /// Output from a dispatched task, tagged with its id prefix.
    pub fn push_dispatch_output(&mut self, task_id: &TaskId, text: &str) {
        let tag: String = task_id.0.chars().take(8).collect();
        for line in text.lines() {
            self.push(ChatLineKind::Agent, format!("[{tag}] {line}"));
        }
    }

    pub fn push_warning(&mut self, text: impl Into<String>) {
        self.streaming = false;
        self.push(ChatLineKind::Warning, text.into());
    }

    fn push(&mut self, kind: ChatLineKind, text: String) {
        self.lines.push_back(ChatLine { kind, text });
        while self.lines.len() > MAX_CHAT_LINES {
            self.lines.pop_front();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn story(id: &str, name: &str, status: Status) -> Story {
        Story::new(name, "").with_id(StoryId::new(id)).with_status(status)
    }

    fn task(id: &str, name: &str, status: Status, story: Option<&str>) -> Task {
        let task = Task::new(name, "").with_id(TaskId::new(id)).with_status(status);
        match story {
            Some(story) => task.with_story(StoryId::new(story)),
            None => task,
        }
    }

    fn names(tree: &TaskTree) -> Vec<String> {
        tree.rows()
            .iter()
            .map(|row| match row {
                TreeRow::Story { story, .. } => format!("S:{}", story.name),
                TreeRow::UnassignedHeader { count } => format!("U:{count}"),
                TreeRow::Task { task, .. } => format!("T:{}", task.name),
            })
            .collect()
    }

    fn sample() -> TaskTree {
        TaskTree::new(
            vec![
                story("S2", "Billing", Status::Completed),
                story("S1", "Auth", Status::Ready),
            ],
            vec![
                task("T1", "Session", Status::Completed, Some("S1")),
                task("T2", "Login form", Status::Created, Some("S1")),
                task("T3", "Docs", Status::Ready, None),
                task("T4", "Orphan", Status::Created, Some("gone")),
            ],
        )
    }

    #[test]
    fn stories_sorted_with_tasks_then_unassigned_section() {
        let tree = sample();
        assert_eq!(
            names(&tree),
            vec![
                "S:Auth",
                "T:Login form",
                "T:Session",
                "S:Billing",
                "U:2",
                "T:Orphan",
                "T:Docs",
            ]
        );
        let TreeRow::Story { done, total, .. } = &tree.rows()[0] else {
            panic!("expected story row");
        };
        assert_eq!((*done, *total), (1, 2));
    }

    #[test]
    fn selection_wraps_in_both_directions() {
        let mut tree = sample();
        tree.select_previous();
        assert_eq!(tree.selected_index(), tree.rows().len() - 1);
        tree.select_next();
        assert_eq!(tree.selected_index(), 0);

        let mut empty = TaskTree::default();
        empty.select_next();
        empty.select_previous();
        assert_eq!(empty.selected_index(), 0);
        assert!(empty.selected_row().is_none());
    }

    #[test]
    fn collapsing_a_story_hides_its_tasks() {
        let mut tree = sample();
        assert!(tree.toggle_selected());
        assert_eq!(names(&tree)[..2], ["S:Auth".to_string(), "S:Billing".to_string()]);
        assert!(matches!(
            tree.selected_row(),
            Some(TreeRow::Story { collapsed: true, .. })
        ));

        assert!(tree.toggle_selected());
        assert_eq!(names(&tree)[1], "T:Login form");

        tree.select_next();
        assert!(!tree.toggle_selected());
    }

    #[test]
    fn refresh_keeps_selection_on_the_same_entity() {
        let mut tree = sample();
        tree.select_next();
        assert_eq!(
            tree.selected_task().map(|task| task.id.clone()),
            Some(TaskId::new("T2"))
        );

        tree.replace(
            vec![story("S1", "Auth", Status::Ready)],
            vec![
                task("T0", "Audit", Status::Created, Some("S1")),
                task("T2", "Login form", Status::Created, Some("S1")),
            ],
        );
        assert_eq!(
            tree.selected_task().map(|task| task.id.clone()),
            Some(TaskId::new("T2"))
        );

        tree.replace(Vec::new(), Vec::new());
        assert_eq!(tree.selected_index(), 0);
        assert!(tree.rows().is_empty());
    }

    #[test]
    fn status_icons_cover_every_status() {
        let icons: Vec<&str> = Status::ALL.iter().map(|status| status_icon(*status)).collect();
        assert_eq!(icons, vec!["○", "◎", "●", "▸", "✓"]);
    }

    #[test]
    fn streamed_replies_are_not_repeated() {
        let mut chat = ChatLog::default();
        chat.push_user("plan auth");
        chat.push_delta("first line\nsecond line");
        chat.finish_reply("first line\nsecond line");
        chat.finish_reply("direct reply");
        chat.push_warning("agent did not respond within 30s");

        let lines: Vec<(ChatLineKind, String)> = chat
            .lines()
            .map(|line| (line.kind, line.text.clone()))
            .collect();
        assert_eq!(
            lines,
            vec![
                (ChatLineKind::You, "You: plan auth".to_string()),
                (ChatLineKind::Agent, "first line".to_string()),
                (ChatLineKind::Agent, "second line".to_string()),
                (ChatLineKind::Agent, "direct reply".to_string()),
                (
                    ChatLineKind::Warning,
                    "agent did not respond within 30s".to_string()
                ),
            ]
        );
    }
}
