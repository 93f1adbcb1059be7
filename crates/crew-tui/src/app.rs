use std::collections::VecDeque;

use crossterm::event::{KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crew_core::{Settings, Validate};
use crewd::{ChatEvent, DispatchEvent};

use crate::action::{map_global_key, map_key_to_command, AppAction, UiCommand, View};
use crate::event::TuiEvent;
use crate::forms::Form;
use crate::model::{ChatLog, TaskTree, TreeRow};
use crate::notifications::{NotificationLevel, Notifications};

#[derive(Debug, Clone)]
pub struct TuiApp {
    pub view: View,
    pub tree: TaskTree,
    pub chat: ChatLog,
    pub form: Option<Form>,
    pub notifications: Notifications,
    pub status_line: String,
    /// Rendered settings and their validation issues.
    pub settings_lines: Vec<String>,
    pub should_quit: bool,
    interrupt_armed: bool,
    action_queue: VecDeque<AppAction>,
}

impl Default for TuiApp {
    fn default() -> Self {
        Self {
            view: View::Tasks,
            tree: TaskTree::default(),
            chat: ChatLog::default(),
            form: None,
            notifications: Notifications::default(),
            status_line: "ready".to_string(),
            settings_lines: Vec::new(),
            should_quit: false,
            interrupt_armed: false,
            action_queue: VecDeque::new(),
        }
    }
}

impl TuiApp {
    pub fn with_settings(settings: &Settings) -> Self {
        let mut lines: Vec<String> = match toml::to_string_pretty(settings) {
            Ok(body) => body.lines().map(str::to_string).collect(),
            Err(err) => vec![format!("settings could not be rendered: {err}")],
        };
        let issues = settings.validate();
        if !issues.is_empty() {
            lines.push(String::new());
            lines.extend(issues.iter().map(|issue| {
                let level = if issue.is_error() { "error" } else { "warning" };
                format!("{level}: {} ({})", issue.message, issue.code)
            }));
        }
        Self {
            settings_lines: lines,
            ..Self::default()
        }
    }

    pub fn push_action(&mut self, action: AppAction) {
        tracing::debug!(action = action.label(), "queued ui action");
        self.action_queue.push_back(action);
    }

    pub fn drain_actions(&mut self) -> Vec<AppAction> {
        self.action_queue.drain(..).collect()
    }

    pub fn handle_key_event(&mut self, key: KeyEvent) {
        if key.kind != KeyEventKind::Press {
            return;
        }

        match map_global_key(key) {
            Some(UiCommand::Quit) => {
                self.should_quit = true;
                return;
            }
            Some(UiCommand::Interrupt) => {
                if self.interrupt_armed {
                    self.should_quit = true;
                } else {
                    self.interrupt_armed = true;
                    self.status_line = "press Ctrl+C again to quit".to_string();
                }
                return;
            }
            _ => self.interrupt_armed = false,
        }

        if self.form.is_some() {
            self.handle_form_key(key);
            return;
        }
        if self.view == View::Chat {
            self.handle_chat_key(key);
            return;
        }

        let Some(command) = map_key_to_command(key) else {
            return;
        };
        match command {
            UiCommand::ShowView(view) => {
                self.view = view;
                self.status_line = format!("{} view", view.label().to_ascii_lowercase());
            }
            UiCommand::NewTask => {
                let story_id = match self.tree.selected_row() {
                    Some(TreeRow::Story { story, .. }) => Some(story.id.clone()),
                    Some(TreeRow::Task { task, .. }) => task.story_id.clone(),
                    _ => None,
                };
                self.form = Some(Form::new_task(self.tree.stories(), story_id));
            }
            UiCommand::NewStory => self.form = Some(Form::new_story()),
            UiCommand::EditSelected => match self.tree.selected_row() {
                Some(TreeRow::Story { story, .. }) => {
                    let id = story.id.clone();
                    self.push_action(AppAction::LoadStory(id));
                }
                Some(TreeRow::Task { task, .. }) => {
                    let id = task.id.clone();
                    self.push_action(AppAction::LoadTask(id));
                }
                _ => {}
            },
            UiCommand::ToggleCollapse => {
                self.tree.toggle_selected();
            }
            UiCommand::DispatchSelected => match self.tree.selected_task() {
                Some(task) => {
                    let id = task.id.clone();
                    self.status_line = format!("dispatching {}", task.name);
                    self.push_action(AppAction::Dispatch(id));
                }
                None => self
                    .notifications
                    .push(NotificationLevel::Warning, "select a task to dispatch"),
            },
            UiCommand::Refresh => {
                self.status_line = "refreshing".to_string();
                self.push_action(AppAction::Refresh);
            }
            UiCommand::SelectNext => self.tree.select_next(),
            UiCommand::SelectPrevious => self.tree.select_previous(),
            UiCommand::Interrupt | UiCommand::Quit => {}
        }
    }

    fn handle_form_key(&mut self, key: KeyEvent) {
        let Some(form) = self.form.as_mut() else {
            return;
        };
        if form.saving {
            if key.code == KeyCode::Esc {
                self.form = None;
            }
            return;
        }

        match key.code {
            KeyCode::Esc => {
                self.form = None;
                self.status_line = "edit canceled".to_string();
            }
            KeyCode::Tab | KeyCode::Down => form.focus_next(),
            KeyCode::BackTab | KeyCode::Up => form.focus_previous(),
            KeyCode::Left => form.cycle(false),
            KeyCode::Right => form.cycle(true),
            KeyCode::Backspace => form.backspace(),
            KeyCode::Enter => {
                form.saving = true;
                form.error = None;
                let submission = form.submission();
                self.push_action(AppAction::Submit(submission));
            }
            KeyCode::Char(ch) if !key.modifiers.contains(KeyModifiers::CONTROL) => {
                form.insert_char(ch)
            }
            _ => {}
        }
    }

    fn handle_chat_key(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Esc => {
                self.view = View::Tasks;
                self.status_line = "tasks view".to_string();
            }
            KeyCode::Enter => {
                let message = self.chat.input.trim().to_string();
                if message.is_empty() {
                    return;
                }
                self.chat.input.clear();
                self.chat.push_user(&message);
                self.chat.busy = true;
                self.push_action(AppAction::SendChat(message));
            }
            KeyCode::Backspace => {
                self.chat.input.pop();
            }
            KeyCode::Char(ch) if !key.modifiers.contains(KeyModifiers::CONTROL) => {
                self.chat.input.push(ch)
            }
            _ => {}
        }
    }

    pub fn apply_event(&mut self, event: TuiEvent) {
        match event {
            TuiEvent::TreeReplaced { stories, tasks } => {
                self.tree.replace(stories, tasks);
                self.status_line = format!(
                    "{} stories, {} rows",
                    self.tree.stories().len(),
                    self.tree.rows().len()
                );
            }
            TuiEvent::StoryLoaded { story } => self.form = Some(Form::edit_story(&story)),
            TuiEvent::TaskLoaded { task } => {
                self.form = Some(Form::edit_task(&task, self.tree.stories()))
            }
            TuiEvent::FormSaved { message } => {
                self.form = None;
                self.notifications.push(NotificationLevel::Success, message);
                self.push_action(AppAction::Refresh);
            }
            TuiEvent::FormRejected { message } => {
                if let Some(form) = self.form.as_mut() {
                    form.saving = false;
                    form.error = Some(message);
                }
            }
            TuiEvent::FormClosed => self.form = None,
            TuiEvent::Chat(event) => self.apply_chat_event(event),
            TuiEvent::ChatQueued => self
                .chat
                .push_warning("queued: the agent is busy, this message will be sent next"),
            TuiEvent::Dispatch(event) => self.apply_dispatch_event(event),
            TuiEvent::Notify { level, message } => self.notifications.push(level, message),
            TuiEvent::StatusLine { message } => self.status_line = message,
        }
    }

    fn apply_chat_event(&mut self, event: ChatEvent) {
        match event {
            ChatEvent::Delta { text } => self.chat.push_delta(&text),
            ChatEvent::Reply { text } => self.chat.finish_reply(&text),
            ChatEvent::Warning { message } => self.chat.push_warning(message),
            ChatEvent::Idle => {
                self.chat.busy = false;
                // The agent may have changed stories or tasks through its tools.
                self.push_action(AppAction::Refresh);
            }
        }
    }

    fn apply_dispatch_event(&mut self, event: DispatchEvent) {
        match event {
            DispatchEvent::Started { task_id, worktree } => {
                self.status_line = format!("task {task_id} running in {}", worktree.display());
                self.notifications
                    .push(NotificationLevel::Info, format!("agent started on {task_id}"));
                self.push_action(AppAction::Refresh);
            }
            DispatchEvent::Output { task_id, text } => {
                self.chat.push_dispatch_output(&task_id, &text)
            }
            DispatchEvent::Finished { task_id } => {
                self.notifications
                    .push(NotificationLevel::Success, format!("agent finished {task_id}"));
                self.push_action(AppAction::Refresh);
            }
            DispatchEvent::Failed { task_id, message } => {
                self.chat.push_warning(message.clone());
                self.notifications.push(
                    NotificationLevel::Error,
                    format!("dispatch of {task_id} failed: {message}"),
                );
                self.push_action(AppAction::Refresh);
            }
        }
    }
}
