use crossterm::event::{KeyCode, KeyEvent, KeyEventKind, KeyModifiers};

use crew_core::{StoryId, TaskId};

use crate::forms::FormSubmission;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum View {
    Tasks,
    Chat,
    Settings,
}

impl View {
    pub const ALL: [View; 3] = [View::Tasks, View::Chat, View::Settings];

    pub fn label(self) -> &'static str {
        match self {
            View::Tasks => "Tasks",
            View::Chat => "Chat",
            View::Settings => "Settings",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UiCommand {
    ShowView(View),
    NewTask,
    NewStory,
    EditSelected,
    ToggleCollapse,
    DispatchSelected,
    Refresh,
    SelectNext,
    SelectPrevious,
    /// First Ctrl+C arms quitting, a second one quits.
    Interrupt,
    Quit,
}

/// Work the app hands to the backend.
#[derive(Debug, Clone, PartialEq)]
pub enum AppAction {
    Refresh,
    LoadStory(StoryId),
    LoadTask(TaskId),
    Submit(FormSubmission),
    Dispatch(TaskId),
    SendChat(String),
}

impl AppAction {
    pub fn label(&self) -> &'static str {
        match self {
            AppAction::Refresh => "refresh",
            AppAction::LoadStory(_) => "load_story",
            AppAction::LoadTask(_) => "load_task",
            AppAction::Submit(_) => "submit_form",
            AppAction::Dispatch(_) => "dispatch_task",
            AppAction::SendChat(_) => "send_chat",
        }
    }
}

/// Quit shortcuts, checked before any view-specific handling.
pub fn map_global_key(key: KeyEvent) -> Option<UiCommand> {
    if key.kind != KeyEventKind::Press || !key.modifiers.contains(KeyModifiers::CONTROL) {
        return None;
    }
    match key.code {
        KeyCode::Char('q') => Some(UiCommand::Quit),
        KeyCode::Char('c') => Some(UiCommand::Interrupt),
        _ => None,
    }
}

/// Keys on the tasks and settings views.
pub fn map_key_to_command(key: KeyEvent) -> Option<UiCommand> {
    if key.kind != KeyEventKind::Press {
        return None;
    }
    if let Some(command) = map_global_key(key) {
        return Some(command);
    }
    if key.modifiers.contains(KeyModifiers::CONTROL) {
        return None;
    }

    match key.code {
        KeyCode::Down | KeyCode::Char('j') => Some(UiCommand::SelectNext),
        KeyCode::Up | KeyCode::Char('k') => Some(UiCommand::SelectPrevious),
        KeyCode::Enter => Some(UiCommand::EditSelected),
        KeyCode::Char(' ') => Some(UiCommand::ToggleCollapse),
        KeyCode::Char('t') => Some(UiCommand::ShowView(View::Tasks)),
        KeyCode::Char('c') => Some(UiCommand::ShowView(View::Chat)),
        KeyCode::Char('s') => Some(UiCommand::ShowView(View::Settings)),
        KeyCode::Char('n') => Some(UiCommand::NewTask),
        KeyCode::Char('N') => Some(UiCommand::NewStory),
        KeyCode::Char('d') => Some(UiCommand::DispatchSelected),
        KeyCode::Char('r') => Some(UiCommand::Refresh),
        _ => None,
    }
}
