use crew_core::{Story, Task};
use crewd::{ChatEvent, DispatchEvent};

use crate::notifications::NotificationLevel;

/// Results and background updates applied to the app on the UI loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TuiEvent {
    TreeReplaced {
        stories: Vec<Story>,
        tasks: Vec<Task>,
    },
    StoryLoaded {
        story: Story,
    },
    TaskLoaded {
        task: Task,
    },
    FormSaved {
        message: String,
    },
    /// The form stays open and shows `message` inline.
    FormRejected {
        message: String,
    },
    FormClosed,
    Chat(ChatEvent),
    ChatQueued,
    Dispatch(DispatchEvent),
    Notify {
        level: NotificationLevel,
        message: String,
    },
    StatusLine {
        message: String,
    },
}

impl TuiEvent {
    pub fn notify(level: NotificationLevel, message: impl Into<String>) -> Self {
        TuiEvent::Notify {
            level,
            message: message.into(),
        }
    }
}

impl From<ChatEvent> for TuiEvent {
    fn from(event: ChatEvent) -> Self {
        TuiEvent::Chat(event)
    }
}

impl From<DispatchEvent> for TuiEvent {
    fn from(event: DispatchEvent) -> Self {
        TuiEvent::Dispatch(event)
    }
}
