//! Toast notifications with auto-dismiss.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use ratatui::style::Color;

const MAX_VISIBLE_TOASTS: usize = 3;
const DEFAULT_DISMISS: Duration = Duration::from_secs(5);
/// Errors stay up longer than routine messages.
const ERROR_DISMISS: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationLevel {
    Info,
    Success,
    Warning,
    Error,
}

impl NotificationLevel {
    pub fn color(self) -> Color {
        match self {
            NotificationLevel::Info => Color::Blue,
            NotificationLevel::Success => Color::Green,
            NotificationLevel::Warning => Color::Yellow,
            NotificationLevel::Error => Color::Red,
        }
    }

    pub fn icon(self) -> &'static str {
        match self {
            NotificationLevel::Info => "ℹ",
            NotificationLevel::Success => "✓",
            NotificationLevel::Warning => "⚠",
            NotificationLevel::Error => "✗",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Toast {
    pub level: NotificationLevel,
    pub message: String,
    pub created_at: Instant,
    pub duration: Duration,
}

impl Toast {
    pub fn new(level: NotificationLevel, message: impl Into<String>) -> Self {
        let duration = match level {
            NotificationLevel::Error => ERROR_DISMISS,
            _ => DEFAULT_DISMISS,
        };
        Self {
            level,
            message: message.into(),
            created_at: Instant::now(),
            duration,
        }
    }

    pub fn is_expired_at(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.created_at) >= self.duration
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Notifications {
    toasts: VecDeque<Toast>,
}

impl Notifications {
    pub fn push(&mut self, level: NotificationLevel, message: impl Into<String>) {
        self.push_toast(Toast::new(level, message));
    }

    pub fn push_toast(&mut self, toast: Toast) {
        match toast.level {
            NotificationLevel::Error | NotificationLevel::Warning => {
                tracing::warn!(message = %toast.message, "notification")
            }
            _ => tracing::debug!(message = %toast.message, "notification"),
        }
        self.toasts.push_back(toast);
    }

    /// Drop expired toasts.
    pub fn tick(&mut self) {
        self.tick_at(Instant::now());
    }

    pub fn tick_at(&mut self, now: Instant) {
        self.toasts.retain(|toast| !toast.is_expired_at(now));
    }

    pub fn dismiss_all(&mut self) {
        self.toasts.clear();
    }

    /// Newest toasts, up to the display limit, newest last.
    pub fn visible(&self) -> impl Iterator<Item = &Toast> {
        let skip = self.toasts.len().saturating_sub(MAX_VISIBLE_TOASTS);
        self.toasts.iter().skip(skip)
    }

    /// Toasts beyond the display limit.
    pub fn overflow(&self) -> usize {
        self.toasts.len().saturating_sub(MAX_VISIBLE_TOASTS)
    }

    pub fn is_empty(&self) -> bool {
        self.toasts.is_empty()
    }
}
