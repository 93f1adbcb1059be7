use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Clear, Paragraph, Wrap};
use ratatui::Frame;

use crate::action::View;
use crate::app::TuiApp;
use crate::forms::Form;
use crate::model::{status_icon, ChatLineKind, TreeRow};

// -- Color palette ----------------------------------------------------------

const ACCENT: Color = Color::Cyan;
const DIM: Color = Color::DarkGray;
const MUTED: Color = Color::Gray;
const SELECTED_BG: Color = Color::Indexed(236);
const BORDER_NORMAL: Color = Color::DarkGray;
const BORDER_FOCUSED: Color = Color::Cyan;
const KEY_FG: Color = Color::Yellow;

const AGENT_WIDTH: usize = 10;
const REPO_WIDTH: usize = 14;
const CHECKLIST_WIDTH: usize = 7;
const LABEL_WIDTH: usize = 16;

fn normal_block(title: &str) -> Block<'_> {
    Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(BORDER_NORMAL))
        .title(Span::styled(
            format!(" {title} "),
            Style::default().fg(ACCENT).add_modifier(Modifier::BOLD),
        ))
}

fn focused_block(title: &str) -> Block<'_> {
    Block::default()
        .borders(Borders::ALL)
        .border_style(
            Style::default()
                .fg(BORDER_FOCUSED)
                .add_modifier(Modifier::BOLD),
        )
        .title(Span::styled(
            format!(" {title} "),
            Style::default()
                .fg(Color::White)
                .add_modifier(Modifier::BOLD),
        ))
}

// -- Layout -----------------------------------------------------------------

pub fn render_app(frame: &mut Frame<'_>, app: &TuiApp) {
    let root = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Min(5),
            Constraint::Length(3),
        ])
        .split(frame.area());

    render_header(frame, root[0], app);
    match app.view {
        View::Tasks => render_tree(frame, root[1], app),
        View::Chat => render_chat(frame, root[1], app),
        View::Settings => render_settings(frame, root[1], app),
    }
    render_footer(frame, root[2], app);

    if let Some(form) = &app.form {
        render_form(frame, form);
    }
    render_toasts(frame, app);
}

// -- Header -----------------------------------------------------------------

fn render_header(frame: &mut Frame<'_>, area: Rect, app: &TuiApp) {
    let mut spans = vec![Span::styled(
        " crew ",
        Style::default().fg(ACCENT).add_modifier(Modifier::BOLD),
    )];
    spans.extend(view_tabs(app.view));
    if app.chat.busy {
        spans.push(Span::styled("  agent working", Style::default().fg(KEY_FG)));
    }

    let widget = Paragraph::new(Line::from(spans)).block(normal_block("Workspace"));
    frame.render_widget(widget, area);
}

fn view_tabs(current: View) -> Vec<Span<'static>> {
    View::ALL
        .iter()
        .map(|view| {
            let style = if *view == current {
                Style::default()
                    .fg(Color::Black)
                    .bg(ACCENT)
                    .add_modifier(Modifier::BOLD)
            } else {
                Style::default().fg(MUTED)
            };
            Span::styled(format!(" {} ", view.label()), style)
        })
        .collect()
}

// -- Tasks tree -------------------------------------------------------------

fn render_tree(frame: &mut Frame<'_>, area: Rect, app: &TuiApp) {
    let name_width = (area.width as usize)
        .saturating_sub(AGENT_WIDTH + REPO_WIDTH + CHECKLIST_WIDTH + 12)
        .max(8);

    let mut lines = vec![Line::from(Span::styled(
        format!(
            "   {:<name_width$} {:<AGENT_WIDTH$} {:<REPO_WIDTH$} {:>CHECKLIST_WIDTH$}  st",
            "name", "agent", "repository", "list"
        ),
        Style::default().fg(DIM).add_modifier(Modifier::BOLD),
    ))];

    let rows = app.tree.rows();
    if rows.is_empty() {
        lines.push(Line::from(Span::styled(
            "   no stories or tasks yet; press N or n to add one",
            Style::default().fg(DIM),
        )));
    }

    // Keep the selection in view.
    let visible = (area.height as usize).saturating_sub(3).max(1);
    let selected = app.tree.selected_index();
    let offset = selected.saturating_sub(visible.saturating_sub(1));
    for (idx, row) in rows.iter().enumerate().skip(offset).take(visible) {
        lines.push(format_tree_row(row, idx == selected, name_width));
    }

    frame.render_widget(Paragraph::new(lines).block(normal_block("Tasks")), area);
}

/// Column values for one row: name, agent, repository, checklist, status.
fn tree_row_cells(row: &TreeRow) -> [String; 5] {
    match row {
        TreeRow::Story {
            story,
            collapsed,
            done,
            total,
        } => {
            let marker = if *collapsed { "▸" } else { "▾" };
            [
                format!("{marker} {}", story.name),
                String::new(),
                String::new(),
                format!("{done}/{total}"),
                status_icon(story.status).to_string(),
            ]
        }
        TreeRow::UnassignedHeader { count } => [
            format!("Unassigned ({count})"),
            String::new(),
            String::new(),
            String::new(),
            String::new(),
        ],
        TreeRow::Task { task, nested } => {
            let indent = if *nested { "    " } else { "  " };
            let (done, total) = task.checklist_progress();
            let checklist = if total == 0 {
                String::new()
            } else {
                format!("{done}/{total}")
            };
            [
                format!("{indent}{}", task.name),
                task.agent.clone().unwrap_or_default(),
                task.repository_name
                    .clone()
                    .or_else(|| task.repository_url.clone())
                    .unwrap_or_default(),
                checklist,
                status_icon(task.status).to_string(),
            ]
        }
    }
}

fn format_tree_row(row: &TreeRow, selected: bool, name_width: usize) -> Line<'static> {
    let [name, agent, repo, checklist, status] = tree_row_cells(row);
    let base = if selected {
        Style::default().bg(SELECTED_BG).fg(Color::White)
    } else {
        match row {
            TreeRow::Task { .. } => Style::default().fg(MUTED),
            _ => Style::default().fg(Color::White).add_modifier(Modifier::BOLD),
        }
    };
    let prefix = if selected { " ▶ " } else { "   " };

    Line::from(vec![
        Span::styled(prefix, base.fg(ACCENT)),
        Span::styled(format!("{:<name_width$} ", truncate(&name, name_width)), base),
        Span::styled(
            format!("{:<AGENT_WIDTH$} ", truncate(&agent, AGENT_WIDTH)),
            base.fg(DIM),
        ),
        Span::styled(
            format!("{:<REPO_WIDTH$} ", truncate(&repo, REPO_WIDTH)),
            base.fg(DIM),
        ),
        Span::styled(format!("{checklist:>CHECKLIST_WIDTH$}  "), base),
        Span::styled(status, base.fg(ACCENT)),
    ])
}

// -- Chat -------------------------------------------------------------------

fn render_chat(frame: &mut Frame<'_>, area: Rect, app: &TuiApp) {
    let parts = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(3), Constraint::Length(3)])
        .split(area);

    let height = (parts[0].height as usize).saturating_sub(2);
    let skip = app.chat.len().saturating_sub(height);
    let lines: Vec<Line> = app
        .chat
        .lines()
        .skip(skip)
        .map(|line| {
            let style = match line.kind {
                ChatLineKind::You => Style::default().fg(ACCENT).add_modifier(Modifier::BOLD),
                ChatLineKind::Agent => Style::default().fg(Color::White),
                ChatLineKind::Warning => Style::default().fg(KEY_FG),
            };
            Line::from(Span::styled(line.text.clone(), style))
        })
        .collect();
    frame.render_widget(
        Paragraph::new(lines)
            .block(normal_block("Chat"))
            .wrap(Wrap { trim: false }),
        parts[0],
    );

    let title = if app.chat.busy {
        "Message (agent working, new messages queue)"
    } else {
        "Message"
    };
    let input = Paragraph::new(Line::from(vec![
        Span::styled("> ", Style::default().fg(ACCENT)),
        Span::raw(app.chat.input.clone()),
        Span::styled("▏", Style::default().fg(ACCENT)),
    ]))
    .block(focused_block(title));
    frame.render_widget(input, parts[1]);
}

// -- Settings ---------------------------------------------------------------

fn render_settings(frame: &mut Frame<'_>, area: Rect, app: &TuiApp) {
    let lines: Vec<Line> = app
        .settings_lines
        .iter()
        .map(|line| {
            let style = if line.starts_with("error:") {
                Style::default().fg(Color::Red)
            } else if line.starts_with("warning:") {
                Style::default().fg(KEY_FG)
            } else if line.starts_with('[') {
                Style::default().fg(ACCENT).add_modifier(Modifier::BOLD)
            } else {
                Style::default().fg(MUTED)
            };
            Line::from(Span::styled(line.clone(), style))
        })
        .collect();
    frame.render_widget(
        Paragraph::new(lines)
            .block(normal_block("Settings"))
            .wrap(Wrap { trim: false }),
        area,
    );
}

// -- Form modal -------------------------------------------------------------

fn render_form(frame: &mut Frame<'_>, form: &Form) {
    let area = centered_rect(70, 70, frame.area());
    let mut lines = Vec::new();
    for key in form.fields() {
        let focused = *key == form.focused();
        let label_style = if focused {
            Style::default().fg(ACCENT).add_modifier(Modifier::BOLD)
        } else {
            Style::default().fg(DIM)
        };
        let mut spans = vec![
            Span::styled(format!("{:<LABEL_WIDTH$}", key.label()), label_style),
            Span::styled(
                form.display_value(*key),
                Style::default().fg(Color::White),
            ),
        ];
        if focused {
            spans.push(Span::styled("▏", Style::default().fg(ACCENT)));
        }
        lines.push(Line::from(spans));
    }

    lines.push(Line::from(""));
    if let Some(error) = &form.error {
        lines.push(Line::from(Span::styled(
            error.clone(),
            Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),
        )));
    }
    if form.saving {
        lines.push(Line::from(Span::styled("saving…", Style::default().fg(KEY_FG))));
    }
    lines.push(Line::from(Span::styled(
        "Tab/Shift-Tab field   ←/→ cycle   Enter save   Esc cancel",
        Style::default().fg(DIM),
    )));

    let widget = Paragraph::new(lines)
        .block(focused_block(form.title()))
        .wrap(Wrap { trim: false });
    frame.render_widget(Clear, area);
    frame.render_widget(widget, area);
}

fn centered_rect(percent_x: u16, percent_y: u16, area: Rect) -> Rect {
    let vertical = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(area);
    let horizontal = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(vertical[1]);
    horizontal[1]
}

// -- Toasts -----------------------------------------------------------------

fn render_toasts(frame: &mut Frame<'_>, app: &TuiApp) {
    let screen = frame.area();
    let width = (screen.width / 2).clamp(20, 60).min(screen.width);
    let mut y = screen.y + 1;
    for toast in app.notifications.visible() {
        if y + 3 > screen.bottom() {
            break;
        }
        let area = Rect::new(screen.right().saturating_sub(width + 1), y, width, 3);
        let color = toast.level.color();
        let widget = Paragraph::new(Line::from(vec![
            Span::styled(format!("{} ", toast.level.icon()), Style::default().fg(color)),
            Span::raw(toast.message.clone()),
        ]))
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(color)),
        );
        frame.render_widget(Clear, area);
        frame.render_widget(widget, area);
        y += 3;
    }
    let overflow = app.notifications.overflow();
    if overflow > 0 && y < screen.bottom() {
        let area = Rect::new(screen.right().saturating_sub(width + 1), y, width, 1);
        frame.render_widget(
            Paragraph::new(Span::styled(
                format!("+{overflow} more"),
                Style::default().fg(DIM),
            )),
            area,
        );
    }
}

// -- Footer -----------------------------------------------------------------

fn render_footer(frame: &mut Frame<'_>, area: Rect, app: &TuiApp) {
    let line = Line::from(vec![
        Span::styled(format!(" {} ", app.status_line), Style::default().fg(MUTED)),
        Span::styled("│ ", Style::default().fg(DIM)),
        Span::styled(key_hints(app), Style::default().fg(KEY_FG)),
    ]);
    frame.render_widget(Paragraph::new(line).block(normal_block("Status")), area);
}

fn key_hints(app: &TuiApp) -> &'static str {
    if app.form.is_some() {
        return "Tab next  Enter save  Esc cancel";
    }
    match app.view {
        View::Tasks => {
            "j/k move  Enter edit  Space fold  n task  N story  d dispatch  r refresh  c chat  s settings  Ctrl+Q quit"
        }
        View::Chat => "Enter send  Esc tasks  Ctrl+Q quit",
        View::Settings => "t tasks  c chat  Ctrl+Q quit",
    }
}

fn truncate(value: &str, width: usize) -> String {
    if value.chars().count() <= width {
        return value.to_string();
    }
    let mut out: String = value.chars().take(width.saturating_sub(1)).collect();
    out.push('…');
    out
}
