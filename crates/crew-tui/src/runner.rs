use std::io;
use std::time::Duration;

use crossterm::event::{self, Event as CEvent};
use crossterm::execute;
use crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use crewd::{ChatEvent, DispatchEvent};
use ratatui::backend::CrosstermBackend;
use ratatui::Terminal;
use tokio::sync::mpsc;

use crate::action::AppAction;
use crate::app::TuiApp;
use crate::backend::Backend;
use crate::error::TuiError;
use crate::event::TuiEvent;
use crate::ui::render_app;

/// Background event streams the UI listens to.
#[derive(Debug)]
pub struct EventSources {
    pub chat: mpsc::UnboundedReceiver<ChatEvent>,
    pub dispatch: mpsc::UnboundedReceiver<DispatchEvent>,
}

pub async fn run_tui(
    mut app: TuiApp,
    backend: Backend,
    sources: EventSources,
    tick_rate: Duration,
) -> Result<(), TuiError> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let mut terminal = Terminal::new(CrosstermBackend::new(stdout))?;

    let run_result = run_loop(&mut terminal, &mut app, &backend, sources, tick_rate).await;

    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;
    backend.chat().shutdown().await;

    run_result
}

async fn run_loop(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    app: &mut TuiApp,
    backend: &Backend,
    sources: EventSources,
    tick_rate: Duration,
) -> Result<(), TuiError> {
    let (events_tx, mut events) = mpsc::unbounded_channel();
    forward(sources.chat, events_tx.clone());
    forward(sources.dispatch, events_tx.clone());
    let mut input = spawn_input_reader(tick_rate);

    let mut ticker = tokio::time::interval(tick_rate);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    app.push_action(AppAction::Refresh);
    while !app.should_quit {
        spawn_actions(app, backend, &events_tx);
        terminal.draw(|frame| render_app(frame, app))?;

        tokio::select! {
            read = input.recv() => match read {
                Some(Ok(event)) => handle_terminal_event(app, event),
                Some(Err(err)) => return Err(err.into()),
                None => return Err(TuiError::InputClosed),
            },
            Some(event) = events.recv() => app.apply_event(event),
            _ = ticker.tick() => app.notifications.tick(),
        }
    }
    Ok(())
}

/// Run each queued action on its own task; results come back as events.
fn spawn_actions(app: &mut TuiApp, backend: &Backend, events: &mpsc::UnboundedSender<TuiEvent>) {
    for action in app.drain_actions() {
        let backend = backend.clone();
        let events = events.clone();
        tokio::spawn(async move {
            for event in backend.execute(action).await {
                if events.send(event).is_err() {
                    break;
                }
            }
        });
    }
}

fn forward<E>(mut source: mpsc::UnboundedReceiver<E>, sink: mpsc::UnboundedSender<TuiEvent>)
where
    E: Into<TuiEvent> + Send + 'static,
{
    tokio::spawn(async move {
        while let Some(event) = source.recv().await {
            if sink.send(event.into()).is_err() {
                break;
            }
        }
    });
}

/// crossterm reads block, so they run on a plain thread.
fn spawn_input_reader(poll_interval: Duration) -> mpsc::UnboundedReceiver<io::Result<CEvent>> {
    let (tx, rx) = mpsc::unbounded_channel();
    std::thread::spawn(move || loop {
        let read = match event::poll(poll_interval) {
            Ok(true) => event::read(),
            Ok(false) => {
                if tx.is_closed() {
                    break;
                }
                continue;
            }
            Err(err) => Err(err),
        };
        let failed = read.is_err();
        if tx.send(read).is_err() || failed {
            break;
        }
    });
    rx
}

fn handle_terminal_event(app: &mut TuiApp, event: CEvent) {
    match event {
        CEvent::Key(key) => app.handle_key_event(key),
        CEvent::Resize(_, _) => {}
        _ => {}
    }
}
