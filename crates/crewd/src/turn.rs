use std::time::Duration;

use crew_agents::{AgentSession, SessionEvent};

/// How one prompt sent to an agent session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnOutcome {
    /// The session went idle. Carries the completed message, or the
    /// concatenated deltas when no complete message arrived.
    Completed { text: String },
    Failed { message: String },
    TimedOut,
}

/// Drain events for the last prompt until `Idle`, `Error` or `timeout`.
/// Every delta is handed to `on_delta` as it arrives.
pub async fn await_turn<F>(
    session: &mut dyn AgentSession,
    timeout: Duration,
    mut on_delta: F,
) -> TurnOutcome
where
    F: FnMut(&str) + Send,
{
    let drain = async {
        let mut streamed = String::new();
        let mut complete: Option<String> = None;
        loop {
            match session.next_event().await {
                Some(SessionEvent::MessageDelta { text }) => {
                    on_delta(&text);
                    streamed.push_str(&text);
                }
                Some(SessionEvent::MessageComplete { text }) => complete = Some(text),
                Some(SessionEvent::Idle) => {
                    return TurnOutcome::Completed {
                        text: complete.unwrap_or(streamed),
                    }
                }
                Some(SessionEvent::Error { message }) => return TurnOutcome::Failed { message },
                None => {
                    return TurnOutcome::Failed {
                        message: "agent session closed before going idle".to_string(),
                    }
                }
            }
        }
    };

    match tokio::time::timeout(timeout, drain).await {
        Ok(outcome) => outcome,
        Err(_) => TurnOutcome::TimedOut,
    }
}
