//! Interactive console
//!
//! Prints every session event as it arrives and turns stdin lines into
//! outbound messages. Reconnection, when enabled, happens here by opening a
//! fresh session; the session itself never retries.

use std::time::Duration;

use backoff::{backoff::Backoff, ExponentialBackoff};
use chrono::Local;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tracing::{info, warn};

use crate::config::{ClientConfig, ReconnectSettings};
use crate::error::{Error, Result};
use crate::protocol::{InboundMessage, OutboundMessage};
use crate::session::{Session, SessionEvent};

/// A line typed by the user
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    Quit,
    Ping,
    Message(String),
    Empty,
}

impl ConsoleCommand {
    pub fn parse(line: &str) -> Self {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            ConsoleCommand::Empty
        } else if trimmed.eq_ignore_ascii_case("quit") {
            ConsoleCommand::Quit
        } else if trimmed.eq_ignore_ascii_case("ping") {
            ConsoleCommand::Ping
        } else {
            ConsoleCommand::Message(trimmed.to_string())
        }
    }
}

/// How a single session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionOutcome {
    /// The user asked to leave
    Quit,
    /// The connection went away on its own
    Dropped,
}

// ─────────────────────────────────────────────────────────────────
// Formatting
// ─────────────────────────────────────────────────────────────────

/// One-line description of an inbound message
pub fn describe_message(msg: &InboundMessage) -> String {
    match msg {
        InboundMessage::Welcome {
            connection_id,
            heartbeat_interval,
            ..
        } => format!(
            "Welcome: {} (connection {}, heartbeat every {}ms)",
            msg.text().unwrap_or(""),
            connection_id,
            heartbeat_interval.as_millis()
        ),
        InboundMessage::Pong { .. } => match msg.connection_id() {
            Some(id) => format!("Pong received (connection {})", id),
            None => "Pong received".to_string(),
        },
        InboundMessage::HeartbeatAck { .. } => "Heartbeat acknowledged".to_string(),
        InboundMessage::Echo { .. } => {
            let mut line = format!("Echo: {}", msg.text().unwrap_or(""));
            if let Some(connections) = msg.connections() {
                line.push_str(&format!(" (connections: {})", connections));
            }
            line
        }
        InboundMessage::Raw(text) => format!("Raw: {}", text),
        InboundMessage::Unknown { payload, .. } => format!(
            "Unknown message ({}): {}",
            msg.kind(),
            serde_json::Value::Object(payload.clone())
        ),
    }
}

/// One-line description of a session event
pub fn describe(event: &SessionEvent) -> String {
    match event {
        SessionEvent::Message(msg) => describe_message(msg),
        SessionEvent::StaleConnection(warning) => format!(
            "Warning: no heartbeat response for {}s ({} unanswered), connection may be stale",
            warning.silent_for.as_secs(),
            warning.missed_acks
        ),
        SessionEvent::Error { message, .. } => format!("Error: {}", message),
        SessionEvent::Closed { reason } => format!("Connection {}", reason),
    }
}

fn print_line(text: &str) {
    println!("[{}] {}", Local::now().format("%H:%M:%S"), text);
}

// ─────────────────────────────────────────────────────────────────
// Console Loop
// ─────────────────────────────────────────────────────────────────

fn build_backoff(settings: &ReconnectSettings) -> ExponentialBackoff {
    let initial = Duration::from_millis(settings.initial_delay_ms);
    ExponentialBackoff {
        current_interval: initial,
        initial_interval: initial,
        max_interval: Duration::from_millis(settings.max_delay_ms),
        max_elapsed_time: None,
        ..Default::default()
    }
}

/// Run the interactive console until the user quits or stdin closes
pub async fn run_console(config: &ClientConfig, reconnect: bool) -> Result<()> {
    let url = config.session.url.as_str();
    let mut stdin = BufReader::new(tokio::io::stdin()).lines();
    let mut backoff = build_backoff(&config.reconnect);
    let max_attempts = config.reconnect.max_attempts;
    let mut attempts = 0u32;

    loop {
        match Session::connect(url, config.session_config()).await {
            Ok(session) => {
                attempts = 0;
                backoff.reset();
                if run_session(&session, &mut stdin).await? == SessionOutcome::Quit {
                    return Ok(());
                }
                if !reconnect {
                    return Ok(());
                }
            }
            Err(e) if reconnect && e.is_retryable() => {
                print_line(&format!("Connection failed: {}", e));
            }
            Err(e) => return Err(e),
        }

        attempts += 1;
        if max_attempts > 0 && attempts > max_attempts {
            return Err(Error::connection_failed(
                url,
                format!("giving up after {} reconnection attempts", max_attempts),
            ));
        }

        let delay = backoff
            .next_backoff()
            .unwrap_or_else(|| Duration::from_millis(config.reconnect.max_delay_ms));
        info!(attempt = attempts, delay_ms = delay.as_millis() as u64, "Scheduling reconnect");
        print_line(&format!("Reconnecting in {:.1}s (attempt {})", delay.as_secs_f64(), attempts));

        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = tokio::signal::ctrl_c() => return Ok(()),
        }
    }
}

async fn run_session(session: &Session, stdin: &mut Lines<BufReader<Stdin>>) -> Result<SessionOutcome> {
    let mut events = session
        .take_events()
        .ok_or_else(|| Error::Internal("session events already taken".to_string()))?;

    match session.connection_id() {
        Some(id) => print_line(&format!("Connected to {} (connection {})", session.url(), id)),
        None => print_line(&format!("Connected to {}", session.url())),
    }
    print_line("Type a message and press Enter to send, 'ping' to ping, 'quit' to exit");

    let outcome = loop {
        tokio::select! {
            biased;
            event = events.recv() => match event {
                Some(event) => {
                    print_line(&describe(&event));
                    if event.is_closed() {
                        break SessionOutcome::Dropped;
                    }
                }
                None => break SessionOutcome::Dropped,
            },
            line = stdin.next_line() => match line {
                Ok(Some(line)) => {
                    let message = match ConsoleCommand::parse(&line) {
                        ConsoleCommand::Quit => break SessionOutcome::Quit,
                        ConsoleCommand::Empty => continue,
                        ConsoleCommand::Ping => OutboundMessage::ping(),
                        ConsoleCommand::Message(text) => OutboundMessage::message(text),
                    };
                    if let Err(e) = session.send(message).await {
                        print_line(&format!("Send failed: {}", e));
                    }
                }
                Ok(None) => {
                    info!("Input closed");
                    break SessionOutcome::Quit;
                }
                Err(e) => {
                    warn!(error = %e, "Failed to read input");
                    break SessionOutcome::Quit;
                }
            },
            _ = tokio::signal::ctrl_c() => break SessionOutcome::Quit,
        }
    };

    session.close().await?;
    if outcome == SessionOutcome::Quit {
        print_line("Disconnected");
    }
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{CloseReason, StaleConnectionWarning};

    #[test]
    fn test_parse_commands() {
        assert_eq!(ConsoleCommand::parse("quit"), ConsoleCommand::Quit);
        assert_eq!(ConsoleCommand::parse("  QUIT \n"), ConsoleCommand::Quit);
        assert_eq!(ConsoleCommand::parse("ping"), ConsoleCommand::Ping);
        assert_eq!(ConsoleCommand::parse(""), ConsoleCommand::Empty);
        assert_eq!(ConsoleCommand::parse("   "), ConsoleCommand::Empty);
        assert_eq!(
            ConsoleCommand::parse("hello there"),
            ConsoleCommand::Message("hello there".to_string())
        );
        assert_eq!(
            ConsoleCommand::parse("quit now"),
            ConsoleCommand::Message("quit now".to_string())
        );
    }

    #[test]
    fn test_describe_welcome() {
        let msg = InboundMessage::parse(
            r#"{"type":"welcome","message":"Connected","connectionId":"abc","heartbeatInterval":20000}"#,
        );
        let line = describe_message(&msg);
        assert!(line.contains("Connected"));
        assert!(line.contains("abc"));
        assert!(line.contains("20000ms"));
    }

    #[test]
    fn test_describe_echo_and_raw() {
        let echo = InboundMessage::parse(r#"{"type":"echo","message":"hi","connections":2}"#);
        assert_eq!(describe_message(&echo), "Echo: hi (connections: 2)");

        let raw = InboundMessage::parse("plain text");
        assert_eq!(describe_message(&raw), "Raw: plain text");
    }

    #[test]
    fn test_describe_unknown_includes_payload() {
        let msg = InboundMessage::parse(r#"{"type":"presence","user":"x"}"#);
        let line = describe_message(&msg);
        assert!(line.starts_with("Unknown message (presence)"));
        assert!(line.contains(r#""user":"x""#));
    }

    #[test]
    fn test_describe_events() {
        let stale = SessionEvent::StaleConnection(StaleConnectionWarning {
            silent_for: Duration::from_secs(60),
            missed_acks: 3,
            window: Duration::from_secs(60),
        });
        assert!(describe(&stale).contains("60s"));

        let closed = SessionEvent::Closed {
            reason: CloseReason::Local,
        };
        assert_eq!(describe(&closed), "Connection closed locally");
    }

    #[test]
    fn test_backoff_from_settings() {
        let settings = ReconnectSettings {
            initial_delay_ms: 200,
            max_delay_ms: 800,
            ..Default::default()
        };
        let mut backoff = build_backoff(&settings);

        // Randomization spreads each delay by up to half the interval
        let first = backoff.next_backoff().unwrap();
        assert!(first >= Duration::from_millis(100) && first <= Duration::from_millis(300));
        for _ in 0..10 {
            let delay = backoff.next_backoff().unwrap();
            assert!(delay <= Duration::from_millis(1200));
        }
    }
}
