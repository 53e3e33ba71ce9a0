//! Scripted diagnostics against a live server
//!
//! `run_probe` walks a fixed message exchange and records the reply to each
//! step. `run_send` pushes arbitrary text frames and collects whatever comes
//! back.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::console::describe_message;
use crate::error::{Error, Result};
use crate::protocol::{InboundMessage, OutboundMessage};
use crate::session::{Session, SessionConfig, SessionEvent};

/// Timing for a probe run
#[derive(Debug, Clone)]
pub struct ProbeOptions {
    /// How long to wait for a reply after each send
    pub response_timeout: Duration,

    /// Idle period between the two halves of the exchange
    pub idle: Duration,
}

impl Default for ProbeOptions {
    fn default() -> Self {
        Self {
            response_timeout: Duration::from_secs(5),
            idle: Duration::ZERO,
        }
    }
}

/// A message sent by the probe and the first reply to it
#[derive(Debug, Clone)]
pub struct ProbeStep {
    pub sent: &'static str,
    pub reply: Option<InboundMessage>,
}

/// Everything a probe observed
#[derive(Debug, Clone, Default)]
pub struct ProbeReport {
    pub connection_id: Option<String>,
    pub welcome: Option<InboundMessage>,
    pub steps: Vec<ProbeStep>,
    /// Messages that arrived while idling
    pub during_idle: Vec<InboundMessage>,
    pub counts: BTreeMap<String, usize>,
}

impl ProbeReport {
    fn record(&mut self, msg: &InboundMessage) {
        *self.counts.entry(msg.kind().to_string()).or_insert(0) += 1;
    }

    /// Total messages received, welcome included
    pub fn total(&self) -> usize {
        self.counts.values().sum()
    }

    pub fn count(&self, kind: &str) -> usize {
        self.counts.get(kind).copied().unwrap_or(0)
    }
}

impl fmt::Display for ProbeReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.welcome {
            Some(welcome) => writeln!(f, "Connected: {}", describe_message(welcome))?,
            None => writeln!(f, "Connected: no welcome received")?,
        }

        for (n, step) in self.steps.iter().enumerate() {
            match &step.reply {
                Some(reply) => writeln!(f, "{}. sent {:<10} -> {}", n + 1, step.sent, describe_message(reply))?,
                None => writeln!(f, "{}. sent {:<10} -> no reply", n + 1, step.sent)?,
            }
        }

        for msg in &self.during_idle {
            writeln!(f, "   while idle: {}", describe_message(msg))?;
        }

        writeln!(f)?;
        writeln!(f, "Summary: {} messages received", self.total())?;
        for (kind, count) in &self.counts {
            writeln!(f, "  {:<14} {}", kind, count)?;
        }
        Ok(())
    }
}

/// Result of `run_send`
#[derive(Debug, Clone, Default)]
pub struct SendReport {
    pub sent: usize,
    pub received: Vec<InboundMessage>,
}

impl fmt::Display for SendReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Sent {} frame(s), received {} message(s)", self.sent, self.received.len())?;
        for msg in &self.received {
            writeln!(f, "  {}", describe_message(msg))?;
        }
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────
// Event Helpers
// ─────────────────────────────────────────────────────────────────

/// Wait until `deadline` for the next inbound message
///
/// Non-message events are logged and skipped. A closed session is an error.
async fn next_message(
    events: &mut mpsc::Receiver<SessionEvent>,
    deadline: Instant,
) -> Result<Option<InboundMessage>> {
    loop {
        let event = match tokio::time::timeout_at(deadline, events.recv()).await {
            Ok(Some(event)) => event,
            Ok(None) => return Err(Error::connection_lost("event stream ended")),
            Err(_) => return Ok(None),
        };

        match event {
            SessionEvent::Message(msg) => return Ok(Some(msg)),
            SessionEvent::StaleConnection(warning) => {
                warn!(missed_acks = warning.missed_acks, "Connection may be stale");
            }
            SessionEvent::Error { message, .. } => warn!(error = %message, "Session error"),
            SessionEvent::Closed { reason } => {
                return Err(Error::connection_lost(reason.to_string()));
            }
        }
    }
}

/// Collect every message that arrives within `window`
async fn collect_for(
    events: &mut mpsc::Receiver<SessionEvent>,
    window: Duration,
) -> Result<Vec<InboundMessage>> {
    let deadline = Instant::now() + window;
    let mut received = Vec::new();
    while let Some(msg) = next_message(events, deadline).await? {
        received.push(msg);
    }
    Ok(received)
}

// ─────────────────────────────────────────────────────────────────
// Probe
// ─────────────────────────────────────────────────────────────────

/// Run the scripted exchange
///
/// Sends `message` and `ping`, optionally idles, then sends `heartbeat`,
/// `message` and `ping`. The session is closed before returning.
pub async fn run_probe(url: &str, config: SessionConfig, options: &ProbeOptions) -> Result<ProbeReport> {
    let session = Session::connect(url, config).await?;
    let result = probe_session(&session, options).await;
    session.close().await?;
    result
}

async fn probe_session(session: &Session, options: &ProbeOptions) -> Result<ProbeReport> {
    let mut events = session
        .take_events()
        .ok_or_else(|| Error::Internal("session events already taken".to_string()))?;
    let mut report = ProbeReport {
        connection_id: session.connection_id(),
        ..Default::default()
    };

    if let Some(msg) = next_message(&mut events, Instant::now() + options.response_timeout).await? {
        report.record(&msg);
        report.welcome = Some(msg);
    }

    let first_half = [
        OutboundMessage::message("Hello, hibernation test!"),
        OutboundMessage::ping(),
    ];
    for message in first_half {
        probe_step(session, &mut events, &mut report, message, options).await?;
    }

    if !options.idle.is_zero() {
        info!(idle_secs = options.idle.as_secs(), "Idling");
        let idle = collect_for(&mut events, options.idle).await?;
        for msg in &idle {
            report.record(msg);
        }
        report.during_idle = idle;
    }

    let second_half = [
        OutboundMessage::heartbeat(),
        OutboundMessage::message("Testing after hibernation period"),
        OutboundMessage::ping(),
    ];
    for message in second_half {
        probe_step(session, &mut events, &mut report, message, options).await?;
    }

    Ok(report)
}

async fn probe_step(
    session: &Session,
    events: &mut mpsc::Receiver<SessionEvent>,
    report: &mut ProbeReport,
    message: OutboundMessage,
    options: &ProbeOptions,
) -> Result<()> {
    let sent = message.kind();
    session.send(message).await?;
    debug!(message_type = sent, "Probe step sent");

    let reply = next_message(events, Instant::now() + options.response_timeout).await?;
    if let Some(ref msg) = reply {
        report.record(msg);
    }
    report.steps.push(ProbeStep { sent, reply });
    Ok(())
}

// ─────────────────────────────────────────────────────────────────
// Raw Sender
// ─────────────────────────────────────────────────────────────────

/// Send each text verbatim, then collect replies for `wait`
///
/// The welcome is not included in the replies.
pub async fn run_send(url: &str, config: SessionConfig, texts: &[String], wait: Duration) -> Result<SendReport> {
    let session = Session::connect(url, config).await?;
    let result = send_texts(&session, texts, wait).await;
    session.close().await?;
    result
}

async fn send_texts(session: &Session, texts: &[String], wait: Duration) -> Result<SendReport> {
    let mut events = session
        .take_events()
        .ok_or_else(|| Error::Internal("session events already taken".to_string()))?;
    let mut report = SendReport::default();

    for text in texts {
        session.send_text(text.as_str()).await?;
        report.sent += 1;
    }

    report.received = collect_for(&mut events, wait)
        .await?
        .into_iter()
        .filter(|msg| !matches!(msg, InboundMessage::Welcome { .. }))
        .collect();
    Ok(report)
}
