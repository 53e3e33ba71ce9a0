//! WebSocket session client
//!
//! Provides a single-connection session with:
//! - Welcome handshake and negotiated heartbeat interval
//! - Heartbeat keep-alive with stale connection detection
//! - Classified inbound messages delivered as events
//! - Bounded, idempotent shutdown

use std::sync::Arc;
use std::time::Duration;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use parking_lot::{Mutex, RwLock};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch, Mutex as AsyncMutex};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_tungstenite::{
    connect_async,
    tungstenite::Message as WsMessage,
    MaybeTlsStream, WebSocketStream,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::error::{Error, Result};
use crate::protocol::{InboundMessage, OutboundMessage, DEFAULT_HEARTBEAT_INTERVAL};

use super::{CloseReason, LivenessTracker, SessionEvent, SessionState};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, WsMessage>;
type WsSource = SplitStream<WsStream>;

// ─────────────────────────────────────────────────────────────────
// Configuration
// ─────────────────────────────────────────────────────────────────

/// Timing and buffering for a session
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Limit on the TCP/TLS/upgrade handshake
    pub connect_timeout: Duration,

    /// How long `connect` waits for the welcome frame
    pub welcome_timeout: Duration,

    /// Heartbeat interval when the server never announces one
    pub default_heartbeat_interval: Duration,

    /// Unanswered heartbeats tolerated before a stale warning
    pub missed_ack_limit: u32,

    /// Upper bound on each shutdown step
    pub close_grace: Duration,

    /// Capacity of the event channel
    pub event_queue_size: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            welcome_timeout: Duration::from_secs(5),
            default_heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
            missed_ack_limit: 3,
            close_grace: Duration::from_secs(1),
            event_queue_size: 64,
        }
    }
}

// ─────────────────────────────────────────────────────────────────
// Shared State
// ─────────────────────────────────────────────────────────────────

#[derive(Debug)]
struct SessionShared {
    state: SessionState,
    connection_id: Option<String>,
    /// `None` until the welcome arrives or the welcome wait gives up
    heartbeat_interval: Option<Duration>,
    liveness: LivenessTracker,
    heartbeats_sent: u64,
    events_dropped: u64,
    /// Set while the event queue is rejecting events
    dropping: bool,
}

/// State reachable from the background tasks
struct SessionInner {
    url: String,
    config: SessionConfig,
    shared: RwLock<SessionShared>,
    sink: AsyncMutex<WsSink>,
    event_tx: mpsc::Sender<SessionEvent>,
    /// Session lifetime; cancelled by `close` and on drop
    cancel: CancellationToken,
    /// Child of `cancel` that stops the receive and heartbeat loops
    io_cancel: CancellationToken,
    interval_tx: watch::Sender<Option<Duration>>,
}

impl SessionInner {
    fn state(&self) -> SessionState {
        self.shared.read().state
    }

    /// Classify a text frame and apply its session side effects
    fn dispatch(&self, raw_frame: &str) -> InboundMessage {
        let msg = InboundMessage::parse(raw_frame);
        self.apply(&msg);
        msg
    }

    fn dispatch_bytes(&self, raw_frame: &[u8]) -> InboundMessage {
        let msg = InboundMessage::parse_bytes(raw_frame);
        self.apply(&msg);
        msg
    }

    fn apply(&self, msg: &InboundMessage) {
        match msg {
            InboundMessage::Welcome {
                connection_id,
                heartbeat_interval,
                ..
            } => self.apply_welcome(connection_id, *heartbeat_interval),
            m if m.is_liveness() => {
                self.shared.write().liveness.record_liveness(Instant::now());
                debug!(message_type = %m.kind(), "Liveness response received");
            }
            m if m.is_unknown() => {
                debug!(message_type = %m.kind(), "Unrecognized message type");
            }
            m => debug!(message_type = %m.kind(), "Received message"),
        }
    }

    fn apply_welcome(&self, connection_id: &str, interval: Duration) {
        let resolved = {
            let mut shared = self.shared.write();
            if let Some(existing) = &shared.connection_id {
                warn!(
                    connection_id = %existing,
                    ignored = %connection_id,
                    "Duplicate welcome ignored"
                );
                return;
            }
            shared.connection_id = Some(connection_id.to_string());

            // A late welcome keeps the interval the heartbeat already runs on
            if shared.heartbeat_interval.is_none() {
                shared.heartbeat_interval = Some(interval);
                shared.liveness.set_interval(interval);
                true
            } else {
                false
            }
        };

        info!(
            connection_id = %connection_id,
            heartbeat_interval_ms = interval.as_millis() as u64,
            "Welcome received"
        );
        if resolved {
            self.interval_tx.send_replace(Some(interval));
        }
    }

    fn resolve_default_interval(&self) {
        let interval = self.config.default_heartbeat_interval;
        {
            let mut shared = self.shared.write();
            if shared.heartbeat_interval.is_some() {
                return;
            }
            shared.heartbeat_interval = Some(interval);
            shared.liveness.set_interval(interval);
        }
        self.interval_tx.send_replace(Some(interval));
    }

    /// Deliver an event, waiting for queue capacity unless the loops are stopping
    async fn emit(&self, event: SessionEvent) {
        tokio::select! {
            result = self.event_tx.send(event) => {
                if result.is_err() {
                    debug!("Event receiver dropped");
                }
            }
            _ = self.io_cancel.cancelled() => {}
        }
    }

    /// Deliver an event without waiting; a full queue drops it
    fn offer(&self, event: SessionEvent) {
        match self.event_tx.try_send(event) {
            Ok(()) => {
                let mut shared = self.shared.write();
                if shared.dropping {
                    shared.dropping = false;
                    info!(dropped_total = shared.events_dropped, "Event delivery resumed");
                }
            }
            Err(mpsc::error::TrySendError::Full(_)) => {
                let mut shared = self.shared.write();
                shared.events_dropped += 1;
                if !shared.dropping {
                    shared.dropping = true;
                    warn!(
                        capacity = self.config.event_queue_size,
                        "Event queue full, dropping events until it drains"
                    );
                }
            }
            Err(mpsc::error::TrySendError::Closed(_)) => debug!("Event receiver dropped"),
        }
    }

    async fn write_frame(&self, frame: WsMessage) -> Result<()> {
        let mut sink = self.sink.lock().await;

        // Re-checked under the lock so nothing is written once closing starts
        let state = self.state();
        if !state.is_open() {
            return Err(Error::NotConnected { state });
        }

        sink.send(frame)
            .await
            .map_err(|e| Error::connection_lost(e.to_string()))
    }

    async fn write_message(&self, message: &OutboundMessage) -> Result<()> {
        let json = message.to_json()?;
        self.write_frame(WsMessage::Text(json)).await
    }

    /// The peer or transport ended the connection
    async fn finish(&self, reason: CloseReason, error_message: Option<String>) {
        {
            let mut shared = self.shared.write();
            if shared.state != SessionState::Open {
                return;
            }
            shared.state = SessionState::Closed;
        }

        info!(reason = %reason, "Session ended");
        if let Some(message) = error_message {
            self.emit(SessionEvent::Error { message, fatal: true }).await;
        }
        self.emit(SessionEvent::Closed { reason }).await;
        self.io_cancel.cancel();
    }
}

// ─────────────────────────────────────────────────────────────────
// Session
// ─────────────────────────────────────────────────────────────────

/// A live WebSocket session
///
/// Created by [`Session::connect`]. Events are read either through
/// [`Session::take_events`] or by registering a callback with
/// [`Session::on_message`]. Dropping the session stops its tasks.
pub struct Session {
    inner: Arc<SessionInner>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    events: Mutex<Option<mpsc::Receiver<SessionEvent>>>,
    forwarder: Mutex<Option<JoinHandle<()>>>,
}

impl Session {
    /// Open a session and wait for the server's welcome
    ///
    /// Returns once the welcome has been processed, or once
    /// `welcome_timeout` passes, in which case the session stays open
    /// with the default heartbeat interval.
    pub async fn connect(url: &str, config: SessionConfig) -> Result<Session> {
        let parsed = Url::parse(url).map_err(|e| Error::invalid_url(url, e.to_string()))?;
        if !matches!(parsed.scheme(), "ws" | "wss") {
            return Err(Error::invalid_url(url, "scheme must be ws or wss"));
        }

        info!(url = %parsed, "Connecting");

        let ws_stream = match tokio::time::timeout(config.connect_timeout, connect_async(parsed.as_str())).await
        {
            Ok(Ok((stream, _response))) => stream,
            Ok(Err(e)) => {
                error!(url = %url, error = %e, "Connection failed");
                return Err(Error::connection_failed(url, e.to_string()));
            }
            Err(_) => {
                error!(url = %url, "Connection timed out");
                return Err(Error::connection_timeout(
                    url,
                    config.connect_timeout.as_millis() as u64,
                ));
            }
        };
        info!("WebSocket connection established");

        let (write, read) = ws_stream.split();
        let (event_tx, event_rx) = mpsc::channel(config.event_queue_size.max(1));
        let (interval_tx, interval_rx) = watch::channel(None);
        let cancel = CancellationToken::new();
        let io_cancel = cancel.child_token();

        let liveness = LivenessTracker::new(config.default_heartbeat_interval, config.missed_ack_limit);
        let inner = Arc::new(SessionInner {
            url: url.to_string(),
            config,
            shared: RwLock::new(SessionShared {
                state: SessionState::Open,
                connection_id: None,
                heartbeat_interval: None,
                liveness,
                heartbeats_sent: 0,
                events_dropped: 0,
                dropping: false,
            }),
            sink: AsyncMutex::new(write),
            event_tx,
            cancel,
            io_cancel,
            interval_tx,
        });

        let receiver = tokio::spawn(run_receive_loop(inner.clone(), read));
        let heartbeat = tokio::spawn(run_heartbeat_loop(inner.clone(), interval_rx.clone()));

        let session = Session {
            inner,
            tasks: Mutex::new(vec![receiver, heartbeat]),
            events: Mutex::new(Some(event_rx)),
            forwarder: Mutex::new(None),
        };

        session.wait_for_welcome(interval_rx).await?;
        Ok(session)
    }

    async fn wait_for_welcome(&self, mut interval_rx: watch::Receiver<Option<Duration>>) -> Result<()> {
        let timeout = self.inner.config.welcome_timeout;

        tokio::select! {
            biased;
            received = async { interval_rx.wait_for(Option::is_some).await.map(|_| ()) } => {
                if received.is_err() {
                    return Err(Error::Internal("welcome channel closed".to_string()));
                }
                Ok(())
            }
            _ = self.inner.io_cancel.cancelled() => {
                self.close().await?;
                Err(Error::connection_failed(
                    &self.inner.url,
                    "connection closed before welcome",
                ))
            }
            _ = tokio::time::sleep(timeout) => {
                warn!(
                    timeout_ms = timeout.as_millis() as u64,
                    "No welcome received, using default heartbeat interval"
                );
                self.inner.resolve_default_interval();
                Ok(())
            }
        }
    }

    // ─────────────────────────────────────────────────────────────
    // Accessors
    // ─────────────────────────────────────────────────────────────

    pub fn url(&self) -> &str {
        &self.inner.url
    }

    pub fn state(&self) -> SessionState {
        self.inner.state()
    }

    /// Identity assigned by the server's welcome
    pub fn connection_id(&self) -> Option<String> {
        self.inner.shared.read().connection_id.clone()
    }

    /// Interval the heartbeat runs on, once known
    pub fn heartbeat_interval(&self) -> Option<Duration> {
        self.inner.shared.read().heartbeat_interval
    }

    /// When the last pong or heartbeat ack arrived
    pub fn last_liveness(&self) -> Option<Instant> {
        self.inner.shared.read().liveness.last_liveness()
    }

    pub fn heartbeats_sent(&self) -> u64 {
        self.inner.shared.read().heartbeats_sent
    }

    /// Events discarded because the event queue was full
    pub fn events_dropped(&self) -> u64 {
        self.inner.shared.read().events_dropped
    }

    pub fn is_open(&self) -> bool {
        self.state().is_open()
    }

    // ─────────────────────────────────────────────────────────────
    // Events
    // ─────────────────────────────────────────────────────────────

    /// Take the event receiver
    ///
    /// Returns `None` if it was already taken or handed to `on_message`.
    /// Until the receiver is drained, events beyond `event_queue_size` are
    /// dropped; frames are still read and heartbeats still sent.
    pub fn take_events(&self) -> Option<mpsc::Receiver<SessionEvent>> {
        self.events.lock().take()
    }

    /// Deliver every event to `callback` on a background task
    ///
    /// Events arriving before registration are buffered and delivered
    /// first. The callback stops being invoked once the session is closed.
    pub fn on_message<F>(&self, mut callback: F) -> Result<()>
    where
        F: FnMut(&SessionEvent) + Send + 'static,
    {
        let mut rx = self
            .take_events()
            .ok_or_else(|| Error::Internal("event receiver already taken".to_string()))?;
        let cancel = self.inner.cancel.clone();

        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    event = rx.recv() => match event {
                        Some(event) => callback(&event),
                        None => break,
                    },
                    _ = cancel.cancelled() => {
                        while let Ok(event) = rx.try_recv() {
                            callback(&event);
                        }
                        break;
                    }
                }
            }
        });

        *self.forwarder.lock() = Some(handle);
        Ok(())
    }

    /// Handle a text frame as if it had arrived on the connection
    ///
    /// Never fails: unparseable text comes back as `Raw`, unrecognized
    /// types as `Unknown`. The frame is not forwarded as an event.
    pub fn dispatch(&self, raw_frame: &str) -> InboundMessage {
        self.inner.dispatch(raw_frame)
    }

    // ─────────────────────────────────────────────────────────────
    // Sending
    // ─────────────────────────────────────────────────────────────

    /// Serialize and send a message
    pub async fn send(&self, message: OutboundMessage) -> Result<()> {
        let state = self.state();
        if !state.is_open() {
            return Err(Error::NotConnected { state });
        }

        self.inner.write_message(&message).await?;
        debug!(message_type = message.kind(), "Sent message");
        Ok(())
    }

    /// Send a text frame exactly as given
    pub async fn send_text(&self, text: impl Into<String>) -> Result<()> {
        let state = self.state();
        if !state.is_open() {
            return Err(Error::NotConnected { state });
        }

        self.inner.write_frame(WsMessage::Text(text.into())).await?;
        debug!("Sent raw text frame");
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────
    // Shutdown
    // ─────────────────────────────────────────────────────────────

    /// Close the session
    ///
    /// Stops both background tasks, sends a close frame if the connection
    /// was still open, and emits a final `Closed` event. Each step is
    /// bounded by `close_grace`. Calling it again is a no-op.
    pub async fn close(&self) -> Result<()> {
        let was_open = {
            let mut shared = self.inner.shared.write();
            match shared.state {
                SessionState::Closing => return Ok(()),
                SessionState::Closed => false,
                _ => {
                    shared.state = SessionState::Closing;
                    true
                }
            }
        };

        let tasks = std::mem::take(&mut *self.tasks.lock());
        if !was_open && tasks.is_empty() {
            return Ok(());
        }

        let grace = self.inner.config.close_grace;
        self.inner.io_cancel.cancel();
        join_bounded(tasks, grace).await;

        if was_open {
            let sent = tokio::time::timeout(grace, async {
                let mut sink = self.inner.sink.lock().await;
                sink.send(WsMessage::Close(None)).await
            })
            .await;

            match sent {
                Ok(Ok(())) => debug!("Close frame sent"),
                Ok(Err(e)) => debug!(error = %e, "Close frame not delivered"),
                Err(_) => warn!("Timed out sending close frame"),
            }

            self.inner.shared.write().state = SessionState::Closed;
            info!(connection_id = ?self.connection_id(), "Session closed");
            self.inner.offer(SessionEvent::Closed {
                reason: CloseReason::Local,
            });
        }

        self.inner.cancel.cancel();
        let forwarder = self.forwarder.lock().take();
        if let Some(handle) = forwarder {
            join_bounded(vec![handle], grace).await;
        }

        Ok(())
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.inner.cancel.cancel();
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let shared = self.inner.shared.read();
        f.debug_struct("Session")
            .field("url", &self.inner.url)
            .field("state", &shared.state)
            .field("connection_id", &shared.connection_id)
            .field("heartbeat_interval", &shared.heartbeat_interval)
            .finish()
    }
}

/// Wait for tasks up to `grace`, aborting any still running
async fn join_bounded(handles: Vec<JoinHandle<()>>, grace: Duration) {
    let deadline = Instant::now() + grace;
    for mut handle in handles {
        match tokio::time::timeout_at(deadline, &mut handle).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) if e.is_panic() => error!(error = %e, "Session task panicked"),
            Ok(Err(_)) => {}
            Err(_) => {
                warn!("Session task did not stop in time, aborting");
                handle.abort();
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────
// Background Tasks
// ─────────────────────────────────────────────────────────────────

async fn run_receive_loop(inner: Arc<SessionInner>, mut read: WsSource) {
    loop {
        let frame = tokio::select! {
            _ = inner.io_cancel.cancelled() => {
                debug!("Receive loop cancelled");
                return;
            }
            frame = read.next() => frame,
        };

        let msg = match frame {
            Some(Ok(WsMessage::Text(text))) => inner.dispatch(&text),
            Some(Ok(WsMessage::Binary(data))) => inner.dispatch_bytes(&data),
            // tungstenite answers pings itself
            Some(Ok(WsMessage::Ping(_))) | Some(Ok(WsMessage::Pong(_))) | Some(Ok(WsMessage::Frame(_))) => {
                continue
            }
            Some(Ok(WsMessage::Close(frame))) => {
                let reason = match frame {
                    Some(frame) => CloseReason::Remote {
                        code: Some(u16::from(frame.code)),
                        reason: frame.reason.into_owned(),
                    },
                    None => CloseReason::Remote {
                        code: None,
                        reason: String::new(),
                    },
                };
                inner.finish(reason, None).await;
                return;
            }
            Some(Err(e)) => {
                error!(error = %e, "WebSocket error");
                let message = e.to_string();
                inner
                    .finish(CloseReason::TransportError(message.clone()), Some(message))
                    .await;
                return;
            }
            None => {
                info!("WebSocket stream ended");
                inner.finish(CloseReason::StreamEnded, None).await;
                return;
            }
        };

        inner.offer(SessionEvent::Message(msg));
    }
}

async fn run_heartbeat_loop(
    inner: Arc<SessionInner>,
    mut interval_rx: watch::Receiver<Option<Duration>>,
) {
    let cancel = inner.io_cancel.clone();

    let interval = tokio::select! {
        _ = cancel.cancelled() => return,
        resolved = async { interval_rx.wait_for(Option::is_some).await.map(|v| *v) } => {
            match resolved {
                Ok(Some(interval)) => interval,
                _ => return,
            }
        }
    };

    info!(interval_ms = interval.as_millis() as u64, "Heartbeat started");

    let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        if !inner.state().is_open() {
            break;
        }

        let warning = inner.shared.write().liveness.check(Instant::now());
        if let Some(warning) = warning {
            warn!(
                silent_for_ms = warning.silent_for.as_millis() as u64,
                missed_acks = warning.missed_acks,
                "No heartbeat response, connection may be stale"
            );
            inner.offer(SessionEvent::StaleConnection(warning));
        }

        let heartbeat = OutboundMessage::heartbeat();
        let sent = tokio::select! {
            _ = cancel.cancelled() => break,
            sent = inner.write_message(&heartbeat) => sent,
        };

        match sent {
            Ok(()) => {
                let mut shared = inner.shared.write();
                shared.liveness.record_heartbeat_sent(Instant::now());
                shared.heartbeats_sent += 1;
                debug!(count = shared.heartbeats_sent, "Sent heartbeat");
            }
            Err(Error::NotConnected { .. }) => break,
            Err(e) => warn!(error = %e, "Failed to send heartbeat"),
        }
    }

    debug!("Heartbeat stopped");
}
