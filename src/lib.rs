//! ws-session: a WebSocket client session with heartbeat keep-alive
//!
//! The [`Session`] type owns one connection. It reads the server's welcome,
//! runs a heartbeat on the negotiated interval, classifies inbound frames
//! and reports them as [`SessionEvent`]s, and shuts down within a bounded
//! grace period.
//!
//! ```no_run
//! use ws_session::{OutboundMessage, Session, SessionConfig};
//!
//! # async fn demo() -> ws_session::Result<()> {
//! let session = Session::connect("ws://localhost:8788/websocket", SessionConfig::default()).await?;
//! session.on_message(|event| println!("{:?}", event))?;
//! session.send(OutboundMessage::ping()).await?;
//! session.close().await?;
//! # Ok(())
//! # }
//! ```

pub mod cli;
pub mod config;
pub mod console;
pub mod error;
pub mod logging;
pub mod probe;
pub mod protocol;
pub mod session;
pub mod version;

pub use error::{Error, Result};
pub use protocol::{InboundMessage, OutboundMessage};
pub use session::{CloseReason, Session, SessionConfig, SessionEvent, SessionState};
