//! WebSocket session management
//!
//! A `Session` owns one connection and runs two tasks against it:
//! - a receive loop that classifies inbound frames and forwards them as events
//! - a heartbeat loop that keeps the connection alive and flags staleness
//!
//! Both tasks stop as soon as the session is closed.

mod client;
mod events;
mod liveness;
mod state;

pub use client::*;
pub use events::*;
pub use liveness::*;
pub use state::*;
