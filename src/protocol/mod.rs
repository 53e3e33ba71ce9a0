//! Wire protocol for the session
//!
//! JSON objects over WebSocket text frames, discriminated by a `type` field.
//! Inbound frames are classified leniently so that message kinds the server
//! adds later still reach the caller; outbound frames are a closed set.

mod inbound;
mod outbound;

pub use inbound::*;
pub use outbound::*;
