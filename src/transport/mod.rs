//! # Transport
//!
//! Moves envelopes between two actor systems over any ordered byte stream: TCP in
//! production, `tokio::io::duplex` in tests.
//!
//! - [`frame`]: length-prefixed framing.
//! - [`channel`]: handshake, single writer, ordered reader, pending-call bookkeeping.

pub mod channel;
pub mod frame;

pub use channel::{Channel, InboundHandler};
