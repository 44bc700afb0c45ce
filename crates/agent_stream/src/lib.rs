//! Wire-level decoding for the generation event stream.
//!
//! This crate owns SSE framing and the typed event union only. It contains
//! no transport code: callers hand in byte chunks as they arrive and drain
//! decoded events. Malformed payloads cost at most one event, never the
//! stream.

pub mod events;
pub mod sse;

pub use events::{StreamEvent, TextChannel};
pub use sse::{SseDecoder, END_OF_STREAM_SENTINEL};
