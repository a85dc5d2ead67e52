//! # braid-events
//!
//! Wire event model for the Braid firehose.
//!
//! - **[`EventType`]**: the seven stream event discriminators with exact
//!   wire strings (`"chunk"`, `"tool_call"`, ...)
//! - **[`StreamEvent`]**: flat struct mirroring the inbound envelope shape,
//!   with typed optional payload fields
//! - **Envelope parsing**: [`StreamEvent::from_envelope`] validates and
//!   rejects malformed or unaddressed envelopes
//! - **[`SeenEvents`]**: bounded recently-seen-ID window backing the
//!   at-most-once consumption guarantee
//!
//! The transport guarantees only at-least-once, possibly out-of-order,
//! possibly duplicated delivery; everything in this crate exists to make
//! consumption of that feed idempotent and order-tolerant.

#![deny(unsafe_code)]

pub mod dedup;
pub mod envelope;
pub mod errors;
pub mod event_type;

pub use dedup::SeenEvents;
pub use envelope::{StreamEvent, ToolCallPayload, ToolResultPayload};
pub use errors::{EventError, Result};
pub use event_type::EventType;
