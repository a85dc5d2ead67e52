//! # braid-core
//!
//! Foundation types, branded IDs, and logging for the Braid engine.
//!
//! This crate provides the shared vocabulary the other Braid crates depend on:
//!
//! - **Branded IDs**: `EventId`, `SessionId`, `MessageId`, `ToolCallId`,
//!   `UserId` as newtypes for type safety
//! - **Content parts**: `ContentPart` enum covering text fragments, tool
//!   invocations, and tool results
//! - **Messages**: the canonical `Message` owned by the timeline merger
//! - **Sessions**: `Session` with its provisional/confirmed identity tag,
//!   plus the bucket classification types
//! - **Plan state**: mergeable per-session derived checklist state
//! - **Logging**: `tracing` subscriber setup

#![deny(unsafe_code)]

pub mod content;
pub mod ids;
pub mod logging;
pub mod message;
pub mod plan;
pub mod session;

pub use content::ContentPart;
pub use ids::{EventId, MessageId, SessionId, ToolCallId, UserId};
pub use message::{Message, Role};
pub use plan::{PlanPatch, PlanState, PlanTask};
pub use session::{
    BucketEntry, BucketStatus, IdentityState, ReadState, Session, SessionStatus,
};
