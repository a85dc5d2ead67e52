//! # braid-engine
//!
//! Realtime session event reconciliation engine.
//!
//! One multiplexed per-user event stream reports progress for many
//! concurrent agent sessions. This crate turns that unreliable,
//! interleaved, at-least-once feed into consistent client state:
//!
//! - **[`transport`]**: the seam to the long-lived per-user connection
//! - **[`router`]**: the firehose — validates envelopes and fans accepted
//!   events out to the downstream consumers, synchronously, in arrival order
//! - **[`merger`]**: pure reducer turning fragment events into canonical,
//!   deduplicated, append-consistent messages
//! - **[`reconcile`]**: optimistic-session identity reconciliation
//!   (provisional → confirmed, exactly once)
//! - **[`buckets`]**: per-session (status, read-state) machine with a
//!   stable processing-order list
//! - **[`debounce`]**: per-key cancellable timer table for coalesced
//!   derived-state refreshes
//! - **[`projection`]**: read-side turn grouping, rebuildable at any time
//! - **[`engine`]**: the façade wiring all of the above together
//!
//! All mutation happens synchronously inside dispatch under one lock;
//! collaborator I/O (plan refetches, directory calls) is fire-and-forget
//! and never blocks event processing.

#![deny(unsafe_code)]

pub mod buckets;
pub mod collaborators;
pub mod debounce;
pub mod engine;
pub mod errors;
pub mod merger;
pub mod projection;
pub mod reconcile;
pub mod router;
pub mod settings;
pub mod store;
pub mod transport;

pub use buckets::SessionBuckets;
pub use collaborators::{PlanService, SessionDirectory, SessionRecord, ToolJobDispatcher};
pub use debounce::DebounceTable;
pub use engine::{Engine, EngineDeps};
pub use errors::{EngineError, Result};
pub use merger::ScopeFilter;
pub use projection::{TurnGroup, project};
pub use reconcile::IdentityReconciler;
pub use router::{EventRouter, Subscription};
pub use settings::EngineSettings;
pub use store::SessionStore;
pub use transport::{ChannelTransport, RawEnvelope, Transport};
