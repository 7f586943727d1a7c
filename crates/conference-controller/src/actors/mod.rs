//! Actor model implementation for the Conference Controller.
//!
//! ```text
//! ConferenceRegistryActor (singleton per instance)
//! ├── owns the slug and join code registries
//! └── supervises N ConferenceActors
//!     └── ConferenceActor (one per live platform session)
//!         ├── owns the session's participants
//!         └── arms one CleanupTimer per participant
//! ```
//!
//! # Key Design Decisions
//!
//! - **Single writer per key**: slugs and codes belong to the registry,
//!   participants to their conference actor
//! - **Registry never awaits a conference**: conferences call the registry
//!   when they close, never the other way round
//! - **CancellationToken propagation**: the registry passes child tokens to
//!   conferences, conferences pass child tokens to cleanup timers
//! - **Message passing**: all inter-actor communication via `tokio::sync::mpsc`
//!
//! # Modules
//!
//! - [`registry`] - `ConferenceRegistryActor` singleton
//! - [`conference`] - `ConferenceActor` per live session
//! - [`cleanup`] - Participant cleanup timers
//! - [`messages`] - Message types for actor communication
//! - [`metrics`] - Actor counters mirrored to Prometheus

pub mod cleanup;
pub mod conference;
pub mod messages;
pub mod metrics;
pub mod registry;

// Re-export primary types
pub use conference::{ConferenceActor, ConferenceActorHandle, ConferenceSettings};
pub use messages::*;
pub use metrics::ActorMetrics;
pub use registry::{ConferenceRegistryActor, ConferenceRegistryHandle, RegistrySettings};
