//! Conference Controller Service Library
//!
//! Coordinates multi-party conferences on top of an external real-time media
//! platform:
//!
//! - Conference lifecycle: create by name (slug), lazy creation on first web
//!   join, numeric join codes for telephone entry, teardown when empty
//! - Participant lifecycle: admission (web or phone), pending → connected,
//!   safety-net cleanup timers, idempotent leave
//! - Subscription fan-out: new participants catch up on every published
//!   stream, new streams reach every connected participant
//!
//! # Architecture
//!
//! State is owned by actors, one writer per key:
//!
//! ```text
//! ConferenceRegistryActor (singleton)
//! ├── slug registry + join code registry
//! └── supervises N ConferenceActors
//!     └── ConferenceActor (one per live platform session)
//!         ├── owns the ParticipantStore
//!         ├── arms one CleanupTimer per participant
//!         └── spawns fan-out tasks after each committed mutation
//! ```
//!
//! HTTP requests and platform callbacks enter through `routes` → `handlers`
//! and are turned into actor messages.
//!
//! # Modules
//!
//! - [`actors`] - Registry and per-conference actors
//! - [`config`] - Service configuration from environment
//! - [`errors`] - Error types with HTTP status mapping
//! - [`fanout`] - Concurrent subscribe issuing with isolated failures
//! - [`handlers`] - HTTP handlers for the API and callbacks
//! - [`middleware`] - HTTP metrics middleware
//! - [`models`] - Request, response and notification bodies
//! - [`observability`] - Metrics and health endpoints
//! - [`platform`] - Media platform boundary (HTTP client and mock)
//! - [`routes`] - Router and application state
//! - [`store`] - Identifier registries and participant store

pub mod actors;
pub mod config;
pub mod errors;
pub mod fanout;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod observability;
pub mod platform;
pub mod routes;
pub mod store;
