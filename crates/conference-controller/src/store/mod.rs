//! Conference state stores.
//!
//! Plain data structures with no I/O. Each store is owned by exactly one
//! actor, which is what makes its invariants hold:
//!
//! - [`identifiers`] - slug and join code registries (owned by the registry actor)
//! - [`participants`] - per-session participant records (owned by a conference actor)

pub mod identifiers;
pub mod participants;

pub use identifiers::{IdentifierRegistry, JoinCode, JoinCodeGenerator, Slug};
pub use participants::{Participant, ParticipantStatus, ParticipantStore, SubscriptionTarget};
