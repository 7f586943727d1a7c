//! Actor metrics.
//!
//! Counters are mirrored into Prometheus gauges (`cc_` prefix) through
//! [`crate::observability::metrics`].

use crate::observability::metrics as prom;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

/// Actor type for metrics labeling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActorType {
    /// ConferenceRegistryActor (singleton).
    Registry,
    /// ConferenceActor (one per live session).
    Conference,
}

impl ActorType {
    /// Returns the actor type as a string for metric labels.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            ActorType::Registry => "registry",
            ActorType::Conference => "conference",
        }
    }
}

/// Aggregated metrics for the actor system, shared by every actor.
#[derive(Debug, Default)]
pub struct ActorMetrics {
    /// Conferences currently live.
    pub active_conferences: AtomicUsize,
    /// Participants currently admitted, across all conferences.
    pub active_participants: AtomicUsize,
    /// Total actor panics (indicates bugs).
    pub actor_panics: AtomicU64,
    /// Total messages processed across all actors.
    pub total_messages_processed: AtomicU64,
}

impl ActorMetrics {
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn conference_created(&self) {
        let count = self.active_conferences.fetch_add(1, Ordering::Relaxed) + 1;
        prom::set_conferences_active(count);
    }

    pub fn conference_removed(&self) {
        let count = self
            .active_conferences
            .fetch_sub(1, Ordering::Relaxed)
            .saturating_sub(1);
        prom::set_conferences_active(count);
    }

    pub fn participant_admitted(&self) {
        let count = self.active_participants.fetch_add(1, Ordering::Relaxed) + 1;
        prom::set_participants_active(count);
    }

    pub fn participant_removed(&self) {
        let count = self
            .active_participants
            .fetch_sub(1, Ordering::Relaxed)
            .saturating_sub(1);
        prom::set_participants_active(count);
    }

    /// Record an actor panic.
    pub fn record_panic(&self, actor_type: ActorType) {
        self.actor_panics.fetch_add(1, Ordering::Relaxed);
        prom::record_actor_panic(actor_type.as_str());
        tracing::error!(
            target: "cc.actor.panic",
            actor_type = actor_type.as_str(),
            total_panics = self.actor_panics.load(Ordering::Relaxed),
            "Actor panic detected - indicates bug, investigation required"
        );
    }

    pub fn record_message_processed(&self) {
        self.total_messages_processed
            .fetch_add(1, Ordering::Relaxed);
    }

    #[must_use]
    pub fn conference_count(&self) -> usize {
        self.active_conferences.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn participant_count(&self) -> usize {
        self.active_participants.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_actor_type_labels() {
        assert_eq!(ActorType::Registry.as_str(), "registry");
        assert_eq!(ActorType::Conference.as_str(), "conference");
    }

    #[test]
    fn test_actor_metrics_counts() {
        let metrics = ActorMetrics::new();

        metrics.conference_created();
        metrics.participant_admitted();
        metrics.participant_admitted();
        metrics.participant_removed();

        assert_eq!(metrics.conference_count(), 1);
        assert_eq!(metrics.participant_count(), 1);

        metrics.conference_removed();
        assert_eq!(metrics.conference_count(), 0);

        metrics.record_panic(ActorType::Conference);
        assert_eq!(metrics.actor_panics.load(Ordering::Relaxed), 1);

        metrics.record_message_processed();
        metrics.record_message_processed();
        assert_eq!(metrics.total_messages_processed.load(Ordering::Relaxed), 2);
    }
}
