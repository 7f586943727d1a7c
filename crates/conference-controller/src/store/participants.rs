//! Participant records for one session.
//!
//! A [`ParticipantStore`] belongs to exactly one session and is owned by that
//! session's conference actor. Because a participant record only exists
//! inside its session's store, "participant P references session S" and
//! "session S lists P" cannot disagree.
//!
//! Mutations return the subscriptions they make necessary, computed from
//! state *after* the mutation is applied:
//!
//! - [`ParticipantStore::mark_connected`] yields catch-up targets (every
//!   stream already published by someone else)
//! - [`ParticipantStore::record_stream`] yields broadcast targets (every
//!   other connected participant)

use crate::actors::cleanup::CleanupTimer;
use crate::errors::CcError;
use chrono::{DateTime, Utc};
use common::types::{JoinMode, ParticipantId, SessionId, StreamId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Connection state of a participant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParticipantStatus {
    /// Admitted, media not yet connected.
    Pending,
    /// Media connected; receives every stream in the session.
    Connected,
}

/// One subscription to issue: `subscriber` receives `stream_id`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SubscriptionTarget {
    pub subscriber: ParticipantId,
    pub publisher: ParticipantId,
    pub stream_id: StreamId,
}

/// A participant admitted to a session.
#[derive(Debug)]
pub struct Participant {
    pub participant_id: ParticipantId,
    pub session_id: SessionId,
    pub display_name: Option<String>,
    pub mode: JoinMode,
    pub status: ParticipantStatus,
    /// Streams in publication order, no duplicates.
    pub published_streams: Vec<StreamId>,
    pub joined_at: DateTime<Utc>,
    /// Safety-net timer; dropping it disarms it.
    cleanup: Option<CleanupTimer>,
}

impl Participant {
    pub fn is_connected(&self) -> bool {
        self.status == ParticipantStatus::Connected
    }

    /// Cancel the pending cleanup timer, if any.
    pub fn disarm_cleanup(&mut self) {
        if let Some(timer) = self.cleanup.take() {
            timer.disarm();
        }
    }
}

/// Participants of one session, keyed by participant ID.
#[derive(Debug)]
pub struct ParticipantStore {
    session_id: SessionId,
    participants: HashMap<ParticipantId, Participant>,
}

impl ParticipantStore {
    pub fn new(session_id: SessionId) -> Self {
        Self {
            session_id,
            participants: HashMap::new(),
        }
    }

    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    /// Add a freshly admitted participant in `Pending` state.
    ///
    /// # Errors
    ///
    /// Returns `CcError::Conflict` if the ID is already present.
    pub fn insert_pending(
        &mut self,
        participant_id: ParticipantId,
        mode: JoinMode,
        display_name: Option<String>,
        cleanup: Option<CleanupTimer>,
    ) -> Result<(), CcError> {
        if self.participants.contains_key(&participant_id) {
            return Err(CcError::Conflict(format!(
                "participant {participant_id} already in session"
            )));
        }

        self.participants.insert(
            participant_id.clone(),
            Participant {
                participant_id,
                session_id: self.session_id.clone(),
                display_name,
                mode,
                status: ParticipantStatus::Pending,
                published_streams: Vec::new(),
                joined_at: Utc::now(),
                cleanup,
            },
        );
        Ok(())
    }

    /// Mark a participant connected and return its catch-up subscriptions.
    ///
    /// Returns `None` for an unknown participant. A participant that is
    /// already connected yields no targets, so a repeated join event does not
    /// subscribe twice.
    pub fn mark_connected(
        &mut self,
        participant_id: &ParticipantId,
    ) -> Option<Vec<SubscriptionTarget>> {
        let participant = self.participants.get_mut(participant_id)?;
        if participant.is_connected() {
            return Some(Vec::new());
        }
        participant.status = ParticipantStatus::Connected;

        let targets = self
            .participants
            .values()
            .filter(|other| other.participant_id != *participant_id)
            .flat_map(|other| {
                other
                    .published_streams
                    .iter()
                    .map(|stream_id| SubscriptionTarget {
                        subscriber: participant_id.clone(),
                        publisher: other.participant_id.clone(),
                        stream_id: stream_id.clone(),
                    })
            })
            .collect();

        Some(targets)
    }

    /// Record a stream published by `publisher` and return the subscriptions
    /// that deliver it to every other connected participant.
    ///
    /// Returns `None` for an unknown publisher. A stream already recorded
    /// yields no targets.
    pub fn record_stream(
        &mut self,
        publisher: &ParticipantId,
        stream_id: StreamId,
    ) -> Option<Vec<SubscriptionTarget>> {
        let participant = self.participants.get_mut(publisher)?;
        if participant.published_streams.contains(&stream_id) {
            return Some(Vec::new());
        }
        participant.published_streams.push(stream_id.clone());

        let targets = self
            .participants
            .values()
            .filter(|other| other.participant_id != *publisher && other.is_connected())
            .map(|other| SubscriptionTarget {
                subscriber: other.participant_id.clone(),
                publisher: publisher.clone(),
                stream_id: stream_id.clone(),
            })
            .collect();

        Some(targets)
    }

    /// Remove a participant, disarming its cleanup timer.
    pub fn remove(&mut self, participant_id: &ParticipantId) -> Option<Participant> {
        let mut participant = self.participants.remove(participant_id)?;
        participant.disarm_cleanup();
        Some(participant)
    }

    /// Remove every participant, disarming their timers.
    pub fn drain(&mut self) -> Vec<Participant> {
        self.participants
            .drain()
            .map(|(_, mut participant)| {
                participant.disarm_cleanup();
                participant
            })
            .collect()
    }

    pub fn get(&self, participant_id: &ParticipantId) -> Option<&Participant> {
        self.participants.get(participant_id)
    }

    pub fn contains(&self, participant_id: &ParticipantId) -> bool {
        self.participants.contains_key(participant_id)
    }

    /// All participants, oldest first.
    pub fn participants(&self) -> Vec<&Participant> {
        let mut all: Vec<&Participant> = self.participants.values().collect();
        all.sort_by(|a, b| {
            a.joined_at
                .cmp(&b.joined_at)
                .then_with(|| a.participant_id.cmp(&b.participant_id))
        });
        all
    }

    pub fn connected_count(&self) -> usize {
        self.participants
            .values()
            .filter(|p| p.is_connected())
            .count()
    }

    pub fn len(&self) -> usize {
        self.participants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.participants.is_empty()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn pid(id: &str) -> ParticipantId {
        ParticipantId::new(id)
    }

    fn sid(id: &str) -> StreamId {
        StreamId::new(id)
    }

    fn store_with(ids: &[&str]) -> ParticipantStore {
        let mut store = ParticipantStore::new(SessionId::new("s-1"));
        for id in ids {
            store
                .insert_pending(pid(id), JoinMode::Web, None, None)
                .unwrap();
        }
        store
    }

    #[test]
    fn test_insert_pending_references_session() {
        let store = store_with(&["a"]);
        let participant = store.get(&pid("a")).unwrap();

        assert_eq!(participant.status, ParticipantStatus::Pending);
        assert_eq!(participant.session_id, *store.session_id());
        assert!(participant.published_streams.is_empty());
    }

    #[test]
    fn test_insert_duplicate_rejected() {
        let mut store = store_with(&["a"]);
        let result = store.insert_pending(pid("a"), JoinMode::Phone, None, None);
        assert!(matches!(result, Err(CcError::Conflict(_))));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_mark_connected_catches_up_on_existing_streams() {
        let mut store = store_with(&["a", "b"]);
        store.mark_connected(&pid("a")).unwrap();
        store.record_stream(&pid("a"), sid("a-audio")).unwrap();
        store.record_stream(&pid("a"), sid("a-video")).unwrap();

        let targets: HashSet<_> = store
            .mark_connected(&pid("b"))
            .unwrap()
            .into_iter()
            .collect();

        let expected: HashSet<_> = ["a-audio", "a-video"]
            .into_iter()
            .map(|s| SubscriptionTarget {
                subscriber: pid("b"),
                publisher: pid("a"),
                stream_id: sid(s),
            })
            .collect();
        assert_eq!(targets, expected);
    }

    #[test]
    fn test_mark_connected_twice_yields_nothing() {
        let mut store = store_with(&["a", "b"]);
        store.record_stream(&pid("a"), sid("a-audio")).unwrap();

        assert_eq!(store.mark_connected(&pid("b")).unwrap().len(), 1);
        assert!(store.mark_connected(&pid("b")).unwrap().is_empty());
    }

    #[test]
    fn test_mark_connected_unknown() {
        let mut store = store_with(&["a"]);
        assert!(store.mark_connected(&pid("ghost")).is_none());
    }

    #[test]
    fn test_record_stream_targets_connected_others_only() {
        let mut store = store_with(&["a", "b", "c"]);
        store.mark_connected(&pid("a")).unwrap();
        store.mark_connected(&pid("b")).unwrap();
        // c stays pending

        let targets = store.record_stream(&pid("a"), sid("a-video")).unwrap();

        assert_eq!(targets.len(), 1);
        let target = targets.first().unwrap();
        assert_eq!(target.subscriber, pid("b"));
        assert_eq!(target.publisher, pid("a"));
        assert_eq!(target.stream_id, sid("a-video"));
    }

    #[test]
    fn test_record_stream_duplicate_is_noop() {
        let mut store = store_with(&["a", "b"]);
        store.mark_connected(&pid("b")).unwrap();

        assert_eq!(store.record_stream(&pid("a"), sid("x")).unwrap().len(), 1);
        assert!(store.record_stream(&pid("a"), sid("x")).unwrap().is_empty());
        assert_eq!(store.get(&pid("a")).unwrap().published_streams.len(), 1);
    }

    #[test]
    fn test_record_stream_unknown_publisher() {
        let mut store = store_with(&["a"]);
        assert!(store.record_stream(&pid("ghost"), sid("x")).is_none());
    }

    #[test]
    fn test_never_targets_self() {
        let mut store = store_with(&["a", "b", "c"]);
        for id in ["a", "b", "c"] {
            store.mark_connected(&pid(id)).unwrap();
        }

        let mut all = Vec::new();
        for id in ["a", "b", "c"] {
            all.extend(store.record_stream(&pid(id), sid(&format!("{id}-s"))).unwrap());
        }

        assert_eq!(all.len(), 6);
        assert!(all.iter().all(|t| t.subscriber != t.publisher));
    }

    #[test]
    fn test_remove_and_counts() {
        let mut store = store_with(&["a", "b"]);
        store.mark_connected(&pid("a")).unwrap();
        assert_eq!(store.connected_count(), 1);

        assert!(store.remove(&pid("a")).is_some());
        assert!(store.remove(&pid("a")).is_none());
        assert_eq!(store.connected_count(), 0);
        assert_eq!(store.len(), 1);

        assert_eq!(store.drain().len(), 1);
        assert!(store.is_empty());
    }
}
