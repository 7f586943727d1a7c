//! In-memory media platform for tests and local development.
//!
//! Issues sequential IDs (`session-1`, `participant-2`, ...), records every
//! call, and lets tests inject failures per operation or per subscribed
//! stream.

use super::{CreatedParticipant, MediaPlatform, PlatformError, PlatformOperation};
use common::secret::SecretString;
use common::types::{ParticipantId, PublishPermission, SessionId, StreamId};
use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::Notify;

/// A call received by the mock, in arrival order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlatformCall {
    CreateSession {
        tag: String,
    },
    GetSession(SessionId),
    DeleteSession(SessionId),
    CreateParticipant {
        tag: String,
        publish_permissions: Vec<PublishPermission>,
    },
    AddParticipant {
        participant_id: ParticipantId,
        session_id: SessionId,
    },
    RemoveParticipant {
        participant_id: ParticipantId,
        session_id: SessionId,
    },
    DeleteParticipant(ParticipantId),
    Subscribe {
        session_id: SessionId,
        participant_id: ParticipantId,
        stream_id: StreamId,
    },
}

impl PlatformCall {
    fn operation(&self) -> PlatformOperation {
        match self {
            PlatformCall::CreateSession { .. } => PlatformOperation::CreateSession,
            PlatformCall::GetSession(_) => PlatformOperation::GetSession,
            PlatformCall::DeleteSession(_) => PlatformOperation::DeleteSession,
            PlatformCall::CreateParticipant { .. } => PlatformOperation::CreateParticipant,
            PlatformCall::AddParticipant { .. } => PlatformOperation::AddParticipant,
            PlatformCall::RemoveParticipant { .. } => PlatformOperation::RemoveParticipant,
            PlatformCall::DeleteParticipant(_) => PlatformOperation::DeleteParticipant,
            PlatformCall::Subscribe { .. } => PlatformOperation::Subscribe,
        }
    }
}

/// A subscription the mock accepted.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Subscription {
    pub session_id: SessionId,
    pub subscriber: ParticipantId,
    pub stream_id: StreamId,
}

#[derive(Default)]
struct MockState {
    next_id: u64,
    sessions: HashSet<SessionId>,
    participants: HashSet<ParticipantId>,
    calls: Vec<PlatformCall>,
    subscriptions: Vec<Subscription>,
    failing_operations: HashMap<PlatformOperation, PlatformError>,
    failing_streams: HashMap<StreamId, PlatformError>,
}

/// Mock media platform.
#[derive(Default)]
pub struct MockMediaPlatform {
    state: Mutex<MockState>,
    subscribe_delay: Option<Duration>,
    changed: Notify,
}

impl MockMediaPlatform {
    /// Create a mock that accepts every call.
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every subscribe call (to observe concurrent fan-out).
    pub fn with_subscribe_delay(mut self, delay: Duration) -> Self {
        self.subscribe_delay = Some(delay);
        self
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Make every call of `operation` fail with `error` until cleared.
    pub fn fail_operation(&self, operation: PlatformOperation, error: PlatformError) {
        self.state().failing_operations.insert(operation, error);
    }

    /// Stop injecting failures for `operation`.
    pub fn clear_failure(&self, operation: PlatformOperation) {
        self.state().failing_operations.remove(&operation);
    }

    /// Make subscriptions to one stream fail with `error`.
    pub fn fail_subscriptions_to(&self, stream_id: StreamId, error: PlatformError) {
        self.state().failing_streams.insert(stream_id, error);
    }

    /// Forget a session as if it had expired on the platform side.
    pub fn expire_session(&self, session_id: &SessionId) {
        self.state().sessions.remove(session_id);
    }

    /// Returns true if the session currently exists.
    pub fn has_session(&self, session_id: &SessionId) -> bool {
        self.state().sessions.contains(session_id)
    }

    /// Returns true if the participant currently exists.
    pub fn has_participant(&self, participant_id: &ParticipantId) -> bool {
        self.state().participants.contains(participant_id)
    }

    /// All calls received so far.
    pub fn calls(&self) -> Vec<PlatformCall> {
        self.state().calls.clone()
    }

    /// Number of calls received for one operation.
    pub fn call_count(&self, operation: PlatformOperation) -> usize {
        self.state()
            .calls
            .iter()
            .filter(|call| call.operation() == operation)
            .count()
    }

    /// Successful subscriptions so far.
    pub fn subscriptions(&self) -> Vec<Subscription> {
        self.state().subscriptions.clone()
    }

    /// Sessions for which a delete call was received.
    pub fn deleted_sessions(&self) -> Vec<SessionId> {
        self.state()
            .calls
            .iter()
            .filter_map(|call| match call {
                PlatformCall::DeleteSession(id) => Some(id.clone()),
                _ => None,
            })
            .collect()
    }

    /// Wait until at least `count` subscriptions were accepted.
    ///
    /// Returns false if `timeout` elapsed first.
    pub async fn wait_for_subscriptions(&self, count: usize, timeout: Duration) -> bool {
        tokio::time::timeout(timeout, async {
            loop {
                let notified = self.changed.notified();
                if self.state().subscriptions.len() >= count {
                    return;
                }
                notified.await;
            }
        })
        .await
        .is_ok()
    }

    /// Wait until at least `count` calls of `operation` were received.
    pub async fn wait_for_calls(
        &self,
        operation: PlatformOperation,
        count: usize,
        timeout: Duration,
    ) -> bool {
        tokio::time::timeout(timeout, async {
            loop {
                let notified = self.changed.notified();
                if self.call_count(operation) >= count {
                    return;
                }
                notified.await;
            }
        })
        .await
        .is_ok()
    }

    /// Record a call and return the injected failure for its operation, if any.
    fn record(&self, call: PlatformCall) -> Result<(), PlatformError> {
        let operation = call.operation();
        let injected = {
            let mut state = self.state();
            state.calls.push(call);
            state.failing_operations.get(&operation).cloned()
        };
        self.changed.notify_waiters();
        injected.map_or(Ok(()), Err)
    }

    fn next_id(&self, prefix: &str) -> String {
        let mut state = self.state();
        state.next_id += 1;
        format!("{prefix}-{}", state.next_id)
    }
}

#[async_trait::async_trait]
impl MediaPlatform for MockMediaPlatform {
    async fn create_session(&self, tag: &str) -> Result<SessionId, PlatformError> {
        self.record(PlatformCall::CreateSession {
            tag: tag.to_string(),
        })?;

        let session_id = SessionId::new(self.next_id("session"));
        self.state().sessions.insert(session_id.clone());
        Ok(session_id)
    }

    async fn get_session(&self, session_id: &SessionId) -> Result<(), PlatformError> {
        self.record(PlatformCall::GetSession(session_id.clone()))?;

        if self.has_session(session_id) {
            Ok(())
        } else {
            Err(PlatformError::NotFound)
        }
    }

    async fn delete_session(&self, session_id: &SessionId) -> Result<(), PlatformError> {
        self.record(PlatformCall::DeleteSession(session_id.clone()))?;

        if self.state().sessions.remove(session_id) {
            Ok(())
        } else {
            Err(PlatformError::NotFound)
        }
    }

    async fn create_participant(
        &self,
        tag: &str,
        publish_permissions: &[PublishPermission],
        _callback_url: &str,
    ) -> Result<CreatedParticipant, PlatformError> {
        self.record(PlatformCall::CreateParticipant {
            tag: tag.to_string(),
            publish_permissions: publish_permissions.to_vec(),
        })?;

        let participant_id = ParticipantId::new(self.next_id("participant"));
        self.state().participants.insert(participant_id.clone());
        Ok(CreatedParticipant {
            device_token: SecretString::from(format!("token-{participant_id}")),
            participant_id,
        })
    }

    async fn add_participant_to_session(
        &self,
        participant_id: &ParticipantId,
        session_id: &SessionId,
    ) -> Result<(), PlatformError> {
        self.record(PlatformCall::AddParticipant {
            participant_id: participant_id.clone(),
            session_id: session_id.clone(),
        })?;

        if self.has_session(session_id) {
            Ok(())
        } else {
            Err(PlatformError::NotFound)
        }
    }

    async fn remove_participant_from_session(
        &self,
        participant_id: &ParticipantId,
        session_id: &SessionId,
    ) -> Result<(), PlatformError> {
        self.record(PlatformCall::RemoveParticipant {
            participant_id: participant_id.clone(),
            session_id: session_id.clone(),
        })
    }

    async fn delete_participant(
        &self,
        participant_id: &ParticipantId,
    ) -> Result<(), PlatformError> {
        self.record(PlatformCall::DeleteParticipant(participant_id.clone()))?;
        self.state().participants.remove(participant_id);
        Ok(())
    }

    async fn subscribe(
        &self,
        session_id: &SessionId,
        participant_id: &ParticipantId,
        stream_id: &StreamId,
    ) -> Result<(), PlatformError> {
        if let Some(delay) = self.subscribe_delay {
            tokio::time::sleep(delay).await;
        }

        self.record(PlatformCall::Subscribe {
            session_id: session_id.clone(),
            participant_id: participant_id.clone(),
            stream_id: stream_id.clone(),
        })?;

        let stream_failure = self.state().failing_streams.get(stream_id).cloned();
        if let Some(error) = stream_failure {
            return Err(error);
        }

        self.state().subscriptions.push(Subscription {
            session_id: session_id.clone(),
            subscriber: participant_id.clone(),
            stream_id: stream_id.clone(),
        });
        self.changed.notify_waiters();
        Ok(())
    }
}
