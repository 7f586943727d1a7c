//! Message types for actor communication.
//!
//! All inter-actor communication uses strongly-typed message passing via
//! `tokio::sync::mpsc`. Request-reply uses `tokio::sync::oneshot`.

use super::conference::ConferenceActorHandle;
use crate::errors::CcError;
use crate::platform::PlatformError;
use crate::store::{JoinCode, ParticipantStatus, Slug};
use chrono::{DateTime, Utc};
use common::secret::SecretString;
use common::types::{JoinMode, ParticipantId, SessionId, StreamId};
use std::time::Duration;
use tokio::sync::oneshot;

/// Messages sent to `ConferenceRegistryActor`.
#[derive(Debug)]
pub enum RegistryMessage {
    /// Explicitly create a conference. Fails with `Conflict` if the slug is
    /// bound to a live, valid session.
    CreateConference {
        slug: Slug,
        display_name: String,
        respond_to: oneshot::Sender<Result<ConferenceInfo, CcError>>,
    },

    /// Resolve the slug to a live session, creating one if none is bound or
    /// the bound session no longer exists on the platform.
    GetOrCreateConference {
        slug: Slug,
        respond_to: oneshot::Sender<Result<ConferenceEntry, CcError>>,
    },

    /// Look up a conference by slug without validating or creating.
    ResolveSlug {
        slug: Slug,
        respond_to: oneshot::Sender<Option<ConferenceEntry>>,
    },

    /// Look up a conference by join code. Never creates.
    ResolveJoinCode {
        code: JoinCode,
        respond_to: oneshot::Sender<Option<ConferenceEntry>>,
    },

    /// Forget a conference: unbind slug and code, delete the platform session.
    RemoveConference {
        session_id: SessionId,
        reason: CloseReason,
        respond_to: oneshot::Sender<Result<(), CcError>>,
    },

    /// List live conferences.
    ListConferences {
        respond_to: oneshot::Sender<Vec<ConferenceInfo>>,
    },

    /// Get current registry status (for health checks).
    GetStatus {
        respond_to: oneshot::Sender<RegistryStatus>,
    },

    /// Initiate graceful shutdown (SIGTERM received).
    Shutdown {
        deadline: Duration,
        respond_to: oneshot::Sender<Result<(), CcError>>,
    },

    /// Posted by the registry's own task once `get_session` for a bound
    /// slug returns.
    SessionChecked {
        slug: Slug,
        session_id: SessionId,
        result: Result<(), PlatformError>,
    },

    /// Posted by the registry's own task once `create_session` returns.
    CreationFinished {
        slug: Slug,
        join_code: JoinCode,
        result: Result<SessionId, PlatformError>,
    },
}

/// Messages sent to `ConferenceActor`.
#[derive(Debug)]
pub enum ConferenceMessage {
    /// Create a platform participant and add it to this session.
    Admit {
        mode: JoinMode,
        display_name: Option<String>,
        respond_to: oneshot::Sender<Result<Admission, CcError>>,
    },

    /// Platform event: the participant's media connected.
    ParticipantJoined {
        participant_id: ParticipantId,
        respond_to: oneshot::Sender<Result<FanoutScheduled, CcError>>,
    },

    /// Platform event: the participant published a stream.
    StreamPublished {
        participant_id: ParticipantId,
        stream_id: StreamId,
        respond_to: oneshot::Sender<Result<FanoutScheduled, CcError>>,
    },

    /// The participant left (platform event or voice call ended).
    ParticipantLeft {
        participant_id: ParticipantId,
        reason: LeaveReason,
        respond_to: oneshot::Sender<Result<LeaveOutcome, CcError>>,
    },

    /// Cleanup timer fired for a participant.
    ExpireParticipant { participant_id: ParticipantId },

    /// Get current conference state.
    GetState {
        respond_to: oneshot::Sender<ConferenceState>,
    },

    /// Remove every participant and close the conference.
    EndConference {
        respond_to: oneshot::Sender<Result<(), CcError>>,
    },
}

/// Why a participant left.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeaveReason {
    /// Platform reported `participant-left`.
    PlatformEvent,
    /// The voice leg reported a terminal call status.
    CallEnded,
    /// Cleanup timer expired.
    CleanupTimer,
    /// Conference was ended explicitly.
    ConferenceEnded,
}

impl LeaveReason {
    pub const fn as_str(self) -> &'static str {
        match self {
            LeaveReason::PlatformEvent => "platform_event",
            LeaveReason::CallEnded => "call_ended",
            LeaveReason::CleanupTimer => "cleanup_timer",
            LeaveReason::ConferenceEnded => "conference_ended",
        }
    }
}

/// Why a conference closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// Last participant left.
    Empty,
    /// Deleted through the API.
    Ended,
}

impl CloseReason {
    pub const fn as_str(self) -> &'static str {
        match self {
            CloseReason::Empty => "empty",
            CloseReason::Ended => "ended",
        }
    }
}

/// Public facts about a live conference.
#[derive(Debug, Clone)]
pub struct ConferenceInfo {
    pub session_id: SessionId,
    pub slug: Slug,
    /// Name as first given (the slug for lazily created conferences).
    pub display_name: String,
    pub join_code: JoinCode,
    pub created_at: DateTime<Utc>,
}

/// A live conference together with its actor handle.
#[derive(Debug, Clone)]
pub struct ConferenceEntry {
    pub info: ConferenceInfo,
    pub handle: ConferenceActorHandle,
}

/// Result of a successful admission.
#[derive(Debug)]
pub struct Admission {
    pub session_id: SessionId,
    pub participant_id: ParticipantId,
    pub device_token: SecretString,
}

/// Number of subscriptions a platform event scheduled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FanoutScheduled {
    pub subscriptions: usize,
}

/// Result of a leave request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeaveOutcome {
    /// Participant removed; `remaining` participants are left.
    Removed { remaining: usize },
    /// Participant was not present (already removed).
    AlreadyGone,
}

/// Snapshot of one participant.
#[derive(Debug, Clone)]
pub struct ParticipantInfo {
    pub participant_id: ParticipantId,
    pub display_name: Option<String>,
    pub mode: JoinMode,
    pub status: ParticipantStatus,
    pub published_streams: Vec<StreamId>,
    pub joined_at: DateTime<Utc>,
}

/// Conference state snapshot.
#[derive(Debug, Clone)]
pub struct ConferenceState {
    pub session_id: SessionId,
    /// Participants, oldest first.
    pub participants: Vec<ParticipantInfo>,
    pub is_closing: bool,
}

impl ConferenceState {
    /// Participants whose media is connected.
    pub fn connected(&self) -> impl Iterator<Item = &ParticipantInfo> {
        self.participants
            .iter()
            .filter(|p| p.status == ParticipantStatus::Connected)
    }
}

/// Registry status (for health checks).
#[derive(Debug, Clone, Copy)]
pub struct RegistryStatus {
    pub conference_count: usize,
    pub participant_count: usize,
    pub is_draining: bool,
}
