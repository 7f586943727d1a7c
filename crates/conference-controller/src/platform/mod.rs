//! Media platform boundary.
//!
//! The controller never touches media itself: sessions, participants and
//! subscriptions live on an external real-time media platform. Everything the
//! controller needs from it goes through [`MediaPlatform`], with two
//! implementations:
//!
//! - [`http::HttpMediaPlatform`] - REST client used in production
//! - [`mock::MockMediaPlatform`] - in-memory fake with failure injection
//!
//! Errors are classified so callers can tell "the thing is gone"
//! ([`PlatformError::NotFound`]) from "try again later"
//! ([`PlatformError::Unavailable`]).

pub mod http;
pub mod mock;

use common::secret::SecretString;
use common::types::{ParticipantId, PublishPermission, SessionId, StreamId};
use std::sync::Arc;
use thiserror::Error;

/// Media platform error.
#[derive(Debug, Clone, Error)]
pub enum PlatformError {
    /// The referenced session or participant does not exist on the platform.
    #[error("Resource not found on media platform")]
    NotFound,

    /// Transport failure, timeout or 5xx.
    #[error("Media platform unavailable: {0}")]
    Unavailable(String),

    /// The platform refused the request (4xx other than 404).
    #[error("Media platform rejected request ({status}): {message}")]
    Rejected { status: u16, message: String },

    /// The platform answered with something we could not parse.
    #[error("Invalid media platform response: {0}")]
    InvalidResponse(String),
}

impl PlatformError {
    /// Returns true if the platform reported the resource as missing.
    pub fn is_not_found(&self) -> bool {
        matches!(self, PlatformError::NotFound)
    }
}

/// Platform operation names, used as log fields and metric labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PlatformOperation {
    CreateSession,
    GetSession,
    DeleteSession,
    CreateParticipant,
    AddParticipant,
    RemoveParticipant,
    DeleteParticipant,
    Subscribe,
}

impl PlatformOperation {
    /// Returns the operation name as a string for metric labels.
    pub const fn as_str(self) -> &'static str {
        match self {
            PlatformOperation::CreateSession => "create_session",
            PlatformOperation::GetSession => "get_session",
            PlatformOperation::DeleteSession => "delete_session",
            PlatformOperation::CreateParticipant => "create_participant",
            PlatformOperation::AddParticipant => "add_participant",
            PlatformOperation::RemoveParticipant => "remove_participant",
            PlatformOperation::DeleteParticipant => "delete_participant",
            PlatformOperation::Subscribe => "subscribe",
        }
    }
}

/// A participant freshly created on the platform.
#[derive(Debug, Clone)]
pub struct CreatedParticipant {
    /// Platform-issued participant ID.
    pub participant_id: ParticipantId,
    /// Credential the client presents to the platform.
    pub device_token: SecretString,
}

/// Operations the controller needs from the media platform.
#[async_trait::async_trait]
pub trait MediaPlatform: Send + Sync {
    /// Create a session tagged with the conference slug.
    async fn create_session(&self, tag: &str) -> Result<SessionId, PlatformError>;

    /// Check that a session still exists.
    async fn get_session(&self, session_id: &SessionId) -> Result<(), PlatformError>;

    /// Delete a session.
    async fn delete_session(&self, session_id: &SessionId) -> Result<(), PlatformError>;

    /// Create a participant with the given publish permissions. The platform
    /// posts lifecycle events for it to `callback_url`.
    async fn create_participant(
        &self,
        tag: &str,
        publish_permissions: &[PublishPermission],
        callback_url: &str,
    ) -> Result<CreatedParticipant, PlatformError>;

    /// Attach a participant to a session.
    async fn add_participant_to_session(
        &self,
        participant_id: &ParticipantId,
        session_id: &SessionId,
    ) -> Result<(), PlatformError>;

    /// Detach a participant from a session.
    async fn remove_participant_from_session(
        &self,
        participant_id: &ParticipantId,
        session_id: &SessionId,
    ) -> Result<(), PlatformError>;

    /// Delete a participant.
    async fn delete_participant(&self, participant_id: &ParticipantId)
        -> Result<(), PlatformError>;

    /// Subscribe `participant_id` to one stream within the session.
    async fn subscribe(
        &self,
        session_id: &SessionId,
        participant_id: &ParticipantId,
        stream_id: &StreamId,
    ) -> Result<(), PlatformError>;
}

/// Shared handle to a platform implementation.
pub type SharedPlatform = Arc<dyn MediaPlatform>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_not_found() {
        assert!(PlatformError::NotFound.is_not_found());
        assert!(!PlatformError::Unavailable("timeout".to_string()).is_not_found());
        assert!(!PlatformError::Rejected {
            status: 404,
            message: "body".to_string()
        }
        .is_not_found());
    }

    #[test]
    fn test_operation_labels() {
        assert_eq!(PlatformOperation::Subscribe.as_str(), "subscribe");
        assert_eq!(PlatformOperation::GetSession.as_str(), "get_session");
        assert_eq!(
            PlatformOperation::RemoveParticipant.as_str(),
            "remove_participant"
        );
    }
}
