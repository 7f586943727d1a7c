//! Conference Controller API models.
//!
//! Request and response bodies for the HTTP surface and the JSON
//! notifications posted by the media platform. All wire names are camelCase.

use crate::actors::{ConferenceInfo, ParticipantInfo};
use chrono::{DateTime, Utc};
use common::types::{JoinMode, ParticipantId, SessionId, StreamId};
use serde::{Deserialize, Serialize};

/// Maximum display name length accepted for participants and conferences.
pub const MAX_DISPLAY_NAME_LENGTH: usize = 100;

// ============================================================================
// Conference API Models
// ============================================================================

/// Request body for `POST /v1/conferences`.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateConferenceRequest {
    /// Display name; the slug is derived from it.
    pub name: String,
}

/// A live conference.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConferenceResponse {
    pub session_id: SessionId,
    pub slug: String,
    pub name: String,
    pub join_code: String,
    pub created_at: DateTime<Utc>,
    /// Present on detail responses only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub participant_count: Option<usize>,
}

impl From<&ConferenceInfo> for ConferenceResponse {
    fn from(info: &ConferenceInfo) -> Self {
        Self {
            session_id: info.session_id.clone(),
            slug: info.slug.to_string(),
            name: info.display_name.clone(),
            join_code: info.join_code.to_string(),
            created_at: info.created_at,
            participant_count: None,
        }
    }
}

/// Response body for `GET /v1/conferences`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConferenceListResponse {
    pub conferences: Vec<ConferenceResponse>,
}

/// Request body for `POST /v1/conferences/{slug}/participants`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct JoinConferenceRequest {
    /// Optional display name shown to other participants.
    #[serde(default)]
    pub name: Option<String>,
}

/// Everything a browser client needs to connect its media.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinConferenceResponse {
    pub session_id: SessionId,
    pub participant_id: ParticipantId,
    /// Platform-issued device token (opaque to this service).
    pub device_token: String,
    pub websocket_url: String,
    pub join_code: String,
    pub slug: String,
}

/// A connected participant.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantResponse {
    pub participant_id: ParticipantId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub mode: JoinMode,
    pub joined_at: DateTime<Utc>,
}

impl From<&ParticipantInfo> for ParticipantResponse {
    fn from(info: &ParticipantInfo) -> Self {
        Self {
            participant_id: info.participant_id.clone(),
            name: info.display_name.clone(),
            mode: info.mode,
            joined_at: info.joined_at,
        }
    }
}

/// Response body for `GET /v1/conferences/{slug}/participants`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParticipantListResponse {
    pub participants: Vec<ParticipantResponse>,
}

// ============================================================================
// Telephone Bridge Models
// ============================================================================

/// Digits collected from a caller by the telephone bridge.
#[derive(Debug, Clone, Deserialize)]
pub struct VoiceJoinRequest {
    pub digits: String,
    /// Caller id, used as the participant's display name.
    #[serde(default)]
    pub from: Option<String>,
}

/// Returned to the bridge so it can connect the voice leg.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoiceJoinResponse {
    pub session_id: SessionId,
    pub participant_id: ParticipantId,
    pub bridge_token: String,
}

/// Call status reported by the telephone bridge.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoiceStatusRequest {
    pub session_id: SessionId,
    pub participant_id: ParticipantId,
    pub status: String,
}

/// Call statuses that end the voice leg.
pub const TERMINAL_CALL_STATUSES: &[&str] = &[
    "completed",
    "failed",
    "busy",
    "no-answer",
    "canceled",
    "hangup",
];

impl VoiceStatusRequest {
    /// True when the voice leg has ended.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        let status = self.status.trim().to_ascii_lowercase();
        TERMINAL_CALL_STATUSES.contains(&status.as_str())
    }
}

// ============================================================================
// Platform Notifications
// ============================================================================

/// Kind of participant notification posted by the media platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PlatformEventKind {
    ParticipantJoined,
    ParticipantLeft,
    ParticipantPublished,
    ParticipantUnsubscribed,
}

impl PlatformEventKind {
    /// Returns the event name as sent on the wire.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            PlatformEventKind::ParticipantJoined => "participant-joined",
            PlatformEventKind::ParticipantLeft => "participant-left",
            PlatformEventKind::ParticipantPublished => "participant-published",
            PlatformEventKind::ParticipantUnsubscribed => "participant-unsubscribed",
        }
    }
}

/// Notification body posted to `/v1/callbacks/platform`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlatformEvent {
    pub event: PlatformEventKind,
    pub session_id: SessionId,
    pub participant_id: ParticipantId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stream_id: Option<StreamId>,
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_platform_event_deserialization() {
        let event: PlatformEvent = serde_json::from_value(json!({
            "event": "participant-published",
            "sessionId": "session-1",
            "participantId": "participant-2",
            "streamId": "stream-a"
        }))
        .unwrap();

        assert_eq!(event.event, PlatformEventKind::ParticipantPublished);
        assert_eq!(event.session_id.as_str(), "session-1");
        assert_eq!(event.stream_id.unwrap().as_str(), "stream-a");

        let event: PlatformEvent = serde_json::from_value(json!({
            "event": "participant-left",
            "sessionId": "session-1",
            "participantId": "participant-2"
        }))
        .unwrap();
        assert!(event.stream_id.is_none());
    }

    #[test]
    fn test_unknown_platform_event_rejected() {
        let result: Result<PlatformEvent, _> = serde_json::from_value(json!({
            "event": "participant-exploded",
            "sessionId": "s",
            "participantId": "p"
        }));
        assert!(result.is_err());
    }

    #[test]
    fn test_join_response_uses_camel_case() {
        let response = JoinConferenceResponse {
            session_id: SessionId::new("session-1"),
            participant_id: ParticipantId::new("participant-2"),
            device_token: "token".to_string(),
            websocket_url: "wss://device.example.com".to_string(),
            join_code: "1234567".to_string(),
            slug: "river-otter".to_string(),
        };
        let value = serde_json::to_value(&response).unwrap();

        assert_eq!(value["sessionId"], "session-1");
        assert_eq!(value["participantId"], "participant-2");
        assert_eq!(value["deviceToken"], "token");
        assert_eq!(value["websocketUrl"], "wss://device.example.com");
        assert_eq!(value["joinCode"], "1234567");
    }

    #[test]
    fn test_join_request_name_is_optional() {
        let request: JoinConferenceRequest = serde_json::from_value(json!({})).unwrap();
        assert!(request.name.is_none());
    }

    #[test]
    fn test_terminal_call_statuses() {
        let status = |s: &str| VoiceStatusRequest {
            session_id: SessionId::new("s"),
            participant_id: ParticipantId::new("p"),
            status: s.to_string(),
        };

        assert!(status("completed").is_terminal());
        assert!(status("No-Answer").is_terminal());
        assert!(status("hangup").is_terminal());
        assert!(!status("ringing").is_terminal());
        assert!(!status("in-progress").is_terminal());
    }
}
