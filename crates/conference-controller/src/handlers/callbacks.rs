//! Callback handlers for the media platform and the telephone bridge.
//!
//! - `POST /v1/callbacks/platform` - Participant notifications
//! - `POST /v1/callbacks/voice/join` - Caller entered a join code
//! - `POST /v1/callbacks/voice/status` - Voice leg status change
//!
//! Notifications about sessions or participants this instance no longer
//! tracks are acknowledged and ignored; the platform retries non-2xx
//! responses and a retry cannot succeed.

use crate::actors::{ConferenceEntry, LeaveReason};
use crate::errors::CcError;
use crate::handlers::conferences::normalize_display_name;
use crate::models::{
    PlatformEvent, PlatformEventKind, VoiceJoinRequest, VoiceJoinResponse, VoiceStatusRequest,
};
use crate::observability::metrics::record_platform_event;
use crate::routes::AppState;
use crate::store::JoinCode;
use axum::{extract::State, http::StatusCode, Json};
use common::secret::ExposeSecret;
use common::types::{JoinMode, SessionId};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

// ============================================================================
// Handler: POST /v1/callbacks/platform
// ============================================================================

/// Handler for POST /v1/callbacks/platform
///
/// # Response
///
/// - 204 No Content: Event applied or ignored
/// - 400 Bad Request: `participant-published` without a `streamId`
#[instrument(
    skip(state, event),
    fields(
        event = event.event.as_str(),
        session_id = %event.session_id,
        participant_id = %event.participant_id
    )
)]
pub async fn platform_event(
    State(state): State<Arc<AppState>>,
    Json(event): Json<PlatformEvent>,
) -> Result<StatusCode, CcError> {
    let kind = event.event;

    if kind == PlatformEventKind::ParticipantPublished && event.stream_id.is_none() {
        record_platform_event(kind.as_str(), "rejected");
        return Err(CcError::BadRequest(
            "participant-published requires streamId".to_string(),
        ));
    }

    let Some(entry) = find_session(&state, &event.session_id).await? else {
        debug!(
            target: "cc.handlers.callbacks",
            event = kind.as_str(),
            session_id = %event.session_id,
            "Event for unknown session ignored"
        );
        record_platform_event(kind.as_str(), "ignored");
        return Ok(StatusCode::NO_CONTENT);
    };

    let result = match (kind, event.stream_id) {
        (PlatformEventKind::ParticipantJoined, _) => entry
            .handle
            .participant_joined(event.participant_id.clone())
            .await
            .map(|scheduled| {
                debug!(
                    target: "cc.handlers.callbacks",
                    participant_id = %event.participant_id,
                    subscriptions = scheduled.subscriptions,
                    "Participant connected"
                );
            }),
        (PlatformEventKind::ParticipantPublished, Some(stream_id)) => entry
            .handle
            .stream_published(event.participant_id.clone(), stream_id)
            .await
            .map(|scheduled| {
                debug!(
                    target: "cc.handlers.callbacks",
                    participant_id = %event.participant_id,
                    subscriptions = scheduled.subscriptions,
                    "Stream published"
                );
            }),
        (PlatformEventKind::ParticipantLeft, _) => entry
            .handle
            .participant_left(event.participant_id.clone(), LeaveReason::PlatformEvent)
            .await
            .map(|outcome| {
                debug!(
                    target: "cc.handlers.callbacks",
                    participant_id = %event.participant_id,
                    outcome = ?outcome,
                    "Participant left"
                );
            }),
        (PlatformEventKind::ParticipantUnsubscribed, stream_id) => {
            info!(
                target: "cc.handlers.callbacks",
                participant_id = %event.participant_id,
                stream_id = ?stream_id,
                "Participant unsubscribed"
            );
            record_platform_event(kind.as_str(), "ignored");
            return Ok(StatusCode::NO_CONTENT);
        }
        (PlatformEventKind::ParticipantPublished, None) => {
            return Err(CcError::BadRequest(
                "participant-published requires streamId".to_string(),
            ));
        }
    };

    match result {
        Ok(()) => {
            record_platform_event(kind.as_str(), "applied");
            Ok(StatusCode::NO_CONTENT)
        }
        Err(CcError::NotFound(_) | CcError::ConferenceClosed) => {
            debug!(
                target: "cc.handlers.callbacks",
                event = kind.as_str(),
                participant_id = %event.participant_id,
                "Event for unknown participant ignored"
            );
            record_platform_event(kind.as_str(), "ignored");
            Ok(StatusCode::NO_CONTENT)
        }
        Err(e) => {
            record_platform_event(kind.as_str(), "rejected");
            Err(e)
        }
    }
}

// ============================================================================
// Handler: POST /v1/callbacks/voice/join
// ============================================================================

/// Handler for POST /v1/callbacks/voice/join
///
/// Callers can only join a live conference; an unknown code never creates one.
///
/// # Response
///
/// - 200 OK: Bridge token for the voice leg
/// - 404 Not Found: No live conference uses the code
/// - 502 Bad Gateway: Media platform refused the participant
#[instrument(skip(state, request))]
pub async fn voice_join(
    State(state): State<Arc<AppState>>,
    Json(request): Json<VoiceJoinRequest>,
) -> Result<Json<VoiceJoinResponse>, CcError> {
    let unknown_code = || CcError::NotFound("No conference uses this join code".to_string());

    let code = JoinCode::from_digits(&request.digits).ok_or_else(unknown_code)?;
    let Some(entry) = state.registry.resolve_join_code(code).await? else {
        info!(
            target: "cc.handlers.callbacks",
            "Caller entered unknown join code"
        );
        return Err(unknown_code());
    };

    let caller = normalize_display_name(request.from)?;
    let admission = entry
        .handle
        .admit(JoinMode::Phone, caller)
        .await
        .map_err(|e| match e {
            CcError::ConferenceClosed => unknown_code(),
            other => other,
        })?;

    info!(
        target: "cc.handlers.callbacks",
        session_id = %admission.session_id,
        participant_id = %admission.participant_id,
        "Caller joined conference"
    );

    Ok(Json(VoiceJoinResponse {
        session_id: admission.session_id,
        participant_id: admission.participant_id,
        bridge_token: admission.device_token.expose_secret().to_string(),
    }))
}

// ============================================================================
// Handler: POST /v1/callbacks/voice/status
// ============================================================================

/// Handler for POST /v1/callbacks/voice/status
///
/// A terminal status removes the caller from the conference. Other statuses
/// are acknowledged.
#[instrument(
    skip(state, request),
    fields(
        session_id = %request.session_id,
        participant_id = %request.participant_id,
        status = %request.status
    )
)]
pub async fn voice_status(
    State(state): State<Arc<AppState>>,
    Json(request): Json<VoiceStatusRequest>,
) -> Result<StatusCode, CcError> {
    if !request.is_terminal() {
        return Ok(StatusCode::NO_CONTENT);
    }

    let Some(entry) = find_session(&state, &request.session_id).await? else {
        return Ok(StatusCode::NO_CONTENT);
    };

    match entry
        .handle
        .participant_left(request.participant_id.clone(), LeaveReason::CallEnded)
        .await
    {
        Ok(outcome) => {
            info!(
                target: "cc.handlers.callbacks",
                participant_id = %request.participant_id,
                outcome = ?outcome,
                "Voice leg ended"
            );
        }
        Err(CcError::ConferenceClosed) => {}
        Err(e) => {
            warn!(
                target: "cc.handlers.callbacks",
                participant_id = %request.participant_id,
                error = %e,
                "Failed to remove caller"
            );
            return Err(e);
        }
    }

    Ok(StatusCode::NO_CONTENT)
}

async fn find_session(
    state: &AppState,
    session_id: &SessionId,
) -> Result<Option<ConferenceEntry>, CcError> {
    state.registry.resolve_session(session_id.clone()).await
}
