//! Conference handlers.
//!
//! - `POST /v1/conferences` - Create a conference by name
//! - `GET /v1/conferences` - List live conferences
//! - `GET /v1/conferences/{slug}` - Conference detail
//! - `DELETE /v1/conferences/{slug}` - End a conference
//! - `GET /v1/conferences/{slug}/participants` - Connected participants
//! - `POST /v1/conferences/{slug}/participants` - Join (creates the conference on first use)

use crate::actors::{Admission, ConferenceEntry};
use crate::errors::CcError;
use crate::models::{
    ConferenceListResponse, ConferenceResponse, CreateConferenceRequest, JoinConferenceRequest,
    JoinConferenceResponse, ParticipantListResponse, ParticipantResponse, MAX_DISPLAY_NAME_LENGTH,
};
use crate::routes::AppState;
use crate::store::Slug;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use common::secret::ExposeSecret;
use common::types::JoinMode;
use std::sync::Arc;
use tracing::{debug, info, instrument};

// ============================================================================
// Handler: POST /v1/conferences
// ============================================================================

/// Handler for POST /v1/conferences
///
/// # Response
///
/// - 201 Created: Conference created
/// - 400 Bad Request: Name is empty or yields no usable slug
/// - 409 Conflict: A live conference already uses the slug
/// - 503 Service Unavailable: Join codes exhausted or draining
#[instrument(skip(state, request))]
pub async fn create_conference(
    State(state): State<Arc<AppState>>,
    Json(request): Json<CreateConferenceRequest>,
) -> Result<(StatusCode, Json<ConferenceResponse>), CcError> {
    let name = normalize_display_name(Some(request.name))?
        .ok_or_else(|| CcError::BadRequest("Conference name is required".to_string()))?;
    let slug = Slug::from_name(&name)?;

    let info = state.registry.create_conference(slug, name).await?;

    info!(
        target: "cc.handlers.conferences",
        session_id = %info.session_id,
        slug = %info.slug,
        "Conference created"
    );

    Ok((StatusCode::CREATED, Json(ConferenceResponse::from(&info))))
}

// ============================================================================
// Handler: GET /v1/conferences
// ============================================================================

/// Handler for GET /v1/conferences
#[instrument(skip(state))]
pub async fn list_conferences(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ConferenceListResponse>, CcError> {
    let conferences = state
        .registry
        .list_conferences()
        .await?
        .iter()
        .map(ConferenceResponse::from)
        .collect();

    Ok(Json(ConferenceListResponse { conferences }))
}

// ============================================================================
// Handler: GET /v1/conferences/{slug}
// ============================================================================

/// Handler for GET /v1/conferences/{slug}
///
/// # Response
///
/// - 200 OK: Conference with its participant count
/// - 404 Not Found: No live conference for the slug
#[instrument(skip(state), fields(slug = %slug))]
pub async fn get_conference(
    State(state): State<Arc<AppState>>,
    Path(slug): Path<String>,
) -> Result<Json<ConferenceResponse>, CcError> {
    let entry = find_conference(&state, &slug).await?;
    let conference_state = entry
        .handle
        .get_state()
        .await
        .map_err(|e| closed_as_not_found(e, &slug))?;

    let mut response = ConferenceResponse::from(&entry.info);
    response.participant_count = Some(conference_state.participants.len());

    Ok(Json(response))
}

// ============================================================================
// Handler: DELETE /v1/conferences/{slug}
// ============================================================================

/// Handler for DELETE /v1/conferences/{slug}
///
/// Removes every participant from the platform and closes the conference.
///
/// # Response
///
/// - 204 No Content: Conference ended
/// - 404 Not Found: No live conference for the slug
#[instrument(skip(state), fields(slug = %slug))]
pub async fn delete_conference(
    State(state): State<Arc<AppState>>,
    Path(slug): Path<String>,
) -> Result<StatusCode, CcError> {
    let entry = find_conference(&state, &slug).await?;
    entry
        .handle
        .end_conference()
        .await
        .map_err(|e| closed_as_not_found(e, &slug))?;

    info!(
        target: "cc.handlers.conferences",
        session_id = %entry.info.session_id,
        slug = %entry.info.slug,
        "Conference ended"
    );

    Ok(StatusCode::NO_CONTENT)
}

// ============================================================================
// Handler: GET /v1/conferences/{slug}/participants
// ============================================================================

/// Handler for GET /v1/conferences/{slug}/participants
///
/// Lists participants whose media is connected, oldest first.
#[instrument(skip(state), fields(slug = %slug))]
pub async fn list_participants(
    State(state): State<Arc<AppState>>,
    Path(slug): Path<String>,
) -> Result<Json<ParticipantListResponse>, CcError> {
    let entry = find_conference(&state, &slug).await?;
    let conference_state = entry
        .handle
        .get_state()
        .await
        .map_err(|e| closed_as_not_found(e, &slug))?;

    let participants = conference_state
        .connected()
        .map(ParticipantResponse::from)
        .collect();

    Ok(Json(ParticipantListResponse { participants }))
}

// ============================================================================
// Handler: POST /v1/conferences/{slug}/participants
// ============================================================================

/// Handler for POST /v1/conferences/{slug}/participants
///
/// Joins a browser participant, creating the conference if the slug is not
/// live. A conference that closes between resolution and admission is
/// resolved again once, which creates a fresh session.
///
/// # Response
///
/// - 200 OK: Device token and connection details
/// - 400 Bad Request: Slug or name invalid
/// - 502 Bad Gateway: Media platform refused the participant
/// - 503 Service Unavailable: Join codes exhausted or draining
#[instrument(skip(state, request), fields(slug = %slug))]
pub async fn join_conference(
    State(state): State<Arc<AppState>>,
    Path(slug): Path<String>,
    request: Option<Json<JoinConferenceRequest>>,
) -> Result<Json<JoinConferenceResponse>, CcError> {
    let slug = Slug::from_name(&slug)?;
    let name = normalize_display_name(request.and_then(|Json(r)| r.name))?;

    let entry = state.registry.get_or_create(slug.clone()).await?;
    let (entry, admission) = match entry.handle.admit(JoinMode::Web, name.clone()).await {
        Ok(admission) => (entry, admission),
        Err(CcError::ConferenceClosed) => {
            debug!(
                target: "cc.handlers.conferences",
                slug = %slug,
                session_id = %entry.info.session_id,
                "Conference closed during join, resolving again"
            );
            let entry = state.registry.get_or_create(slug).await?;
            let admission = entry.handle.admit(JoinMode::Web, name).await?;
            (entry, admission)
        }
        Err(e) => return Err(e),
    };

    Ok(Json(join_response(&entry, admission, &state)))
}

fn join_response(
    entry: &ConferenceEntry,
    admission: Admission,
    state: &AppState,
) -> JoinConferenceResponse {
    info!(
        target: "cc.handlers.conferences",
        session_id = %admission.session_id,
        participant_id = %admission.participant_id,
        "Web participant joined"
    );

    JoinConferenceResponse {
        session_id: admission.session_id,
        participant_id: admission.participant_id,
        device_token: admission.device_token.expose_secret().to_string(),
        websocket_url: state.config.device_websocket_url.clone(),
        join_code: entry.info.join_code.to_string(),
        slug: entry.info.slug.to_string(),
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Resolve a path slug to a live conference.
async fn find_conference(state: &AppState, raw_slug: &str) -> Result<ConferenceEntry, CcError> {
    let not_found = || CcError::NotFound(format!("Conference '{raw_slug}' not found"));

    let slug = Slug::from_name(raw_slug).map_err(|_| not_found())?;
    state.registry.resolve_slug(slug).await?.ok_or_else(not_found)
}

/// A conference that shut down after resolution no longer exists.
fn closed_as_not_found(error: CcError, raw_slug: &str) -> CcError {
    match error {
        CcError::ConferenceClosed => CcError::NotFound(format!("Conference '{raw_slug}' not found")),
        other => other,
    }
}

/// Trim a display name; blank means absent.
pub(crate) fn normalize_display_name(name: Option<String>) -> Result<Option<String>, CcError> {
    let Some(name) = name else {
        return Ok(None);
    };

    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    if trimmed.chars().count() > MAX_DISPLAY_NAME_LENGTH {
        return Err(CcError::BadRequest(format!(
            "Name must be at most {MAX_DISPLAY_NAME_LENGTH} characters"
        )));
    }

    Ok(Some(trimmed.to_string()))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_display_name() {
        assert_eq!(normalize_display_name(None).unwrap(), None);
        assert_eq!(normalize_display_name(Some("   ".to_string())).unwrap(), None);
        assert_eq!(
            normalize_display_name(Some("  Ada  ".to_string())).unwrap(),
            Some("Ada".to_string())
        );

        let long = "x".repeat(MAX_DISPLAY_NAME_LENGTH + 1);
        assert!(matches!(
            normalize_display_name(Some(long)),
            Err(CcError::BadRequest(_))
        ));
    }

    #[test]
    fn test_closed_as_not_found() {
        assert!(matches!(
            closed_as_not_found(CcError::ConferenceClosed, "river-otter"),
            CcError::NotFound(_)
        ));
        assert!(matches!(
            closed_as_not_found(CcError::Draining, "river-otter"),
            CcError::Draining
        ));
    }
}
