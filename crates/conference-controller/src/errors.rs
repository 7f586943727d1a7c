//! Conference Controller error types.
//!
//! All errors map to HTTP status codes via the `IntoResponse` impl. Platform
//! and internal failures are logged server-side; clients get a generic
//! message.

use crate::platform::PlatformError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Conference Controller error type.
///
/// Maps to HTTP status codes:
/// - BadRequest: 400 Bad Request
/// - NotFound: 404 Not Found
/// - Conflict: 409 Conflict
/// - Platform: 502 Bad Gateway
/// - ConferenceClosed, CapacityExceeded, Draining: 503 Service Unavailable
/// - Internal: 500 Internal Server Error
#[derive(Debug, Clone, Error)]
pub enum CcError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    /// The conference is being torn down and accepts no new participants.
    #[error("Conference is closing")]
    ConferenceClosed,

    /// No free join code is left in the configured code space.
    #[error("Capacity exceeded: {0}")]
    CapacityExceeded(String),

    #[error("Service is draining")]
    Draining,

    #[error("Media platform error: {0}")]
    Platform(#[from] PlatformError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl CcError {
    /// Returns the HTTP status code for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            CcError::BadRequest(_) => 400,
            CcError::NotFound(_) => 404,
            CcError::Conflict(_) => 409,
            CcError::Platform(_) => 502,
            CcError::ConferenceClosed | CcError::CapacityExceeded(_) | CcError::Draining => 503,
            CcError::Internal(_) => 500,
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

impl IntoResponse for CcError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            CcError::NotFound(resource) => (StatusCode::NOT_FOUND, "NOT_FOUND", resource.clone()),
            CcError::Conflict(reason) => (StatusCode::CONFLICT, "CONFLICT", reason.clone()),
            CcError::BadRequest(reason) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", reason.clone()),
            CcError::ConferenceClosed => (
                StatusCode::SERVICE_UNAVAILABLE,
                "CONFERENCE_CLOSED",
                "Conference is closing. Please try again.".to_string(),
            ),
            CcError::CapacityExceeded(reason) => {
                tracing::warn!(target: "cc.capacity", reason = %reason, "Capacity exceeded");
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "CAPACITY_EXCEEDED",
                    "No conference capacity available".to_string(),
                )
            }
            CcError::Draining => (
                StatusCode::SERVICE_UNAVAILABLE,
                "SERVICE_UNAVAILABLE",
                "Service temporarily unavailable".to_string(),
            ),
            CcError::Platform(err) => {
                // Log actual error server-side, return generic message to client
                tracing::error!(target: "cc.platform", error = %err, "Media platform request failed");
                (
                    StatusCode::BAD_GATEWAY,
                    "PLATFORM_ERROR",
                    "Media platform request failed".to_string(),
                )
            }
            CcError::Internal(reason) => {
                tracing::error!(target: "cc.internal", reason = %reason, "Internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "An internal error occurred".to_string(),
                )
            }
        };

        let error_response = ErrorResponse {
            error: ErrorDetail {
                code: code.to_string(),
                message,
            },
        };

        (status, Json(error_response)).into_response()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[test]
    fn test_display() {
        assert_eq!(
            CcError::NotFound("Conference not found".to_string()).to_string(),
            "Not found: Conference not found"
        );
        assert_eq!(CcError::ConferenceClosed.to_string(), "Conference is closing");
        assert_eq!(
            CcError::Platform(PlatformError::NotFound).to_string(),
            "Media platform error: Resource not found on media platform"
        );
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(CcError::BadRequest("x".into()).status_code(), 400);
        assert_eq!(CcError::NotFound("x".into()).status_code(), 404);
        assert_eq!(CcError::Conflict("x".into()).status_code(), 409);
        assert_eq!(
            CcError::Platform(PlatformError::Unavailable("down".into())).status_code(),
            502
        );
        assert_eq!(CcError::ConferenceClosed.status_code(), 503);
        assert_eq!(CcError::CapacityExceeded("x".into()).status_code(), 503);
        assert_eq!(CcError::Draining.status_code(), 503);
        assert_eq!(CcError::Internal("x".into()).status_code(), 500);
    }

    #[tokio::test]
    async fn test_not_found_response_body() {
        let response = CcError::NotFound("Conference not found".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let body = body_json(response).await;
        assert_eq!(body["error"]["code"], "NOT_FOUND");
        assert_eq!(body["error"]["message"], "Conference not found");
    }

    #[tokio::test]
    async fn test_platform_error_hides_details() {
        let response = CcError::Platform(PlatformError::Rejected {
            status: 401,
            message: "bad credentials for acct-42".to_string(),
        })
        .into_response();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);

        let body = body_json(response).await;
        assert_eq!(body["error"]["code"], "PLATFORM_ERROR");
        assert!(!body["error"]["message"]
            .as_str()
            .unwrap()
            .contains("acct-42"));
    }

    #[tokio::test]
    async fn test_internal_error_hides_details() {
        let response = CcError::Internal("channel send failed".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body = body_json(response).await;
        assert_eq!(body["error"]["code"], "INTERNAL_ERROR");
        assert_eq!(body["error"]["message"], "An internal error occurred");
    }

    #[test]
    fn test_from_platform_error() {
        let err: CcError = PlatformError::Unavailable("timeout".to_string()).into();
        assert!(matches!(err, CcError::Platform(PlatformError::Unavailable(_))));
    }
}
