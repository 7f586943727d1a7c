//! HTTP client for the media platform REST API.
//!
//! All resources live under `{api_url}/accounts/{account_id}`. Requests use
//! HTTP basic auth with the configured platform credentials.
//!
//! Status mapping:
//! - 2xx: success
//! - 404: [`PlatformError::NotFound`]
//! - 5xx, timeouts, connection failures: [`PlatformError::Unavailable`]
//! - other 4xx: [`PlatformError::Rejected`]

use super::{CreatedParticipant, MediaPlatform, PlatformError, PlatformOperation};
use crate::config::Config;
use crate::errors::CcError;
use crate::observability::metrics;
use common::secret::{ExposeSecret, SecretString};
use common::types::{ParticipantId, PublishPermission, SessionId, StreamId};
use reqwest::{Client, RequestBuilder, Response};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{error, instrument, warn};

/// Default timeout for platform requests in seconds.
const PLATFORM_REQUEST_TIMEOUT_SECS: u64 = 10;

/// Default connect timeout in seconds.
const PLATFORM_CONNECT_TIMEOUT_SECS: u64 = 5;

/// Longest error body kept in a `Rejected` message.
const MAX_ERROR_BODY_CHARS: usize = 256;

#[derive(Debug, Serialize)]
struct CreateSessionRequest<'a> {
    tag: &'a str,
}

#[derive(Debug, Deserialize)]
struct CreateSessionResponse {
    id: SessionId,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateParticipantRequest<'a> {
    tag: &'a str,
    publish_permissions: &'a [PublishPermission],
    callback_url: &'a str,
}

#[derive(Debug, Deserialize)]
struct ParticipantBody {
    id: ParticipantId,
}

#[derive(Debug, Deserialize)]
struct CreateParticipantResponse {
    participant: ParticipantBody,
    token: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SubscribeRequest<'a> {
    stream_id: &'a StreamId,
}

/// Media platform REST client.
#[derive(Clone)]
pub struct HttpMediaPlatform {
    /// HTTP client with configured timeouts.
    client: Client,

    /// `{api_url}/accounts/{account_id}`.
    base_url: String,

    username: String,

    password: SecretString,
}

impl HttpMediaPlatform {
    /// Create a new platform client.
    ///
    /// # Errors
    ///
    /// Returns `CcError::Internal` if the HTTP client cannot be built.
    pub fn new(
        api_url: &str,
        account_id: &str,
        username: String,
        password: SecretString,
    ) -> Result<Self, CcError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(PLATFORM_REQUEST_TIMEOUT_SECS))
            .connect_timeout(Duration::from_secs(PLATFORM_CONNECT_TIMEOUT_SECS))
            .build()
            .map_err(|e| {
                error!(target: "cc.platform", error = %e, "Failed to build HTTP client");
                CcError::Internal("failed to build platform HTTP client".to_string())
            })?;

        Ok(Self {
            client,
            base_url: format!("{}/accounts/{}", api_url.trim_end_matches('/'), account_id),
            username,
            password,
        })
    }

    /// Create a client from service configuration.
    pub fn from_config(config: &Config) -> Result<Self, CcError> {
        Self::new(
            &config.platform_api_url,
            &config.platform_account_id,
            config.platform_username.clone(),
            config.platform_password.clone(),
        )
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Send an authenticated request and classify the outcome.
    async fn execute(
        &self,
        operation: PlatformOperation,
        request: RequestBuilder,
    ) -> Result<Response, PlatformError> {
        let start = Instant::now();

        let result = match request
            .basic_auth(&self.username, Some(self.password.expose_secret()))
            .send()
            .await
        {
            Ok(response) => Self::check_status(operation, response).await,
            Err(e) => {
                warn!(
                    target: "cc.platform",
                    operation = operation.as_str(),
                    error = %e,
                    "Platform request failed"
                );
                Err(PlatformError::Unavailable(format!(
                    "{} request failed",
                    operation.as_str()
                )))
            }
        };

        metrics::record_platform_request(operation.as_str(), start.elapsed(), result.is_ok());
        result
    }

    async fn check_status(
        operation: PlatformOperation,
        response: Response,
    ) -> Result<Response, PlatformError> {
        let status = response.status();

        if status.is_success() {
            Ok(response)
        } else if status.as_u16() == 404 {
            Err(PlatformError::NotFound)
        } else if status.is_server_error() {
            warn!(
                target: "cc.platform",
                operation = operation.as_str(),
                status = %status,
                "Platform returned server error"
            );
            Err(PlatformError::Unavailable(format!(
                "platform returned {status}"
            )))
        } else {
            let body = response.text().await.unwrap_or_default();
            let message: String = body.chars().take(MAX_ERROR_BODY_CHARS).collect();
            warn!(
                target: "cc.platform",
                operation = operation.as_str(),
                status = %status,
                body = %message,
                "Platform rejected request"
            );
            Err(PlatformError::Rejected {
                status: status.as_u16(),
                message,
            })
        }
    }

    async fn parse_json<T: for<'de> Deserialize<'de>>(
        operation: PlatformOperation,
        response: Response,
    ) -> Result<T, PlatformError> {
        response.json().await.map_err(|e| {
            error!(
                target: "cc.platform",
                operation = operation.as_str(),
                error = %e,
                "Failed to parse platform response"
            );
            PlatformError::InvalidResponse(format!("{} response: {e}", operation.as_str()))
        })
    }
}

#[async_trait::async_trait]
impl MediaPlatform for HttpMediaPlatform {
    #[instrument(skip(self), fields(tag = %tag))]
    async fn create_session(&self, tag: &str) -> Result<SessionId, PlatformError> {
        let op = PlatformOperation::CreateSession;
        let request = self
            .client
            .post(self.url("/sessions"))
            .json(&CreateSessionRequest { tag });

        let response = self.execute(op, request).await?;
        let body: CreateSessionResponse = Self::parse_json(op, response).await?;
        Ok(body.id)
    }

    #[instrument(skip(self), fields(session_id = %session_id))]
    async fn get_session(&self, session_id: &SessionId) -> Result<(), PlatformError> {
        let request = self.client.get(self.url(&format!("/sessions/{session_id}")));
        self.execute(PlatformOperation::GetSession, request)
            .await
            .map(|_| ())
    }

    #[instrument(skip(self), fields(session_id = %session_id))]
    async fn delete_session(&self, session_id: &SessionId) -> Result<(), PlatformError> {
        let request = self
            .client
            .delete(self.url(&format!("/sessions/{session_id}")));
        self.execute(PlatformOperation::DeleteSession, request)
            .await
            .map(|_| ())
    }

    #[instrument(skip(self, publish_permissions, callback_url), fields(tag = %tag))]
    async fn create_participant(
        &self,
        tag: &str,
        publish_permissions: &[PublishPermission],
        callback_url: &str,
    ) -> Result<CreatedParticipant, PlatformError> {
        let op = PlatformOperation::CreateParticipant;
        let request = self
            .client
            .post(self.url("/participants"))
            .json(&CreateParticipantRequest {
                tag,
                publish_permissions,
                callback_url,
            });

        let response = self.execute(op, request).await?;
        let body: CreateParticipantResponse = Self::parse_json(op, response).await?;
        Ok(CreatedParticipant {
            participant_id: body.participant.id,
            device_token: SecretString::from(body.token),
        })
    }

    #[instrument(skip(self), fields(participant_id = %participant_id, session_id = %session_id))]
    async fn add_participant_to_session(
        &self,
        participant_id: &ParticipantId,
        session_id: &SessionId,
    ) -> Result<(), PlatformError> {
        let request = self.client.put(self.url(&format!(
            "/sessions/{session_id}/participants/{participant_id}"
        )));
        self.execute(PlatformOperation::AddParticipant, request)
            .await
            .map(|_| ())
    }

    #[instrument(skip(self), fields(participant_id = %participant_id, session_id = %session_id))]
    async fn remove_participant_from_session(
        &self,
        participant_id: &ParticipantId,
        session_id: &SessionId,
    ) -> Result<(), PlatformError> {
        let request = self.client.delete(self.url(&format!(
            "/sessions/{session_id}/participants/{participant_id}"
        )));
        self.execute(PlatformOperation::RemoveParticipant, request)
            .await
            .map(|_| ())
    }

    #[instrument(skip(self), fields(participant_id = %participant_id))]
    async fn delete_participant(
        &self,
        participant_id: &ParticipantId,
    ) -> Result<(), PlatformError> {
        let request = self
            .client
            .delete(self.url(&format!("/participants/{participant_id}")));
        self.execute(PlatformOperation::DeleteParticipant, request)
            .await
            .map(|_| ())
    }

    #[instrument(skip(self), fields(session_id = %session_id, participant_id = %participant_id, stream_id = %stream_id))]
    async fn subscribe(
        &self,
        session_id: &SessionId,
        participant_id: &ParticipantId,
        stream_id: &StreamId,
    ) -> Result<(), PlatformError> {
        let request = self
            .client
            .post(self.url(&format!(
                "/sessions/{session_id}/participants/{participant_id}/subscriptions"
            )))
            .json(&SubscribeRequest { stream_id });
        self.execute(PlatformOperation::Subscribe, request)
            .await
            .map(|_| ())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use wiremock::matchers::{basic_auth, body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn platform(server: &MockServer) -> HttpMediaPlatform {
        HttpMediaPlatform::new(
            &server.uri(),
            "acct-1",
            "api-user".to_string(),
            SecretString::from("api-pass"),
        )
        .unwrap()
    }

    // =========================================================================
    // Sessions
    // =========================================================================

    #[tokio::test]
    async fn test_create_session_sends_tag_with_basic_auth() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/accounts/acct-1/sessions"))
            .and(basic_auth("api-user", "api-pass"))
            .and(body_json(serde_json::json!({ "tag": "river-otter" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "sess-123",
                "tag": "river-otter"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let session_id = platform(&server).create_session("river-otter").await.unwrap();
        assert_eq!(session_id.as_str(), "sess-123");
    }

    #[tokio::test]
    async fn test_get_session_not_found() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/accounts/acct-1/sessions/sess-gone"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let result = platform(&server)
            .get_session(&SessionId::new("sess-gone"))
            .await;
        assert!(matches!(result, Err(PlatformError::NotFound)));
    }

    #[tokio::test]
    async fn test_server_error_is_unavailable() {
        let server = MockServer::start().await;

        Mock::given(method("DELETE"))
            .and(path("/accounts/acct-1/sessions/sess-1"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let result = platform(&server)
            .delete_session(&SessionId::new("sess-1"))
            .await;
        assert!(matches!(result, Err(PlatformError::Unavailable(_))));
    }

    #[tokio::test]
    async fn test_client_error_is_rejected_with_body() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/accounts/acct-1/sessions"))
            .respond_with(ResponseTemplate::new(401).set_body_string("bad credentials"))
            .mount(&server)
            .await;

        let result = platform(&server).create_session("x").await;
        match result {
            Err(PlatformError::Rejected { status, message }) => {
                assert_eq!(status, 401);
                assert_eq!(message, "bad credentials");
            }
            other => panic!("expected Rejected, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_malformed_body_is_invalid_response() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/accounts/acct-1/sessions"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&server)
            .await;

        let result = platform(&server).create_session("x").await;
        assert!(matches!(result, Err(PlatformError::InvalidResponse(_))));
    }

    #[tokio::test]
    async fn test_connection_refused_is_unavailable() {
        let platform = HttpMediaPlatform::new(
            "http://127.0.0.1:1",
            "acct-1",
            "u".to_string(),
            SecretString::from("p"),
        )
        .unwrap();

        let result = platform.get_session(&SessionId::new("s")).await;
        assert!(matches!(result, Err(PlatformError::Unavailable(_))));
    }

    // =========================================================================
    // Participants and subscriptions
    // =========================================================================

    #[tokio::test]
    async fn test_create_participant_returns_id_and_token() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/accounts/acct-1/participants"))
            .and(body_json(serde_json::json!({
                "tag": "alice",
                "publishPermissions": ["AUDIO", "VIDEO"],
                "callbackUrl": "https://cc.example.com/v1/callbacks/platform"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "participant": { "id": "p-1" },
                "token": "device-token-1"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let created = platform(&server)
            .create_participant(
                "alice",
                &[PublishPermission::Audio, PublishPermission::Video],
                "https://cc.example.com/v1/callbacks/platform",
            )
            .await
            .unwrap();

        assert_eq!(created.participant_id.as_str(), "p-1");
        assert_eq!(created.device_token.expose_secret(), "device-token-1");
    }

    #[tokio::test]
    async fn test_participant_membership_paths() {
        let server = MockServer::start().await;

        Mock::given(method("PUT"))
            .and(path("/accounts/acct-1/sessions/s-1/participants/p-1"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path("/accounts/acct-1/sessions/s-1/participants/p-1"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path("/accounts/acct-1/participants/p-1"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let platform = platform(&server);
        let session = SessionId::new("s-1");
        let participant = ParticipantId::new("p-1");

        platform
            .add_participant_to_session(&participant, &session)
            .await
            .unwrap();
        platform
            .remove_participant_from_session(&participant, &session)
            .await
            .unwrap();
        platform.delete_participant(&participant).await.unwrap();
    }

    #[tokio::test]
    async fn test_subscribe_posts_stream_id() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/accounts/acct-1/sessions/s-1/participants/p-2/subscriptions"))
            .and(body_json(serde_json::json!({ "streamId": "stream-a" })))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        platform(&server)
            .subscribe(
                &SessionId::new("s-1"),
                &ParticipantId::new("p-2"),
                &StreamId::new("stream-a"),
            )
            .await
            .unwrap();
    }
}
