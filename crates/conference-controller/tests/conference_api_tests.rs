//! HTTP integration tests for the Conference Controller.
//!
//! Each test spawns a real server on an ephemeral port backed by the
//! in-memory media platform.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use cc_test_utils::{assert_eventually, ConsistencyCategory, TestConferenceServer};
use common::types::{ParticipantId, PublishPermission, SessionId, StreamId};
use conference_controller::platform::mock::{MockMediaPlatform, PlatformCall, Subscription};
use conference_controller::platform::{PlatformError, PlatformOperation};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

const FANOUT_WAIT: Duration = Duration::from_secs(2);

fn event(kind: &str, session_id: &str, participant_id: &str) -> Value {
    json!({
        "event": kind,
        "sessionId": session_id,
        "participantId": participant_id,
    })
}

fn published(session_id: &str, participant_id: &str, stream_id: &str) -> Value {
    json!({
        "event": "participant-published",
        "sessionId": session_id,
        "participantId": participant_id,
        "streamId": stream_id,
    })
}

fn subscription(session_id: &str, subscriber: &str, stream_id: &str) -> Subscription {
    Subscription {
        session_id: SessionId::new(session_id),
        subscriber: ParticipantId::new(subscriber),
        stream_id: StreamId::new(stream_id),
    }
}

fn str_field<'a>(value: &'a Value, field: &str) -> &'a str {
    value[field].as_str().unwrap()
}

// ============================================================================
// River-otter scenario
// ============================================================================

#[tokio::test]
async fn test_river_otter_scenario() -> anyhow::Result<()> {
    let server = TestConferenceServer::spawn().await?;
    let platform = Arc::clone(server.platform());
    let client = server.client();

    // Create conference "river-otter"
    let response = client
        .post(format!("{}/v1/conferences", server.url()))
        .json(&json!({ "name": "River Otter" }))
        .send()
        .await?;
    assert_eq!(response.status(), 201);
    let conference: Value = response.json().await?;
    assert_eq!(str_field(&conference, "slug"), "river-otter");
    let join_code = str_field(&conference, "joinCode").to_string();
    assert_eq!(join_code.len(), 7);
    assert!(join_code.chars().all(|c| c.is_ascii_digit()));
    let session_id = str_field(&conference, "sessionId").to_string();

    // A joins, connects: nothing published yet, no fan-out
    let a = server.join_web("river-otter", Some("A")).await?;
    assert_eq!(str_field(&a, "sessionId"), session_id);
    assert_eq!(str_field(&a, "joinCode"), join_code);
    let a_id = str_field(&a, "participantId").to_string();

    let status = server
        .post_platform_event(event("participant-joined", &session_id, &a_id))
        .await?;
    assert_eq!(status, 204);

    // A publishes s1 with nobody else connected
    let status = server
        .post_platform_event(published(&session_id, &a_id, "s1"))
        .await?;
    assert_eq!(status, 204);

    // B joins and connects: subscribed to s1
    let b = server.join_web("river-otter", Some("B")).await?;
    assert_eq!(str_field(&b, "sessionId"), session_id);
    let b_id = str_field(&b, "participantId").to_string();
    server
        .post_platform_event(event("participant-joined", &session_id, &b_id))
        .await?;

    assert!(platform.wait_for_subscriptions(1, FANOUT_WAIT).await);
    assert_eq!(
        platform.subscriptions(),
        vec![subscription(&session_id, &b_id, "s1")]
    );

    // B publishes s2: A subscribed to s2
    server
        .post_platform_event(published(&session_id, &b_id, "s2"))
        .await?;
    assert!(platform.wait_for_subscriptions(2, FANOUT_WAIT).await);

    let subscriptions = platform.subscriptions();
    assert_eq!(subscriptions.len(), 2);
    assert!(subscriptions.contains(&subscription(&session_id, &a_id, "s2")));
    assert!(subscriptions
        .iter()
        .all(|s| !(s.subscriber.as_str() == a_id && s.stream_id.as_str() == "s1")));
    assert!(subscriptions
        .iter()
        .all(|s| !(s.subscriber.as_str() == b_id && s.stream_id.as_str() == "s2")));

    // A leaves: B remains, session kept
    server
        .post_platform_event(event("participant-left", &session_id, &a_id))
        .await?;
    let response = client
        .get(format!("{}/v1/conferences/river-otter/participants", server.url()))
        .send()
        .await?;
    assert_eq!(response.status(), 200);
    let participants: Value = response.json().await?;
    let listed = participants["participants"].as_array().unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(str_field(&listed[0], "participantId"), b_id);
    assert!(platform.deleted_sessions().is_empty());

    // B leaves: session deleted, slug and code freed
    server
        .post_platform_event(event("participant-left", &session_id, &b_id))
        .await?;

    let response = client
        .get(format!("{}/v1/conferences/river-otter", server.url()))
        .send()
        .await?;
    assert_eq!(response.status(), 404);

    let expected = vec![SessionId::new(session_id.as_str())];
    assert_eventually(ConsistencyCategory::PlatformCleanup, || {
        let platform = Arc::clone(&platform);
        let expected = expected.clone();
        async move { platform.deleted_sessions() == expected }
    })
    .await
    .expect("platform session should be deleted");

    let response = client
        .post(format!("{}/v1/callbacks/voice/join", server.url()))
        .json(&json!({ "digits": join_code }))
        .send()
        .await?;
    assert_eq!(response.status(), 404);

    // Same name again creates rather than conflicts
    let response = client
        .post(format!("{}/v1/conferences", server.url()))
        .json(&json!({ "name": "River Otter" }))
        .send()
        .await?;
    assert_eq!(response.status(), 201);
    let recreated: Value = response.json().await?;
    assert_ne!(str_field(&recreated, "sessionId"), session_id);

    Ok(())
}

// ============================================================================
// Conference API
// ============================================================================

#[tokio::test]
async fn test_create_conference_conflict_and_validation() -> anyhow::Result<()> {
    let server = TestConferenceServer::spawn().await?;
    let url = format!("{}/v1/conferences", server.url());

    let response = server
        .client()
        .post(&url)
        .json(&json!({ "name": "Weekly Sync" }))
        .send()
        .await?;
    assert_eq!(response.status(), 201);

    let response = server
        .client()
        .post(&url)
        .json(&json!({ "name": "weekly  sync!" }))
        .send()
        .await?;
    assert_eq!(response.status(), 409);
    let body: Value = response.json().await?;
    assert_eq!(body["error"]["code"], "CONFLICT");

    let response = server
        .client()
        .post(&url)
        .json(&json!({ "name": "   " }))
        .send()
        .await?;
    assert_eq!(response.status(), 400);

    let response = server
        .client()
        .post(&url)
        .json(&json!({ "name": "!!!" }))
        .send()
        .await?;
    assert_eq!(response.status(), 400);

    Ok(())
}

#[tokio::test]
async fn test_list_detail_and_delete_conference() -> anyhow::Result<()> {
    let server = TestConferenceServer::spawn().await?;
    let client = server.client();

    server.join_web("alpha", None).await?;
    server.join_web("beta", Some("Grace")).await?;
    server.join_web("beta", None).await?;

    let response = client
        .get(format!("{}/v1/conferences", server.url()))
        .send()
        .await?;
    assert_eq!(response.status(), 200);
    let list: Value = response.json().await?;
    let slugs: Vec<&str> = list["conferences"]
        .as_array()
        .unwrap()
        .iter()
        .map(|c| c["slug"].as_str().unwrap())
        .collect();
    assert_eq!(slugs, vec!["alpha", "beta"]);

    let detail: Value = client
        .get(format!("{}/v1/conferences/beta", server.url()))
        .send()
        .await?
        .json()
        .await?;
    assert_eq!(detail["participantCount"], 2);

    // Pending participants are not listed
    let participants: Value = client
        .get(format!("{}/v1/conferences/beta/participants", server.url()))
        .send()
        .await?
        .json()
        .await?;
    assert_eq!(participants["participants"].as_array().unwrap().len(), 0);

    let response = client
        .delete(format!("{}/v1/conferences/beta", server.url()))
        .send()
        .await?;
    assert_eq!(response.status(), 204);

    let response = client
        .get(format!("{}/v1/conferences/beta", server.url()))
        .send()
        .await?;
    assert_eq!(response.status(), 404);

    let response = client
        .delete(format!("{}/v1/conferences/beta", server.url()))
        .send()
        .await?;
    assert_eq!(response.status(), 404);

    let platform = server.platform();
    assert_eq!(platform.call_count(PlatformOperation::DeleteParticipant), 2);

    Ok(())
}

#[tokio::test]
async fn test_web_join_creates_conference_lazily() -> anyhow::Result<()> {
    let server = TestConferenceServer::spawn().await?;

    let first = server.join_web("Standup Room", Some("Ada")).await?;
    assert_eq!(str_field(&first, "slug"), "standup-room");
    assert_eq!(
        str_field(&first, "websocketUrl"),
        cc_test_utils::TEST_WEBSOCKET_URL
    );
    assert!(!str_field(&first, "deviceToken").is_empty());

    let second = server.join_web("standup-room", None).await?;
    assert_eq!(str_field(&first, "sessionId"), str_field(&second, "sessionId"));
    assert_ne!(
        str_field(&first, "participantId"),
        str_field(&second, "participantId")
    );

    assert_eq!(
        server.platform().call_count(PlatformOperation::CreateSession),
        1
    );

    Ok(())
}

#[tokio::test]
async fn test_web_join_recreates_expired_session() -> anyhow::Result<()> {
    let server = TestConferenceServer::spawn().await?;

    let first = server.join_web("river-otter", None).await?;
    let stale = SessionId::new(str_field(&first, "sessionId"));
    server.platform().expire_session(&stale);

    let second = server.join_web("river-otter", None).await?;
    assert_ne!(str_field(&second, "sessionId"), stale.as_str());

    Ok(())
}

#[tokio::test]
async fn test_web_join_platform_failure_is_bad_gateway() -> anyhow::Result<()> {
    let platform = Arc::new(MockMediaPlatform::new());
    platform.fail_operation(
        PlatformOperation::CreateParticipant,
        PlatformError::Unavailable("connection refused".to_string()),
    );
    let server = TestConferenceServer::spawn_with(platform, &[]).await?;

    let response = server
        .client()
        .post(format!("{}/v1/conferences/river-otter/participants", server.url()))
        .json(&json!({}))
        .send()
        .await?;
    assert_eq!(response.status(), 502);
    let body: Value = response.json().await?;
    assert_eq!(body["error"]["code"], "PLATFORM_ERROR");
    assert!(!body["error"]["message"]
        .as_str()
        .unwrap()
        .contains("connection refused"));

    Ok(())
}

#[tokio::test]
async fn test_failed_lazy_join_removes_empty_conference() -> anyhow::Result<()> {
    let platform = Arc::new(MockMediaPlatform::new());
    platform.fail_operation(
        PlatformOperation::CreateParticipant,
        PlatformError::Unavailable("down".to_string()),
    );
    let server = TestConferenceServer::spawn_with(Arc::clone(&platform), &[]).await?;

    for i in 0..5 {
        let response = server
            .client()
            .post(format!("{}/v1/conferences/room-{i}/participants", server.url()))
            .json(&json!({}))
            .send()
            .await?;
        assert_eq!(response.status(), 502);
    }

    let registry = server.registry().clone();
    assert_eventually(ConsistencyCategory::PlatformCleanup, || {
        let platform = Arc::clone(&platform);
        let registry = registry.clone();
        async move {
            let live = registry.list_conferences().await.map_or(usize::MAX, |c| c.len());
            live == 0 && platform.deleted_sessions().len() == 5
        }
    })
    .await
    .expect("empty conferences should be torn down");

    // The slug is free again once the platform recovers
    platform.clear_failure(PlatformOperation::CreateParticipant);
    let joined = server.join_web("room-0", None).await?;
    assert_eq!(str_field(&joined, "slug"), "room-0");
    assert_eq!(platform.call_count(PlatformOperation::CreateSession), 6);

    Ok(())
}

#[tokio::test]
async fn test_join_code_exhaustion() -> anyhow::Result<()> {
    let platform = Arc::new(MockMediaPlatform::new());
    let server = TestConferenceServer::spawn_with(platform, &[("CC_JOIN_CODE_LENGTH", "1")]).await?;

    for i in 0..10 {
        server.join_web(&format!("room-{i}"), None).await?;
    }

    let response = server
        .client()
        .post(format!("{}/v1/conferences", server.url()))
        .json(&json!({ "name": "one too many" }))
        .send()
        .await?;
    assert_eq!(response.status(), 503);
    let body: Value = response.json().await?;
    assert_eq!(body["error"]["code"], "CAPACITY_EXCEEDED");

    Ok(())
}

// ============================================================================
// Telephone bridge
// ============================================================================

#[tokio::test]
async fn test_voice_join_by_code() -> anyhow::Result<()> {
    let server = TestConferenceServer::spawn().await?;
    let client = server.client();

    let web = server.join_web("river-otter", None).await?;
    let code = str_field(&web, "joinCode");
    let spaced: String = code
        .chars()
        .flat_map(|c| [c, ' '])
        .collect::<String>()
        + "#";

    let response = client
        .post(format!("{}/v1/callbacks/voice/join", server.url()))
        .json(&json!({ "digits": spaced, "from": "+15550100" }))
        .send()
        .await?;
    assert_eq!(response.status(), 200);
    let voice: Value = response.json().await?;
    assert_eq!(str_field(&voice, "sessionId"), str_field(&web, "sessionId"));
    assert!(!str_field(&voice, "bridgeToken").is_empty());

    let calls = server.platform().calls();
    let created_audio_only = calls.iter().any(|call| {
        matches!(
            call,
            PlatformCall::CreateParticipant {
                tag,
                publish_permissions,
            } if tag == "phone"
                && publish_permissions == &vec![PublishPermission::Audio]
        )
    });
    assert!(created_audio_only);

    // The caller's number is local only and never sent to the platform
    assert!(!format!("{calls:?}").contains("15550100"));

    Ok(())
}

#[tokio::test]
async fn test_voice_join_unknown_code_never_creates() -> anyhow::Result<()> {
    let server = TestConferenceServer::spawn().await?;

    for digits in ["1234567", "", "abc"] {
        let response = server
            .client()
            .post(format!("{}/v1/callbacks/voice/join", server.url()))
            .json(&json!({ "digits": digits }))
            .send()
            .await?;
        assert_eq!(response.status(), 404);
    }

    assert_eq!(
        server.platform().call_count(PlatformOperation::CreateSession),
        0
    );

    Ok(())
}

#[tokio::test]
async fn test_voice_status_terminal_removes_caller() -> anyhow::Result<()> {
    let server = TestConferenceServer::spawn().await?;
    let client = server.client();

    let web = server.join_web("river-otter", None).await?;
    let voice: Value = client
        .post(format!("{}/v1/callbacks/voice/join", server.url()))
        .json(&json!({ "digits": str_field(&web, "joinCode") }))
        .send()
        .await?
        .json()
        .await?;
    let session_id = str_field(&voice, "sessionId");
    let caller = str_field(&voice, "participantId");

    let status_url = format!("{}/v1/callbacks/voice/status", server.url());
    let response = client
        .post(&status_url)
        .json(&json!({ "sessionId": session_id, "participantId": caller, "status": "ringing" }))
        .send()
        .await?;
    assert_eq!(response.status(), 204);
    assert!(server.platform().has_participant(&ParticipantId::new(caller)));

    let response = client
        .post(&status_url)
        .json(&json!({ "sessionId": session_id, "participantId": caller, "status": "completed" }))
        .send()
        .await?;
    assert_eq!(response.status(), 204);
    assert!(!server.platform().has_participant(&ParticipantId::new(caller)));

    // Repeated status is harmless
    let response = client
        .post(&status_url)
        .json(&json!({ "sessionId": session_id, "participantId": caller, "status": "completed" }))
        .send()
        .await?;
    assert_eq!(response.status(), 204);

    let detail: Value = client
        .get(format!("{}/v1/conferences/river-otter", server.url()))
        .send()
        .await?
        .json()
        .await?;
    assert_eq!(detail["participantCount"], 1);

    Ok(())
}

// ============================================================================
// Platform callbacks
// ============================================================================

#[tokio::test]
async fn test_platform_events_for_unknown_targets_are_ignored() -> anyhow::Result<()> {
    let server = TestConferenceServer::spawn().await?;

    let status = server
        .post_platform_event(event("participant-joined", "no-such-session", "p"))
        .await?;
    assert_eq!(status, 204);

    let web = server.join_web("river-otter", None).await?;
    let session_id = str_field(&web, "sessionId");

    let status = server
        .post_platform_event(event("participant-joined", session_id, "stranger"))
        .await?;
    assert_eq!(status, 204);

    let status = server
        .post_platform_event(event("participant-unsubscribed", session_id, "stranger"))
        .await?;
    assert_eq!(status, 204);

    Ok(())
}

#[tokio::test]
async fn test_platform_event_validation() -> anyhow::Result<()> {
    let server = TestConferenceServer::spawn().await?;

    let status = server
        .post_platform_event(event("participant-published", "s", "p"))
        .await?;
    assert_eq!(status, 400);

    let status = server
        .post_platform_event(event("participant-exploded", "s", "p"))
        .await?;
    assert!(status.is_client_error());

    Ok(())
}

// ============================================================================
// Operational endpoints
// ============================================================================

#[tokio::test]
async fn test_health_ready_and_metrics() -> anyhow::Result<()> {
    let server = TestConferenceServer::spawn().await?;
    let client = server.client();

    let response = client.get(format!("{}/health", server.url())).send().await?;
    assert_eq!(response.status(), 200);

    let response = client.get(format!("{}/ready", server.url())).send().await?;
    assert_eq!(response.status(), 200);

    server.health().set_not_ready();
    let response = client.get(format!("{}/ready", server.url())).send().await?;
    assert_eq!(response.status(), 503);

    let response = client.get(format!("{}/metrics", server.url())).send().await?;
    assert_eq!(response.status(), 200);

    Ok(())
}
