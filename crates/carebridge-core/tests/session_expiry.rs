mod common;

use std::time::Duration;

use carebridge_core::{ApiError, GuardState, SessionEvent, Severity};
use futures::future::join_all;
use serde_json::{json, Value};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use common::{harness, harness_with_delay, SETTLE};

async fn mount_unauthorized(server: &MockServer) {
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "statusCode": 401,
            "message": "Unauthorized"
        })))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_401_notifies_clears_and_redirects_once() {
    let server = MockServer::start().await;
    mount_unauthorized(&server).await;
    let h = harness(&server.uri(), "/dashboard", Some("stale-token"));

    let err = h
        .api
        .service("dementia-profiles")
        .find::<Value>()
        .await
        .unwrap_err();

    // Caller still gets the original failure
    assert!(err.is_unauthorized());
    assert_eq!(err.body(), Some(&json!({ "statusCode": 401, "message": "Unauthorized" })));

    let seen = h.notifier.seen();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].title, "Session Expired");
    assert_eq!(seen[0].severity, Severity::Warning);
    assert!(h.session.token().is_none());

    // Redirect only after the delay
    assert!(h.navigator.visits().is_empty());
    tokio::time::sleep(SETTLE).await;
    assert_eq!(h.navigator.visits(), vec!["/".to_string()]);
    assert_eq!(h.guard.state(), GuardState::Idle);
}

#[tokio::test]
async fn test_concurrent_401s_single_episode() {
    let server = MockServer::start().await;
    mount_unauthorized(&server).await;
    // Long enough that every response lands inside the episode
    let delay = Duration::from_millis(750);
    let h = harness_with_delay(&server.uri(), "/care-plan", Some("stale-token"), delay);

    let resources = ["dementia-profiles", "medications", "appointments", "caregivers"];
    let calls = (0..12).map(|i| {
        let service = h.api.service(resources[i % resources.len()]);
        async move { service.find::<Value>().await }
    });
    let results = join_all(calls).await;

    assert_eq!(results.len(), 12);
    assert!(results
        .iter()
        .all(|r| matches!(r, Err(ApiError::Unauthorized { .. }))));
    assert_eq!(h.notifier.seen().len(), 1);
    assert!(h.navigator.visits().is_empty());

    tokio::time::sleep(delay + SETTLE).await;
    assert_eq!(h.navigator.visits().len(), 1);
    assert_eq!(server.received_requests().await.unwrap().len(), 12);
}

#[tokio::test]
async fn test_401_on_auth_page_is_silent() {
    let server = MockServer::start().await;
    mount_unauthorized(&server).await;
    let h = harness(&server.uri(), "/login", Some("stale-token"));

    let err = h.api.service("users").get::<Value>("me").await.unwrap_err();

    assert!(err.is_unauthorized());
    assert_eq!(h.guard.state(), GuardState::Idle);
    assert!(h.notifier.seen().is_empty());
    // Session is left for the login page to manage
    assert_eq!(h.session.token().as_deref(), Some("stale-token"));

    tokio::time::sleep(SETTLE).await;
    assert!(h.navigator.visits().is_empty());
}

#[tokio::test]
async fn test_guard_rearms_after_episode() {
    let server = MockServer::start().await;
    mount_unauthorized(&server).await;
    let h = harness(&server.uri(), "/dashboard", Some("stale-token"));
    let mut events = h.guard.subscribe();

    let _ = h.api.service("appointments").find::<Value>().await;
    assert_eq!(events.recv().await.unwrap(), SessionEvent::Expired);
    assert_eq!(
        events.recv().await.unwrap(),
        SessionEvent::Redirected { to: "/".to_string() }
    );
    assert_eq!(h.guard.state(), GuardState::Idle);

    // A later, unrelated failure starts a new episode
    let _ = h.api.service("appointments").find::<Value>().await;
    assert_eq!(h.notifier.seen().len(), 2);
    tokio::time::sleep(SETTLE).await;
    assert_eq!(h.navigator.visits().len(), 2);
}

#[tokio::test]
async fn test_status_code_in_body_counts_as_401() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/journal-entries"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "statusCode": "401",
            "message": "jwt expired"
        })))
        .mount(&server)
        .await;
    let h = harness(&server.uri(), "/journal", Some("stale-token"));

    let err = h
        .api
        .service("journal-entries")
        .create::<Value, _>(&json!({ "mood": "calm" }))
        .await
        .unwrap_err();

    match err {
        ApiError::Unauthorized { message, .. } => assert_eq!(message, "jwt expired"),
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(h.notifier.seen().len(), 1);
}

#[tokio::test]
async fn test_non_401_failure_passes_through() {
    let server = MockServer::start().await;
    let body = json!({ "statusCode": 500, "message": "Database unavailable" });
    Mock::given(method("PATCH"))
        .and(path("/medications/m1"))
        .respond_with(ResponseTemplate::new(500).set_body_json(body.clone()))
        .mount(&server)
        .await;
    let h = harness(&server.uri(), "/medications", Some("good-token"));

    let err = h
        .api
        .service("medications")
        .patch::<Value, _>("m1", &json!({ "dose": "5mg" }))
        .await
        .unwrap_err();

    assert_eq!(err.status().map(|s| s.as_u16()), Some(500));
    assert_eq!(err.body(), Some(&body));
    assert!(h.notifier.seen().is_empty());
    assert_eq!(h.session.token().as_deref(), Some("good-token"));
    tokio::time::sleep(SETTLE).await;
    assert!(h.navigator.visits().is_empty());
}

#[tokio::test]
async fn test_404_by_user_id_has_no_session_side_effects() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/dementia-profiles/user/u1"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({
            "statusCode": 404,
            "message": "Profile not found"
        })))
        .expect(1)
        .mount(&server)
        .await;
    let h = harness(&server.uri(), "/dashboard", Some("good-token"));

    let err = h
        .api
        .service("dementia-profiles")
        .find_by_user_id::<Value>("u1")
        .await
        .unwrap_err();

    assert_eq!(err.status().map(|s| s.as_u16()), Some(404));
    assert!(!err.is_unauthorized());
    assert!(h.notifier.seen().is_empty());
    assert_eq!(h.guard.state(), GuardState::Idle);
    assert!(h.session.is_authenticated());
}

#[tokio::test]
async fn test_network_failure_skips_guard() {
    // Nothing listens on port 1
    let h = harness("http://127.0.0.1:1", "/dashboard", Some("good-token"));

    let err = h.api.service("caregivers").find::<Value>().await.unwrap_err();

    assert!(matches!(err, ApiError::NetworkError(_)));
    assert!(h.notifier.seen().is_empty());
    assert!(h.session.is_authenticated());
}
