//! Anti-forgery header on the wire.
//!
//! Tests for:
//! - Mutating requests carry the token's csrf claim
//! - Safe methods never carry it
//! - Missing or broken tokens fail open

mod common;

use common::{manager, manager_with_token, token_for};
use roomsync_session::{CSRF_HEADER, CredentialStore, SignedToken};
use std::time::Duration;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn accept_everything(server: &MockServer) {
    Mock::given(wiremock::matchers::any())
        .respond_with(ResponseTemplate::new(204))
        .mount(server)
        .await;
}

#[tokio::test]
async fn post_with_valid_token_carries_csrf_header() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/bookings"))
        .and(header(CSRF_HEADER, "csrf-xyz"))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&server)
        .await;

    let session = manager_with_token(&server, &token_for("1", "a@example.com", "csrf-xyz"));
    let resp = session
        .api()
        .post_json("/bookings", &serde_json::json!({"room": 4}))
        .await
        .unwrap();
    assert_eq!(resp.status(), 201);
}

#[tokio::test]
async fn put_and_delete_carry_csrf_header() {
    let server = MockServer::start().await;
    accept_everything(&server).await;

    let session = manager_with_token(&server, &token_for("1", "a@example.com", "csrf-xyz"));
    session.api().put_json("/bookings/3", &serde_json::json!({"room": 5})).await.unwrap();
    session.api().delete("/bookings/3").await.unwrap();

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 2);
    for request in &requests {
        assert_eq!(request.headers.get(CSRF_HEADER).unwrap(), "csrf-xyz");
    }
}

#[tokio::test]
async fn get_never_carries_csrf_header() {
    let server = MockServer::start().await;
    accept_everything(&server).await;

    let session = manager_with_token(&server, &token_for("1", "a@example.com", "csrf-xyz"));
    session.api().get("/rooms").await.unwrap();

    let requests = server.received_requests().await.unwrap();
    assert!(requests[0].headers.get(CSRF_HEADER).is_none());
}

#[tokio::test]
async fn delete_without_token_is_sent_bare() {
    let server = MockServer::start().await;
    accept_everything(&server).await;

    let resp = manager(&server).api().delete("/bookings/3").await.unwrap();
    assert_eq!(resp.status(), 204);

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 1);
    assert!(requests[0].headers.get(CSRF_HEADER).is_none());
}

#[tokio::test]
async fn undecodable_token_fails_open() {
    let server = MockServer::start().await;
    accept_everything(&server).await;

    let session = manager(&server);
    session
        .credentials()
        .put(&SignedToken::new("not.a.jwt"), Duration::from_secs(60))
        .unwrap();
    session.api().post_json("/bookings", &serde_json::json!({})).await.unwrap();

    let requests = server.received_requests().await.unwrap();
    assert!(requests[0].headers.get(CSRF_HEADER).is_none());
}

#[tokio::test]
async fn header_tracks_login_and_logout() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/login/email"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({"access_token": token_for("2", "b@example.com", "fresh")})),
        )
        .mount(&server)
        .await;
    accept_everything(&server).await;

    let session = manager(&server);
    session.login_with_password("b@example.com", "pw").await.unwrap();
    session.api().delete("/bookings/1").await.unwrap();
    session.logout().unwrap();
    session.api().delete("/bookings/2").await.unwrap();

    let requests = server.received_requests().await.unwrap();
    let deletes: Vec<_> = requests.iter().filter(|r| r.method.as_str() == "DELETE").collect();
    assert_eq!(deletes.len(), 2);
    assert_eq!(deletes[0].headers.get(CSRF_HEADER).unwrap(), "fresh");
    assert!(deletes[1].headers.get(CSRF_HEADER).is_none());
}
