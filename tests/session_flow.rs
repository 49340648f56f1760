//! Session manager against a mock backend.
//!
//! Tests for:
//! - Password login (form and JSON bodies, body and cookie token contracts)
//! - Rejected and undecodable logins
//! - Profile fetch and registration
//! - Logout and identity lookup
//! - Persistence across manager restarts

mod common;

use std::time::Duration;

use common::{config_for, manager, manager_with_token, token_for};
use roomsync_session::{
    AuthState, CredentialStore, FileCredentialStore, LoginEncoding, MemoryCredentialStore, SessionError, SessionManager,
    SignedToken,
};
use wiremock::matchers::{body_json, body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn mount_login_body(server: &MockServer, token: &str) {
    Mock::given(method("POST"))
        .and(path("/login/email"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({"access_token": token, "token_type": "bearer"})),
        )
        .mount(server)
        .await;
}

// =============================================================================
// Password login
// =============================================================================

#[tokio::test]
async fn login_then_refresh_is_authenticated() {
    let server = MockServer::start().await;
    let token = token_for("17", "guest@example.com", "csrf-17");
    mount_login_body(&server, &token).await;

    let session = manager(&server);
    let claims = session.login_with_password("guest@example.com", "hunter2").await.unwrap();
    assert_eq!(claims.email, "guest@example.com");

    let state = session.refresh();
    assert!(matches!(&state, AuthState::Authenticated(c) if c.email == "guest@example.com"));
    assert_eq!(session.current_identity().unwrap().sub, "17");
}

#[tokio::test]
async fn form_login_sends_username_and_password() {
    let server = MockServer::start().await;
    let token = token_for("1", "a@example.com", "c");
    Mock::given(method("POST"))
        .and(path("/login/email"))
        .and(header("content-type", "application/x-www-form-urlencoded"))
        .and(body_string_contains("username=a%40example.com"))
        .and(body_string_contains("password=pw"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"access_token": token})))
        .expect(1)
        .mount(&server)
        .await;

    manager(&server).login_with_password("a@example.com", "pw").await.unwrap();
}

#[tokio::test]
async fn json_login_sends_email_and_password() {
    let server = MockServer::start().await;
    let token = token_for("1", "a@example.com", "c");
    Mock::given(method("POST"))
        .and(path("/login/email"))
        .and(body_json(serde_json::json!({"email": "a@example.com", "password": "pw"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"access_token": token})))
        .expect(1)
        .mount(&server)
        .await;

    let mut config = config_for(&server);
    config.login_encoding = LoginEncoding::Json;
    let session = SessionManager::new(config, MemoryCredentialStore::new()).unwrap();
    session.login_with_password("a@example.com", "pw").await.unwrap();
}

#[tokio::test]
async fn login_accepts_session_cookie_response() {
    let server = MockServer::start().await;
    let token = token_for("5", "cookie@example.com", "csrf-5");
    Mock::given(method("POST"))
        .and(path("/login/email"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("set-cookie", format!("jwt={token}; Path=/; Max-Age=86400; SameSite=Lax").as_str()),
        )
        .mount(&server)
        .await;

    let session = manager(&server);
    let claims = session.login_with_password("cookie@example.com", "pw").await.unwrap();
    assert_eq!(claims.sub, "5");
    assert!(session.auth_state().is_authenticated());
}

#[tokio::test]
async fn rejected_login_propagates_and_stores_nothing() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/login/email"))
        .respond_with(ResponseTemplate::new(401).set_body_json(serde_json::json!({"detail": "bad credentials"})))
        .expect(1)
        .mount(&server)
        .await;

    let session = manager(&server);
    let err = session.login_with_password("a@example.com", "wrong").await.unwrap_err();
    match err {
        SessionError::Rejected { status, message } => {
            assert_eq!(status, 401);
            assert_eq!(message, "bad credentials");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(session.current_identity().is_none());
    assert!(!session.auth_state().is_authenticated());
}

#[tokio::test]
async fn login_without_token_is_an_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/login/email"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"ok": true})))
        .mount(&server)
        .await;

    let err = manager(&server).login_with_password("a@example.com", "pw").await.unwrap_err();
    assert!(matches!(err, SessionError::MissingToken));
}

#[tokio::test]
async fn undecodable_issued_token_is_not_stored() {
    let server = MockServer::start().await;
    mount_login_body(&server, "opaque-session-id").await;

    let session = manager(&server);
    let err = session.login_with_password("a@example.com", "pw").await.unwrap_err();
    assert!(matches!(err, SessionError::Decode(_)));
    assert!(session.current_identity().is_none());
}

#[tokio::test]
async fn undecodable_cookie_token_is_purged() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/login/email"))
        .respond_with(ResponseTemplate::new(200).insert_header("set-cookie", "jwt=not-a-jwt; Path=/"))
        .mount(&server)
        .await;

    let session = manager(&server);
    let err = session.login_with_password("a@example.com", "pw").await.unwrap_err();
    assert!(matches!(err, SessionError::Decode(_)));
    assert!(session.current_identity().is_none());
    assert!(!session.auth_state().is_authenticated());
}

#[tokio::test]
async fn second_login_replaces_identity() {
    let server = MockServer::start().await;
    let first = token_for("1", "first@example.com", "c1");
    let session = manager_with_token(&server, &first);
    assert_eq!(session.auth_state().identity().unwrap().sub, "1");

    let second = token_for("2", "second@example.com", "c2");
    mount_login_body(&server, &second).await;
    session.login_with_password("second@example.com", "pw").await.unwrap();
    assert_eq!(session.current_identity().unwrap().sub, "2");
    assert_eq!(session.auth_state().identity().unwrap().email, "second@example.com");
}

// =============================================================================
// Profile / registration
// =============================================================================

#[tokio::test]
async fn profile_is_fetched_with_session_cookie() {
    let server = MockServer::start().await;
    let token = token_for("3", "p@example.com", "c");
    Mock::given(method("GET"))
        .and(path("/profile"))
        .and(header("cookie", format!("jwt={token}").as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "name": "Pat",
            "email": "p@example.com",
            "avatar_url": "https://cdn.example.com/p.png",
            "bookings": 2
        })))
        .expect(1)
        .mount(&server)
        .await;

    let profile = manager_with_token(&server, &token).fetch_profile().await.unwrap();
    assert_eq!(profile.name, "Pat");
    assert_eq!(profile.avatar_url.as_deref(), Some("https://cdn.example.com/p.png"));
    assert_eq!(profile.extra.get("bookings"), Some(&serde_json::json!(2)));
}

#[tokio::test]
async fn profile_failure_is_absent() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/profile"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    assert!(manager(&server).fetch_profile().await.is_none());
}

#[tokio::test]
async fn profile_with_unreadable_body_is_absent() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/profile"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
        .mount(&server)
        .await;

    assert!(manager(&server).fetch_profile().await.is_none());
}

#[tokio::test]
async fn register_returns_created_user_without_logging_in() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/register"))
        .and(body_json(serde_json::json!({"name": "Ada", "email": "ada@example.com", "password": "pw"})))
        .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({
            "id": 8,
            "name": "Ada",
            "email": "ada@example.com"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let session = manager(&server);
    let user = session.register("Ada", "ada@example.com", "pw").await.unwrap();
    assert_eq!(user.email, "ada@example.com");
    assert!(!session.auth_state().is_authenticated());
}

#[tokio::test]
async fn register_conflict_is_reported() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/register"))
        .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({"detail": "Email already registered"})))
        .mount(&server)
        .await;

    let err = manager(&server).register("Ada", "ada@example.com", "pw").await.unwrap_err();
    assert!(matches!(
        err,
        SessionError::RegistrationFailed { status: 400, ref message } if message == "Email already registered"
    ));
}

// =============================================================================
// Logout / identity
// =============================================================================

#[tokio::test]
async fn invalid_stored_token_is_purged_on_lookup() {
    let server = MockServer::start().await;
    let session = manager(&server);
    session
        .credentials()
        .put(&SignedToken::new("invalid"), Duration::from_secs(60))
        .unwrap();

    assert!(session.current_identity().is_none());
    assert!(session.credentials().get().unwrap().is_none());
}

#[tokio::test]
async fn logout_then_identity_is_absent() {
    let server = MockServer::start().await;
    let session = manager_with_token(&server, &token_for("1", "a@example.com", "c"));
    assert!(session.auth_state().is_authenticated());

    session.logout().unwrap();
    assert!(session.current_identity().is_none());
    assert_eq!(session.auth_state().current(), AuthState::Anonymous);

    session.logout().unwrap();
    assert_eq!(session.auth_state().current(), AuthState::Anonymous);
}

#[tokio::test]
async fn file_store_survives_restart() {
    let server = MockServer::start().await;
    let token = token_for("11", "persist@example.com", "c");
    mount_login_body(&server, &token).await;

    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("session.json");

    let first = SessionManager::new(config_for(&server), FileCredentialStore::new(&file, "jwt", "/")).unwrap();
    first.login_with_password("persist@example.com", "pw").await.unwrap();
    assert!(!first.persistence_degraded());
    drop(first);

    let second = SessionManager::new(config_for(&server), FileCredentialStore::new(&file, "jwt", "/")).unwrap();
    assert_eq!(second.auth_state().identity().unwrap().sub, "11");

    second.logout().unwrap();
    let third = SessionManager::new(config_for(&server), FileCredentialStore::new(&file, "jwt", "/")).unwrap();
    assert!(!third.auth_state().is_authenticated());
}
