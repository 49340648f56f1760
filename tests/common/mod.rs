//! Fixtures shared by the integration tests.

#![allow(dead_code)]

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use roomsync_session::{MemoryCredentialStore, SessionConfig, SessionManager};
use wiremock::MockServer;

/// Unsigned compact JWT carrying the given identity.
pub fn token_for(sub: &str, email: &str, csrf: &str) -> String {
    let payload = serde_json::json!({
        "sub": sub,
        "email": email,
        "name": "Integration User",
        "csrf_token": csrf,
        "exp": 4_102_444_800_i64,
    });
    format!(
        "eyJhbGciOiJIUzI1NiIsInR5cCI6IkpXVCJ9.{}.c2lnbmF0dXJl",
        URL_SAFE_NO_PAD.encode(payload.to_string())
    )
}

pub fn config_for(server: &MockServer) -> SessionConfig {
    SessionConfig::new(&server.uri()).unwrap()
}

pub fn manager(server: &MockServer) -> SessionManager<MemoryCredentialStore> {
    SessionManager::new(config_for(server), MemoryCredentialStore::new()).unwrap()
}

pub fn manager_with_token(server: &MockServer, token: &str) -> SessionManager<MemoryCredentialStore> {
    SessionManager::new(config_for(server), MemoryCredentialStore::with_token(token)).unwrap()
}
