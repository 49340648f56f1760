//! Token fixtures shared by unit tests.

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;

/// Unsigned compact JWT carrying the given identity.
pub(crate) fn token_for(sub: &str, email: &str, csrf: &str) -> String {
    let payload = serde_json::json!({
        "sub": sub,
        "email": email,
        "name": "Test User",
        "csrf_token": csrf,
        "exp": 4_102_444_800_i64,
        "iat": 1_700_000_000_i64,
    });
    format!(
        "eyJhbGciOiJIUzI1NiIsInR5cCI6IkpXVCJ9.{}.dGVzdC1zaWduYXR1cmU",
        URL_SAFE_NO_PAD.encode(payload.to_string())
    )
}
