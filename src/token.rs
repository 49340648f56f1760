//! JWT payload decoding.
//!
//! DESIGN
//! ======
//! Decoding only parses the payload segment. Signature verification belongs
//! to the backend, so nothing here is a security boundary: claims are read to
//! render identity and to echo `csrf_token`, never to grant access.
//!
//! Decoding is pure and cheap, and callers re-run it every time claims are
//! needed instead of caching a result that could outlive the token.

#[cfg(test)]
#[path = "token_test.rs"]
mod token_test;

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("malformed token: {0}")]
    Malformed(&'static str),
    #[error("token payload is not valid base64url: {0}")]
    Encoding(#[from] base64::DecodeError),
    #[error("token payload is not a JSON object: {0}")]
    Payload(String),
    #[error("token is missing required claim `{0}`")]
    MissingClaim(&'static str),
}

/// Identity claims carried by a session token.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Subject: the backend's user id.
    pub sub: String,
    pub email: String,
    /// Display name.
    pub name: String,
    /// Anti-forgery secret echoed back in `X-CSRF-Token`.
    pub csrf_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
    /// Expiry, seconds since the Unix epoch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exp: Option<i64>,
    /// Issued-at, seconds since the Unix epoch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iat: Option<i64>,
}

impl Claims {
    /// Whether `exp` lies at or before `now_unix`. Tokens without `exp` never expire here.
    #[must_use]
    pub fn is_expired_at(&self, now_unix: i64) -> bool {
        self.exp.is_some_and(|exp| exp <= now_unix)
    }
}

/// Payload shape before required-claim validation.
#[derive(Deserialize)]
struct RawClaims {
    #[serde(default, deserialize_with = "deserialize_subject")]
    sub: Option<String>,
    email: Option<String>,
    name: Option<String>,
    csrf_token: Option<String>,
    avatar_url: Option<String>,
    #[serde(default, deserialize_with = "deserialize_timestamp")]
    exp: Option<i64>,
    #[serde(default, deserialize_with = "deserialize_timestamp")]
    iat: Option<i64>,
}

/// Decode the payload of a compact JWT into [`Claims`].
///
/// # Errors
///
/// Returns [`DecodeError`] if the token does not have three segments, the
/// payload is not base64url JSON, or a required claim is absent or empty.
pub fn decode(token: &str) -> Result<Claims, DecodeError> {
    let mut segments = token.trim().split('.');
    let (Some(header), Some(payload), Some(signature), None) =
        (segments.next(), segments.next(), segments.next(), segments.next())
    else {
        return Err(DecodeError::Malformed("expected three dot-separated segments"));
    };
    if header.is_empty() || payload.is_empty() || signature.is_empty() {
        return Err(DecodeError::Malformed("empty segment"));
    }

    let bytes = URL_SAFE_NO_PAD.decode(payload.trim_end_matches('='))?;
    let value: Value = serde_json::from_slice(&bytes).map_err(|e| DecodeError::Payload(e.to_string()))?;
    if !value.is_object() {
        return Err(DecodeError::Payload("payload is not an object".to_owned()));
    }
    let raw: RawClaims = serde_json::from_value(value).map_err(|e| DecodeError::Payload(e.to_string()))?;

    Ok(Claims {
        sub: required(raw.sub, "sub")?,
        email: required(raw.email, "email")?,
        name: required(raw.name, "name")?,
        csrf_token: required(raw.csrf_token, "csrf_token")?,
        avatar_url: raw.avatar_url,
        exp: raw.exp,
        iat: raw.iat,
    })
}

fn required(value: Option<String>, claim: &'static str) -> Result<String, DecodeError> {
    value.filter(|v| !v.is_empty()).ok_or(DecodeError::MissingClaim(claim))
}

/// Accept `sub` as a string or an integer; the backend stringifies integer ids
/// but other issuers do not.
fn deserialize_subject<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::de::Error as _;

    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s)),
        Some(Value::Number(n)) if n.is_i64() || n.is_u64() => Ok(Some(n.to_string())),
        Some(other) => Err(D::Error::custom(format!("invalid sub claim: {other}"))),
    }
}

/// Accept integral timestamps only.
fn deserialize_timestamp<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::de::Error as _;

    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => n
            .as_i64()
            .map(Some)
            .ok_or_else(|| D::Error::custom(format!("invalid timestamp: {n}"))),
        Some(other) => Err(D::Error::custom(format!("invalid timestamp: {other}"))),
    }
}
