//! Session facade: every login strategy, profile fetch, logout and identity
//! lookup goes through [`SessionManager`].
//!
//! SYSTEM CONTEXT
//! ==============
//! UI code never touches the credential store or the auth state directly.
//! Each operation here writes or clears the stored token first and then
//! recomputes the [`AuthStateStore`] from it, so the two never disagree.
//!
//! LOGIN CONTRACT
//! ==============
//! `POST /login/email` is answered either with a JSON body carrying
//! `access_token` or with a `Set-Cookie` for the session cookie. The body
//! wins when both are present. The issued token is decoded before it is
//! kept; an undecodable token fails the login and is never stored.
//!
//! ERROR HANDLING
//! ==============
//! Explicit user actions (login, register, OAuth completion) propagate
//! [`SessionError`]. Passive reads (`current_identity`, `fetch_profile`,
//! `refresh`) degrade to "no identity" and log instead.

#[cfg(test)]
#[path = "session_test.rs"]
mod session_test;

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use cookie::Cookie;
use reqwest::header::{HeaderMap, SET_COOKIE};
use reqwest::{Method, Response, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::api::ApiClient;
use crate::config::{LoginEncoding, SessionConfig};
use crate::credential::{CredentialStore, FallbackStore, SignedToken, StorageError};
use crate::navigation::{NavigationError, Navigator};
use crate::state::{AuthState, AuthStateStore};
use crate::token::{self, Claims, DecodeError};

const PASSWORD_LOGIN_PATH: &str = "/login/email";
const REGISTER_PATH: &str = "/register";
const PROFILE_PATH: &str = "/profile";
const CALLBACK_TOKEN_PARAM: &str = "token";

// =============================================================================
// TYPES
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("http: {0}")]
    Http(#[from] reqwest::Error),
    #[error("login rejected ({status}): {message}")]
    Rejected { status: u16, message: String },
    #[error("login response carried no session token")]
    MissingToken,
    #[error("issued token could not be decoded: {0}")]
    Decode(#[from] DecodeError),
    #[error("registration failed ({status}): {message}")]
    RegistrationFailed { status: u16, message: String },
    #[error("callback URL has no token parameter")]
    MissingCallbackToken,
    #[error("invalid URL: {0}")]
    InvalidUrl(String),
    #[error(transparent)]
    Navigation(#[from] NavigationError),
    #[error("credential storage: {0}")]
    Storage(#[from] StorageError),
}

/// OAuth providers the backend offers a redirect for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum OAuthProvider {
    Google,
    GitHub,
}

impl OAuthProvider {
    /// Backend path that starts this provider's redirect dance.
    #[must_use]
    pub fn path(self) -> &'static str {
        match self {
            Self::Google => "/login",
            Self::GitHub => "/login/github",
        }
    }
}

impl fmt::Display for OAuthProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Google => "google",
            Self::GitHub => "github",
        })
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown OAuth provider: {0}")]
pub struct UnknownProvider(pub String);

impl FromStr for OAuthProvider {
    type Err = UnknownProvider;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "google" => Ok(Self::Google),
            "github" => Ok(Self::GitHub),
            other => Err(UnknownProvider(other.to_owned())),
        }
    }
}

/// Profile payload returned by `/profile` and `/register`.
///
/// Fields the backend adds beyond the known ones are kept in `extra`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Deserialize)]
struct LoginResponse {
    #[serde(default)]
    access_token: Option<String>,
}

#[derive(Serialize)]
struct JsonLogin<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Serialize)]
struct FormLogin<'a> {
    username: &'a str,
    password: &'a str,
}

#[derive(Serialize)]
struct Registration<'a> {
    name: &'a str,
    email: &'a str,
    password: &'a str,
}

// =============================================================================
// SESSION MANAGER
// =============================================================================

pub struct SessionManager<S> {
    config: SessionConfig,
    store: Arc<FallbackStore<S>>,
    api: ApiClient<FallbackStore<S>>,
    state: Arc<AuthStateStore>,
}

impl<S: CredentialStore + 'static> SessionManager<S> {
    /// Wrap `durable` in a fallback store, build the shared API client and
    /// seed the auth state from whatever token is already stored.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(config: SessionConfig, durable: S) -> Result<Self, SessionError> {
        let store = Arc::new(FallbackStore::new(durable));
        let state = Arc::new(AuthStateStore::new(AuthState::Anonymous));
        let api = ApiClient::with_auth_state(&config, Arc::clone(&store), Arc::clone(&state))?;
        let manager = Self { config, store, api, state };
        manager.refresh();
        Ok(manager)
    }

    #[must_use]
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    #[must_use]
    pub fn api(&self) -> &ApiClient<FallbackStore<S>> {
        &self.api
    }

    /// The credential store behind this session.
    #[must_use]
    pub fn credentials(&self) -> &FallbackStore<S> {
        &self.store
    }

    #[must_use]
    pub fn auth_state(&self) -> &AuthStateStore {
        &self.state
    }

    /// Whether the session currently lives only in volatile memory.
    #[must_use]
    pub fn persistence_degraded(&self) -> bool {
        self.store.is_degraded()
    }

    // -------------------------------------------------------------------------
    // OAuth
    // -------------------------------------------------------------------------

    #[must_use]
    pub fn oauth_login_url(&self, provider: OAuthProvider) -> String {
        self.config.endpoint(provider.path())
    }

    /// Send the user agent to the provider's backend redirect. Local state
    /// is untouched; the flow resumes in [`SessionManager::complete_oauth_login`].
    ///
    /// # Errors
    ///
    /// Returns an error if the navigator refuses the URL.
    pub fn begin_oauth_login(&self, provider: OAuthProvider, navigator: &dyn Navigator) -> Result<(), SessionError> {
        let url = self.oauth_login_url(provider);
        tracing::info!(%provider, "starting oauth login");
        navigator.navigate(&url)?;
        Ok(())
    }

    /// Finish OAuth from the login-success URL the backend redirected to
    /// (`...?token=<jwt>`).
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is invalid, has no token, or the token
    /// does not decode. Nothing is stored on error.
    pub fn complete_oauth_login(&self, callback_url: &str) -> Result<Claims, SessionError> {
        let url = reqwest::Url::parse(callback_url).map_err(|e| SessionError::InvalidUrl(e.to_string()))?;
        let token = url
            .query_pairs()
            .find(|(key, value)| key == CALLBACK_TOKEN_PARAM && !value.is_empty())
            .map(|(_, value)| value.into_owned())
            .ok_or(SessionError::MissingCallbackToken)?;

        let claims = self.accept_token(&SignedToken::new(token))?;
        tracing::info!(sub = %claims.sub, "oauth login completed");
        Ok(claims)
    }

    // -------------------------------------------------------------------------
    // Password login / registration
    // -------------------------------------------------------------------------

    /// Log in with email and password.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Rejected`] for non-2xx responses,
    /// [`SessionError::MissingToken`] when the response carries no token and
    /// [`SessionError::Decode`] when the issued token is unreadable. No
    /// retry is attempted.
    pub async fn login_with_password(&self, identifier: &str, secret: &str) -> Result<Claims, SessionError> {
        let before = self.stored_token();
        let builder = self.api.request(Method::POST, PASSWORD_LOGIN_PATH);
        let builder = match self.config.login_encoding {
            LoginEncoding::Form => builder.form(&FormLogin { username: identifier, password: secret }),
            LoginEncoding::Json => builder.json(&JsonLogin { email: identifier, password: secret }),
        };

        let resp = self.api.send(builder).await?;
        let status = resp.status();
        if !status.is_success() {
            let message = rejection_message(resp).await;
            tracing::warn!(status = status.as_u16(), "password login rejected");
            return Err(SessionError::Rejected { status: status.as_u16(), message });
        }

        let from_cookie = session_cookie_value(resp.headers(), &self.config.cookie_name);
        let body = resp.text().await?;
        let from_body = serde_json::from_str::<LoginResponse>(&body)
            .ok()
            .and_then(|r| r.access_token)
            .filter(|t| !t.is_empty());

        // A browser hides Set-Cookie from scripts; the jar is the only place
        // a cookie-issued token shows up there.
        let token = from_body
            .or(from_cookie)
            .map(SignedToken::new)
            .or_else(|| self.stored_token().filter(|t| Some(t) != before.as_ref()));
        let Some(token) = token else {
            tracing::warn!("login response carried no session token");
            return Err(SessionError::MissingToken);
        };

        let claims = self.accept_token(&token)?;
        tracing::info!(sub = %claims.sub, "password login succeeded");
        Ok(claims)
    }

    /// Create an account. Does not log in.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::RegistrationFailed`] for non-2xx responses or
    /// [`SessionError::Http`] on transport or payload errors.
    pub async fn register(&self, name: &str, email: &str, password: &str) -> Result<UserProfile, SessionError> {
        let resp = self
            .api
            .post_json(REGISTER_PATH, &Registration { name, email, password })
            .await?;
        let status = resp.status();
        if !status.is_success() {
            let message = rejection_message(resp).await;
            tracing::warn!(status = status.as_u16(), "registration rejected");
            return Err(SessionError::RegistrationFailed { status: status.as_u16(), message });
        }
        let profile = resp.json::<UserProfile>().await?;
        tracing::info!(email = %profile.email, "registered user");
        Ok(profile)
    }

    // -------------------------------------------------------------------------
    // Profile / logout / identity
    // -------------------------------------------------------------------------

    /// Fetch the signed-in user's profile. Any failure yields `None`.
    pub async fn fetch_profile(&self) -> Option<UserProfile> {
        let resp = match self.api.get(PROFILE_PATH).await {
            Ok(resp) => resp,
            Err(e) => {
                tracing::warn!(error = %e, "profile fetch failed");
                return None;
            }
        };
        if !resp.status().is_success() {
            tracing::debug!(status = resp.status().as_u16(), "profile unavailable");
            return None;
        }
        match resp.json::<UserProfile>().await {
            Ok(profile) => Some(profile),
            Err(e) => {
                tracing::warn!(error = %e, "profile payload unreadable");
                None
            }
        }
    }

    /// Drop the stored token and go anonymous. Safe to call repeatedly.
    ///
    /// # Errors
    ///
    /// Returns an error if the durable medium could not be cleared. The auth
    /// state is anonymous either way.
    pub fn logout(&self) -> Result<(), SessionError> {
        let result = self.store.clear();
        self.state.clear();
        tracing::info!("logged out");
        result.map_err(SessionError::from)
    }

    /// Decode the stored token. An undecodable token is purged.
    pub fn current_identity(&self) -> Option<Claims> {
        let token = self.stored_token()?;
        match token::decode(token.as_str()) {
            Ok(claims) => Some(claims),
            Err(e) => {
                tracing::warn!(error = %e, "stored token is undecodable; purging");
                self.purge();
                None
            }
        }
    }

    /// Recompute the auth state from the credential store.
    pub fn refresh(&self) -> AuthState {
        let next = AuthState::from(self.current_identity());
        self.state.set(next.clone());
        next
    }

    // -------------------------------------------------------------------------
    // Internals
    // -------------------------------------------------------------------------

    fn stored_token(&self) -> Option<SignedToken> {
        match self.store.get() {
            Ok(token) => token,
            Err(e) => {
                tracing::warn!(error = %e, "credential read failed");
                None
            }
        }
    }

    /// Drop an unusable token and go anonymous. A failed clear is logged;
    /// the store masks the stale token either way.
    fn purge(&self) {
        if let Err(e) = self.store.clear() {
            tracing::warn!(error = %e, "failed to purge undecodable token");
        }
        self.state.clear();
    }

    /// Decode, persist and publish a freshly issued token.
    fn accept_token(&self, token: &SignedToken) -> Result<Claims, SessionError> {
        let claims = match token::decode(token.as_str()) {
            Ok(claims) => claims,
            Err(e) => {
                // The transport may already have written it from Set-Cookie.
                if self.stored_token().as_ref() == Some(token) {
                    self.purge();
                }
                return Err(e.into());
            }
        };
        self.store.put(token, self.config.session_ttl)?;
        self.refresh();
        Ok(claims)
    }
}

// =============================================================================
// HELPERS
// =============================================================================

fn session_cookie_value(headers: &HeaderMap, cookie_name: &str) -> Option<String> {
    headers
        .get_all(SET_COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .filter_map(|raw| Cookie::parse(raw).ok())
        .find(|cookie| cookie.name() == cookie_name && !cookie.value().is_empty())
        .map(|cookie| cookie.value().to_owned())
}

async fn rejection_message(resp: Response) -> String {
    let status = resp.status();
    let body = resp.text().await.unwrap_or_default();
    message_from_body(&body).unwrap_or_else(|| fallback_reason(status))
}

fn fallback_reason(status: StatusCode) -> String {
    status.canonical_reason().unwrap_or("request failed").to_owned()
}

/// Pull a human-readable message out of an error body: a JSON `detail`,
/// `message` or `error` string, else the trimmed text.
fn message_from_body(body: &str) -> Option<String> {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return None;
    }
    if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(trimmed) {
        return ["detail", "message", "error"]
            .iter()
            .find_map(|key| map.get(*key).and_then(Value::as_str))
            .map(str::to_owned)
            .or_else(|| Some(trimmed.to_owned()));
    }
    Some(trimmed.to_owned())
}
