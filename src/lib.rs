//! Client-side session manager for the RoomSync booking app.
//!
//! SYSTEM CONTEXT
//! ==============
//! The backend issues a signed JWT. This crate keeps that token in a durable
//! credential store, decodes it into [`Claims`] on demand, echoes its
//! `csrf_token` claim on every mutating request, and publishes the current
//! identity through a reactive [`AuthStateStore`].
//!
//! ARCHITECTURE
//! ============
//! - [`credential`] persists exactly one token with an expiry.
//! - [`token`] decodes a token into claims without verifying it.
//! - [`interceptor`] derives the `X-CSRF-Token` header for POST/PUT/DELETE.
//! - [`api`] is the shared HTTP client with the interceptor installed.
//! - [`session`] is the facade: OAuth redirect, password login, register,
//!   profile fetch, logout and identity lookup.
//! - [`state`] owns the single `AuthState` value consumers render from.
//!
//! Browser builds enable the `hydrate` feature for `document.cookie` storage
//! and `window.location` navigation.

pub mod api;
pub mod config;
pub mod credential;
pub mod interceptor;
pub mod navigation;
pub mod session;
pub mod state;
pub mod token;

#[cfg(test)]
mod test_support;

pub use api::ApiClient;
pub use config::{ConfigError, LoginEncoding, SessionConfig};
pub use credential::{CredentialStore, FallbackStore, MemoryCredentialStore, SignedToken, StorageError};
pub use interceptor::{CSRF_HEADER, CsrfInterceptor};
pub use navigation::{NavigationError, Navigator, RecordingNavigator};
pub use session::{OAuthProvider, SessionError, SessionManager, UnknownProvider, UserProfile};
pub use state::{AuthState, AuthStateStore};
pub use token::{Claims, DecodeError, decode};

#[cfg(not(target_arch = "wasm32"))]
pub use credential::file::FileCredentialStore;

#[cfg(feature = "hydrate")]
pub use credential::browser::DocumentCookieStore;
#[cfg(feature = "hydrate")]
pub use navigation::WindowNavigator;
