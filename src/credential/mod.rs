//! Durable storage for the single session token.
//!
//! SYSTEM CONTEXT
//! ==============
//! Only the session facade, the request interceptor and the transport cookie
//! bridge touch a [`CredentialStore`]. UI code reads the auth state store
//! instead.
//!
//! DESIGN
//! ======
//! A store holds at most one token. `put` overwrites, `clear` is idempotent,
//! and expiry is the medium's job: a browser cookie or file record simply
//! stops being returned once its max-age has passed.
//!
//! TRADE-OFFS
//! ==========
//! There is no locking across `get`/`put` pairs. Two concurrent logins race
//! and the last `put` wins; every later read sees that token.


#[cfg(feature = "hydrate")]
pub mod browser;
#[cfg(not(target_arch = "wasm32"))]
pub mod file;

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use cookie::{Cookie, SameSite};

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("credential storage unavailable: {0}")]
    Unavailable(String),
    #[error("credential storage io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("credential record encode failed: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Opaque signed session token issued by the backend.
///
/// `Debug` prints only the length so tokens never end up in logs.
#[derive(Clone, PartialEq, Eq)]
pub struct SignedToken(String);

impl SignedToken {
    #[must_use]
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Debug for SignedToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SignedToken(<{} chars>)", self.0.len())
    }
}

/// Storage contract for the session token.
pub trait CredentialStore: Send + Sync {
    /// Store `token`, replacing any previous one, with a max-age of `ttl`.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] when the medium refuses the write.
    fn put(&self, token: &SignedToken, ttl: Duration) -> Result<(), StorageError>;

    /// The current token, or `None` if nothing unexpired is stored.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] when the medium cannot be read.
    fn get(&self) -> Result<Option<SignedToken>, StorageError>;

    /// Remove the token. Clearing an empty store succeeds.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] when the medium refuses the write.
    fn clear(&self) -> Result<(), StorageError>;
}

impl<S: CredentialStore + ?Sized> CredentialStore for std::sync::Arc<S> {
    fn put(&self, token: &SignedToken, ttl: Duration) -> Result<(), StorageError> {
        (**self).put(token, ttl)
    }

    fn get(&self) -> Result<Option<SignedToken>, StorageError> {
        (**self).get()
    }

    fn clear(&self) -> Result<(), StorageError> {
        (**self).clear()
    }
}

/// Process-local store. Does not survive a restart; used in tests and as the
/// volatile tier of [`FallbackStore`].
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    token: Mutex<Option<SignedToken>>,
}

impl MemoryCredentialStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store seeded with `token`.
    #[must_use]
    pub fn with_token(token: impl Into<String>) -> Self {
        Self { token: Mutex::new(Some(SignedToken::new(token))) }
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn put(&self, token: &SignedToken, _ttl: Duration) -> Result<(), StorageError> {
        *self.token.lock().unwrap_or_else(PoisonError::into_inner) = Some(token.clone());
        Ok(())
    }

    fn get(&self) -> Result<Option<SignedToken>, StorageError> {
        Ok(self.token.lock().unwrap_or_else(PoisonError::into_inner).clone())
    }

    fn clear(&self) -> Result<(), StorageError> {
        self.token.lock().unwrap_or_else(PoisonError::into_inner).take();
        Ok(())
    }
}

/// Durable store with a volatile safety net.
///
/// When the durable medium rejects a write (cookies disabled, read-only
/// disk), the token is kept in memory so the current session still works,
/// and [`FallbackStore::is_degraded`] reports that it will not survive a
/// reload.
#[derive(Debug)]
pub struct FallbackStore<S> {
    durable: S,
    volatile: MemoryCredentialStore,
    degraded: AtomicBool,
    /// Set when a clear could not reach the durable medium; reads report no
    /// token until the next successful `put`.
    cleared: AtomicBool,
}

impl<S: CredentialStore> FallbackStore<S> {
    #[must_use]
    pub fn new(durable: S) -> Self {
        Self {
            durable,
            volatile: MemoryCredentialStore::new(),
            degraded: AtomicBool::new(false),
            cleared: AtomicBool::new(false),
        }
    }

    /// Whether the last write fell back to volatile memory.
    #[must_use]
    pub fn is_degraded(&self) -> bool {
        self.degraded.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn durable(&self) -> &S {
        &self.durable
    }
}

impl<S: CredentialStore> CredentialStore for FallbackStore<S> {
    fn put(&self, token: &SignedToken, ttl: Duration) -> Result<(), StorageError> {
        match self.durable.put(token, ttl) {
            Ok(()) => {
                self.volatile.clear()?;
                self.degraded.store(false, Ordering::Release);
            }
            Err(e) => {
                tracing::warn!(error = %e, "durable credential storage unavailable; session will not survive reload");
                self.volatile.put(token, ttl)?;
                self.degraded.store(true, Ordering::Release);
            }
        }
        self.cleared.store(false, Ordering::Release);
        Ok(())
    }

    fn get(&self) -> Result<Option<SignedToken>, StorageError> {
        if self.cleared.load(Ordering::Acquire) {
            return Ok(None);
        }
        if self.is_degraded() {
            return self.volatile.get();
        }
        match self.durable.get() {
            Ok(token) => Ok(token),
            Err(e) => {
                tracing::warn!(error = %e, "durable credential read failed; using volatile copy");
                self.volatile.get()
            }
        }
    }

    fn clear(&self) -> Result<(), StorageError> {
        self.volatile.clear()?;
        let result = self.durable.clear();
        if let Err(e) = &result {
            tracing::warn!(error = %e, "durable credential clear failed; masking stale token");
        }
        self.cleared.store(result.is_err(), Ordering::Release);
        self.degraded.store(false, Ordering::Release);
        result
    }
}

/// Build the session cookie: `Path`, `Max-Age` and `SameSite=Lax`, never
/// `HttpOnly` because script must read it to derive the CSRF header.
#[must_use]
pub fn session_cookie(name: &str, path: &str, token: &SignedToken, ttl: Duration) -> Cookie<'static> {
    let max_age = time::Duration::seconds(i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX));
    Cookie::build((name.to_owned(), token.as_str().to_owned()))
        .path(path.to_owned())
        .max_age(max_age)
        .same_site(SameSite::Lax)
        .http_only(false)
        .build()
}

/// Cookie that deletes the session cookie on write.
#[must_use]
pub fn expired_session_cookie(name: &str, path: &str) -> Cookie<'static> {
    Cookie::build((name.to_owned(), String::new()))
        .path(path.to_owned())
        .max_age(time::Duration::ZERO)
        .same_site(SameSite::Lax)
        .build()
}
