//! `document.cookie` credential store for hydrated browser builds.
//!
//! SYSTEM CONTEXT
//! ==============
//! The cookie is script-readable (no `HttpOnly`) so the request
//! interceptor can decode it, and `SameSite=Lax` so the browser attaches it
//! to same-site API calls as the primary credential. The browser drops it
//! once `Max-Age` elapses.

use std::time::Duration;

use cookie::Cookie;
use wasm_bindgen::JsCast;

use super::{CredentialStore, SignedToken, StorageError, expired_session_cookie, session_cookie};

#[derive(Debug, Clone)]
pub struct DocumentCookieStore {
    cookie_name: String,
    cookie_path: String,
}

impl DocumentCookieStore {
    #[must_use]
    pub fn new(cookie_name: &str, cookie_path: &str) -> Self {
        Self { cookie_name: cookie_name.to_owned(), cookie_path: cookie_path.to_owned() }
    }

    fn document() -> Result<web_sys::HtmlDocument, StorageError> {
        web_sys::window()
            .and_then(|w| w.document())
            .ok_or_else(|| StorageError::Unavailable("no document".to_owned()))?
            .dyn_into::<web_sys::HtmlDocument>()
            .map_err(|_| StorageError::Unavailable("document is not an HTML document".to_owned()))
    }

    fn write(&self, cookie: &Cookie<'_>) -> Result<(), StorageError> {
        Self::document()?
            .set_cookie(&cookie.to_string())
            .map_err(|e| StorageError::Unavailable(format!("{e:?}")))
    }
}

impl CredentialStore for DocumentCookieStore {
    fn put(&self, token: &SignedToken, ttl: Duration) -> Result<(), StorageError> {
        self.write(&session_cookie(&self.cookie_name, &self.cookie_path, token, ttl))?;
        // Browsers silently drop cookies when storage is blocked; read back to detect it.
        match self.get()? {
            Some(stored) if &stored == token => Ok(()),
            _ => Err(StorageError::Unavailable("browser rejected the session cookie".to_owned())),
        }
    }

    fn get(&self) -> Result<Option<SignedToken>, StorageError> {
        let raw = Self::document()?
            .cookie()
            .map_err(|e| StorageError::Unavailable(format!("{e:?}")))?;
        Ok(raw
            .split(';')
            .filter_map(|pair| Cookie::parse(pair.trim().to_owned()).ok())
            .find(|c| c.name() == self.cookie_name && !c.value().is_empty())
            .map(|c| SignedToken::new(c.value())))
    }

    fn clear(&self) -> Result<(), StorageError> {
        self.write(&expired_session_cookie(&self.cookie_name, &self.cookie_path))
    }
}
