//! Anti-forgery header injection for mutating requests.
//!
//! SYSTEM CONTEXT
//! ==============
//! The session token itself rides in a transport-managed cookie. This module
//! only adds `X-CSRF-Token`, copied from the token's `csrf_token` claim, to
//! POST/PUT/DELETE requests. A cross-site page can make the browser send the
//! cookie but cannot read it, so it cannot produce a matching header.
//!
//! ERROR HANDLING
//! ==============
//! Every failure fails open: no token, an unreadable store or an undecodable
//! token all send the request without the header. The backend's signature
//! and CSRF checks stay authoritative.

#[cfg(test)]
#[path = "interceptor_test.rs"]
mod interceptor_test;

use std::sync::Arc;

use reqwest::Method;
use reqwest::header::HeaderValue;

use crate::credential::CredentialStore;
use crate::token;

/// Header carrying the anti-forgery value.
pub const CSRF_HEADER: &str = "X-CSRF-Token";

/// Whether `method` is one the backend treats as state-mutating.
#[must_use]
pub fn is_mutating(method: &Method) -> bool {
    matches!(*method, Method::POST | Method::PUT | Method::DELETE)
}

pub struct CsrfInterceptor<S> {
    store: Arc<S>,
}

impl<S> Clone for CsrfInterceptor<S> {
    fn clone(&self) -> Self {
        Self { store: Arc::clone(&self.store) }
    }
}

impl<S: CredentialStore> CsrfInterceptor<S> {
    #[must_use]
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Rewrite `request` in place before it is sent.
    ///
    /// Safe methods pass through untouched. For mutating methods any
    /// caller-supplied `X-CSRF-Token` is dropped and replaced by the value
    /// derived from the stored token, if one can be derived.
    pub fn apply(&self, request: &mut reqwest::Request) {
        if !is_mutating(request.method()) {
            return;
        }
        let headers = request.headers_mut();
        headers.remove(CSRF_HEADER);
        if let Some(value) = self.header_value() {
            headers.insert(CSRF_HEADER, value);
        }
    }

    /// Derive the header value from the current token, re-decoding every call.
    #[must_use]
    pub fn header_value(&self) -> Option<HeaderValue> {
        let token = match self.store.get() {
            Ok(Some(token)) => token,
            Ok(None) => {
                tracing::debug!("no session token; sending without csrf header");
                return None;
            }
            Err(e) => {
                tracing::warn!(error = %e, "credential read failed; sending without csrf header");
                return None;
            }
        };

        let claims = match token::decode(token.as_str()) {
            Ok(claims) => claims,
            Err(e) => {
                tracing::warn!(error = %e, "session token undecodable; sending without csrf header");
                return None;
            }
        };

        match HeaderValue::from_str(&claims.csrf_token) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(sub = %claims.sub, "csrf_token claim is not a valid header value");
                None
            }
        }
    }
}
