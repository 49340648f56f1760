//! Shared HTTP client for the RoomSync backend.
//!
//! SYSTEM CONTEXT
//! ==============
//! Session operations and every collaborator service (profiles, bookings,
//! admin dashboards) issue requests through one [`ApiClient`], so the CSRF
//! interceptor runs on every call without call sites repeating it.
//!
//! ARCHITECTURE
//! ============
//! The session token is the transport's cookie, never a header set here. In
//! the browser the fetch layer sends `document.cookie` with
//! `credentials: include`. On native targets [`TransportCookies`] plays the
//! browser's part: it serves the stored token as the `Cookie` header and
//! writes `Set-Cookie` responses for the session cookie back into the
//! credential store.

#[cfg(test)]
#[path = "api_test.rs"]
mod api_test;

use std::sync::Arc;

use reqwest::{Method, RequestBuilder, Response};
use serde::Serialize;

use crate::config::SessionConfig;
use crate::credential::CredentialStore;
use crate::interceptor::CsrfInterceptor;
use crate::state::AuthStateStore;

pub struct ApiClient<S> {
    http: reqwest::Client,
    base_url: String,
    interceptor: CsrfInterceptor<S>,
}

impl<S: CredentialStore + 'static> ApiClient<S> {
    /// Build the client and install the interceptor over `store`.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying HTTP client cannot be constructed.
    pub fn new(config: &SessionConfig, store: Arc<S>) -> Result<Self, reqwest::Error> {
        Self::build(config, store, None)
    }

    /// Like [`ApiClient::new`], but a backend that expires the session cookie
    /// also drops `state` to anonymous.
    pub(crate) fn with_auth_state(
        config: &SessionConfig,
        store: Arc<S>,
        state: Arc<AuthStateStore>,
    ) -> Result<Self, reqwest::Error> {
        Self::build(config, store, Some(state))
    }

    #[cfg_attr(target_arch = "wasm32", allow(unused_variables))]
    fn build(config: &SessionConfig, store: Arc<S>, state: Option<Arc<AuthStateStore>>) -> Result<Self, reqwest::Error> {
        let builder = reqwest::Client::builder();
        #[cfg(not(target_arch = "wasm32"))]
        let builder = builder.timeout(config.request_timeout).cookie_provider(Arc::new(
            TransportCookies::new(config, Arc::clone(&store)).with_auth_state(state),
        ));

        Ok(Self {
            http: builder.build()?,
            base_url: config.api_base_url.clone(),
            interceptor: CsrfInterceptor::new(store),
        })
    }

    #[must_use]
    pub fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// Start a request to `path`; finish it with [`ApiClient::send`].
    #[must_use]
    pub fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let builder = self.http.request(method, self.url(path));
        #[cfg(target_arch = "wasm32")]
        let builder = builder.fetch_credentials_include();
        builder
    }

    /// Run the interceptor over the built request, then send it.
    ///
    /// # Errors
    ///
    /// Returns an error if the request cannot be built or the transport fails.
    /// Non-2xx statuses are returned as responses, not errors.
    pub async fn send(&self, builder: RequestBuilder) -> Result<Response, reqwest::Error> {
        let mut request = builder.build()?;
        self.interceptor.apply(&mut request);
        tracing::debug!(method = %request.method(), url = %request.url(), "api request");
        self.http.execute(request).await
    }

    /// # Errors
    ///
    /// See [`ApiClient::send`].
    pub async fn get(&self, path: &str) -> Result<Response, reqwest::Error> {
        self.send(self.request(Method::GET, path)).await
    }

    /// # Errors
    ///
    /// See [`ApiClient::send`].
    pub async fn post_json<T: Serialize + ?Sized>(&self, path: &str, body: &T) -> Result<Response, reqwest::Error> {
        self.send(self.request(Method::POST, path).json(body)).await
    }

    /// # Errors
    ///
    /// See [`ApiClient::send`].
    pub async fn put_json<T: Serialize + ?Sized>(&self, path: &str, body: &T) -> Result<Response, reqwest::Error> {
        self.send(self.request(Method::PUT, path).json(body)).await
    }

    /// # Errors
    ///
    /// See [`ApiClient::send`].
    pub async fn delete(&self, path: &str) -> Result<Response, reqwest::Error> {
        self.send(self.request(Method::DELETE, path)).await
    }

    #[must_use]
    pub fn interceptor(&self) -> &CsrfInterceptor<S> {
        &self.interceptor
    }
}

#[cfg(not(target_arch = "wasm32"))]
pub use transport::TransportCookies;

#[cfg(not(target_arch = "wasm32"))]
mod transport {
    use std::sync::Arc;
    use std::time::Duration;

    use cookie::Cookie;
    use reqwest::Url;
    use reqwest::header::HeaderValue;
    use time::OffsetDateTime;

    use crate::config::SessionConfig;
    use crate::credential::{CredentialStore, SignedToken};
    use crate::state::AuthStateStore;

    /// Cookie jar for the backend origin that holds only the session cookie,
    /// backed by the credential store.
    pub struct TransportCookies<S> {
        store: Arc<S>,
        cookie_name: String,
        origin: Option<Url>,
        default_ttl: Duration,
        state: Option<Arc<AuthStateStore>>,
    }

    impl<S: CredentialStore> TransportCookies<S> {
        #[must_use]
        pub fn new(config: &SessionConfig, store: Arc<S>) -> Self {
            Self {
                store,
                cookie_name: config.cookie_name.clone(),
                origin: Url::parse(&config.api_base_url).ok(),
                default_ttl: config.session_ttl,
                state: None,
            }
        }

        /// Drop `state` to anonymous whenever the backend removes the cookie.
        #[must_use]
        pub(crate) fn with_auth_state(mut self, state: Option<Arc<AuthStateStore>>) -> Self {
            self.state = state;
            self
        }

        fn same_origin(&self, url: &Url) -> bool {
            self.origin.as_ref().is_some_and(|origin| origin.origin() == url.origin())
        }

        fn accept(&self, cookie: &Cookie<'_>, now: OffsetDateTime) {
            let expires_in = cookie
                .max_age()
                .or_else(|| cookie.expires_datetime().map(|at| at - now));
            let removed = cookie.value().is_empty() || expires_in.is_some_and(|d| d <= time::Duration::ZERO);

            if removed {
                tracing::debug!("backend expired the session cookie");
                if let Err(e) = self.store.clear() {
                    tracing::warn!(error = %e, "failed to clear session cookie");
                }
                if let Some(state) = &self.state {
                    state.clear();
                }
                return;
            }

            let ttl = expires_in
                .and_then(|d| u64::try_from(d.whole_seconds()).ok())
                .map_or(self.default_ttl, Duration::from_secs);
            if let Err(e) = self.store.put(&SignedToken::new(cookie.value()), ttl) {
                tracing::warn!(error = %e, "failed to store session cookie");
            }
        }
    }

    impl<S: CredentialStore + 'static> reqwest::cookie::CookieStore for TransportCookies<S> {
        fn set_cookies(&self, cookie_headers: &mut dyn Iterator<Item = &HeaderValue>, url: &Url) {
            if !self.same_origin(url) {
                return;
            }
            let now = OffsetDateTime::now_utc();
            for header in cookie_headers {
                let Ok(raw) = header.to_str() else {
                    continue;
                };
                let Ok(cookie) = Cookie::parse(raw) else {
                    continue;
                };
                if cookie.name() == self.cookie_name {
                    self.accept(&cookie, now);
                }
            }
        }

        fn cookies(&self, url: &Url) -> Option<HeaderValue> {
            if !self.same_origin(url) {
                return None;
            }
            let token = match self.store.get() {
                Ok(token) => token?,
                Err(e) => {
                    tracing::warn!(error = %e, "credential read failed; sending without session cookie");
                    return None;
                }
            };
            HeaderValue::from_str(&format!("{}={}", self.cookie_name, token.as_str())).ok()
        }
    }
}
