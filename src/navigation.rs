//! Full-page navigation for the OAuth redirect.
//!
//! The OAuth flow leaves the app entirely, so the session manager hands the
//! provider URL to a [`Navigator`] rather than issuing a request itself.

use std::sync::Mutex;
use std::sync::PoisonError;

#[derive(Debug, thiserror::Error)]
pub enum NavigationError {
    #[error("no window available for navigation")]
    NoWindow,
    #[error("navigation rejected: {0}")]
    Rejected(String),
}

/// Sends the user agent to another URL.
pub trait Navigator {
    /// # Errors
    ///
    /// Returns an error if the host environment refuses the navigation.
    fn navigate(&self, url: &str) -> Result<(), NavigationError>;
}

/// Remembers every URL it was asked to open. Used by hosts that hand the URL
/// off themselves (a terminal prints it) and by tests.
#[derive(Debug, Default)]
pub struct RecordingNavigator {
    visited: Mutex<Vec<String>>,
}

impl RecordingNavigator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn visited(&self) -> Vec<String> {
        self.visited.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    #[must_use]
    pub fn last(&self) -> Option<String> {
        self.visited.lock().unwrap_or_else(PoisonError::into_inner).last().cloned()
    }
}

impl Navigator for RecordingNavigator {
    fn navigate(&self, url: &str) -> Result<(), NavigationError> {
        self.visited
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(url.to_owned());
        Ok(())
    }
}

/// Navigates the current browser tab via `window.location`.
#[cfg(feature = "hydrate")]
#[derive(Debug, Default, Clone, Copy)]
pub struct WindowNavigator;

#[cfg(feature = "hydrate")]
impl Navigator for WindowNavigator {
    fn navigate(&self, url: &str) -> Result<(), NavigationError> {
        let window = web_sys::window().ok_or(NavigationError::NoWindow)?;
        window
            .location()
            .set_href(url)
            .map_err(|e| NavigationError::Rejected(format!("{e:?}")))
    }
}
