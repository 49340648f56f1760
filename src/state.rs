//! Auth-session state for the current user.
//!
//! SYSTEM CONTEXT
//! ==============
//! Route guards, headers and other identity-aware consumers read this store
//! instead of the raw token. Only the session manager transitions it.

#[cfg(test)]
#[path = "state_test.rs"]
mod state_test;

use tokio::sync::watch;

use crate::token::Claims;

/// Exactly one of "signed in as these claims" or "no session".
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum AuthState {
    Authenticated(Claims),
    #[default]
    Anonymous,
}

impl AuthState {
    #[must_use]
    pub fn claims(&self) -> Option<&Claims> {
        match self {
            Self::Authenticated(claims) => Some(claims),
            Self::Anonymous => None,
        }
    }

    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        matches!(self, Self::Authenticated(_))
    }
}

impl From<Option<Claims>> for AuthState {
    fn from(claims: Option<Claims>) -> Self {
        claims.map_or(Self::Anonymous, Self::Authenticated)
    }
}

/// Reactive holder of the single [`AuthState`].
///
/// Readers either sample it with [`AuthStateStore::current`] or hold a
/// [`watch::Receiver`] from [`AuthStateStore::subscribe`] and await changes.
#[derive(Debug)]
pub struct AuthStateStore {
    tx: watch::Sender<AuthState>,
}

impl AuthStateStore {
    pub(crate) fn new(initial: AuthState) -> Self {
        let (tx, _rx) = watch::channel(initial);
        Self { tx }
    }

    #[must_use]
    pub fn current(&self) -> AuthState {
        self.tx.borrow().clone()
    }

    #[must_use]
    pub fn identity(&self) -> Option<Claims> {
        self.tx.borrow().claims().cloned()
    }

    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.tx.borrow().is_authenticated()
    }

    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<AuthState> {
        self.tx.subscribe()
    }

    /// Replace the state, notifying subscribers only on an actual change.
    pub(crate) fn set(&self, next: AuthState) {
        let changed = self.tx.send_if_modified(|state| {
            if *state == next {
                return false;
            }
            *state = next;
            true
        });
        if changed {
            tracing::debug!(authenticated = self.is_authenticated(), "auth state changed");
        }
    }

    pub(crate) fn clear(&self) {
        self.set(AuthState::Anonymous);
    }
}
