//! The single authoritative copy of the current [`Session`].
//!
//! Mirrored to durable storage under `farewell-session` and published through
//! a `tokio::sync::watch` channel, so views subscribe instead of polling.

use std::sync::Arc;

use tokio::sync::watch;

use crate::error::Error;
use crate::storage::{self, Storage, keys};
use crate::types::{Session, SessionPatch, SessionToken};

pub struct SessionStore {
    storage: Arc<dyn Storage>,
    current: watch::Sender<Option<Session>>,
}

impl SessionStore {
    /// Rehydrate from durable storage. Never fails: an absent, malformed or
    /// token-less record means "anonymous", and a corrupt record is removed.
    #[must_use]
    pub fn load(storage: Arc<dyn Storage>) -> Self {
        let initial = match storage::get_json::<Session>(storage.as_ref(), keys::SESSION) {
            Some(session) if session.is_valid() => Some(session),
            Some(_) => {
                tracing::warn!("Stored session has an empty token, discarding");
                storage::remove_quietly(storage.as_ref(), keys::SESSION);
                None
            }
            None => {
                if storage.contains(keys::SESSION) {
                    storage::remove_quietly(storage.as_ref(), keys::SESSION);
                }
                None
            }
        };
        let (current, _) = watch::channel(initial);
        Self { storage, current }
    }

    /// Snapshot of the current session.
    #[must_use]
    pub fn current(&self) -> Option<Session> {
        self.current.borrow().clone()
    }

    /// Session present and its token non-empty.
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.current.borrow().as_ref().is_some_and(Session::is_valid)
    }

    /// Token to attach to the next authenticated request, read now.
    #[must_use]
    pub fn bearer_token(&self) -> Option<SessionToken> {
        self.current
            .borrow()
            .as_ref()
            .filter(|s| s.is_valid())
            .map(|s| s.session_token.clone())
    }

    /// `Authorization` header value for the current session.
    #[must_use]
    pub fn authorization_header(&self) -> Option<String> {
        self.bearer_token()
            .map(|token| format!("Bearer {}", token.as_str()))
    }

    /// Replace the session. Durable storage is written before subscribers
    /// are notified; both happen before this returns.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Storage`] or [`Error::Serialization`] if the record
    /// could not be persisted. The in-memory session is unchanged in that case.
    pub fn set(&self, session: Session) -> Result<(), Error> {
        storage::set_json(self.storage.as_ref(), keys::SESSION, &session)?;
        self.current.send_replace(Some(session));
        Ok(())
    }

    /// Drop the session (logout or 401).
    pub fn clear(&self) {
        storage::remove_quietly(self.storage.as_ref(), keys::SESSION);
        let previous = self.current.send_replace(None);
        if previous.is_some() {
            tracing::debug!("Session cleared");
        }
    }

    /// Apply a partial update to the current session.
    ///
    /// Returns the merged session, or `None` when anonymous.
    ///
    /// # Errors
    ///
    /// Same as [`set`](Self::set).
    pub fn merge(&self, patch: SessionPatch) -> Result<Option<Session>, Error> {
        let Some(mut session) = self.current() else {
            return Ok(None);
        };
        session.merge(patch);
        self.set(session.clone())?;
        Ok(Some(session))
    }

    /// Receive every session change from now on.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Option<Session>> {
        self.current.subscribe()
    }
}
