use std::future::Future;
use std::sync::Arc;

use tokio::sync::watch;

use crate::backend::AuthBackend;
use crate::error::Error;
use crate::handshake::AuthStatus;
use crate::session::SessionStore;
use crate::types::{ConversationRole, Profile, SessionToken};

/// Authenticated calls against the backend.
///
/// The bearer token is read from the [`SessionStore`] when each call starts,
/// so a logout or re-login is reflected on the very next request. A 401 from
/// any call clears the session, publishes [`AuthStatus::SessionExpired`] and
/// returns [`Error::SessionExpired`]; the request is not retried.
pub struct AuthorizedApi<B> {
    backend: Arc<B>,
    sessions: Arc<SessionStore>,
    status: watch::Sender<AuthStatus>,
}

// Manual Clone: avoid derive adding a `B: Clone` bound.
impl<B> Clone for AuthorizedApi<B> {
    fn clone(&self) -> Self {
        Self {
            backend: self.backend.clone(),
            sessions: self.sessions.clone(),
            status: self.status.clone(),
        }
    }
}

impl<B: AuthBackend> AuthorizedApi<B> {
    #[must_use]
    pub fn new(
        backend: Arc<B>,
        sessions: Arc<SessionStore>,
        status: watch::Sender<AuthStatus>,
    ) -> Self {
        Self {
            backend,
            sessions,
            status,
        }
    }

    /// Run `call` with the current token, handling the 401 contract.
    ///
    /// # Errors
    ///
    /// [`Error::Unauthenticated`] when no session exists,
    /// [`Error::SessionExpired`] when the backend answered 401, otherwise the
    /// error returned by `call`.
    pub async fn with_session<'a, T, F, Fut>(&'a self, call: F) -> Result<T, Error>
    where
        F: FnOnce(&'a B, SessionToken) -> Fut,
        Fut: Future<Output = Result<T, Error>> + 'a,
    {
        let token = self.sessions.bearer_token().ok_or(Error::Unauthenticated)?;
        match call(self.backend.as_ref(), token).await {
            Err(e) if e.is_unauthorized() => {
                tracing::warn!(error = %e, "Backend rejected session token, clearing session");
                self.sessions.clear();
                self.status.send_replace(AuthStatus::SessionExpired);
                Err(Error::SessionExpired)
            }
            other => other,
        }
    }

    /// # Errors
    ///
    /// See [`with_session`](Self::with_session).
    pub async fn me(&self) -> Result<Option<Profile>, Error> {
        self.with_session(|backend, token| async move { backend.fetch_me(&token).await })
            .await
    }

    /// # Errors
    ///
    /// See [`with_session`](Self::with_session).
    pub async fn save_profile(&self, profile: &Profile) -> Result<Profile, Error> {
        self.with_session(|backend, token| async move { backend.save_profile(&token, profile).await })
            .await
    }

    /// Create the one-time minimal profile used by simplified registration.
    ///
    /// # Errors
    ///
    /// See [`with_session`](Self::with_session).
    pub async fn create_minimal_profile(&self, name: &str) -> Result<Profile, Error> {
        let profile = Profile::minimal(name);
        self.save_profile(&profile).await
    }

    /// # Errors
    ///
    /// See [`with_session`](Self::with_session).
    pub async fn join_conversation(
        &self,
        conversation_id: &str,
        role: ConversationRole,
    ) -> Result<(), Error> {
        self.with_session(|backend, token| async move {
            backend.join_conversation(&token, conversation_id, role).await
        })
        .await
    }
}
