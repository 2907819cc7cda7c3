use std::future::Future;

use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::types::{ConversationRole, Profile, SessionProfile, SessionToken};

/// Response of `GET /auth/kakao/login`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[non_exhaustive]
pub struct LoginUrl {
    /// Single-use anti-forgery token for this attempt.
    pub state: String,
    /// Kakao authorize URL to send the user to.
    pub auth_url: String,
}

impl LoginUrl {
    #[must_use]
    pub fn new(state: impl Into<String>, auth_url: impl Into<String>) -> Self {
        Self {
            state: state.into(),
            auth_url: auth_url.into(),
        }
    }
}

/// Response of `GET /auth/kakao/callback`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[non_exhaustive]
pub struct CallbackPayload {
    pub profile: SessionProfile,
    pub session_token: SessionToken,
}

impl CallbackPayload {
    #[must_use]
    pub fn new(profile: SessionProfile, session_token: impl Into<String>) -> Self {
        Self {
            profile,
            session_token: SessionToken(session_token.into()),
        }
    }
}

/// The party backend, seen from the client.
///
/// [`ApiClient`](crate::ApiClient) is the HTTP implementation. Authenticated
/// calls take the token explicitly; callers go through
/// [`AuthorizedApi`](crate::AuthorizedApi) so the token is read from the
/// session store at call time and a 401 clears the session.
///
/// A 401 must be reported as [`Error::Unauthorized`].
pub trait AuthBackend: Send + Sync + 'static {
    /// Start a login attempt: fresh `{state, auth_url}` every call.
    fn login_url(&self) -> impl Future<Output = Result<LoginUrl, Error>> + Send;

    /// Exchange the authorization code Kakao handed back.
    fn exchange_code(
        &self,
        code: &str,
        state: Option<&str>,
    ) -> impl Future<Output = Result<CallbackPayload, Error>> + Send;

    /// `GET /me`. `None` when the user has no profile row yet.
    fn fetch_me(
        &self,
        token: &SessionToken,
    ) -> impl Future<Output = Result<Option<Profile>, Error>> + Send;

    /// `PUT /me`. Returns the profile as stored by the backend.
    fn save_profile(
        &self,
        token: &SessionToken,
        profile: &Profile,
    ) -> impl Future<Output = Result<Profile, Error>> + Send;

    /// `POST /conversations/{id}/join`.
    fn join_conversation(
        &self,
        token: &SessionToken,
        conversation_id: &str,
        role: ConversationRole,
    ) -> impl Future<Output = Result<(), Error>> + Send;
}
