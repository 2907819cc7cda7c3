#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// Network failure talking to the backend.
    #[cfg(feature = "http")]
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Backend answered with a non-success status. `detail` is shown verbatim.
    #[error("{detail}")]
    Rejected {
        operation: &'static str,
        status: u16,
        detail: String,
    },

    /// Backend answered 401 for an authenticated call.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// No session present for a call that requires one.
    #[error("Not authenticated")]
    Unauthenticated,

    /// The session was cleared after the backend rejected its token.
    #[error("Session expired, please log in again")]
    SessionExpired,

    /// Callback `state` did not match the pending login state.
    #[error("State mismatch, please try logging in again")]
    StateMismatch,

    /// Kakao redirected back with an `error` parameter, or the popup reported one.
    #[error("Login failed: {0}")]
    Login(String),

    /// The popup never reported back within the configured timeout.
    #[error("Login window did not respond in time")]
    PopupTimeout,

    /// The popup wait was superseded or abandoned before a message arrived.
    #[error("Login window was closed")]
    PopupClosed,

    /// The host window refused a navigation or popup request.
    #[error("Navigation error: {0}")]
    Navigation(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Missing or invalid configuration.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Returns `true` for a backend 401.
    #[must_use]
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Unauthorized(_))
    }
}
