use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;
use url::Url;

use crate::handshake::controller::LoginOptions;
use crate::types::Session;

/// Message the popup posts to its opener once the callback is handled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum PopupMessage {
    #[serde(rename = "kakao-login-success")]
    Success { session: Session },
    #[serde(rename = "kakao-login-error")]
    Error { error: String },
}

impl PopupMessage {
    /// Decode a raw window message. Anything that is not a login message
    /// (other scripts, dev tools) yields `None`.
    #[must_use]
    pub fn from_json(raw: &str) -> Option<Self> {
        serde_json::from_str(raw).ok()
    }
}

/// Pending popup login, returned by
/// [`HandshakeController::initiate_login`](crate::HandshakeController::initiate_login).
///
/// Pass it to
/// [`HandshakeController::await_popup`](crate::HandshakeController::await_popup).
#[derive(Debug)]
pub struct PopupWait {
    pub(crate) receiver: oneshot::Receiver<PopupMessage>,
    pub(crate) options: LoginOptions,
}

/// Single slot holding the sender for the popup attempt currently in flight.
#[derive(Debug, Default)]
pub(crate) struct PopupMailbox {
    slot: Mutex<Option<oneshot::Sender<PopupMessage>>>,
}

impl PopupMailbox {
    /// Start a new attempt. A previous, unresolved attempt is abandoned and
    /// its waiter sees the channel close.
    pub(crate) fn arm(&self, options: LoginOptions) -> PopupWait {
        let (tx, receiver) = oneshot::channel();
        let previous = self.lock().replace(tx);
        if previous.is_some() {
            tracing::debug!("Superseding previous popup login attempt");
        }
        PopupWait { receiver, options }
    }

    pub(crate) fn disarm(&self) {
        self.lock().take();
    }

    /// Hand `message` to the waiting attempt. Only the first message counts.
    pub(crate) fn deliver(&self, message: PopupMessage) -> bool {
        match self.lock().take() {
            Some(tx) => tx.send(message).is_ok(),
            None => false,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Option<oneshot::Sender<PopupMessage>>> {
        self.slot
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

/// Compare a message origin (`scheme://host[:port]`) with the app origin.
pub(crate) fn origin_matches(origin: &str, app_origin: &Url) -> bool {
    match Url::parse(origin) {
        Ok(url) => url.origin() == app_origin.origin(),
        Err(_) => false,
    }
}
