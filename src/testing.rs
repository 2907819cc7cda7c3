//! Recording fakes for the backend and the host window.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use url::Url;

use crate::backend::{AuthBackend, CallbackPayload, LoginUrl};
use crate::config::PopupFeatures;
use crate::error::Error;
use crate::handshake::{PopupMessage, Window};
use crate::types::{ConversationRole, Profile, SessionProfile, SessionToken};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Default)]
pub(crate) struct FakeBackend {
    login_fails: bool,
    exchange_rejection: Option<String>,
    me_unauthorized: bool,
    save_unauthorized: bool,
    profile: Option<Profile>,
    login_calls: AtomicUsize,
    exchange_calls: AtomicUsize,
    tokens_seen: Mutex<Vec<String>>,
    saved_profiles: Mutex<Vec<Profile>>,
    joins: Mutex<Vec<(String, ConversationRole)>>,
}

impl FakeBackend {
    pub(crate) const AUTH_URL: &'static str = "https://kauth.kakao.com/oauth/authorize?client_id=test";

    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_login_failure(mut self) -> Self {
        self.login_fails = true;
        self
    }

    pub(crate) fn with_exchange_rejected(mut self, detail: &str) -> Self {
        self.exchange_rejection = Some(detail.to_owned());
        self
    }

    pub(crate) fn with_me_unauthorized(mut self) -> Self {
        self.me_unauthorized = true;
        self
    }

    pub(crate) fn with_save_unauthorized(mut self) -> Self {
        self.save_unauthorized = true;
        self
    }

    pub(crate) fn with_profile(mut self, profile: Profile) -> Self {
        self.profile = Some(profile);
        self
    }

    pub(crate) fn exchange_calls(&self) -> usize {
        self.exchange_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn tokens_seen(&self) -> Vec<String> {
        lock(&self.tokens_seen).clone()
    }

    pub(crate) fn saved_profiles(&self) -> Vec<Profile> {
        lock(&self.saved_profiles).clone()
    }

    pub(crate) fn joins(&self) -> Vec<(String, ConversationRole)> {
        lock(&self.joins).clone()
    }

    fn record_token(&self, token: &SessionToken) {
        lock(&self.tokens_seen).push(token.as_str().to_owned());
    }
}

impl AuthBackend for FakeBackend {
    async fn login_url(&self) -> Result<LoginUrl, Error> {
        let n = self.login_calls.fetch_add(1, Ordering::SeqCst) + 1;
        if self.login_fails {
            return Err(Error::Rejected {
                operation: "login url",
                status: 502,
                detail: "Bad Gateway".into(),
            });
        }
        Ok(LoginUrl::new(format!("state-{n}"), Self::AUTH_URL))
    }

    async fn exchange_code(&self, code: &str, _state: Option<&str>) -> Result<CallbackPayload, Error> {
        self.exchange_calls.fetch_add(1, Ordering::SeqCst);
        // Let overlapping callers interleave as they would on a real network.
        tokio::task::yield_now().await;
        if let Some(detail) = &self.exchange_rejection {
            return Err(Error::Rejected {
                operation: "code exchange",
                status: 400,
                detail: detail.clone(),
            });
        }
        Ok(CallbackPayload::new(
            SessionProfile::new("4609921299", "영진"),
            format!("session-for-{code}"),
        ))
    }

    async fn fetch_me(&self, token: &SessionToken) -> Result<Option<Profile>, Error> {
        self.record_token(token);
        if self.me_unauthorized {
            return Err(Error::Unauthorized("invalid_token".into()));
        }
        Ok(self.profile.clone())
    }

    async fn save_profile(&self, token: &SessionToken, profile: &Profile) -> Result<Profile, Error> {
        self.record_token(token);
        if self.save_unauthorized {
            return Err(Error::Unauthorized("invalid_token".into()));
        }
        lock(&self.saved_profiles).push(profile.clone());
        Ok(profile.clone())
    }

    async fn join_conversation(
        &self,
        token: &SessionToken,
        conversation_id: &str,
        role: ConversationRole,
    ) -> Result<(), Error> {
        self.record_token(token);
        lock(&self.joins).push((conversation_id.to_owned(), role));
        Ok(())
    }
}

pub(crate) struct FakeWindow {
    location: Mutex<Url>,
    has_opener: bool,
    popup_blocked: bool,
    closed: AtomicBool,
    navigations: Mutex<Vec<String>>,
    popups: Mutex<Vec<(String, PopupFeatures)>>,
    pushed: Mutex<Vec<String>>,
    replaced: Mutex<Vec<String>>,
    posted: Mutex<Vec<(PopupMessage, String)>>,
}

impl FakeWindow {
    pub(crate) fn new() -> Self {
        Self {
            location: Mutex::new(Url::parse("http://localhost:5173/").unwrap()),
            has_opener: false,
            popup_blocked: false,
            closed: AtomicBool::new(false),
            navigations: Mutex::default(),
            popups: Mutex::default(),
            pushed: Mutex::default(),
            replaced: Mutex::default(),
            posted: Mutex::default(),
        }
    }

    pub(crate) fn at(self, url: &str) -> Self {
        *lock(&self.location) = Url::parse(url).unwrap();
        self
    }

    pub(crate) fn with_opener(mut self) -> Self {
        self.has_opener = true;
        self
    }

    pub(crate) fn with_popup_blocked(mut self) -> Self {
        self.popup_blocked = true;
        self
    }

    pub(crate) fn navigations(&self) -> Vec<String> {
        lock(&self.navigations).clone()
    }

    pub(crate) fn popups(&self) -> Vec<(String, PopupFeatures)> {
        lock(&self.popups).clone()
    }

    pub(crate) fn pushed(&self) -> Vec<String> {
        lock(&self.pushed).clone()
    }

    pub(crate) fn replaced(&self) -> Vec<String> {
        lock(&self.replaced).clone()
    }

    pub(crate) fn posted(&self) -> Vec<(PopupMessage, String)> {
        lock(&self.posted).clone()
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn move_to(&self, path: &str) {
        let mut location = lock(&self.location);
        if let Ok(next) = location.join(path) {
            *location = next;
        }
    }
}

impl Window for FakeWindow {
    fn location(&self) -> Url {
        lock(&self.location).clone()
    }

    fn navigate(&self, url: &str) -> Result<(), Error> {
        lock(&self.navigations).push(url.to_owned());
        Ok(())
    }

    fn open_popup(&self, url: &str, features: &PopupFeatures) -> Result<(), Error> {
        if self.popup_blocked {
            return Err(Error::Navigation("popup blocked".into()));
        }
        lock(&self.popups).push((url.to_owned(), *features));
        Ok(())
    }

    fn push_route(&self, path: &str) {
        lock(&self.pushed).push(path.to_owned());
        self.move_to(path);
    }

    fn replace_route(&self, path: &str) {
        lock(&self.replaced).push(path.to_owned());
        self.move_to(path);
    }

    fn has_opener(&self) -> bool {
        self.has_opener
    }

    fn post_to_opener(&self, message: &PopupMessage, target_origin: &str) -> Result<(), Error> {
        if !self.has_opener {
            return Err(Error::Navigation("no opener".into()));
        }
        lock(&self.posted).push((message.clone(), target_origin.to_owned()));
        Ok(())
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}
