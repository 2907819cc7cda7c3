use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::watch;

use crate::api::AuthorizedApi;
use crate::backend::AuthBackend;
use crate::config::{ClientConfig, LoginMode};
use crate::error::Error;
use crate::handshake::callback::{CallbackGuard, CallbackQuery};
use crate::handshake::popup::{PopupMailbox, PopupMessage, PopupWait, origin_matches};
use crate::handshake::status::AuthStatus;
use crate::handshake::window::Window;
use crate::navigation::{
    HOME_PATH, Navigation, NavigationReconciler, ProfileState, Route, SessionTransition,
};
use crate::session::SessionStore;
use crate::storage::{self, Storage, keys};
use crate::types::Session;

/// Per-attempt login options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoginOptions {
    /// Overrides [`ClientConfig::login_mode`] for this attempt.
    pub mode: Option<LoginMode>,
    /// Create a name-only profile right after the first sign-in.
    pub simplified_registration: bool,
}

impl LoginOptions {
    #[must_use]
    pub fn with_mode(mut self, mode: LoginMode) -> Self {
        self.mode = Some(mode);
        self
    }

    #[must_use]
    pub fn simplified_registration(mut self) -> Self {
        self.simplified_registration = true;
        self
    }
}

/// How the user left for Kakao.
#[derive(Debug)]
pub enum LoginLaunch {
    /// The window is navigating away; nothing more happens in this page.
    Redirected,
    /// A popup is open; await it with [`HandshakeController::await_popup`].
    Popup(PopupWait),
}

/// Result of [`HandshakeController::handle_callback`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallbackOutcome {
    /// No `code` and no provider error on the URL.
    Ignored,
    /// Another invocation holds the marker, or this code was already exchanged.
    AlreadyHandled,
    /// Running in the popup: the result went to the opener and the popup closed.
    PostedToOpener,
    /// Redirect mode: session persisted and the user was routed.
    SignedIn(Navigation),
}

/// Drives the Kakao OAuth handshake in redirect and popup mode.
///
/// One controller lives for the lifetime of a page. It owns the popup
/// mailbox and remembers which authorization codes it has exchanged.
pub struct HandshakeController<B, W> {
    config: ClientConfig,
    backend: Arc<B>,
    window: Arc<W>,
    durable: Arc<dyn Storage>,
    tab: Arc<dyn Storage>,
    sessions: Arc<SessionStore>,
    api: AuthorizedApi<B>,
    navigation: NavigationReconciler,
    status: watch::Sender<AuthStatus>,
    popup: PopupMailbox,
    exchanged_codes: Mutex<HashSet<String>>,
}

impl<B: AuthBackend, W: Window> HandshakeController<B, W> {
    /// Build a controller and rehydrate the session from `durable`.
    ///
    /// `durable` survives restarts (`localStorage`); `tab` lives as long as
    /// the tab (`sessionStorage`).
    pub fn new(
        config: ClientConfig,
        backend: B,
        window: W,
        durable: Arc<dyn Storage>,
        tab: Arc<dyn Storage>,
    ) -> Self {
        let backend = Arc::new(backend);
        let sessions = Arc::new(SessionStore::load(durable.clone()));
        let (status, _) = watch::channel(AuthStatus::Idle);
        let api = AuthorizedApi::new(backend.clone(), sessions.clone(), status.clone());
        let navigation =
            NavigationReconciler::new(durable.clone(), tab.clone(), config.callback_path());
        Self {
            config,
            backend,
            window: Arc::new(window),
            durable,
            tab,
            sessions,
            api,
            navigation,
            status,
            popup: PopupMailbox::default(),
            exchanged_codes: Mutex::new(HashSet::new()),
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn sessions(&self) -> &Arc<SessionStore> {
        &self.sessions
    }

    /// Authenticated backend calls bound to this controller's session.
    pub fn api(&self) -> &AuthorizedApi<B> {
        &self.api
    }

    pub fn navigation(&self) -> &NavigationReconciler {
        &self.navigation
    }

    pub fn window(&self) -> &W {
        &self.window
    }

    pub fn status(&self) -> AuthStatus {
        self.status.borrow().clone()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<AuthStatus> {
        self.status.subscribe()
    }

    fn set_status(&self, status: AuthStatus) {
        self.status.send_replace(status);
    }

    fn fail(&self, error: &Error) {
        let message = match error {
            Error::Login(message) => message.clone(),
            other => other.to_string(),
        };
        self.set_status(AuthStatus::Failed(message));
    }

    // ── Login ──────────────────────────────────────────────────────────

    /// Start a login attempt.
    ///
    /// Marks the intro flow as seen. The `kakao-state` write completes before the user is transported, so
    /// the callback always finds it.
    ///
    /// # Errors
    ///
    /// Returns the backend error if no login URL could be obtained (nothing
    /// is written in that case), or [`Error::Navigation`] if the window
    /// refused to navigate or open the popup.
    pub async fn initiate_login(&self, options: LoginOptions) -> Result<LoginLaunch, Error> {
        // Choosing to log in counts as having seen the intro, even if the
        // attempt later fails or is cancelled.
        self.navigation.mark_landing_seen();
        storage::remove_quietly(self.tab.as_ref(), keys::CALLBACK_PROCESSED);
        self.set_status(AuthStatus::Redirecting);

        let login = match self.backend.login_url().await {
            Ok(login) => login,
            Err(e) => {
                tracing::warn!(error = %e, "Could not obtain Kakao login URL");
                self.fail(&e);
                return Err(e);
            }
        };

        if let Err(e) = self.durable.set(keys::KAKAO_STATE, &login.state) {
            self.fail(&e);
            return Err(e);
        }

        let mode = options.mode.unwrap_or(self.config.login_mode());
        let launched = match mode {
            LoginMode::Redirect => self
                .window
                .navigate(&login.auth_url)
                .map(|()| LoginLaunch::Redirected),
            LoginMode::Popup => {
                let wait = self.popup.arm(options);
                match self.window.open_popup(&login.auth_url, &self.config.popup()) {
                    Ok(()) => {
                        self.set_status(AuthStatus::AwaitingPopup);
                        Ok(LoginLaunch::Popup(wait))
                    }
                    Err(e) => {
                        self.popup.disarm();
                        Err(e)
                    }
                }
            }
        };

        if let Err(e) = &launched {
            tracing::warn!(error = %e, ?mode, "Could not hand the user to Kakao");
            storage::remove_quietly(self.durable.as_ref(), keys::KAKAO_STATE);
            self.fail(e);
        } else {
            tracing::debug!(?mode, "Login handed off to Kakao");
        }
        launched
    }

    // ── Callback ───────────────────────────────────────────────────────

    /// Process the page Kakao redirected back to.
    ///
    /// Safe to invoke more than once for the same page load: only the first
    /// invocation exchanges the code.
    ///
    /// # Errors
    ///
    /// Transport and backend errors, [`Error::StateMismatch`], or
    /// [`Error::Login`] for a provider-reported failure. In popup mode the
    /// error is also posted to the opener.
    pub async fn handle_callback(&self, query: &CallbackQuery) -> Result<CallbackOutcome, Error> {
        let code = query.code();
        let provider_error = query.provider_error();
        if code.is_none() && provider_error.is_none() {
            return Ok(CallbackOutcome::Ignored);
        }

        let guard = match CallbackGuard::acquire(self.tab.as_ref()) {
            Ok(Some(guard)) => guard,
            Ok(None) => {
                tracing::debug!("Callback already in progress, ignoring duplicate");
                return Ok(CallbackOutcome::AlreadyHandled);
            }
            Err(e) => {
                self.fail(&e);
                return Err(e);
            }
        };
        if let Some(code) = code {
            if !self.claim_code(code) {
                tracing::debug!("Authorization code already exchanged, ignoring duplicate");
                return Ok(CallbackOutcome::AlreadyHandled);
            }
        }

        self.set_status(AuthStatus::ProcessingCallback);
        let result = match (provider_error, code) {
            (Some(error), _) => {
                tracing::warn!(%error, "Kakao returned an error to the callback");
                storage::remove_quietly(self.durable.as_ref(), keys::KAKAO_STATE);
                Err(Error::Login(error))
            }
            (None, Some(code)) => self.exchange(code, query.state.as_deref()).await,
            (None, None) => return Ok(CallbackOutcome::Ignored),
        };

        let outcome = self.finish_callback(result).await;
        drop(guard);
        outcome
    }

    async fn finish_callback(&self, result: Result<Session, Error>) -> Result<CallbackOutcome, Error> {
        if self.window.has_opener() {
            let message = match &result {
                Ok(session) => PopupMessage::Success {
                    session: session.clone(),
                },
                Err(e) => PopupMessage::Error {
                    error: e.to_string(),
                },
            };
            let target = self.config.app_origin().origin().ascii_serialization();
            match self.window.post_to_opener(&message, &target) {
                Ok(()) => {
                    self.window.close();
                    match &result {
                        Ok(_) => self.set_status(AuthStatus::SignedIn),
                        Err(e) => self.fail(e),
                    }
                    return result.map(|_| CallbackOutcome::PostedToOpener);
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Opener unreachable, finishing login in this window");
                }
            }
        }

        let session = match result {
            Ok(session) => session,
            Err(e) => {
                self.fail(&e);
                return Err(e);
            }
        };
        if let Err(e) = self.sessions.set(session) {
            self.fail(&e);
            return Err(e);
        }
        self.window.replace_route(HOME_PATH);
        let navigation = self.after_sign_in(&Route::Root, HOME_PATH).await?;
        Ok(CallbackOutcome::SignedIn(navigation))
    }

    /// Exchange `code`, then validate `state` against the pending login.
    async fn exchange(&self, code: &str, state: Option<&str>) -> Result<Session, Error> {
        let pending = self.durable.get(keys::KAKAO_STATE);
        let exchanged = self.backend.exchange_code(code, state).await;
        storage::remove_quietly(self.durable.as_ref(), keys::KAKAO_STATE);

        let payload = match exchanged {
            Ok(payload) => payload,
            Err(e) => {
                tracing::error!(error = %e, "Kakao code exchange failed");
                return Err(e);
            }
        };
        if let Some(expected) = pending.as_deref() {
            if state != Some(expected) {
                tracing::warn!(received = ?state, "OAuth state mismatch, discarding credential");
                return Err(Error::StateMismatch);
            }
        }

        let session = Session::from_profile(payload.profile, payload.session_token);
        if !session.is_valid() {
            return Err(Error::Login("backend issued an empty session token".into()));
        }
        Ok(session)
    }

    fn claim_code(&self, code: &str) -> bool {
        self.exchanged_codes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(code.to_owned())
    }

    // ── Popup ──────────────────────────────────────────────────────────

    /// Entry point for window messages on the opener side.
    ///
    /// Messages from any origin other than the app's are dropped, as are
    /// messages that arrive when no popup login is waiting. Returns whether
    /// the message was accepted.
    pub fn deliver_popup_message(&self, origin: &str, message: PopupMessage) -> bool {
        if !origin_matches(origin, self.config.app_origin()) {
            tracing::warn!(origin, "Ignoring login message from foreign origin");
            return false;
        }
        let accepted = self.popup.deliver(message);
        if !accepted {
            tracing::debug!(origin, "No popup login waiting, ignoring message");
        }
        accepted
    }

    /// Like [`deliver_popup_message`](Self::deliver_popup_message) for a raw
    /// JSON payload. Non-login messages are ignored.
    pub fn deliver_popup_json(&self, origin: &str, raw: &str) -> bool {
        PopupMessage::from_json(raw).is_some_and(|message| self.deliver_popup_message(origin, message))
    }

    /// Wait for the popup to report back, then finish the login.
    ///
    /// # Errors
    ///
    /// [`Error::PopupTimeout`] after [`ClientConfig::popup_timeout`],
    /// [`Error::PopupClosed`] if a newer attempt superseded this one, or any
    /// error from [`receive_popup_message`](Self::receive_popup_message).
    pub async fn await_popup(&self, wait: PopupWait) -> Result<Navigation, Error> {
        let PopupWait { receiver, options } = wait;
        match tokio::time::timeout(self.config.popup_timeout(), receiver).await {
            Ok(Ok(message)) => self.receive_popup_message(message, options).await,
            Ok(Err(_)) => Err(Error::PopupClosed),
            Err(_) => {
                self.popup.disarm();
                tracing::warn!(timeout = ?self.config.popup_timeout(), "Popup login timed out");
                let e = Error::PopupTimeout;
                self.fail(&e);
                Err(e)
            }
        }
    }

    /// Finish a popup login on the opener side.
    ///
    /// A success carrying the token that is already active is a no-op
    /// returning [`Navigation::Stay`].
    ///
    /// # Errors
    ///
    /// [`Error::Login`] for an error message (the session is untouched), or
    /// a storage error if the session could not be persisted.
    pub async fn receive_popup_message(
        &self,
        message: PopupMessage,
        options: LoginOptions,
    ) -> Result<Navigation, Error> {
        let session = match message {
            PopupMessage::Success { session } => session,
            PopupMessage::Error { error } => {
                tracing::warn!(%error, "Popup reported a login failure");
                let e = Error::Login(error);
                self.fail(&e);
                return Err(e);
            }
        };
        if !session.is_valid() {
            let e = Error::Login("login window sent an empty session token".into());
            self.fail(&e);
            return Err(e);
        }
        if self.sessions.bearer_token().as_ref() == Some(&session.session_token) {
            tracing::debug!("Popup session already active, ignoring duplicate");
            return Ok(Navigation::Stay);
        }

        let nickname = session.nickname.clone();
        if let Err(e) = self.sessions.set(session) {
            self.fail(&e);
            return Err(e);
        }
        if options.simplified_registration {
            match self.api.create_minimal_profile(&nickname).await {
                Ok(_) => {}
                Err(Error::SessionExpired) => return Err(Error::SessionExpired),
                Err(e) => tracing::warn!(error = %e, "Minimal profile creation failed"),
            }
        }

        let location = self.window.location();
        let route = self.navigation.route(location.path());
        self.after_sign_in(&route, location.path()).await
    }

    // ── Sign-in ────────────────────────────────────────────────────────

    /// Fetch the profile, decide where to go, and go there.
    ///
    /// `current_path` is where the window is now; routing to it again is
    /// skipped.
    async fn after_sign_in(&self, route: &Route, current_path: &str) -> Result<Navigation, Error> {
        self.set_status(AuthStatus::LoadingProfile);
        let profile = match self.api.me().await {
            Ok(profile) => ProfileState::of(profile.as_ref()),
            // The session is gone: nothing left to route as signed in.
            Err(Error::SessionExpired | Error::Unauthenticated) => {
                self.set_status(AuthStatus::SessionExpired);
                return Err(Error::SessionExpired);
            }
            Err(e) => {
                tracing::warn!(error = %e, "Profile fetch failed after sign-in");
                ProfileState::Unknown
            }
        };

        let navigation = self
            .navigation
            .reconcile(route, SessionTransition::JustAuthenticated(profile));
        self.apply(&navigation, current_path);
        self.set_status(AuthStatus::SignedIn);

        if let Some(session) = self.sessions.current() {
            tracing::info!(
                kakao_id = %session.kakao_id,
                ?profile,
                ?navigation,
                "Signed in with Kakao"
            );
        }
        Ok(navigation)
    }

    fn apply(&self, navigation: &Navigation, current_path: &str) {
        match navigation.target() {
            Some(target) if target != current_path => self.window.push_route(&target),
            _ => {}
        }
    }

    // ── Page load ──────────────────────────────────────────────────────

    /// Reconcile the page the app was just loaded on.
    ///
    /// On the callback route the load belongs to the handshake and is
    /// processed here; anywhere else the decision table runs with the
    /// rehydrated session.
    ///
    /// # Errors
    ///
    /// Only from [`handle_callback`](Self::handle_callback).
    pub async fn resume(&self) -> Result<Navigation, Error> {
        let location = self.window.location();
        let route = self.navigation.route(location.path());
        if route == Route::Callback {
            let query = CallbackQuery::from_url(&location);
            return Ok(match self.handle_callback(&query).await? {
                CallbackOutcome::SignedIn(navigation) => navigation,
                _ => Navigation::HandOffToCallback,
            });
        }

        let transition = if self.sessions.is_authenticated() {
            SessionTransition::Authenticated
        } else {
            SessionTransition::Anonymous
        };
        let navigation = self.navigation.reconcile(&route, transition);
        self.apply(&navigation, location.path());
        Ok(navigation)
    }

    // ── Logout ─────────────────────────────────────────────────────────

    /// Clear the session and return to the default landing surface.
    pub fn logout(&self) {
        self.sessions.clear();
        self.popup.disarm();
        self.set_status(AuthStatus::Idle);
        self.window.push_route(HOME_PATH);
        tracing::info!("Logged out");
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::backend::CallbackPayload;
    use crate::storage::MemoryStorage;
    use crate::testing::{FakeBackend, FakeWindow};
    use crate::types::{
        ConversationRole, PendingDeepLink, Profile, SessionProfile, SessionToken,
    };

    const APP_ORIGIN: &str = "http://localhost:5173";

    struct Harness {
        durable: Arc<MemoryStorage>,
        tab: Arc<MemoryStorage>,
        controller: HandshakeController<FakeBackend, FakeWindow>,
    }

    impl Harness {
        fn new(backend: FakeBackend, window: FakeWindow) -> Self {
            Self::with_config(config(), backend, window)
        }

        fn with_config(config: ClientConfig, backend: FakeBackend, window: FakeWindow) -> Self {
            let durable = Arc::new(MemoryStorage::new());
            let tab = Arc::new(MemoryStorage::new());
            let controller =
                HandshakeController::new(config, backend, window, durable.clone(), tab.clone());
            Self {
                durable,
                tab,
                controller,
            }
        }

        fn backend(&self) -> &FakeBackend {
            &self.controller.backend
        }

        fn window(&self) -> &FakeWindow {
            self.controller.window()
        }
    }

    fn config() -> ClientConfig {
        ClientConfig::new(
            "http://localhost:8000".parse().unwrap(),
            APP_ORIGIN.parse().unwrap(),
        )
    }

    fn popup_session(token: &str) -> Session {
        Session::from_profile(SessionProfile::new("7", "영진"), SessionToken(token.into()))
    }

    fn filled_profile() -> Profile {
        Profile {
            name: "영진".into(),
            intro: "안녕하세요".into(),
            ..Profile::default()
        }
    }

    #[tokio::test]
    async fn redirect_login_writes_state_before_navigating() {
        let h = Harness::new(FakeBackend::new(), FakeWindow::new());
        h.tab.set(keys::CALLBACK_PROCESSED, "1").unwrap();

        let launch = h.controller.initiate_login(LoginOptions::default()).await.unwrap();
        assert!(matches!(launch, LoginLaunch::Redirected));
        assert_eq!(h.durable.get(keys::KAKAO_STATE).as_deref(), Some("state-1"));
        assert_eq!(h.window().navigations(), vec![FakeBackend::AUTH_URL.to_string()]);
        assert!(!h.tab.contains(keys::CALLBACK_PROCESSED));
        assert!(h.durable.contains(keys::LANDING_SEEN));
        assert_eq!(h.controller.status(), AuthStatus::Redirecting);
    }

    #[tokio::test]
    async fn failed_login_does_not_replay_intro() {
        let h = Harness::new(FakeBackend::new().with_login_failure(), FakeWindow::new());
        h.controller.initiate_login(LoginOptions::default()).await.unwrap_err();
        assert_eq!(h.controller.resume().await.unwrap(), Navigation::Stay);
        assert!(h.window().pushed().is_empty());
    }

    #[tokio::test]
    async fn login_url_failure_writes_nothing() {
        let h = Harness::new(FakeBackend::new().with_login_failure(), FakeWindow::new());
        let err = h.controller.initiate_login(LoginOptions::default()).await.unwrap_err();
        assert!(matches!(err, Error::Rejected { .. }));
        assert!(!h.durable.contains(keys::KAKAO_STATE));
        assert!(h.window().navigations().is_empty());
        assert!(h.controller.status().is_failure());
    }

    #[tokio::test]
    async fn blocked_popup_clears_pending_state() {
        let h = Harness::new(FakeBackend::new(), FakeWindow::new().with_popup_blocked());
        let err = h
            .controller
            .initiate_login(LoginOptions::default().with_mode(LoginMode::Popup))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Navigation(_)));
        assert!(!h.durable.contains(keys::KAKAO_STATE));
    }

    #[tokio::test]
    async fn callback_without_code_is_a_noop() {
        let h = Harness::new(FakeBackend::new(), FakeWindow::new());
        h.durable.set(keys::KAKAO_STATE, "s").unwrap();

        let outcome = h.controller.handle_callback(&CallbackQuery::default()).await.unwrap();
        assert_eq!(outcome, CallbackOutcome::Ignored);
        assert_eq!(h.backend().exchange_calls(), 0);
        assert_eq!(h.durable.get(keys::KAKAO_STATE).as_deref(), Some("s"));
        assert!(h.tab.is_empty());
        assert_eq!(h.controller.status(), AuthStatus::Idle);
    }

    #[tokio::test]
    async fn redirect_callback_signs_in_and_routes_to_onboarding() {
        let h = Harness::new(FakeBackend::new(), FakeWindow::new());
        h.durable.set(keys::KAKAO_STATE, "s").unwrap();

        let outcome = h
            .controller
            .handle_callback(&CallbackQuery::new("code-1", Some("s")))
            .await
            .unwrap();
        assert_eq!(outcome, CallbackOutcome::SignedIn(Navigation::Onboarding));

        let session = h.controller.sessions().current().unwrap();
        assert_eq!(session.session_token.as_str(), "session-for-code-1");
        assert!(h.durable.contains(keys::SESSION));
        assert!(!h.durable.contains(keys::KAKAO_STATE));
        assert!(!h.tab.contains(keys::CALLBACK_PROCESSED));
        assert_eq!(h.window().replaced(), vec![HOME_PATH.to_string()]);
        assert_eq!(h.window().pushed(), vec!["/onboarding".to_string()]);
        assert_eq!(h.controller.status(), AuthStatus::SignedIn);
    }

    #[tokio::test]
    async fn redirect_callback_with_filled_profile_goes_home() {
        let h = Harness::new(
            FakeBackend::new().with_profile(filled_profile()),
            FakeWindow::new(),
        );
        let outcome = h
            .controller
            .handle_callback(&CallbackQuery::new("code-1", None))
            .await
            .unwrap();
        assert_eq!(outcome, CallbackOutcome::SignedIn(Navigation::Home));
        assert!(h.durable.contains(keys::LANDING_SEEN));
        // Already on `/` after the callback URL was replaced.
        assert_eq!(h.window().replaced(), vec![HOME_PATH.to_string()]);
        assert!(h.window().pushed().is_empty());
    }

    #[tokio::test]
    async fn redirect_callback_replays_pending_deep_link() {
        let h = Harness::new(
            FakeBackend::new().with_profile(filled_profile()),
            FakeWindow::new(),
        );
        h.controller
            .navigation()
            .capture_deep_link(&PendingDeepLink::new("42", ConversationRole::Listener))
            .unwrap();

        let outcome = h
            .controller
            .handle_callback(&CallbackQuery::new("code-1", None))
            .await
            .unwrap();
        assert_eq!(
            outcome,
            CallbackOutcome::SignedIn(Navigation::DeepLink(PendingDeepLink::new(
                "42",
                ConversationRole::Listener
            )))
        );
        assert_eq!(
            h.window().pushed(),
            vec!["/conversation/42?join=listener".to_string()]
        );
        assert!(h.controller.navigation().pending_deep_link().is_none());
    }

    #[tokio::test]
    async fn concurrent_duplicate_callbacks_exchange_once() {
        let h = Harness::new(FakeBackend::new(), FakeWindow::new());
        let query = CallbackQuery::new("code-1", None);

        let (first, second) = tokio::join!(
            h.controller.handle_callback(&query),
            h.controller.handle_callback(&query)
        );
        assert_eq!(h.backend().exchange_calls(), 1);
        let outcomes = [first.unwrap(), second.unwrap()];
        assert!(outcomes.contains(&CallbackOutcome::AlreadyHandled));
        assert!(
            outcomes
                .iter()
                .any(|o| matches!(o, CallbackOutcome::SignedIn(_)))
        );
    }

    #[tokio::test]
    async fn sequential_duplicate_callback_is_ignored_but_new_code_proceeds() {
        let h = Harness::new(FakeBackend::new(), FakeWindow::new());
        h.controller
            .handle_callback(&CallbackQuery::new("code-1", None))
            .await
            .unwrap();
        let again = h
            .controller
            .handle_callback(&CallbackQuery::new("code-1", None))
            .await
            .unwrap();
        assert_eq!(again, CallbackOutcome::AlreadyHandled);
        assert_eq!(h.backend().exchange_calls(), 1);

        h.controller
            .handle_callback(&CallbackQuery::new("code-2", None))
            .await
            .unwrap();
        assert_eq!(h.backend().exchange_calls(), 2);
        assert_eq!(
            h.controller.sessions().bearer_token().unwrap().as_str(),
            "session-for-code-2"
        );
    }

    #[tokio::test]
    async fn state_mismatch_discards_credential() {
        let h = Harness::new(FakeBackend::new(), FakeWindow::new());
        h.durable.set(keys::KAKAO_STATE, "expected").unwrap();

        let err = h
            .controller
            .handle_callback(&CallbackQuery::new("code-1", Some("forged")))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::StateMismatch));
        assert!(!h.controller.sessions().is_authenticated());
        assert!(!h.durable.contains(keys::SESSION));
        assert!(!h.durable.contains(keys::KAKAO_STATE));
        assert!(!h.tab.contains(keys::CALLBACK_PROCESSED));
        assert!(h.controller.status().is_failure());
    }

    #[tokio::test]
    async fn missing_state_with_pending_state_is_a_mismatch() {
        let h = Harness::new(FakeBackend::new(), FakeWindow::new());
        h.durable.set(keys::KAKAO_STATE, "expected").unwrap();
        let err = h
            .controller
            .handle_callback(&CallbackQuery::new("code-1", None))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::StateMismatch));
        assert!(!h.controller.sessions().is_authenticated());
    }

    #[tokio::test]
    async fn backend_rejection_detail_reaches_status() {
        let h = Harness::new(
            FakeBackend::new().with_exchange_rejected("kakao_token_error: invalid_grant"),
            FakeWindow::new(),
        );
        let err = h
            .controller
            .handle_callback(&CallbackQuery::new("code-1", None))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "kakao_token_error: invalid_grant");
        assert_eq!(
            h.controller.status(),
            AuthStatus::Failed("kakao_token_error: invalid_grant".into())
        );
        assert!(!h.tab.contains(keys::CALLBACK_PROCESSED));
    }

    #[tokio::test]
    async fn provider_error_skips_exchange() {
        let h = Harness::new(FakeBackend::new(), FakeWindow::new());
        h.durable.set(keys::KAKAO_STATE, "s").unwrap();
        let query = CallbackQuery {
            error: Some("access_denied".into()),
            ..CallbackQuery::default()
        };
        let err = h.controller.handle_callback(&query).await.unwrap_err();
        assert!(matches!(err, Error::Login(_)));
        assert_eq!(h.backend().exchange_calls(), 0);
        assert!(!h.durable.contains(keys::KAKAO_STATE));
    }

    #[tokio::test]
    async fn popup_callback_posts_to_opener_and_closes() {
        let h = Harness::new(FakeBackend::new(), FakeWindow::new().with_opener());
        let outcome = h
            .controller
            .handle_callback(&CallbackQuery::new("code-1", None))
            .await
            .unwrap();
        assert_eq!(outcome, CallbackOutcome::PostedToOpener);

        let posted = h.window().posted();
        assert_eq!(posted.len(), 1);
        let (message, target) = &posted[0];
        assert!(matches!(message, PopupMessage::Success { session } if session.session_token.as_str() == "session-for-code-1"));
        assert_eq!(target, APP_ORIGIN);
        assert!(h.window().is_closed());
        // The opener owns persistence.
        assert!(!h.durable.contains(keys::SESSION));
    }

    #[tokio::test]
    async fn popup_callback_posts_errors_too() {
        let h = Harness::new(
            FakeBackend::new().with_exchange_rejected("boom"),
            FakeWindow::new().with_opener(),
        );
        h.controller
            .handle_callback(&CallbackQuery::new("code-1", None))
            .await
            .unwrap_err();
        let posted = h.window().posted();
        assert_eq!(
            posted[0].0,
            PopupMessage::Error {
                error: "boom".into()
            }
        );
        assert!(h.window().is_closed());
    }

    #[tokio::test]
    async fn popup_login_end_to_end_on_opener() {
        let h = Harness::new(FakeBackend::new(), FakeWindow::new());
        let launch = h
            .controller
            .initiate_login(LoginOptions::default().with_mode(LoginMode::Popup))
            .await
            .unwrap();
        let LoginLaunch::Popup(wait) = launch else {
            panic!("expected popup launch");
        };
        assert_eq!(h.window().popups().len(), 1);
        assert_eq!(h.controller.status(), AuthStatus::AwaitingPopup);

        assert!(h.controller.deliver_popup_message(
            APP_ORIGIN,
            PopupMessage::Success {
                session: popup_session("popup-token")
            }
        ));
        let navigation = h.controller.await_popup(wait).await.unwrap();
        assert_eq!(navigation, Navigation::Onboarding);
        assert_eq!(
            h.controller.sessions().bearer_token().unwrap().as_str(),
            "popup-token"
        );
    }

    #[tokio::test]
    async fn popup_error_leaves_session_untouched() {
        let h = Harness::new(FakeBackend::new(), FakeWindow::new());
        let existing = popup_session("existing");
        h.controller.sessions().set(existing.clone()).unwrap();

        let err = h
            .controller
            .receive_popup_message(
                PopupMessage::Error {
                    error: "user cancelled".into(),
                },
                LoginOptions::default(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Login(_)));
        assert_eq!(h.controller.sessions().current(), Some(existing));
        assert_eq!(
            h.controller.status(),
            AuthStatus::Failed("user cancelled".into())
        );
    }

    #[tokio::test]
    async fn duplicate_popup_session_is_ignored() {
        let h = Harness::new(FakeBackend::new(), FakeWindow::new());
        h.controller.sessions().set(popup_session("same")).unwrap();
        let navigation = h
            .controller
            .receive_popup_message(
                PopupMessage::Success {
                    session: popup_session("same"),
                },
                LoginOptions::default(),
            )
            .await
            .unwrap();
        assert_eq!(navigation, Navigation::Stay);
        assert!(h.backend().tokens_seen().is_empty());
    }

    #[tokio::test]
    async fn simplified_registration_creates_minimal_profile() {
        let h = Harness::new(FakeBackend::new(), FakeWindow::new());
        h.controller
            .receive_popup_message(
                PopupMessage::Success {
                    session: popup_session("tok"),
                },
                LoginOptions::default().simplified_registration(),
            )
            .await
            .unwrap();
        let saved = h.backend().saved_profiles();
        assert_eq!(saved.len(), 1);
        assert_eq!(saved[0].name, "영진");
    }

    #[tokio::test]
    async fn expired_session_during_minimal_profile_is_not_signed_in() {
        let h = Harness::new(
            FakeBackend::new()
                .with_save_unauthorized()
                .with_profile(filled_profile()),
            FakeWindow::new(),
        );
        let err = h
            .controller
            .receive_popup_message(
                PopupMessage::Success {
                    session: popup_session("tok"),
                },
                LoginOptions::default().simplified_registration(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::SessionExpired));
        assert!(!h.controller.sessions().is_authenticated());
        assert!(!h.durable.contains(keys::SESSION));
        assert_eq!(h.controller.status(), AuthStatus::SessionExpired);
        assert!(h.window().pushed().is_empty());
        assert!(!h.durable.contains(keys::LANDING_SEEN));
    }

    #[tokio::test]
    async fn session_cleared_before_profile_fetch_is_not_signed_in() {
        let h = Harness::new(FakeBackend::new(), FakeWindow::new());
        let err = h.controller.after_sign_in(&Route::Root, HOME_PATH).await.unwrap_err();
        assert!(matches!(err, Error::SessionExpired));
        assert_eq!(h.controller.status(), AuthStatus::SessionExpired);
        assert!(h.window().pushed().is_empty());
    }

    #[tokio::test]
    async fn foreign_origin_messages_are_dropped() {
        let h = Harness::new(FakeBackend::new(), FakeWindow::new());
        let _wait = h
            .controller
            .initiate_login(LoginOptions::default().with_mode(LoginMode::Popup))
            .await
            .unwrap();
        assert!(!h.controller.deliver_popup_message(
            "https://evil.example",
            PopupMessage::Success {
                session: popup_session("forged")
            }
        ));
        assert!(!h.controller.deliver_popup_json(APP_ORIGIN, r#"{"type":"webpackOk"}"#));
        assert!(h.controller.deliver_popup_json(
            APP_ORIGIN,
            r#"{"type":"kakao-login-error","error":"x"}"#
        ));
    }

    #[tokio::test]
    async fn popup_wait_times_out() {
        let h = Harness::with_config(
            config().with_popup_timeout(Duration::from_millis(20)),
            FakeBackend::new(),
            FakeWindow::new(),
        );
        let LoginLaunch::Popup(wait) = h
            .controller
            .initiate_login(LoginOptions::default().with_mode(LoginMode::Popup))
            .await
            .unwrap()
        else {
            panic!("expected popup launch");
        };
        let err = h.controller.await_popup(wait).await.unwrap_err();
        assert!(matches!(err, Error::PopupTimeout));
        assert!(h.controller.status().is_failure());
        // Late messages find nobody waiting.
        assert!(!h.controller.deliver_popup_message(
            APP_ORIGIN,
            PopupMessage::Success {
                session: popup_session("late")
            }
        ));
    }

    #[tokio::test]
    async fn resume_on_callback_url_processes_it() {
        let window = FakeWindow::new()
            .at("http://localhost:5173/api/auth/kakao/callback?code=code-9");
        let h = Harness::new(FakeBackend::new().with_profile(filled_profile()), window);
        let navigation = h.controller.resume().await.unwrap();
        assert_eq!(navigation, Navigation::Home);
        assert!(h.controller.sessions().is_authenticated());
    }

    #[tokio::test]
    async fn resume_shows_intro_to_first_time_visitors() {
        let h = Harness::new(FakeBackend::new(), FakeWindow::new());
        assert_eq!(h.controller.resume().await.unwrap(), Navigation::Intro);
        assert_eq!(h.window().pushed(), vec!["/landing".to_string()]);

        h.controller.navigation().mark_landing_seen();
        assert_eq!(h.controller.resume().await.unwrap(), Navigation::Stay);
    }

    #[tokio::test]
    async fn expired_session_during_sign_in_is_reported() {
        let h = Harness::new(FakeBackend::new().with_me_unauthorized(), FakeWindow::new());
        let err = h
            .controller
            .handle_callback(&CallbackQuery::new("code-1", None))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::SessionExpired));
        assert!(!h.controller.sessions().is_authenticated());
        assert_eq!(h.controller.status(), AuthStatus::SessionExpired);
    }

    #[tokio::test]
    async fn logout_clears_session_and_goes_home() {
        let h = Harness::new(FakeBackend::new(), FakeWindow::new());
        h.controller.sessions().set(popup_session("tok")).unwrap();
        h.controller.logout();
        assert!(!h.controller.sessions().is_authenticated());
        assert!(!h.durable.contains(keys::SESSION));
        assert_eq!(h.window().pushed(), vec![HOME_PATH.to_string()]);
    }

    #[test]
    fn payload_to_session_keeps_identity() {
        let payload = CallbackPayload::new(SessionProfile::new("9", "n").with_admin(true), "t");
        let session = Session::from_profile(payload.profile, payload.session_token);
        assert!(session.is_admin);
        assert_eq!(session.kakao_id.0, "9");
    }
}
