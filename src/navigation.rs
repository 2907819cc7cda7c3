//! Where to send the user after a session transition.
//!
//! [`decide`] is the whole decision table as a pure function;
//! [`NavigationReconciler`] gathers its inputs from storage and applies the
//! side effects of the chosen row (consume the pending deep link, remember
//! that the landing flow was seen).

use std::sync::Arc;

use crate::error::Error;
use crate::storage::{self, Storage, keys};
use crate::types::{OnboardingDraft, PendingDeepLink, Profile};

/// Default landing surface.
pub const HOME_PATH: &str = "/";
/// Introductory swipe flow shown to first-time anonymous visitors.
pub const LANDING_PATH: &str = "/landing";
pub const ONBOARDING_PATH: &str = "/onboarding";
const CONVERSATION_PREFIX: &str = "/conversation/";

// ── Routes ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    Root,
    Callback,
    Landing,
    Onboarding,
    Conversation { id: String },
    Other(String),
}

impl Route {
    /// Classify a path. Query string and fragment are ignored.
    #[must_use]
    pub fn parse(path: &str, callback_path: &str) -> Self {
        let path = path.split(['?', '#']).next().unwrap_or_default();
        let trimmed = if path.len() > 1 {
            path.trim_end_matches('/')
        } else {
            path
        };
        if trimmed == callback_path.trim_end_matches('/') {
            return Self::Callback;
        }
        match trimmed {
            "" | HOME_PATH => Self::Root,
            LANDING_PATH => Self::Landing,
            ONBOARDING_PATH => Self::Onboarding,
            other => match other.strip_prefix(CONVERSATION_PREFIX) {
                Some(id) if !id.is_empty() && !id.contains('/') => Self::Conversation {
                    id: urlencoding::decode(id)
                        .map_or_else(|_| id.to_owned(), std::borrow::Cow::into_owned),
                },
                _ => Self::Other(other.to_owned()),
            },
        }
    }
}

// ── Decision table ─────────────────────────────────────────────────

/// What is known about the user's profile right after sign-in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProfileState {
    /// No intro, tagline or interests (or no profile row at all).
    Empty,
    Filled,
    /// The profile could not be fetched.
    Unknown,
}

impl ProfileState {
    #[must_use]
    pub fn of(profile: Option<&Profile>) -> Self {
        match profile {
            Some(p) if !p.is_materially_empty() => Self::Filled,
            _ => Self::Empty,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionTransition {
    Anonymous,
    /// Authenticated before this decision; nothing new happened.
    Authenticated,
    /// A session was materialized just now.
    JustAuthenticated(ProfileState),
}

/// Inputs to [`decide`].
#[derive(Debug, Clone)]
pub struct NavigationContext<'a> {
    pub route: &'a Route,
    pub transition: SessionTransition,
    pub landing_seen: bool,
    pub has_onboarding_draft: bool,
    pub pending_deep_link: Option<&'a PendingDeepLink>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Navigation {
    /// On the callback route: the handshake controller owns this load.
    HandOffToCallback,
    DeepLink(PendingDeepLink),
    Onboarding,
    Home,
    Intro,
    /// Respect the current route.
    Stay,
}

impl Navigation {
    /// In-app path to route to, if any.
    #[must_use]
    pub fn target(&self) -> Option<String> {
        match self {
            Self::DeepLink(link) => Some(format!(
                "{CONVERSATION_PREFIX}{}?join={}",
                urlencoding::encode(&link.id),
                link.role
            )),
            Self::Onboarding => Some(ONBOARDING_PATH.to_owned()),
            Self::Home => Some(HOME_PATH.to_owned()),
            Self::Intro => Some(LANDING_PATH.to_owned()),
            Self::HandOffToCallback | Self::Stay => None,
        }
    }
}

/// The decision table. First matching row wins.
///
/// | condition | result |
/// |---|---|
/// | on the callback route | [`Navigation::HandOffToCallback`] |
/// | just authenticated, pending deep link | [`Navigation::DeepLink`] |
/// | just authenticated, profile empty | [`Navigation::Onboarding`] |
/// | just authenticated, profile unknown, onboarding draft saved | [`Navigation::Onboarding`] |
/// | just authenticated | [`Navigation::Home`] |
/// | anonymous, landing not seen, on `/` | [`Navigation::Intro`] |
/// | otherwise | [`Navigation::Stay`] |
#[must_use]
pub fn decide(ctx: &NavigationContext<'_>) -> Navigation {
    if *ctx.route == Route::Callback {
        return Navigation::HandOffToCallback;
    }
    match ctx.transition {
        SessionTransition::JustAuthenticated(profile) => {
            if let Some(link) = ctx.pending_deep_link {
                return Navigation::DeepLink(link.clone());
            }
            match profile {
                ProfileState::Empty => Navigation::Onboarding,
                ProfileState::Unknown if ctx.has_onboarding_draft => Navigation::Onboarding,
                ProfileState::Filled | ProfileState::Unknown => Navigation::Home,
            }
        }
        SessionTransition::Anonymous if !ctx.landing_seen && *ctx.route == Route::Root => {
            Navigation::Intro
        }
        SessionTransition::Anonymous | SessionTransition::Authenticated => Navigation::Stay,
    }
}

// ── Reconciler ─────────────────────────────────────────────────────

/// Storage-backed wrapper around [`decide`].
pub struct NavigationReconciler {
    durable: Arc<dyn Storage>,
    tab: Arc<dyn Storage>,
    callback_path: String,
}

impl NavigationReconciler {
    #[must_use]
    pub fn new(
        durable: Arc<dyn Storage>,
        tab: Arc<dyn Storage>,
        callback_path: impl Into<String>,
    ) -> Self {
        Self {
            durable,
            tab,
            callback_path: callback_path.into(),
        }
    }

    #[must_use]
    pub fn route(&self, path: &str) -> Route {
        Route::parse(path, &self.callback_path)
    }

    /// Remember an action to replay once the user has logged in.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Storage`] if the action could not be stored.
    pub fn capture_deep_link(&self, link: &PendingDeepLink) -> Result<(), Error> {
        storage::set_json(self.tab.as_ref(), keys::PENDING_DEEP_LINK, link)
    }

    #[must_use]
    pub fn pending_deep_link(&self) -> Option<PendingDeepLink> {
        storage::get_json(self.tab.as_ref(), keys::PENDING_DEEP_LINK)
    }

    #[must_use]
    pub fn landing_seen(&self) -> bool {
        self.durable.contains(keys::LANDING_SEEN)
    }

    pub fn mark_landing_seen(&self) {
        if let Err(e) = self.durable.set(keys::LANDING_SEEN, "1") {
            tracing::warn!(error = %e, "Could not persist landing-seen flag");
        }
    }

    #[must_use]
    pub fn onboarding_draft(&self) -> Option<OnboardingDraft> {
        storage::get_json(self.durable.as_ref(), keys::ONBOARDING_DRAFT)
    }

    /// # Errors
    ///
    /// Returns [`Error::Storage`] or [`Error::Serialization`].
    pub fn save_onboarding_draft(&self, draft: &OnboardingDraft) -> Result<(), Error> {
        storage::set_json(self.durable.as_ref(), keys::ONBOARDING_DRAFT, draft)
    }

    pub fn clear_onboarding_draft(&self) {
        storage::remove_quietly(self.durable.as_ref(), keys::ONBOARDING_DRAFT);
    }

    /// Decide, then apply the chosen row's side effects.
    ///
    /// Any just-authenticated outcome marks the landing flow as seen; a deep
    /// link is consumed the moment it is chosen.
    pub fn reconcile(&self, route: &Route, transition: SessionTransition) -> Navigation {
        let pending = self.pending_deep_link();
        if pending.is_none() && self.tab.contains(keys::PENDING_DEEP_LINK) {
            // Unreadable leftovers would otherwise linger for the whole tab.
            storage::remove_quietly(self.tab.as_ref(), keys::PENDING_DEEP_LINK);
        }
        let ctx = NavigationContext {
            route,
            transition,
            landing_seen: self.landing_seen(),
            has_onboarding_draft: self.onboarding_draft().is_some(),
            pending_deep_link: pending.as_ref(),
        };
        let decision = decide(&ctx);

        if matches!(transition, SessionTransition::JustAuthenticated(_))
            && decision != Navigation::HandOffToCallback
        {
            self.mark_landing_seen();
        }
        if let Navigation::DeepLink(_) = decision {
            storage::remove_quietly(self.tab.as_ref(), keys::PENDING_DEEP_LINK);
        }

        tracing::debug!(?route, ?transition, ?decision, "Navigation reconciled");
        decision
    }
}
