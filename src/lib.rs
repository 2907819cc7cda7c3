#![doc = include_str!("../README.md")]

pub mod api;
pub mod backend;
pub mod config;
pub mod error;
pub mod handshake;
#[cfg(feature = "http")]
pub mod http;
pub mod navigation;
pub mod session;
pub mod storage;
pub mod types;

#[cfg(test)]
pub(crate) mod testing;

// Re-exports for convenient access
pub use api::AuthorizedApi;
pub use backend::{AuthBackend, CallbackPayload, LoginUrl};
pub use config::{ClientConfig, LoginMode, PopupFeatures};
pub use error::Error;
pub use handshake::{
    AuthStatus, CallbackOutcome, CallbackQuery, HandshakeController, LoginLaunch, LoginOptions,
    PopupMessage, PopupWait, Window,
};
#[cfg(feature = "http")]
pub use http::ApiClient;
pub use navigation::{Navigation, NavigationReconciler, ProfileState, Route, SessionTransition};
pub use session::SessionStore;
pub use storage::{JsonFileStorage, MemoryStorage, Storage};
pub use types::{
    ConversationRole, KakaoId, OnboardingDraft, PendingDeepLink, Profile, ProfilePatch, Session,
    SessionPatch, SessionProfile, SessionToken, Visibility,
};
