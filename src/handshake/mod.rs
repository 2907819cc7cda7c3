//! Kakao OAuth handshake.
//!
//! Redirect mode: [`HandshakeController::initiate_login`] navigates the tab
//! to Kakao; Kakao redirects back to the callback route and
//! [`HandshakeController::handle_callback`] (or
//! [`HandshakeController::resume`]) finishes the login in place.
//!
//! Popup mode: the provider page opens in a popup. The popup runs
//! `handle_callback`, posts a [`PopupMessage`] to its opener and closes. The
//! opener feeds window messages to
//! [`HandshakeController::deliver_popup_message`] and awaits the
//! [`PopupWait`] it got from `initiate_login`.

mod callback;
mod controller;
mod popup;
mod status;
mod window;

pub use callback::CallbackQuery;
pub use controller::{CallbackOutcome, HandshakeController, LoginLaunch, LoginOptions};
pub use popup::{PopupMessage, PopupWait};
pub use status::AuthStatus;
pub use window::Window;
