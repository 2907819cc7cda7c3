use url::Url;

use crate::config::PopupFeatures;
use crate::error::Error;
use crate::handshake::popup::PopupMessage;

/// The browser window hosting the app, as far as the handshake needs it.
///
/// A WASM shell implements this over `web_sys::Window`; tests use a recorder.
pub trait Window: Send + Sync + 'static {
    /// Full current location, including the query string.
    fn location(&self) -> Url;

    /// Leave the app for an external URL (full-page navigation).
    ///
    /// # Errors
    ///
    /// Returns [`Error::Navigation`] if the host refused.
    fn navigate(&self, url: &str) -> Result<(), Error>;

    /// Open the provider page in a popup window.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Navigation`] if the popup could not be opened
    /// (typically a popup blocker).
    fn open_popup(&self, url: &str, features: &PopupFeatures) -> Result<(), Error>;

    /// In-app navigation that adds a history entry.
    fn push_route(&self, path: &str);

    /// In-app navigation that replaces the current history entry.
    fn replace_route(&self, path: &str);

    /// Whether this window was opened by another window.
    fn has_opener(&self) -> bool;

    /// Post `message` to the opener, restricted to `target_origin`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Navigation`] if there is no opener or it is gone.
    fn post_to_opener(&self, message: &PopupMessage, target_origin: &str) -> Result<(), Error>;

    fn close(&self);
}
