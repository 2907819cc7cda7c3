use std::time::Duration;

use url::Url;

use crate::error::Error;

/// How the user is transported to Kakao.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LoginMode {
    /// Full-page navigation; Kakao redirects the same tab back to the callback route.
    #[default]
    Redirect,
    /// Fixed-size popup that reports back to the opener with a window message.
    Popup,
}

impl std::str::FromStr for LoginMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "redirect" => Ok(Self::Redirect),
            "popup" => Ok(Self::Popup),
            other => Err(Error::Config(format!("unknown login mode: {other}"))),
        }
    }
}

/// Popup window geometry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PopupFeatures {
    pub width: u32,
    pub height: u32,
}

impl PopupFeatures {
    /// `window.open` feature string.
    #[must_use]
    pub fn to_feature_string(&self) -> String {
        format!(
            "width={},height={},resizable=no,scrollbars=yes",
            self.width, self.height
        )
    }
}

impl Default for PopupFeatures {
    fn default() -> Self {
        Self {
            width: 480,
            height: 720,
        }
    }
}

/// Client configuration.
///
/// Required fields are constructor parameters. Everything else has a default
/// and a `with_*` override.
///
/// ```rust,ignore
/// use farewell_auth::ClientConfig;
///
/// let config = ClientConfig::new(
///     "https://api.farewell.party".parse()?,
///     "https://farewell.party".parse()?,
/// )
/// .with_login_mode(LoginMode::Popup);
/// ```
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct ClientConfig {
    pub(crate) api_base_url: Url,
    pub(crate) app_origin: Url,
    pub(crate) callback_path: String,
    pub(crate) login_mode: LoginMode,
    pub(crate) popup: PopupFeatures,
    pub(crate) popup_timeout: Duration,
    pub(crate) request_timeout: Duration,
}

impl ClientConfig {
    pub const DEFAULT_API_BASE_URL: &'static str = "http://localhost:8000";
    pub const DEFAULT_CALLBACK_PATH: &'static str = "/api/auth/kakao/callback";

    #[must_use]
    pub fn new(api_base_url: Url, app_origin: Url) -> Self {
        Self {
            api_base_url,
            app_origin,
            callback_path: Self::DEFAULT_CALLBACK_PATH.into(),
            login_mode: LoginMode::default(),
            popup: PopupFeatures::default(),
            popup_timeout: Duration::from_secs(180),
            request_timeout: Duration::from_secs(30),
        }
    }

    /// Create config from environment variables.
    ///
    /// # Required env vars
    /// - `FAREWELL_APP_ORIGIN`: origin the web app is served from (popup messages must come from it)
    ///
    /// # Optional env vars
    /// - `FAREWELL_API_BASE_URL`: backend base URL (default `http://localhost:8000`)
    /// - `FAREWELL_CALLBACK_PATH`: route Kakao redirects back to
    /// - `FAREWELL_LOGIN_MODE`: `redirect` or `popup`
    /// - `FAREWELL_POPUP_TIMEOUT_SECS`: how long the opener waits for the popup
    /// - `FAREWELL_REQUEST_TIMEOUT_SECS`: per-request HTTP timeout
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if a required var is missing or a value does not parse.
    pub fn from_env() -> Result<Self, Error> {
        let origin_str = std::env::var("FAREWELL_APP_ORIGIN")
            .map_err(|_| Error::Config("FAREWELL_APP_ORIGIN is required".into()))?;
        let app_origin: Url = origin_str
            .parse()
            .map_err(|e| Error::Config(format!("FAREWELL_APP_ORIGIN: {e}")))?;

        let api_str = std::env::var("FAREWELL_API_BASE_URL")
            .unwrap_or_else(|_| Self::DEFAULT_API_BASE_URL.to_string());
        let api_base_url: Url = api_str
            .parse()
            .map_err(|e| Error::Config(format!("FAREWELL_API_BASE_URL: {e}")))?;

        let mut config = Self::new(api_base_url, app_origin);

        if let Ok(path) = std::env::var("FAREWELL_CALLBACK_PATH") {
            config = config.with_callback_path(path);
        }
        if let Ok(mode) = std::env::var("FAREWELL_LOGIN_MODE") {
            config = config.with_login_mode(mode.parse()?);
        }
        if let Some(secs) = env_secs("FAREWELL_POPUP_TIMEOUT_SECS")? {
            config = config.with_popup_timeout(secs);
        }
        if let Some(secs) = env_secs("FAREWELL_REQUEST_TIMEOUT_SECS")? {
            config = config.with_request_timeout(secs);
        }

        Ok(config)
    }

    #[must_use]
    pub fn with_callback_path(mut self, path: impl Into<String>) -> Self {
        self.callback_path = path.into();
        self
    }

    #[must_use]
    pub fn with_login_mode(mut self, mode: LoginMode) -> Self {
        self.login_mode = mode;
        self
    }

    #[must_use]
    pub fn with_popup(mut self, popup: PopupFeatures) -> Self {
        self.popup = popup;
        self
    }

    #[must_use]
    pub fn with_popup_timeout(mut self, timeout: Duration) -> Self {
        self.popup_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Backend base URL.
    #[must_use]
    pub fn api_base_url(&self) -> &Url {
        &self.api_base_url
    }

    /// Origin popup messages are accepted from.
    #[must_use]
    pub fn app_origin(&self) -> &Url {
        &self.app_origin
    }

    #[must_use]
    pub fn callback_path(&self) -> &str {
        &self.callback_path
    }

    #[must_use]
    pub fn login_mode(&self) -> LoginMode {
        self.login_mode
    }

    #[must_use]
    pub fn popup(&self) -> PopupFeatures {
        self.popup
    }

    #[must_use]
    pub fn popup_timeout(&self) -> Duration {
        self.popup_timeout
    }

    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }
}

fn env_secs(name: &str) -> Result<Option<Duration>, Error> {
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse::<u64>()
            .map(|secs| Some(Duration::from_secs(secs)))
            .map_err(|e| Error::Config(format!("{name}: {e}"))),
        Err(_) => Ok(None),
    }
}
