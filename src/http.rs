use serde::Deserialize;
use url::Url;

use crate::backend::{AuthBackend, CallbackPayload, LoginUrl};
use crate::config::ClientConfig;
use crate::error::Error;
use crate::types::{ConversationRole, Profile, SessionToken};

/// HTTP client for the party backend.
pub struct ApiClient {
    base_url: Url,
    http: reqwest::Client,
}

#[derive(Deserialize)]
struct ProfileEnvelope {
    #[serde(default)]
    profile: Option<Profile>,
}

impl ApiClient {
    /// Create a client with the configured per-request timeout.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Http`] if the HTTP client cannot be built.
    pub fn new(config: &ClientConfig) -> Result<Self, Error> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()?;
        Ok(Self {
            base_url: config.api_base_url().clone(),
            http,
        })
    }

    /// Use a custom HTTP client (for connection pool reuse or testing).
    #[must_use]
    pub fn with_http_client(mut self, client: reqwest::Client) -> Self {
        self.http = client;
        self
    }

    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Append path segments to the base URL, percent-encoding each one.
    fn endpoint(&self, segments: &[&str]) -> Result<Url, Error> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| Error::Config(format!("API base URL cannot have a path: {}", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// Checks HTTP response status; returns the response on success or an error with details.
    async fn ensure_success(
        response: reqwest::Response,
        operation: &'static str,
    ) -> Result<reqwest::Response, Error> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        let detail = extract_detail(&body)
            .or_else(|| status.canonical_reason().map(str::to_owned))
            .unwrap_or_else(|| format!("HTTP {}", status.as_u16()));

        if status == reqwest::StatusCode::UNAUTHORIZED {
            return Err(Error::Unauthorized(detail));
        }
        Err(Error::Rejected {
            operation,
            status: status.as_u16(),
            detail,
        })
    }
}

/// Pull the `detail` field out of an error body; fall back to the raw body.
fn extract_detail(body: &str) -> Option<String> {
    let body = body.trim();
    if body.is_empty() {
        return None;
    }
    match serde_json::from_str::<serde_json::Value>(body) {
        Ok(serde_json::Value::Object(map)) => match map.get("detail") {
            Some(serde_json::Value::String(s)) => Some(s.clone()),
            Some(other) => Some(other.to_string()),
            None => Some(body.to_owned()),
        },
        _ => Some(body.to_owned()),
    }
}

impl AuthBackend for ApiClient {
    async fn login_url(&self) -> Result<LoginUrl, Error> {
        let url = self.endpoint(&["auth", "kakao", "login"])?;
        let response = self.http.get(url).send().await?;
        let response = Self::ensure_success(response, "login url").await?;
        response.json::<LoginUrl>().await.map_err(Into::into)
    }

    async fn exchange_code(&self, code: &str, state: Option<&str>) -> Result<CallbackPayload, Error> {
        let url = self.endpoint(&["auth", "kakao", "callback"])?;
        let mut request = self.http.get(url).query(&[("code", code)]);
        if let Some(state) = state {
            request = request.query(&[("state", state)]);
        }
        let response = request.send().await?;
        let response = Self::ensure_success(response, "code exchange").await?;
        response.json::<CallbackPayload>().await.map_err(Into::into)
    }

    async fn fetch_me(&self, token: &SessionToken) -> Result<Option<Profile>, Error> {
        let url = self.endpoint(&["me"])?;
        let response = self
            .http
            .get(url)
            .bearer_auth(token.as_str())
            .send()
            .await?;
        let response = Self::ensure_success(response, "profile fetch").await?;
        let envelope = response.json::<ProfileEnvelope>().await?;
        Ok(envelope.profile)
    }

    async fn save_profile(&self, token: &SessionToken, profile: &Profile) -> Result<Profile, Error> {
        let url = self.endpoint(&["me"])?;
        let response = self
            .http
            .put(url)
            .bearer_auth(token.as_str())
            .json(profile)
            .send()
            .await?;
        let response = Self::ensure_success(response, "profile save").await?;
        let envelope = response.json::<ProfileEnvelope>().await?;
        Ok(envelope.profile.unwrap_or_else(|| profile.clone()))
    }

    async fn join_conversation(
        &self,
        token: &SessionToken,
        conversation_id: &str,
        role: ConversationRole,
    ) -> Result<(), Error> {
        let url = self.endpoint(&["conversations", conversation_id, "join"])?;
        let response = self
            .http
            .post(url)
            .bearer_auth(token.as_str())
            .json(&serde_json::json!({ "role": role }))
            .send()
            .await?;
        Self::ensure_success(response, "conversation join").await?;
        Ok(())
    }
}
