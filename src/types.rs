use derive_more::{Display, From, Into};
use serde::{Deserialize, Deserializer, Serialize};

/// Kakao user identifier, as issued by the backend (`kakao_id`).
///
/// Stable per Kakao account. Used as the key for profiles, picks and letters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Display, From, Into)]
#[serde(transparent)]
pub struct KakaoId(pub String);

/// Opaque bearer credential issued by the backend on login.
///
/// `Debug` never prints the token.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize, From, Into)]
#[serde(transparent)]
pub struct SessionToken(pub String);

impl SessionToken {
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl std::fmt::Debug for SessionToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SessionToken(..)")
    }
}

/// Identity part of the callback payload (`profile`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[non_exhaustive]
pub struct SessionProfile {
    pub kakao_id: KakaoId,
    #[serde(default, deserialize_with = "null_as_default")]
    pub nickname: String,
    #[serde(default)]
    pub profile_image_url: Option<String>,
    #[serde(default)]
    pub is_admin: bool,
}

impl SessionProfile {
    #[must_use]
    pub fn new(kakao_id: impl Into<String>, nickname: impl Into<String>) -> Self {
        Self {
            kakao_id: KakaoId(kakao_id.into()),
            nickname: nickname.into(),
            profile_image_url: None,
            is_admin: false,
        }
    }

    #[must_use]
    pub fn with_profile_image_url(mut self, url: impl Into<String>) -> Self {
        self.profile_image_url = Some(url.into());
        self
    }

    #[must_use]
    pub fn with_admin(mut self, is_admin: bool) -> Self {
        self.is_admin = is_admin;
        self
    }
}

/// The client's record of an authenticated user.
///
/// Stored as JSON under `farewell-session` with the same snake_case keys the
/// backend uses, so records written by earlier clients still load.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[non_exhaustive]
pub struct Session {
    pub kakao_id: KakaoId,
    #[serde(default, deserialize_with = "null_as_default")]
    pub nickname: String,
    #[serde(default)]
    pub profile_image_url: Option<String>,
    pub session_token: SessionToken,
    #[serde(default)]
    pub is_admin: bool,
}

impl Session {
    /// Materialize a session from the callback profile and its token.
    #[must_use]
    pub fn from_profile(profile: SessionProfile, session_token: SessionToken) -> Self {
        Self {
            kakao_id: profile.kakao_id,
            nickname: profile.nickname,
            profile_image_url: profile.profile_image_url,
            session_token,
            is_admin: profile.is_admin,
        }
    }

    /// A session is only usable with a non-empty token.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        !self.session_token.is_empty()
    }

    /// Apply a partial update. Present fields override, absent fields are kept.
    pub fn merge(&mut self, patch: SessionPatch) {
        if let Some(nickname) = patch.nickname {
            self.nickname = nickname;
        }
        if let Some(url) = patch.profile_image_url {
            self.profile_image_url = Some(url);
        }
        if let Some(token) = patch.session_token {
            self.session_token = token;
        }
        if let Some(is_admin) = patch.is_admin {
            self.is_admin = is_admin;
        }
    }
}

/// Partial session update.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionPatch {
    pub nickname: Option<String>,
    pub profile_image_url: Option<String>,
    pub session_token: Option<SessionToken>,
    pub is_admin: Option<bool>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    #[default]
    Public,
    Members,
    Private,
}

/// Self-introduction profile as returned by `GET /me`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Profile {
    #[serde(deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(deserialize_with = "null_as_default")]
    pub tagline: String,
    #[serde(deserialize_with = "null_as_default")]
    pub intro: String,
    #[serde(deserialize_with = "null_as_default")]
    pub interests: Vec<String>,
    #[serde(deserialize_with = "null_as_default")]
    pub strengths: Vec<String>,
    #[serde(deserialize_with = "null_as_default")]
    pub contact: String,
    #[serde(deserialize_with = "null_as_default")]
    pub visibility: Visibility,
    pub profile_image: Option<String>,
}

impl Profile {
    /// Minimal profile for a first login: only the display name is known.
    #[must_use]
    pub fn minimal(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// No intro, no tagline, no interests: the user still needs onboarding.
    #[must_use]
    pub fn is_materially_empty(&self) -> bool {
        self.intro.trim().is_empty() && self.tagline.trim().is_empty() && self.interests.is_empty()
    }

    /// Apply a partial update. Present fields override, absent fields are kept.
    pub fn apply(&mut self, patch: ProfilePatch) {
        let ProfilePatch {
            name,
            tagline,
            intro,
            interests,
            strengths,
            contact,
            visibility,
            profile_image,
        } = patch;
        if let Some(v) = name {
            self.name = v;
        }
        if let Some(v) = tagline {
            self.tagline = v;
        }
        if let Some(v) = intro {
            self.intro = v;
        }
        if let Some(v) = interests {
            self.interests = v;
        }
        if let Some(v) = strengths {
            self.strengths = v;
        }
        if let Some(v) = contact {
            self.contact = v;
        }
        if let Some(v) = visibility {
            self.visibility = v;
        }
        if let Some(v) = profile_image {
            self.profile_image = Some(v);
        }
    }
}

/// Partial profile update.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProfilePatch {
    pub name: Option<String>,
    pub tagline: Option<String>,
    pub intro: Option<String>,
    pub interests: Option<Vec<String>>,
    pub strengths: Option<Vec<String>>,
    pub contact: Option<String>,
    pub visibility: Option<Visibility>,
    pub profile_image: Option<String>,
}

/// Role taken when joining a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[serde(rename_all = "lowercase")]
pub enum ConversationRole {
    #[display("speaker")]
    Speaker,
    #[display("listener")]
    Listener,
}

impl std::str::FromStr for ConversationRole {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "speaker" => Ok(Self::Speaker),
            "listener" => Ok(Self::Listener),
            other => Err(crate::Error::Navigation(format!("unknown role: {other}"))),
        }
    }
}

/// Action captured before login, replayed once a session exists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingDeepLink {
    pub id: String,
    pub role: ConversationRole,
}

impl PendingDeepLink {
    #[must_use]
    pub fn new(id: impl Into<String>, role: ConversationRole) -> Self {
        Self {
            id: id.into(),
            role,
        }
    }
}

/// In-progress onboarding form, kept across reloads.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OnboardingDraft {
    pub step: u32,
    pub profile: Profile,
    #[serde(rename = "aiGenerated", skip_serializing_if = "Option::is_none")]
    pub ai_generated: Option<serde_json::Value>,
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}
