use derive_more::Display;

/// User-visible progress of the login handshake.
///
/// `Display` renders the status line shown to the user.
#[derive(Debug, Clone, Default, PartialEq, Eq, Display)]
pub enum AuthStatus {
    #[default]
    #[display("")]
    Idle,
    #[display("카카오 로그인 페이지로 이동합니다...")]
    Redirecting,
    #[display("카카오 로그인 창에서 로그인을 완료해주세요.")]
    AwaitingPopup,
    #[display("카카오 인증 처리 중...")]
    ProcessingCallback,
    #[display("로그인 완료! 프로필을 불러오는 중...")]
    LoadingProfile,
    #[display("로그인 완료!")]
    SignedIn,
    #[display("세션이 만료되었습니다. 다시 로그인해주세요.")]
    SessionExpired,
    #[display("로그인 실패: {_0}")]
    Failed(String),
}

impl AuthStatus {
    /// A handshake step is in flight.
    #[must_use]
    pub fn is_busy(&self) -> bool {
        matches!(
            self,
            Self::Redirecting | Self::AwaitingPopup | Self::ProcessingCallback | Self::LoadingProfile
        )
    }

    #[must_use]
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed(_) | Self::SessionExpired)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failed_renders_error_verbatim() {
        let status = AuthStatus::Failed("kakao_token_error: invalid_grant".into());
        assert_eq!(status.to_string(), "로그인 실패: kakao_token_error: invalid_grant");
        assert!(status.is_failure());
        assert!(!status.is_busy());
    }

    #[test]
    fn idle_renders_nothing() {
        assert_eq!(AuthStatus::default().to_string(), "");
        assert!(!AuthStatus::Idle.is_busy());
        assert!(AuthStatus::ProcessingCallback.is_busy());
    }
}
