//! Identity provider abstraction.

use async_trait::async_trait;
use tokio::sync::watch;

/// Provider error codes the session logic reacts to.
pub const POPUP_BLOCKED: &str = "auth/popup-blocked";
pub const POPUP_CLOSED_BY_USER: &str = "auth/popup-closed-by-user";
pub const OPERATION_NOT_SUPPORTED: &str = "auth/operation-not-supported-in-this-environment";
pub const INVALID_ID_TOKEN: &str = "auth/invalid-id-token";
pub const USER_TOKEN_EXPIRED: &str = "auth/user-token-expired";

/// The signed-in identity as reported by the provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthUser {
    pub uid: String,
    pub email: Option<String>,
    pub display_name: Option<String>,
    pub photo_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    #[error("{message} ({code})")]
    Provider { code: String, message: String },

    #[error("failed to update user data: {0}")]
    Store(String),
}

impl AuthError {
    pub fn provider(code: &str, message: impl Into<String>) -> Self {
        Self::Provider {
            code: code.to_string(),
            message: message.into(),
        }
    }

    pub fn code(&self) -> Option<&str> {
        match self {
            Self::Provider { code, .. } => Some(code),
            Self::Store(_) => None,
        }
    }

    /// The popup never completed; a redirect sign-in may still work.
    pub fn is_popup_dismissed(&self) -> bool {
        matches!(self.code(), Some(POPUP_BLOCKED) | Some(POPUP_CLOSED_BY_USER))
    }
}

/// Source of user identity (Google sign-in in the browser, an ID token on the CLI).
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn sign_in_with_popup(&self) -> Result<AuthUser, AuthError>;

    /// Start a redirect sign-in. Completion is reported through `subscribe`
    /// or `get_redirect_result`.
    async fn sign_in_with_redirect(&self) -> Result<(), AuthError>;

    /// User returned by a redirect sign-in that completed before startup.
    async fn get_redirect_result(&self) -> Result<Option<AuthUser>, AuthError>;

    async fn sign_out(&self) -> Result<(), AuthError>;

    /// Current user, updated on every sign-in and sign-out.
    fn subscribe(&self) -> watch::Receiver<Option<AuthUser>>;

    /// Bearer credential for the current user, if any.
    async fn id_token(&self) -> Option<String>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_popup_codes_allow_redirect_fallback() {
        assert!(AuthError::provider(POPUP_BLOCKED, "blocked").is_popup_dismissed());
        assert!(AuthError::provider(POPUP_CLOSED_BY_USER, "closed").is_popup_dismissed());
        assert!(!AuthError::provider("auth/network-request-failed", "offline").is_popup_dismissed());
        assert!(!AuthError::Store("boom".into()).is_popup_dismissed());
    }

    #[test]
    fn test_error_display_includes_code() {
        let err = AuthError::provider(POPUP_BLOCKED, "Popup blocked");
        assert_eq!(err.to_string(), "Popup blocked (auth/popup-blocked)");
    }
}
