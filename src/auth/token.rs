//! Identity from a Firebase ID token.
//!
//! There is no browser on the command line, so "signing in" means handing over
//! an ID token obtained elsewhere (e.g. `firebase login:ci`, or the emulator).
//! The token's claims identify the user; its signature is checked by the
//! document store on every request, not here.

use async_trait::async_trait;
use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use tokio::sync::{watch, RwLock};

use super::provider::{
    AuthError, AuthUser, IdentityProvider, INVALID_ID_TOKEN, OPERATION_NOT_SUPPORTED,
    POPUP_BLOCKED, USER_TOKEN_EXPIRED,
};

#[derive(Debug, serde::Deserialize)]
struct IdTokenClaims {
    sub: String,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    picture: Option<String>,
}

/// Read the user out of an ID token. Expiry is enforced, the signature is not.
pub fn decode_id_token(token: &str) -> Result<AuthUser, AuthError> {
    let mut validation = Validation::new(Algorithm::RS256);
    validation.insecure_disable_signature_validation();
    validation.validate_aud = false;

    let data = jsonwebtoken::decode::<IdTokenClaims>(
        token.trim(),
        &DecodingKey::from_secret(&[]),
        &validation,
    )
    .map_err(|e| match e.kind() {
        jsonwebtoken::errors::ErrorKind::ExpiredSignature => {
            AuthError::provider(USER_TOKEN_EXPIRED, "ID token has expired")
        }
        _ => AuthError::provider(INVALID_ID_TOKEN, format!("Invalid ID token: {}", e)),
    })?;

    let claims = data.claims;
    if claims.sub.is_empty() {
        return Err(AuthError::provider(INVALID_ID_TOKEN, "ID token has no subject"));
    }

    Ok(AuthUser {
        uid: claims.sub,
        email: claims.email,
        display_name: claims.name,
        photo_url: claims.picture,
    })
}

/// Provider backed by a saved or staged ID token.
pub struct TokenIdentityProvider {
    user: watch::Sender<Option<AuthUser>>,
    token: RwLock<Option<String>>,
    staged: RwLock<Option<String>>,
}

impl TokenIdentityProvider {
    /// Start signed in when `saved_token` is still valid, signed out otherwise.
    pub fn new(saved_token: Option<String>) -> Self {
        let restored = saved_token.and_then(|token| match decode_id_token(&token) {
            Ok(user) => Some((token, user)),
            Err(e) => {
                tracing::warn!("Discarding saved session: {}", e);
                None
            }
        });

        let (token, user) = match restored {
            Some((token, user)) => (Some(token), Some(user)),
            None => (None, None),
        };
        let (tx, _) = watch::channel(user);

        Self {
            user: tx,
            token: RwLock::new(token),
            staged: RwLock::new(None),
        }
    }

    /// Queue `token` for the next popup sign-in.
    pub async fn stage_token(&self, token: impl Into<String>) {
        *self.staged.write().await = Some(token.into());
    }

    /// Token of the signed-in user, for persisting the session.
    pub async fn current_token(&self) -> Option<String> {
        self.token.read().await.clone()
    }
}

#[async_trait]
impl IdentityProvider for TokenIdentityProvider {
    async fn sign_in_with_popup(&self) -> Result<AuthUser, AuthError> {
        let Some(token) = self.staged.write().await.take() else {
            return Err(AuthError::provider(
                POPUP_BLOCKED,
                "No ID token supplied for sign-in",
            ));
        };

        let user = decode_id_token(&token)?;
        *self.token.write().await = Some(token);
        self.user.send_replace(Some(user.clone()));
        tracing::info!("Signed in as {}", user.uid);
        Ok(user)
    }

    async fn sign_in_with_redirect(&self) -> Result<(), AuthError> {
        Err(AuthError::provider(
            OPERATION_NOT_SUPPORTED,
            "Redirect sign-in needs a browser",
        ))
    }

    async fn get_redirect_result(&self) -> Result<Option<AuthUser>, AuthError> {
        Ok(None)
    }

    async fn sign_out(&self) -> Result<(), AuthError> {
        *self.token.write().await = None;
        self.user.send_replace(None);
        Ok(())
    }

    fn subscribe(&self) -> watch::Receiver<Option<AuthUser>> {
        self.user.subscribe()
    }

    async fn id_token(&self) -> Option<String> {
        self.current_token().await
    }
}
