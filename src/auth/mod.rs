//! Signed-in session state.
//!
//! [`AuthContext`] follows the identity provider, keeps the user's profile in
//! sync with the document store, and exposes the result as a watchable
//! [`AuthState`]. State only changes through the context's own transitions.

mod provider;
mod token;

pub use provider::{
    AuthError, AuthUser, IdentityProvider, INVALID_ID_TOKEN, OPERATION_NOT_SUPPORTED,
    POPUP_BLOCKED, POPUP_CLOSED_BY_USER, USER_TOKEN_EXPIRED,
};
pub use token::{decode_id_token, TokenIdentityProvider};

use std::sync::{Arc, Mutex};
use tokio::sync::{watch, Mutex as AsyncMutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::services::{FirestoreService, ANONYMOUS_USER_ID};
use crate::types::{UserProfile, UserType};

/// Snapshot of the session.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthState {
    pub user: Option<AuthUser>,
    pub profile: Option<UserProfile>,
    pub loading: bool,
}

impl Default for AuthState {
    fn default() -> Self {
        Self {
            user: None,
            profile: None,
            loading: true,
        }
    }
}

/// Which screen a session belongs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gate {
    Loading,
    Unauthenticated,
    NeedsRole,
    Ready,
}

impl AuthState {
    pub fn gate(&self) -> Gate {
        if self.loading {
            return Gate::Loading;
        }
        if self.user.is_none() {
            return Gate::Unauthenticated;
        }
        match self.profile.as_ref().and_then(|p| p.user_type) {
            Some(_) => Gate::Ready,
            None => Gate::NeedsRole,
        }
    }
}

struct Shared {
    provider: Arc<dyn IdentityProvider>,
    firestore: FirestoreService,
    state: watch::Sender<AuthState>,
    /// Held across create-or-touch so a sign-in and the listener never both
    /// find the profile missing.
    provisioning: AsyncMutex<()>,
}

impl Shared {
    fn set_loading(&self, loading: bool) {
        self.state.send_modify(|s| s.loading = loading);
    }

    async fn provision_profile(&self, user: &AuthUser) -> Result<UserProfile, AuthError> {
        let _guard = self.provisioning.lock().await;
        self.firestore
            .set_credentials(self.provider.id_token().await)
            .await;
        self.firestore
            .ensure_user_profile(user)
            .await
            .into_result()
            .map_err(|e| AuthError::Store(e.to_string()))
    }

    async fn on_user_changed(&self, user: Option<AuthUser>) {
        let Some(user) = user else {
            self.firestore.set_credentials(None).await;
            self.state.send_modify(|s| {
                s.user = None;
                s.profile = None;
                s.loading = false;
            });
            return;
        };

        let profile = match self.provision_profile(&user).await {
            Ok(profile) => Some(profile),
            Err(e) => {
                tracing::warn!("Could not load profile for {}: {}", user.uid, e);
                None
            }
        };
        self.state.send_modify(|s| {
            s.user = Some(user);
            s.profile = profile;
            s.loading = false;
        });
    }
}

pub struct AuthContext {
    shared: Arc<Shared>,
    listener: Mutex<Option<JoinHandle<()>>>,
    cancel: CancellationToken,
}

impl AuthContext {
    pub fn new(provider: Arc<dyn IdentityProvider>, firestore: FirestoreService) -> Self {
        let (state, _) = watch::channel(AuthState::default());
        Self {
            shared: Arc::new(Shared {
                provider,
                firestore,
                state,
                provisioning: AsyncMutex::new(()),
            }),
            listener: Mutex::new(None),
            cancel: CancellationToken::new(),
        }
    }

    /// Pick up a completed redirect sign-in, then follow the provider's user.
    pub async fn start(&self) {
        let redirected = self.complete_redirect().await;

        let mut users = self.shared.provider.subscribe();
        let shared = Arc::clone(&self.shared);
        let cancel = self.cancel.clone();

        let handle = tokio::spawn(async move {
            // A redirect user outranks the provider's initial signed-out value.
            let mut keep_redirect_user = redirected;
            loop {
                let user = users.borrow_and_update().clone();
                if user.is_some() || !keep_redirect_user {
                    shared.on_user_changed(user).await;
                }
                keep_redirect_user = false;

                tokio::select! {
                    _ = cancel.cancelled() => break,
                    changed = users.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                }
            }
            tracing::debug!("Auth listener stopped");
        });

        if let Ok(mut slot) = self.listener.lock() {
            if let Some(previous) = slot.replace(handle) {
                previous.abort();
            }
        }
    }

    /// Publish the user a redirect sign-in returned with. True when one did.
    async fn complete_redirect(&self) -> bool {
        let user = match self.shared.provider.get_redirect_result().await {
            Ok(Some(user)) => user,
            Ok(None) => return false,
            Err(e) => {
                tracing::error!("Error handling redirect result: {}", e);
                return false;
            }
        };

        tracing::info!("Completed redirect sign-in for {}", user.uid);
        match self.shared.provision_profile(&user).await {
            Ok(profile) => {
                self.shared.state.send_modify(|s| {
                    s.user = Some(user);
                    s.profile = Some(profile);
                    s.loading = false;
                });
                true
            }
            Err(e) => {
                tracing::error!("Error handling redirect result: {}", e);
                false
            }
        }
    }

    /// Stop following the provider. Also done on drop.
    pub fn shutdown(&self) {
        self.cancel.cancel();
        if let Ok(mut slot) = self.listener.lock() {
            if let Some(handle) = slot.take() {
                handle.abort();
            }
        }
    }

    pub fn snapshot(&self) -> AuthState {
        self.shared.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<AuthState> {
        self.shared.state.subscribe()
    }

    pub fn gate(&self) -> Gate {
        self.shared.state.borrow().gate()
    }

    /// Wait until the first provider notification has been handled.
    pub async fn wait_loaded(&self) -> AuthState {
        let mut rx = self.subscribe();
        let state = match rx.wait_for(|s| !s.loading).await {
            Ok(state) => state.clone(),
            Err(_) => self.snapshot(),
        };
        state
    }

    /// Uid of the signed-in user, or the anonymous id.
    pub fn user_id(&self) -> String {
        self.shared
            .state
            .borrow()
            .user
            .as_ref()
            .map(|u| u.uid.clone())
            .unwrap_or_else(|| ANONYMOUS_USER_ID.to_string())
    }

    /// Popup sign-in, falling back to a redirect when the popup was blocked
    /// or closed.
    pub async fn sign_in_with_google(&self) -> Result<(), AuthError> {
        let shared = &self.shared;
        shared.set_loading(true);

        let user = match shared.provider.sign_in_with_popup().await {
            Ok(user) => user,
            Err(e) if e.is_popup_dismissed() => {
                tracing::warn!("Popup sign-in unavailable ({}), trying redirect", e);
                return match shared.provider.sign_in_with_redirect().await {
                    Ok(()) => Ok(()),
                    Err(redirect_err) => {
                        tracing::error!("Redirect sign-in failed: {}", redirect_err);
                        shared.set_loading(false);
                        Err(redirect_err)
                    }
                };
            }
            Err(e) => {
                tracing::error!("Error signing in: {}", e);
                shared.set_loading(false);
                return Err(e);
            }
        };

        match shared.provision_profile(&user).await {
            Ok(profile) => {
                tracing::info!("Signed in: {}", user.uid);
                shared.state.send_modify(|s| {
                    s.user = Some(user);
                    s.profile = Some(profile);
                    s.loading = false;
                });
                Ok(())
            }
            Err(e) => {
                tracing::error!("Error signing in: {}", e);
                shared.set_loading(false);
                Err(e)
            }
        }
    }

    pub async fn logout(&self) -> Result<(), AuthError> {
        if let Err(e) = self.shared.provider.sign_out().await {
            tracing::error!("Error signing out: {}", e);
            return Err(e);
        }
        self.shared.firestore.set_credentials(None).await;
        self.shared.state.send_modify(|s| {
            s.user = None;
            s.profile = None;
        });
        Ok(())
    }

    /// Record the user's role and seed their starter agents. No-op when
    /// signed out.
    pub async fn update_user_type(&self, user_type: UserType) -> Result<(), AuthError> {
        let Some(user) = self.shared.state.borrow().user.clone() else {
            return Ok(());
        };
        let firestore = &self.shared.firestore;

        let result = async {
            firestore
                .set_user_type(&user.uid, user_type)
                .await
                .into_result()?;
            firestore
                .initialize_default_agents(&user.uid, user_type)
                .await
                .into_result()?;
            Ok::<_, crate::api::ApiError>(())
        }
        .await;

        if let Err(e) = result {
            tracing::error!("Error updating user type: {}", e);
            return Err(AuthError::Store(e.to_string()));
        }

        let has_profile = self.shared.state.borrow().profile.is_some();
        let refreshed = if has_profile {
            None
        } else {
            firestore.get_user_profile(&user.uid).await.data.flatten()
        };

        self.shared.state.send_modify(|s| match s.profile.as_mut() {
            Some(profile) => profile.user_type = Some(user_type),
            None => s.profile = refreshed,
        });
        tracing::info!("User {} is now a {}", user.uid, user_type);
        Ok(())
    }
}

impl Drop for AuthContext {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{Document, DocumentStore, Fields, MemoryStore, Query, StoreError};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Mutex as AsyncMutex;

    fn grace() -> AuthUser {
        AuthUser {
            uid: "u1".to_string(),
            email: Some("grace@example.com".to_string()),
            display_name: Some("Grace".to_string()),
            photo_url: Some("https://example.com/g.png".to_string()),
        }
    }

    /// Provider whose answers are set up by each test.
    struct ScriptedProvider {
        user: watch::Sender<Option<AuthUser>>,
        popup: AsyncMutex<Result<AuthUser, AuthError>>,
        redirect: Result<(), AuthError>,
        redirect_calls: AtomicUsize,
        redirect_user: Option<AuthUser>,
    }

    impl ScriptedProvider {
        fn new(
            initial: Option<AuthUser>,
            popup: Result<AuthUser, AuthError>,
            redirect: Result<(), AuthError>,
        ) -> Arc<Self> {
            let (user, _) = watch::channel(initial);
            Arc::new(Self {
                user,
                popup: AsyncMutex::new(popup),
                redirect,
                redirect_calls: AtomicUsize::new(0),
                redirect_user: None,
            })
        }

        /// Signed out, but returning from a redirect sign-in as `user`.
        fn returning_from_redirect(user: AuthUser) -> Arc<Self> {
            let (tx, _) = watch::channel(None);
            Arc::new(Self {
                user: tx,
                popup: AsyncMutex::new(Ok(user.clone())),
                redirect: Ok(()),
                redirect_calls: AtomicUsize::new(0),
                redirect_user: Some(user),
            })
        }
    }

    /// Memory store that yields inside reads and counts full profile writes.
    struct SlowStore {
        inner: MemoryStore,
        profile_writes: AtomicUsize,
    }

    #[async_trait]
    impl DocumentStore for SlowStore {
        async fn get(&self, path: &str) -> Result<Option<Document>, StoreError> {
            let doc = self.inner.get(path).await;
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
            doc
        }

        async fn set(&self, path: &str, fields: Fields, merge: bool) -> Result<(), StoreError> {
            if !merge && path.starts_with("users/") {
                self.profile_writes.fetch_add(1, Ordering::SeqCst);
            }
            self.inner.set(path, fields, merge).await
        }

        async fn add(&self, collection: &str, fields: Fields) -> Result<String, StoreError> {
            self.inner.add(collection, fields).await
        }

        async fn update(&self, path: &str, fields: Fields) -> Result<(), StoreError> {
            self.inner.update(path, fields).await
        }

        async fn delete(&self, path: &str) -> Result<(), StoreError> {
            self.inner.delete(path).await
        }

        async fn query(&self, collection: &str, query: &Query) -> Result<Vec<Document>, StoreError> {
            self.inner.query(collection, query).await
        }
    }

    #[async_trait]
    impl IdentityProvider for ScriptedProvider {
        async fn sign_in_with_popup(&self) -> Result<AuthUser, AuthError> {
            let result = self.popup.lock().await.clone();
            if let Ok(user) = &result {
                self.user.send_replace(Some(user.clone()));
            }
            result
        }

        async fn sign_in_with_redirect(&self) -> Result<(), AuthError> {
            self.redirect_calls.fetch_add(1, Ordering::SeqCst);
            self.redirect.clone()
        }

        async fn get_redirect_result(&self) -> Result<Option<AuthUser>, AuthError> {
            Ok(self.redirect_user.clone())
        }

        async fn sign_out(&self) -> Result<(), AuthError> {
            self.user.send_replace(None);
            Ok(())
        }

        fn subscribe(&self) -> watch::Receiver<Option<AuthUser>> {
            self.user.subscribe()
        }

        async fn id_token(&self) -> Option<String> {
            None
        }
    }

    fn context(provider: Arc<ScriptedProvider>) -> (Arc<MemoryStore>, AuthContext) {
        let store = Arc::new(MemoryStore::new());
        let ctx = AuthContext::new(provider, FirestoreService::new(store.clone()));
        (store, ctx)
    }

    #[tokio::test]
    async fn test_starts_loading_then_unauthenticated() {
        let provider = ScriptedProvider::new(None, Ok(grace()), Ok(()));
        let (_, ctx) = context(provider);
        assert_eq!(ctx.gate(), Gate::Loading);

        ctx.start().await;
        let state = ctx.wait_loaded().await;
        assert_eq!(state.gate(), Gate::Unauthenticated);
        assert_eq!(ctx.user_id(), ANONYMOUS_USER_ID);
    }

    #[tokio::test]
    async fn test_existing_user_gets_profile_then_role() {
        let provider = ScriptedProvider::new(Some(grace()), Ok(grace()), Ok(()));
        let (store, ctx) = context(provider);
        ctx.start().await;

        let state = ctx.wait_loaded().await;
        assert_eq!(state.gate(), Gate::NeedsRole);
        assert_eq!(state.profile.unwrap().photo_url.as_deref(), Some("https://example.com/g.png"));
        assert_eq!(ctx.user_id(), "u1");

        ctx.update_user_type(UserType::Student).await.unwrap();
        assert_eq!(ctx.gate(), Gate::Ready);
        assert_eq!(store.count("users/u1/agents").await, 3);

        ctx.update_user_type(UserType::Student).await.unwrap();
        assert_eq!(store.count("users/u1/agents").await, 3);
    }

    #[tokio::test]
    async fn test_signing_in_twice_keeps_created_at() {
        let provider = ScriptedProvider::new(None, Ok(grace()), Ok(()));
        let (_, ctx) = context(provider);

        ctx.sign_in_with_google().await.unwrap();
        let first = ctx.snapshot().profile.unwrap();
        assert!(!ctx.snapshot().loading);

        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        ctx.sign_in_with_google().await.unwrap();
        let second = ctx.snapshot().profile.unwrap();

        assert_eq!(
            first.created_at.unwrap().timestamp_millis(),
            second.created_at.unwrap().timestamp_millis()
        );
        assert!(second.last_login_at.unwrap() > first.last_login_at.unwrap());
    }

    #[tokio::test]
    async fn test_blocked_popup_falls_back_to_redirect() {
        let provider = ScriptedProvider::new(
            None,
            Err(AuthError::provider(POPUP_BLOCKED, "blocked")),
            Err(AuthError::provider(OPERATION_NOT_SUPPORTED, "no browser")),
        );
        let (_, ctx) = context(provider.clone());
        ctx.start().await;
        ctx.wait_loaded().await;

        let err = ctx.sign_in_with_google().await.unwrap_err();
        assert_eq!(err.code(), Some(OPERATION_NOT_SUPPORTED));
        assert_eq!(provider.redirect_calls.load(Ordering::SeqCst), 1);
        assert_eq!(ctx.gate(), Gate::Unauthenticated);
    }

    #[tokio::test]
    async fn test_other_popup_errors_do_not_redirect() {
        let provider = ScriptedProvider::new(
            None,
            Err(AuthError::provider("auth/network-request-failed", "offline")),
            Ok(()),
        );
        let (_, ctx) = context(provider.clone());

        assert!(ctx.sign_in_with_google().await.is_err());
        assert_eq!(provider.redirect_calls.load(Ordering::SeqCst), 0);
        assert!(!ctx.snapshot().loading);
    }

    #[tokio::test]
    async fn test_update_user_type_without_user_is_noop() {
        let provider = ScriptedProvider::new(None, Ok(grace()), Ok(()));
        let (store, ctx) = context(provider);
        ctx.start().await;
        ctx.wait_loaded().await;

        ctx.update_user_type(UserType::Ceo).await.unwrap();
        assert_eq!(store.count("users").await, 0);
    }

    #[tokio::test]
    async fn test_logout_clears_session() {
        let provider = ScriptedProvider::new(Some(grace()), Ok(grace()), Ok(()));
        let (_, ctx) = context(provider);
        ctx.start().await;
        ctx.wait_loaded().await;

        ctx.logout().await.unwrap();
        let state = ctx.snapshot();
        assert!(state.user.is_none());
        assert!(state.profile.is_none());
        assert_eq!(state.gate(), Gate::Unauthenticated);
    }

    #[tokio::test]
    async fn test_completed_redirect_publishes_user_and_profile() {
        let provider = ScriptedProvider::returning_from_redirect(grace());
        let (store, ctx) = context(provider);
        ctx.start().await;

        let state = ctx.wait_loaded().await;
        assert_eq!(state.user.as_ref().map(|u| u.uid.as_str()), Some("u1"));
        assert_eq!(state.profile.as_ref().map(|p| p.uid.as_str()), Some("u1"));
        assert_eq!(state.gate(), Gate::NeedsRole);
        assert_eq!(ctx.user_id(), "u1");

        // The listener's initial signed-out value must not undo the redirect.
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert_eq!(ctx.gate(), Gate::NeedsRole);
        assert_eq!(store.count("users").await, 1);
    }

    #[tokio::test]
    async fn test_concurrent_provisioning_creates_profile_once() {
        let provider = ScriptedProvider::new(None, Ok(grace()), Ok(()));
        let store = Arc::new(SlowStore {
            inner: MemoryStore::new(),
            profile_writes: AtomicUsize::new(0),
        });
        let ctx = AuthContext::new(provider, FirestoreService::new(store.clone()));

        let user = grace();
        let (first, second) = tokio::join!(
            ctx.shared.provision_profile(&user),
            ctx.shared.provision_profile(&user)
        );
        let (first, second) = (first.unwrap(), second.unwrap());

        assert_eq!(store.profile_writes.load(Ordering::SeqCst), 1);
        assert_eq!(
            first.created_at.unwrap().timestamp_millis(),
            second.created_at.unwrap().timestamp_millis()
        );
    }
}
