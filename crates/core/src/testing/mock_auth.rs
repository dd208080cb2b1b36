//! Mock identity provider for testing.

use async_trait::async_trait;
use chrono::{Duration, Utc};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::{Notify, RwLock};

use crate::error::ServiceError;
use crate::session::{AuthProvider, OAuthProvider, Session, SignUpResponse, User};

/// Mock implementation of the AuthProvider trait.
///
/// Any email/password pair signs in. The user id is the local part of the
/// email, so `alice@example.com` becomes user `alice`. Access tokens are
/// `tok-<id>` and refresh tokens `refresh-<id>`. A signed-out access token
/// no longer resolves to a user until the same user signs in again.
#[derive(Debug)]
pub struct MockAuthProvider {
    token_lifetime: Arc<RwLock<Duration>>,
    confirm_sign_ups: Arc<RwLock<bool>>,
    refresh_calls: Arc<RwLock<usize>>,
    sign_out_calls: Arc<RwLock<usize>>,
    get_user_calls: Arc<RwLock<usize>>,
    revoked: Arc<RwLock<HashSet<String>>>,
    /// When set, `refresh` waits for a notification before answering.
    refresh_gate: Arc<RwLock<Option<Arc<Notify>>>>,
    /// If set, the next operation will fail with this error.
    next_error: Arc<RwLock<Option<ServiceError>>>,
}

impl Default for MockAuthProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl MockAuthProvider {
    pub fn new() -> Self {
        Self {
            token_lifetime: Arc::new(RwLock::new(Duration::hours(1))),
            confirm_sign_ups: Arc::new(RwLock::new(true)),
            refresh_calls: Arc::new(RwLock::new(0)),
            sign_out_calls: Arc::new(RwLock::new(0)),
            get_user_calls: Arc::new(RwLock::new(0)),
            revoked: Arc::new(RwLock::new(HashSet::new())),
            refresh_gate: Arc::new(RwLock::new(None)),
            next_error: Arc::new(RwLock::new(None)),
        }
    }

    /// Lifetime of issued access tokens.
    pub async fn set_token_lifetime(&self, lifetime: Duration) {
        *self.token_lifetime.write().await = lifetime;
    }

    /// When true (the default) sign-up issues a session immediately.
    pub async fn set_confirm_sign_ups(&self, confirm: bool) {
        *self.confirm_sign_ups.write().await = confirm;
    }

    pub async fn set_next_error(&self, error: ServiceError) {
        *self.next_error.write().await = Some(error);
    }

    pub async fn refresh_calls(&self) -> usize {
        *self.refresh_calls.read().await
    }

    pub async fn sign_out_calls(&self) -> usize {
        *self.sign_out_calls.read().await
    }

    pub async fn get_user_calls(&self) -> usize {
        *self.get_user_calls.read().await
    }

    /// Hold every `refresh` call until the returned handle is notified.
    pub async fn hold_refreshes(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.refresh_gate.write().await = Some(Arc::clone(&gate));
        gate
    }

    async fn check_error(&self) -> Result<(), ServiceError> {
        match self.next_error.write().await.take() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    fn user(id: &str) -> User {
        User {
            id: id.to_string(),
            email: Some(format!("{}@example.com", id)),
            user_metadata: serde_json::Value::Null,
        }
    }

    async fn session_for(&self, user: User) -> Session {
        self.revoked
            .write()
            .await
            .remove(&format!("tok-{}", user.id));
        Session {
            access_token: format!("tok-{}", user.id),
            refresh_token: format!("refresh-{}", user.id),
            token_type: "bearer".to_string(),
            expires_at: Utc::now() + *self.token_lifetime.read().await,
            user,
        }
    }
}

fn local_part(email: &str) -> &str {
    email.split('@').next().unwrap_or(email)
}

#[async_trait]
impl AuthProvider for MockAuthProvider {
    async fn sign_in_with_password(
        &self,
        email: &str,
        _password: &str,
    ) -> Result<Session, ServiceError> {
        self.check_error().await?;
        Ok(self.session_for(Self::user(local_part(email))).await)
    }

    async fn sign_up(
        &self,
        email: &str,
        _password: &str,
        profile: serde_json::Value,
    ) -> Result<SignUpResponse, ServiceError> {
        self.check_error().await?;
        let mut user = Self::user(local_part(email));
        user.user_metadata = profile;

        let session = if *self.confirm_sign_ups.read().await {
            Some(self.session_for(user.clone()).await)
        } else {
            None
        };
        Ok(SignUpResponse { user, session })
    }

    async fn refresh(&self, refresh_token: &str) -> Result<Session, ServiceError> {
        *self.refresh_calls.write().await += 1;
        let gate = self.refresh_gate.read().await.clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        self.check_error().await?;
        let id = refresh_token
            .strip_prefix("refresh-")
            .ok_or(ServiceError::Unauthenticated)?;
        Ok(self.session_for(Self::user(id)).await)
    }

    async fn get_user(&self, access_token: &str) -> Result<User, ServiceError> {
        *self.get_user_calls.write().await += 1;
        self.check_error().await?;
        if self.revoked.read().await.contains(access_token) {
            return Err(ServiceError::Unauthenticated);
        }
        let id = access_token
            .strip_prefix("tok-")
            .filter(|id| !id.is_empty())
            .ok_or(ServiceError::Unauthenticated)?;
        Ok(Self::user(id))
    }

    async fn sign_out(&self, access_token: &str) -> Result<(), ServiceError> {
        *self.sign_out_calls.write().await += 1;
        self.check_error().await?;
        self.revoked.write().await.insert(access_token.to_string());
        Ok(())
    }

    fn authorize_url(&self, provider: OAuthProvider, redirect_to: Option<&str>) -> String {
        let mut url = format!("https://auth.test/authorize?provider={}", provider.as_str());
        if let Some(redirect_to) = redirect_to {
            url.push_str("&redirect_to=");
            url.push_str(&urlencoding::encode(redirect_to));
        }
        url
    }
}
