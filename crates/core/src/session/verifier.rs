//! Bearer token verification for callers that hold their own session.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{Duration, Utc};
use tracing::debug;

use super::{AuthProvider, Session, User};
use crate::cache::{family, FetchOptions, QueryCache, QueryKey};
use crate::config::SessionConfig;
use crate::error::ServiceError;

/// Resolves access tokens to sessions through the identity provider.
///
/// A resolved token is trusted for `token_cache_secs` before the provider is
/// asked again. Sessions returned here carry no refresh token; the caller
/// keeps that. Their `expires_at` is the end of the trust window.
pub struct TokenVerifier {
    provider: Arc<dyn AuthProvider>,
    cache: Arc<QueryCache>,
    window: StdDuration,
}

fn token_key(access_token: &str) -> QueryKey {
    QueryKey::new(family::AUTH_USER).scoped(access_token)
}

impl TokenVerifier {
    pub fn new(
        provider: Arc<dyn AuthProvider>,
        cache: Arc<QueryCache>,
        config: &SessionConfig,
    ) -> Self {
        Self {
            provider,
            cache,
            window: StdDuration::from_secs(config.token_cache_secs),
        }
    }

    /// The session `access_token` belongs to. Empty, unknown and revoked
    /// tokens are `Unauthenticated`.
    pub async fn verify(&self, access_token: &str) -> Result<Session, ServiceError> {
        if access_token.is_empty() {
            return Err(ServiceError::Unauthenticated);
        }

        let provider = Arc::clone(&self.provider);
        let token = access_token.to_string();
        let user: User = self
            .cache
            .fetch(
                token_key(access_token),
                FetchOptions::new(self.window, self.window),
                move || async move { provider.get_user(&token).await },
            )
            .await?;

        Ok(Session {
            access_token: access_token.to_string(),
            refresh_token: String::new(),
            token_type: "bearer".to_string(),
            expires_at: Utc::now() + Duration::seconds(self.window.as_secs() as i64),
            user,
        })
    }

    /// Stop trusting `access_token`, e.g. after it was revoked.
    pub fn forget(&self, access_token: &str) {
        debug!("Forgetting verified token");
        self.cache.remove(&token_key(access_token));
    }
}
