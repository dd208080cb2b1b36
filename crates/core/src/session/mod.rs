//! Identity: who is signed in, and how that changes.

mod callback;
mod gotrue;
mod manager;
mod storage;
mod types;
mod verifier;

pub use callback::{parse_callback, session_from_callback, CallbackTokens};
pub use gotrue::GoTrueClient;
pub use manager::{SessionManager, SessionSubscription};
pub use storage::{FileSessionStorage, MemorySessionStorage, SessionStorage, SessionStorageError};
pub use types::{
    AuthState, OAuthProvider, RemoteSessionChange, Session, SessionEvent, SignUpOutcome, User,
};
pub use verifier::TokenVerifier;

use async_trait::async_trait;

use crate::error::ServiceError;

/// Result of a sign-up call. `session` is absent while the identity awaits
/// confirmation.
#[derive(Debug, Clone)]
pub struct SignUpResponse {
    pub user: User,
    pub session: Option<Session>,
}

/// Trait for identity providers.
#[async_trait]
pub trait AuthProvider: Send + Sync {
    async fn sign_in_with_password(&self, email: &str, password: &str)
        -> Result<Session, ServiceError>;

    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        profile: serde_json::Value,
    ) -> Result<SignUpResponse, ServiceError>;

    async fn refresh(&self, refresh_token: &str) -> Result<Session, ServiceError>;

    /// Look up the user an access token belongs to.
    async fn get_user(&self, access_token: &str) -> Result<User, ServiceError>;

    /// Revoke the session remotely.
    async fn sign_out(&self, access_token: &str) -> Result<(), ServiceError>;

    /// Where to send the user to start an OAuth sign-in.
    fn authorize_url(&self, provider: OAuthProvider, redirect_to: Option<&str>) -> String;
}

/// Supplies the session an operation acts with.
///
/// [`SessionManager`] hands out whatever session is current; a [`Session`]
/// verified for a single request always acts as itself.
pub trait SessionSource: Send + Sync {
    fn current_session(&self) -> Option<Session>;
}

impl SessionSource for Session {
    fn current_session(&self) -> Option<Session> {
        Some(self.clone())
    }
}
