use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Authenticated identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
    /// Profile data supplied at sign-up (e.g. display name).
    #[serde(default)]
    pub user_metadata: serde_json::Value,
}

/// Tokens and identity of a signed-in user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub access_token: String,
    pub refresh_token: String,
    #[serde(default = "default_token_type")]
    pub token_type: String,
    pub expires_at: DateTime<Utc>,
    pub user: User,
}

fn default_token_type() -> String {
    "bearer".to_string()
}

impl Session {
    pub fn is_expired(&self) -> bool {
        self.expires_within(Duration::zero())
    }

    /// True if the access token expires within `margin` from now.
    pub fn expires_within(&self, margin: Duration) -> bool {
        self.expires_at <= Utc::now() + margin
    }
}

/// Identity state of the current process.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", content = "user", rename_all = "snake_case")]
pub enum AuthState {
    /// Persisted session not checked yet.
    Unknown,
    Anonymous,
    Authenticated(User),
}

impl AuthState {
    pub fn user(&self) -> Option<&User> {
        match self {
            AuthState::Authenticated(user) => Some(user),
            _ => None,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(self, AuthState::Authenticated(_))
    }
}

/// Published on every session transition.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", content = "user", rename_all = "snake_case")]
pub enum SessionEvent {
    /// Result of `initialize`; `None` when no session was restored.
    InitialSession(Option<User>),
    SignedIn(User),
    SignedOut,
    TokenRefreshed(User),
    UserUpdated(User),
}

/// Change pushed by the identity provider outside of a local call.
#[derive(Debug, Clone, PartialEq)]
pub enum RemoteSessionChange {
    TokenRefreshed(Session),
    UserUpdated(User),
    SignedOut,
}

/// Result of a sign-up request.
#[derive(Debug, Clone, PartialEq)]
pub enum SignUpOutcome {
    /// The provider issued a session right away.
    SignedIn(User),
    /// The identity exists but must be confirmed (e.g. by email) first.
    ConfirmationPending(User),
}

/// Identity provider an OAuth flow can be started with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OAuthProvider {
    Google,
    Github,
}

impl OAuthProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            OAuthProvider::Google => "google",
            OAuthProvider::Github => "github",
        }
    }
}

impl std::str::FromStr for OAuthProvider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "google" => Ok(OAuthProvider::Google),
            "github" => Ok(OAuthProvider::Github),
            other => Err(format!("unsupported OAuth provider: {}", other)),
        }
    }
}
