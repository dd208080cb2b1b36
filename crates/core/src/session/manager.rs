//! Session lifecycle and change notifications.

use std::sync::{Arc, RwLock};
use std::time::Duration as StdDuration;

use chrono::{Duration, Utc};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::callback::session_from_callback;
use super::{
    AuthProvider, AuthState, OAuthProvider, RemoteSessionChange, Session, SessionEvent,
    SessionSource, SessionStorage, SignUpOutcome, User,
};
use crate::config::SessionConfig;
use crate::error::ServiceError;

const EVENT_CAPACITY: usize = 64;

/// Used by the refresh task when no session exists; it also wakes on events.
const IDLE_RECHECK: StdDuration = StdDuration::from_secs(300);

struct Inner {
    state: AuthState,
    session: Option<Session>,
    /// Bumped on every transition. A result computed from an older
    /// generation is dropped instead of installed.
    generation: u64,
}

/// Receives [`SessionEvent`]s. Dropping it unsubscribes.
pub struct SessionSubscription {
    rx: broadcast::Receiver<SessionEvent>,
}

impl SessionSubscription {
    /// Next event, or `None` once the manager is gone. Events missed because
    /// the subscriber fell behind are skipped.
    pub async fn recv(&mut self) -> Option<SessionEvent> {
        loop {
            match self.rx.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!("Session subscriber lagged, skipped {} events", n);
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Non-blocking variant of [`recv`](Self::recv).
    pub fn try_recv(&mut self) -> Option<SessionEvent> {
        loop {
            match self.rx.try_recv() {
                Ok(event) => return Some(event),
                Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
                Err(_) => return None,
            }
        }
    }
}

/// Owns the current identity.
///
/// Every transition is persisted through [`SessionStorage`] and published to
/// subscribers.
pub struct SessionManager {
    provider: Arc<dyn AuthProvider>,
    storage: Arc<dyn SessionStorage>,
    inner: RwLock<Inner>,
    events: broadcast::Sender<SessionEvent>,
    refresh_margin: Duration,
    oauth_redirect: Option<String>,
}

impl SessionManager {
    pub fn new(
        provider: Arc<dyn AuthProvider>,
        storage: Arc<dyn SessionStorage>,
        config: &SessionConfig,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            provider,
            storage,
            inner: RwLock::new(Inner {
                state: AuthState::Unknown,
                session: None,
                generation: 0,
            }),
            events,
            refresh_margin: Duration::seconds(config.refresh_margin_secs as i64),
            oauth_redirect: config.oauth_redirect_url.clone(),
        }
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Inner> {
        self.inner.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Inner> {
        self.inner.write().unwrap_or_else(|e| e.into_inner())
    }

    pub fn state(&self) -> AuthState {
        self.read().state.clone()
    }

    pub fn current_user(&self) -> Option<User> {
        self.read().state.user().cloned()
    }

    pub fn current_session(&self) -> Option<Session> {
        self.read().session.clone()
    }

    /// The current session, or `Unauthenticated` if there is none.
    pub fn require_session(&self) -> Result<Session, ServiceError> {
        self.current_session().ok_or(ServiceError::Unauthenticated)
    }

    pub fn subscribe(&self) -> SessionSubscription {
        SessionSubscription {
            rx: self.events.subscribe(),
        }
    }

    fn publish(&self, event: SessionEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    fn generation(&self) -> u64 {
        self.read().generation
    }

    fn install(&self, inner: &mut Inner, session: Session) -> User {
        if let Err(e) = self.storage.save(&session) {
            warn!("Failed to persist session: {}", e);
        }
        let user = session.user.clone();
        inner.state = AuthState::Authenticated(user.clone());
        inner.session = Some(session);
        inner.generation += 1;
        user
    }

    fn clear(&self, inner: &mut Inner) {
        if let Err(e) = self.storage.clear() {
            warn!("Failed to clear persisted session: {}", e);
        }
        inner.state = AuthState::Anonymous;
        inner.session = None;
        inner.generation += 1;
    }

    fn set_authenticated(&self, session: Session) -> User {
        let mut inner = self.write();
        self.install(&mut inner, session)
    }

    fn set_anonymous(&self) {
        let mut inner = self.write();
        self.clear(&mut inner);
    }

    /// Install `session` unless another transition happened after
    /// `generation` was read.
    fn set_authenticated_since(&self, generation: u64, session: Session) -> Option<User> {
        let mut inner = self.write();
        if inner.generation != generation {
            return None;
        }
        Some(self.install(&mut inner, session))
    }

    /// Clear the session unless another transition happened after
    /// `generation` was read.
    fn set_anonymous_since(&self, generation: u64) -> bool {
        let mut inner = self.write();
        if inner.generation != generation {
            return false;
        }
        self.clear(&mut inner);
        true
    }

    /// Restore the persisted session.
    ///
    /// A session inside the refresh margin is refreshed first; one that
    /// cannot be refreshed is discarded and the state becomes `Anonymous`.
    pub async fn initialize(&self) -> AuthState {
        let generation = self.generation();
        let stored = match self.storage.load() {
            Ok(stored) => stored,
            Err(e) => {
                warn!("Discarding unreadable persisted session: {}", e);
                None
            }
        };

        let restored = match stored {
            None => None,
            Some(session) if !session.expires_within(self.refresh_margin) => Some(session),
            Some(session) => match self.provider.refresh(&session.refresh_token).await {
                Ok(refreshed) => Some(refreshed),
                Err(e) => {
                    warn!(
                        user_id = %session.user.id,
                        "Persisted session could not be refreshed: {}",
                        e
                    );
                    None
                }
            },
        };

        match restored {
            Some(session) => match self.set_authenticated_since(generation, session) {
                Some(user) => {
                    info!(user_id = %user.id, "Restored session");
                    self.publish(SessionEvent::InitialSession(Some(user)));
                }
                None => debug!("Session changed while restoring, keeping the newer one"),
            },
            None => {
                if self.set_anonymous_since(generation) {
                    info!("No session restored, continuing anonymously");
                    self.publish(SessionEvent::InitialSession(None));
                }
            }
        }

        self.state()
    }

    /// Password sign-in. On failure the state is left unchanged.
    pub async fn sign_in(&self, email: &str, password: &str) -> Result<User, ServiceError> {
        let session = self.provider.sign_in_with_password(email, password).await?;
        let user = self.set_authenticated(session);
        info!(user_id = %user.id, "Signed in");
        self.publish(SessionEvent::SignedIn(user.clone()));
        Ok(user)
    }

    /// Create an identity. The state only becomes `Authenticated` when the
    /// provider issues a session immediately.
    pub async fn sign_up(
        &self,
        email: &str,
        password: &str,
        profile: serde_json::Value,
    ) -> Result<SignUpOutcome, ServiceError> {
        let response = self.provider.sign_up(email, password, profile).await?;
        match response.session {
            Some(session) => {
                let user = self.set_authenticated(session);
                info!(user_id = %user.id, "Signed up and signed in");
                self.publish(SessionEvent::SignedIn(user.clone()));
                Ok(SignUpOutcome::SignedIn(user))
            }
            None => {
                info!(user_id = %response.user.id, "Signed up, confirmation pending");
                Ok(SignUpOutcome::ConfirmationPending(response.user))
            }
        }
    }

    /// URL to send the user to for an OAuth sign-in. Does not change state.
    pub fn sign_in_with_oauth(&self, provider: OAuthProvider, redirect_to: Option<&str>) -> String {
        let redirect_to = redirect_to.or(self.oauth_redirect.as_deref());
        self.provider.authorize_url(provider, redirect_to)
    }

    /// Finish an OAuth sign-in from the provider's redirect.
    pub async fn complete_oauth(&self, callback: &str) -> Result<User, ServiceError> {
        let generation = self.generation();
        let session = session_from_callback(self.provider.as_ref(), callback).await?;
        let Some(user) = self.set_authenticated_since(generation, session) else {
            debug!("Session changed during the OAuth exchange, dropping its result");
            return Err(ServiceError::Unauthenticated);
        };
        info!(user_id = %user.id, "Signed in via OAuth");
        self.publish(SessionEvent::SignedIn(user.clone()));
        Ok(user)
    }

    /// Sign out. Remote revocation is best effort; the local session is
    /// always cleared.
    pub async fn sign_out(&self) {
        let session = self.current_session();
        if let Some(session) = &session {
            if let Err(e) = self.provider.sign_out(&session.access_token).await {
                warn!(user_id = %session.user.id, "Remote sign-out failed: {}", e);
            }
        }

        self.set_anonymous();
        if let Some(session) = session {
            info!(user_id = %session.user.id, "Signed out");
        }
        self.publish(SessionEvent::SignedOut);
    }

    /// Apply a change pushed by the identity provider.
    pub fn apply_remote_change(&self, change: RemoteSessionChange) {
        match change {
            RemoteSessionChange::TokenRefreshed(session) => {
                let user = self.set_authenticated(session);
                debug!(user_id = %user.id, "Applied refreshed token");
                self.publish(SessionEvent::TokenRefreshed(user));
            }
            RemoteSessionChange::UserUpdated(user) => {
                let updated = {
                    let mut inner = self.write();
                    match inner.session.as_mut() {
                        Some(session) => {
                            session.user = user.clone();
                            inner.state = AuthState::Authenticated(user.clone());
                            inner.generation += 1;
                            inner.session.clone()
                        }
                        None => None,
                    }
                };
                if let Some(session) = updated {
                    if let Err(e) = self.storage.save(&session) {
                        warn!("Failed to persist session: {}", e);
                    }
                    self.publish(SessionEvent::UserUpdated(user));
                }
            }
            RemoteSessionChange::SignedOut => {
                self.set_anonymous();
                info!("Signed out remotely");
                self.publish(SessionEvent::SignedOut);
            }
        }
    }

    /// Exchange the refresh token for a new session.
    ///
    /// If the provider rejects the refresh token the session is dropped.
    /// A sign-out or sign-in that lands while the provider call is pending
    /// wins; the refreshed session is then discarded.
    pub async fn refresh(&self) -> Result<User, ServiceError> {
        let (session, generation) = {
            let inner = self.read();
            let session = inner.session.clone().ok_or(ServiceError::Unauthenticated)?;
            (session, inner.generation)
        };

        match self.provider.refresh(&session.refresh_token).await {
            Ok(refreshed) => match self.set_authenticated_since(generation, refreshed) {
                Some(user) => {
                    debug!(user_id = %user.id, "Refreshed access token");
                    self.publish(SessionEvent::TokenRefreshed(user.clone()));
                    Ok(user)
                }
                None => {
                    debug!(
                        user_id = %session.user.id,
                        "Session changed during refresh, dropping result"
                    );
                    self.current_user().ok_or(ServiceError::Unauthenticated)
                }
            },
            Err(e @ ServiceError::Transport(_)) => Err(e),
            Err(e) => {
                if self.set_anonymous_since(generation) {
                    warn!(user_id = %session.user.id, "Refresh rejected, signing out: {}", e);
                    self.publish(SessionEvent::SignedOut);
                }
                Err(e)
            }
        }
    }

    fn next_refresh_in(&self) -> StdDuration {
        match self.current_session() {
            Some(session) => (session.expires_at - self.refresh_margin - Utc::now())
                .to_std()
                .unwrap_or(StdDuration::ZERO),
            None => IDLE_RECHECK,
        }
    }

    /// Refresh the access token a margin before it expires, for as long as
    /// the manager is alive.
    pub fn spawn_refresh_task(self: &Arc<Self>) -> JoinHandle<()> {
        let manager = Arc::downgrade(self);
        let mut events = self.subscribe();

        tokio::spawn(async move {
            loop {
                let wait = match manager.upgrade() {
                    Some(m) => m.next_refresh_in(),
                    None => break,
                };

                tokio::select! {
                    _ = tokio::time::sleep(wait) => {
                        let Some(m) = manager.upgrade() else { break };
                        if m.current_session().is_some() {
                            if let Err(e) = m.refresh().await {
                                warn!("Scheduled token refresh failed: {}", e);
                                // Back off on transport errors instead of spinning.
                                tokio::time::sleep(StdDuration::from_secs(5)).await;
                            }
                        }
                    }
                    event = events.recv() => {
                        if event.is_none() {
                            break;
                        }
                    }
                }
            }
            debug!("Session refresh task stopped");
        })
    }
}

impl SessionSource for SessionManager {
    fn current_session(&self) -> Option<Session> {
        SessionManager::current_session(self)
    }
}
