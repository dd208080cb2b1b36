//! Session handlers: password and OAuth sign-in, sign-up, refresh and
//! sign-out.
//!
//! The server keeps no signed-in state. Sign-in hands the session (access and
//! refresh token) to the caller, which presents the access token as a bearer
//! token on later requests and refreshes it itself.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use cinematicdb_core::{
    session_from_callback, AuthState, OAuthProvider, ServiceError, Session, User,
};

use super::error::ApiError;
use super::middleware::{bearer_token, AuthUser};
use super::ws::WsMessage;
use crate::state::AppState;

// ============================================================================
// Request/Response types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct SignInRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct SignUpRequest {
    pub email: String,
    pub password: String,
    /// Profile data stored with the identity, e.g. a display name.
    #[serde(default)]
    pub profile: serde_json::Value,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SignUpStatus {
    SignedIn,
    ConfirmationPending,
}

#[derive(Debug, Serialize)]
pub struct SignUpResponse {
    pub status: SignUpStatus,
    pub user: User,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session: Option<Session>,
}

#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

#[derive(Debug, Deserialize)]
pub struct OAuthParams {
    #[serde(default)]
    pub redirect_to: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct OAuthResponse {
    pub provider: OAuthProvider,
    pub url: String,
}

#[derive(Debug, Deserialize)]
pub struct CallbackRequest {
    /// Redirect URL (or just its fragment/query) the provider sent back.
    pub url: String,
}

fn require_credentials(email: &str, password: &str) -> Result<(), ApiError> {
    if email.trim().is_empty() || password.is_empty() {
        return Err(ApiError::bad_request("email and password are required"));
    }
    Ok(())
}

// ============================================================================
// Handlers
// ============================================================================

/// GET /api/v1/auth/session
///
/// State of the presented bearer token. No token, or one the identity
/// provider no longer accepts, is `anonymous`.
pub async fn get_session(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<AuthState>, ApiError> {
    let Some(token) = bearer_token(&headers) else {
        return Ok(Json(AuthState::Anonymous));
    };
    match state.verifier().verify(token).await {
        Ok(session) => Ok(Json(AuthState::Authenticated(session.user))),
        Err(ServiceError::Unauthenticated) => Ok(Json(AuthState::Anonymous)),
        Err(e) => Err(e.into()),
    }
}

/// POST /api/v1/auth/sign-in
pub async fn sign_in(
    State(state): State<Arc<AppState>>,
    Json(request): Json<SignInRequest>,
) -> Result<Json<Session>, ApiError> {
    require_credentials(&request.email, &request.password)?;
    let session = state
        .auth()
        .sign_in_with_password(request.email.trim(), &request.password)
        .await?;
    info!(user_id = %session.user.id, "Signed in");
    Ok(Json(session))
}

/// POST /api/v1/auth/sign-up
///
/// Returns 201 with a session when the provider signs the user in right
/// away and 202 when the identity still has to be confirmed.
pub async fn sign_up(
    State(state): State<Arc<AppState>>,
    Json(request): Json<SignUpRequest>,
) -> Result<(StatusCode, Json<SignUpResponse>), ApiError> {
    require_credentials(&request.email, &request.password)?;
    let response = state
        .auth()
        .sign_up(request.email.trim(), &request.password, request.profile)
        .await?;

    let (status, body) = match response.session {
        Some(session) => {
            info!(user_id = %session.user.id, "Signed up and signed in");
            (
                StatusCode::CREATED,
                SignUpResponse {
                    status: SignUpStatus::SignedIn,
                    user: session.user.clone(),
                    session: Some(session),
                },
            )
        }
        None => {
            info!(user_id = %response.user.id, "Signed up, confirmation pending");
            (
                StatusCode::ACCEPTED,
                SignUpResponse {
                    status: SignUpStatus::ConfirmationPending,
                    user: response.user,
                    session: None,
                },
            )
        }
    };
    Ok((status, Json(body)))
}

/// POST /api/v1/auth/refresh
pub async fn refresh(
    State(state): State<Arc<AppState>>,
    Json(request): Json<RefreshRequest>,
) -> Result<Json<Session>, ApiError> {
    if request.refresh_token.is_empty() {
        return Err(ApiError::bad_request("refresh_token is required"));
    }
    let session = state.auth().refresh(&request.refresh_token).await?;
    Ok(Json(session))
}

/// POST /api/v1/auth/sign-out
///
/// Revocation at the identity provider is best effort; the token is no
/// longer accepted here either way.
pub async fn sign_out(
    State(state): State<Arc<AppState>>,
    AuthUser(session): AuthUser,
) -> StatusCode {
    if let Err(e) = state.auth().sign_out(&session.access_token).await {
        warn!(user_id = %session.user.id, "Remote sign-out failed: {}", e);
    }
    state.verifier().forget(&session.access_token);
    state.cache().clear_scope(&session.user.id);
    state.ws_broadcaster().broadcast(WsMessage::SignedOut {
        user_id: session.user.id.clone(),
    });

    info!(user_id = %session.user.id, "Signed out");
    StatusCode::NO_CONTENT
}

/// GET /api/v1/auth/oauth/{provider}
///
/// Authorize URL to send the browser to.
pub async fn oauth_url(
    State(state): State<Arc<AppState>>,
    Path(provider): Path<String>,
    Query(params): Query<OAuthParams>,
) -> Result<Json<OAuthResponse>, ApiError> {
    let provider = provider
        .parse::<OAuthProvider>()
        .map_err(ApiError::bad_request)?;
    let redirect_to = params
        .redirect_to
        .as_deref()
        .or(state.config().session.oauth_redirect_url.as_deref());
    let url = state.auth().authorize_url(provider, redirect_to);
    Ok(Json(OAuthResponse { provider, url }))
}

/// POST /api/v1/auth/callback
pub async fn oauth_callback(
    State(state): State<Arc<AppState>>,
    Json(request): Json<CallbackRequest>,
) -> Result<Json<Session>, ApiError> {
    let session = session_from_callback(state.auth().as_ref(), &request.url).await?;
    info!(user_id = %session.user.id, "Signed in via OAuth");
    Ok(Json(session))
}
