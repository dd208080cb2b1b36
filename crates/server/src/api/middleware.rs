//! Authentication and metrics middleware for API routes.

use axum::{
    body::Body,
    extract::{FromRequestParts, State},
    http::{header, request::Parts, HeaderMap, Request},
    middleware::Next,
    response::Response,
};
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

use cinematicdb_core::{ServiceError, Session};

use super::error::ApiError;
use crate::metrics::{
    normalize_path, AUTH_FAILURES_TOTAL, HTTP_REQUESTS_IN_FLIGHT, HTTP_REQUESTS_TOTAL,
    HTTP_REQUEST_DURATION,
};
use crate::state::AppState;

/// Metrics middleware that tracks HTTP request duration and counts.
///
/// This middleware records:
/// - Request duration (histogram)
/// - Request count (counter)
/// - Requests in flight (gauge)
pub async fn metrics_middleware(request: Request<Body>, next: Next) -> Response {
    let start = Instant::now();
    let method = request.method().to_string();
    let path = normalize_path(request.uri().path());

    HTTP_REQUESTS_IN_FLIGHT.inc();

    let response = next.run(request).await;

    HTTP_REQUESTS_IN_FLIGHT.dec();

    let duration = start.elapsed().as_secs_f64();
    let status = response.status().as_u16().to_string();

    HTTP_REQUEST_DURATION
        .with_label_values(&[&method, &path, &status])
        .observe(duration);
    HTTP_REQUESTS_TOTAL
        .with_label_values(&[&method, &path, &status])
        .inc();

    response
}

/// Access token from an `Authorization: Bearer <token>` header.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
}

/// Resolve the caller's session from its access token.
pub async fn authenticate(state: &AppState, token: Option<&str>) -> Result<Session, ApiError> {
    let Some(token) = token else {
        AUTH_FAILURES_TOTAL
            .with_label_values(&["not_authenticated"])
            .inc();
        return Err(ServiceError::Unauthenticated.into());
    };

    match state.verifier().verify(token).await {
        Ok(session) => Ok(session),
        Err(ServiceError::Unauthenticated) => {
            AUTH_FAILURES_TOTAL.with_label_values(&["invalid_token"]).inc();
            Err(ServiceError::Unauthenticated.into())
        }
        Err(e) => {
            // Identity provider unreachable or misbehaving
            AUTH_FAILURES_TOTAL.with_label_values(&["internal_error"]).inc();
            Err(e.into())
        }
    }
}

/// Authentication middleware for routes that act on a user's data.
///
/// Verifies the bearer token and stores the resulting [`Session`] in the
/// request extensions for [`AuthUser`]. Requests without a valid token get
/// a 401.
pub async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, ApiError> {
    let session = authenticate(&state, bearer_token(request.headers())).await?;
    debug!(user_id = %session.user.id, "Authenticated request");
    request.extensions_mut().insert(session);
    Ok(next.run(request).await)
}

/// Extractor for the session verified by [`auth_middleware`].
#[derive(Debug, Clone)]
pub struct AuthUser(pub Session);

impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    fn from_request_parts(
        parts: &mut Parts,
        _state: &S,
    ) -> impl Future<Output = Result<Self, Self::Rejection>> + Send {
        let result = match parts.extensions.get::<Session>() {
            Some(session) => Ok(AuthUser(session.clone())),
            None => Err(ApiError::from(ServiceError::Unauthenticated)),
        };
        std::future::ready(result)
    }
}
