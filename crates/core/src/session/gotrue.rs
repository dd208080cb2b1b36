//! Supabase auth (GoTrue) client.

use std::time::Instant;

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use reqwest::{Method, Response, StatusCode};
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use super::{AuthProvider, OAuthProvider, Session, SignUpResponse, User};
use crate::config::SupabaseConfig;
use crate::error::ServiceError;
use crate::metrics::record_external_call;
use crate::supabase::{read_json, send, ErrorBody, SupabaseHttp};

/// Client for the `/auth/v1` endpoints of a Supabase project.
pub struct GoTrueClient {
    http: SupabaseHttp,
}

impl GoTrueClient {
    pub fn new(config: &SupabaseConfig) -> Result<Self, ServiceError> {
        Ok(Self {
            http: SupabaseHttp::new(config)?,
        })
    }

    async fn check(response: Response) -> Result<Response, ServiceError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = ErrorBody::parse(&response.text().await.unwrap_or_default());
        Err(match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ServiceError::Unauthenticated,
            _ => ServiceError::remote(status, body.message()),
        })
    }

    async fn timed<T>(
        operation: &str,
        fut: impl std::future::Future<Output = Result<T, ServiceError>>,
    ) -> Result<T, ServiceError> {
        let started = Instant::now();
        let result = fut.await;
        record_external_call("supabase_auth", operation, started, &result, ServiceError::kind);
        result
    }

    async fn token_grant(
        &self,
        grant_type: &str,
        body: serde_json::Value,
    ) -> Result<Session, ServiceError> {
        let request = self
            .http
            .request(Method::POST, "/auth/v1/token", None)
            .query(&[("grant_type", grant_type)])
            .json(&body);
        let response = Self::check(send(request).await?).await?;
        let token: TokenResponse = read_json(response).await?;
        Ok(token.into_session(Utc::now()))
    }
}

#[async_trait]
impl AuthProvider for GoTrueClient {
    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Session, ServiceError> {
        debug!("GoTrue password sign-in: email='{}'", email);
        Self::timed(
            "sign_in",
            self.token_grant("password", json!({ "email": email, "password": password })),
        )
        .await
    }

    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        profile: serde_json::Value,
    ) -> Result<SignUpResponse, ServiceError> {
        debug!("GoTrue sign-up: email='{}'", email);
        Self::timed("sign_up", async {
            let request = self
                .http
                .request(Method::POST, "/auth/v1/signup", None)
                .json(&json!({ "email": email, "password": password, "data": profile }));
            let response = Self::check(send(request).await?).await?;
            let body: SignUpBody = read_json(response).await?;
            Ok(body.into_response(Utc::now()))
        })
        .await
    }

    async fn refresh(&self, refresh_token: &str) -> Result<Session, ServiceError> {
        debug!("GoTrue token refresh");
        Self::timed(
            "refresh",
            self.token_grant("refresh_token", json!({ "refresh_token": refresh_token })),
        )
        .await
    }

    async fn get_user(&self, access_token: &str) -> Result<User, ServiceError> {
        Self::timed("get_user", async {
            let request = self
                .http
                .request(Method::GET, "/auth/v1/user", Some(access_token));
            let response = Self::check(send(request).await?).await?;
            read_json(response).await
        })
        .await
    }

    async fn sign_out(&self, access_token: &str) -> Result<(), ServiceError> {
        Self::timed("sign_out", async {
            let request = self
                .http
                .request(Method::POST, "/auth/v1/logout", Some(access_token));
            Self::check(send(request).await?).await?;
            Ok(())
        })
        .await
    }

    fn authorize_url(&self, provider: OAuthProvider, redirect_to: Option<&str>) -> String {
        let mut url = format!(
            "{}?provider={}",
            self.http.url("/auth/v1/authorize"),
            provider.as_str()
        );
        if let Some(redirect_to) = redirect_to {
            url.push_str("&redirect_to=");
            url.push_str(&urlencoding::encode(redirect_to));
        }
        url
    }
}

// ============================================================================
// GoTrue Response Types (private)
// ============================================================================

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: String,
    #[serde(default)]
    token_type: Option<String>,
    expires_in: i64,
    #[serde(default)]
    expires_at: Option<i64>,
    user: User,
}

impl TokenResponse {
    fn into_session(self, now: DateTime<Utc>) -> Session {
        let expires_at = self
            .expires_at
            .and_then(|ts| Utc.timestamp_opt(ts, 0).single())
            .unwrap_or_else(|| now + Duration::seconds(self.expires_in));

        Session {
            access_token: self.access_token,
            refresh_token: self.refresh_token,
            token_type: self.token_type.unwrap_or_else(|| "bearer".to_string()),
            expires_at,
            user: self.user,
        }
    }
}

/// Sign-up answers with a token response when confirmation is disabled and
/// with the bare user otherwise.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum SignUpBody {
    Session(TokenResponse),
    User(User),
}

impl SignUpBody {
    fn into_response(self, now: DateTime<Utc>) -> SignUpResponse {
        match self {
            SignUpBody::Session(token) => {
                let session = token.into_session(now);
                SignUpResponse {
                    user: session.user.clone(),
                    session: Some(session),
                }
            }
            SignUpBody::User(user) => SignUpResponse {
                user,
                session: None,
            },
        }
    }
}
