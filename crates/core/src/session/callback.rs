//! Parsing of the OAuth redirect.

use chrono::{Duration, TimeZone, Utc};

use super::{AuthProvider, Session};
use crate::error::ServiceError;

/// Tokens carried by an OAuth redirect.
#[derive(Debug, Clone, PartialEq)]
pub struct CallbackTokens {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_in: Option<i64>,
    pub expires_at: Option<i64>,
}

/// Parse the redirect the provider sent the user back with.
///
/// Accepts a full URL, a bare fragment (`#access_token=...`) or a bare query
/// string. Tokens are read from the fragment when there is one, otherwise
/// from the query. An `error` parameter is returned as a remote error
/// carrying `error_description`.
pub fn parse_callback(callback: &str) -> Result<CallbackTokens, ServiceError> {
    let params = match callback.split_once('#') {
        Some((_, fragment)) => fragment,
        None => callback
            .split_once('?')
            .map(|(_, query)| query)
            .unwrap_or(callback),
    };

    let mut access_token = None;
    let mut refresh_token = None;
    let mut expires_in = None;
    let mut expires_at = None;
    let mut error = None;
    let mut error_description = None;

    for pair in params.split('&').filter(|p| !p.is_empty()) {
        let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
        let value = decode(value);
        match key {
            "access_token" => access_token = Some(value),
            "refresh_token" => refresh_token = Some(value),
            "expires_in" => expires_in = value.parse().ok(),
            "expires_at" => expires_at = value.parse().ok(),
            "error" => error = Some(value),
            "error_description" => error_description = Some(value),
            _ => {}
        }
    }

    if let Some(error) = error {
        return Err(ServiceError::RemoteService {
            status: 400,
            message: error_description.unwrap_or(error),
        });
    }

    match (access_token, refresh_token) {
        (Some(access_token), Some(refresh_token)) if !access_token.is_empty() => {
            Ok(CallbackTokens {
                access_token,
                refresh_token,
                expires_in,
                expires_at,
            })
        }
        _ => Err(ServiceError::Validation(
            "OAuth callback carries no session tokens".to_string(),
        )),
    }
}

/// Turn a redirect into a session, re-querying the user the access token
/// belongs to. Without an expiry in the redirect the token is assumed to live
/// for an hour.
pub async fn session_from_callback(
    provider: &dyn AuthProvider,
    callback: &str,
) -> Result<Session, ServiceError> {
    let tokens = parse_callback(callback)?;
    let user = provider.get_user(&tokens.access_token).await?;

    let now = Utc::now();
    let expires_at = tokens
        .expires_at
        .and_then(|ts| Utc.timestamp_opt(ts, 0).single())
        .or_else(|| tokens.expires_in.map(|secs| now + Duration::seconds(secs)))
        .unwrap_or(now + Duration::hours(1));

    Ok(Session {
        access_token: tokens.access_token,
        refresh_token: tokens.refresh_token,
        token_type: "bearer".to_string(),
        expires_at,
        user,
    })
}

fn decode(value: &str) -> String {
    let value = value.replace('+', " ");
    urlencoding::decode(&value)
        .map(|v| v.into_owned())
        .unwrap_or(value)
}
