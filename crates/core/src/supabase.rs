//! Plumbing shared by the Supabase auth and PostgREST clients.

use std::time::Duration;

use reqwest::{Client, Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::config::SupabaseConfig;
use crate::error::ServiceError;

/// HTTP client bound to one Supabase project.
#[derive(Clone)]
pub(crate) struct SupabaseHttp {
    client: Client,
    base_url: String,
    anon_key: String,
}

impl SupabaseHttp {
    pub(crate) fn new(config: &SupabaseConfig) -> Result<Self, ServiceError> {
        if config.url.is_empty() || config.anon_key.is_empty() {
            return Err(ServiceError::Validation(
                "Supabase URL and anon key are required".to_string(),
            ));
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs as u64))
            .build()
            .map_err(|e| ServiceError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
            anon_key: config.anon_key.clone(),
        })
    }

    pub(crate) fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Start a request carrying the `apikey` header and a bearer token.
    ///
    /// Without a user token the anon key is used as the bearer.
    pub(crate) fn request(
        &self,
        method: Method,
        path: &str,
        token: Option<&str>,
    ) -> RequestBuilder {
        self.client
            .request(method, self.url(path))
            .header("apikey", &self.anon_key)
            .bearer_auth(token.unwrap_or(&self.anon_key))
    }
}

/// Send a request, mapping transport failures.
pub(crate) async fn send(request: RequestBuilder) -> Result<Response, ServiceError> {
    request
        .send()
        .await
        .map_err(|e| ServiceError::Transport(e.to_string()))
}

/// Read a success body as JSON.
pub(crate) async fn read_json<T: DeserializeOwned>(response: Response) -> Result<T, ServiceError> {
    let body = response
        .bytes()
        .await
        .map_err(|e| ServiceError::Transport(e.to_string()))?;
    serde_json::from_slice(&body).map_err(|e| ServiceError::Validation(e.to_string()))
}

/// Error body returned by Supabase services.
///
/// PostgREST sends `{code, message, details, hint}`; GoTrue sends either
/// `{error, error_description}` or `{code, msg}`.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct ErrorBody {
    #[serde(default)]
    code: Option<serde_json::Value>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    msg: Option<String>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    error_description: Option<String>,
}

impl ErrorBody {
    pub(crate) fn parse(body: &str) -> Self {
        serde_json::from_str(body).unwrap_or_default()
    }

    /// Postgres error code, e.g. "23505".
    pub(crate) fn pg_code(&self) -> Option<&str> {
        self.code.as_ref().and_then(|c| c.as_str())
    }

    pub(crate) fn message(&self) -> String {
        self.error_description
            .as_ref()
            .or(self.message.as_ref())
            .or(self.msg.as_ref())
            .or(self.error.as_ref())
            .cloned()
            .unwrap_or_default()
    }
}
