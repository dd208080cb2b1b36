//! Common test utilities for API testing with mocks.
//!
//! This module provides a test fixture that builds the full router with
//! mock upstreams injected, so every endpoint can be exercised in-process
//! without network access.

#![allow(dead_code)]

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use tower::ServiceExt;

use cinematicdb_core::testing::{MockAuthProvider, MockMetadataProvider, MockTorrentIndex};
use cinematicdb_core::{
    load_config_from_str, AuthProvider, CollectionStore, DiscoveryService, MetadataProvider,
    QueryCache, SqliteCollectionStore, TorrentIndex,
};
use cinematicdb_server::api::WsBroadcaster;
use cinematicdb_server::state::AppState;

/// Re-export fixtures for test convenience
pub use cinematicdb_core::testing::fixtures;

const TEST_CONFIG: &str = r#"
[tmdb]
api_key = "tmdb-secret"

[supabase]
url = "https://project.supabase.co"
anon_key = "anon-secret"

[server]
host = "127.0.0.1"
port = 0
"#;

/// Test fixture for API testing with mock dependencies.
///
/// Provides an in-process router with fully controllable mocks for:
/// - Metadata (MockMetadataProvider)
/// - Torrent index (MockTorrentIndex)
/// - Identity provider (MockAuthProvider)
///
/// Collections live in an in-memory SQLite store. Protected endpoints are
/// called with the `*_as` helpers, which send the token returned by
/// [`TestFixture::sign_in`] as a bearer token.
///
/// # Example
///
/// ```rust,ignore
/// #[tokio::test]
/// async fn test_sign_in() {
///     let fixture = TestFixture::new().await;
///
///     let token = fixture.sign_in("alice").await;
///
///     let response = fixture.get_as(&token, "/api/v1/collections/favorites").await;
///     assert_eq!(response.status, 200);
/// }
/// ```
pub struct TestFixture {
    /// The Axum router for testing
    pub router: Router,
    pub metadata: Arc<MockMetadataProvider>,
    pub torrents: Arc<MockTorrentIndex>,
    pub auth: Arc<MockAuthProvider>,
    pub state: Arc<AppState>,
}

/// Response from a test request
#[derive(Debug)]
pub struct TestResponse {
    pub status: StatusCode,
    pub body: Value,
}

impl TestFixture {
    /// Create a new test fixture with an in-memory SQLite collection store.
    pub async fn new() -> Self {
        let store = Arc::new(
            SqliteCollectionStore::in_memory().expect("Failed to create collection store"),
        );
        Self::with_store(store).await
    }

    /// Create a test fixture around a specific collection store.
    pub async fn with_store(store: Arc<dyn CollectionStore>) -> Self {
        let config = load_config_from_str(TEST_CONFIG).expect("Failed to parse test config");

        let metadata = Arc::new(MockMetadataProvider::new());
        let torrents = Arc::new(MockTorrentIndex::new());
        let auth = Arc::new(MockAuthProvider::new());

        let cache = Arc::new(QueryCache::default());
        let discovery = DiscoveryService::new(
            Arc::clone(&metadata) as Arc<dyn MetadataProvider>,
            Arc::clone(&torrents) as Arc<dyn TorrentIndex>,
            Arc::clone(&cache),
        );

        let state = Arc::new(AppState::new(
            config,
            discovery,
            store,
            Arc::clone(&auth) as Arc<dyn AuthProvider>,
            cache,
            WsBroadcaster::default(),
        ));

        let router = cinematicdb_server::api::create_router(Arc::clone(&state));

        Self {
            router,
            metadata,
            torrents,
            auth,
            state,
        }
    }

    /// Sign in through the API as `<user>@example.com` and return the
    /// access token.
    pub async fn sign_in(&self, user: &str) -> String {
        let response = self
            .post(
                "/api/v1/auth/sign-in",
                serde_json::json!({
                    "email": format!("{}@example.com", user),
                    "password": "secret",
                }),
            )
            .await;
        assert_eq!(response.status, StatusCode::OK, "sign-in failed: {}", response.body);
        response.body["access_token"]
            .as_str()
            .expect("sign-in response has no access token")
            .to_string()
    }

    /// Send a GET request to the test server.
    pub async fn get(&self, path: &str) -> TestResponse {
        self.request("GET", path, None, None).await
    }

    /// Send a POST request with JSON body.
    pub async fn post(&self, path: &str, body: Value) -> TestResponse {
        self.request("POST", path, Some(body), None).await
    }

    /// Send a POST request without a body.
    pub async fn post_empty(&self, path: &str) -> TestResponse {
        self.request("POST", path, None, None).await
    }

    /// Send a DELETE request.
    pub async fn delete(&self, path: &str) -> TestResponse {
        self.request("DELETE", path, None, None).await
    }

    /// Send a GET request with a bearer token.
    pub async fn get_as(&self, token: &str, path: &str) -> TestResponse {
        self.request("GET", path, None, Some(token)).await
    }

    /// Send a POST request with JSON body and a bearer token.
    pub async fn post_as(&self, token: &str, path: &str, body: Value) -> TestResponse {
        self.request("POST", path, Some(body), Some(token)).await
    }

    /// Send a POST request without a body, with a bearer token.
    pub async fn post_empty_as(&self, token: &str, path: &str) -> TestResponse {
        self.request("POST", path, None, Some(token)).await
    }

    /// Send a DELETE request with a bearer token.
    pub async fn delete_as(&self, token: &str, path: &str) -> TestResponse {
        self.request("DELETE", path, None, Some(token)).await
    }

    /// Send a request and return the raw body as text.
    pub async fn get_text(&self, path: &str) -> (StatusCode, String) {
        let request = Request::builder().uri(path).body(Body::empty()).unwrap();
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to send request");
        let status = response.status();
        let bytes = response
            .into_body()
            .collect()
            .await
            .expect("Failed to collect body")
            .to_bytes();
        (status, String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Send a request to the test server.
    async fn request(
        &self,
        method: &str,
        path: &str,
        body: Option<Value>,
        token: Option<&str>,
    ) -> TestResponse {
        let mut request_builder = Request::builder().method(method).uri(path);
        if let Some(token) = token {
            request_builder = request_builder.header("Authorization", format!("Bearer {}", token));
        }

        let body = if let Some(json_body) = body {
            request_builder = request_builder.header("Content-Type", "application/json");
            Body::from(serde_json::to_vec(&json_body).unwrap())
        } else {
            Body::empty()
        };

        let request = request_builder.body(body).unwrap();

        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to send request");

        let status = response.status();
        let body_bytes = response
            .into_body()
            .collect()
            .await
            .expect("Failed to collect body")
            .to_bytes();

        let body: Value = if body_bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&body_bytes).unwrap_or(Value::Null)
        };

        TestResponse { status, body }
    }
}

/// Helper to assert a response has expected status.
#[macro_export]
macro_rules! assert_status {
    ($response:expr, $status:expr) => {
        assert_eq!(
            $response.status, $status,
            "Expected status {:?}, got {:?}. Body: {}",
            $status,
            $response.status,
            serde_json::to_string_pretty(&$response.body).unwrap_or_default()
        );
    };
}
