//! Session and collection endpoint tests.
//!
//! Run with: cargo test -p cinematicdb-server --test session_collections

mod common;

use std::time::Duration;

use axum::http::StatusCode;
use serde_json::json;
use tokio::time::timeout;
use tokio_test::assert_ok;

use cinematicdb_core::ServiceError;
use cinematicdb_server::api::WsMessage;
use common::{fixtures, TestFixture};

fn movie_body(id: u64, title: &str) -> serde_json::Value {
    serde_json::to_value(fixtures::movie(id, title)).unwrap()
}

fn media_ids(body: &serde_json::Value) -> Vec<u64> {
    body.as_array()
        .unwrap()
        .iter()
        .map(|e| e["media_id"].as_u64().unwrap())
        .collect()
}

// ============================================================================
// Session
// ============================================================================

#[tokio::test]
async fn test_session_without_token_is_anonymous() {
    let fixture = TestFixture::new().await;

    let response = fixture.get("/api/v1/auth/session").await;
    assert_status!(response, StatusCode::OK);
    assert_eq!(response.body["state"], "anonymous");

    let response = fixture.get_as("not-a-token", "/api/v1/auth/session").await;
    assert_status!(response, StatusCode::OK);
    assert_eq!(response.body["state"], "anonymous");
}

#[tokio::test]
async fn test_sign_in_returns_session_for_bearer_use() {
    let fixture = TestFixture::new().await;

    let response = fixture
        .post(
            "/api/v1/auth/sign-in",
            json!({ "email": "alice@example.com", "password": "secret" }),
        )
        .await;
    assert_status!(response, StatusCode::OK);
    assert_eq!(response.body["access_token"], "tok-alice");
    assert_eq!(response.body["refresh_token"], "refresh-alice");
    assert_eq!(response.body["user"]["id"], "alice");
    assert_eq!(response.body["user"]["email"], "alice@example.com");

    let response = fixture.get_as("tok-alice", "/api/v1/auth/session").await;
    assert_eq!(response.body["state"], "authenticated");
    assert_eq!(response.body["user"]["id"], "alice");

    // Nobody else is signed in by alice signing in.
    let response = fixture.get("/api/v1/auth/session").await;
    assert_eq!(response.body["state"], "anonymous");
}

#[tokio::test]
async fn test_failed_sign_in_is_unauthorized() {
    let fixture = TestFixture::new().await;
    fixture
        .auth
        .set_next_error(ServiceError::Unauthenticated)
        .await;

    let response = fixture
        .post(
            "/api/v1/auth/sign-in",
            json!({ "email": "alice@example.com", "password": "wrong" }),
        )
        .await;
    assert_status!(response, StatusCode::UNAUTHORIZED);
    assert_eq!(response.body["kind"], "unauthenticated");
}

#[tokio::test]
async fn test_sign_in_requires_credentials() {
    let fixture = TestFixture::new().await;

    let response = fixture
        .post(
            "/api/v1/auth/sign-in",
            json!({ "email": "alice@example.com", "password": "" }),
        )
        .await;
    assert_status!(response, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_sign_up_signed_in_and_pending() {
    let fixture = TestFixture::new().await;

    let response = fixture
        .post(
            "/api/v1/auth/sign-up",
            json!({
                "email": "carol@example.com",
                "password": "secret",
                "profile": { "display_name": "Carol" }
            }),
        )
        .await;
    assert_status!(response, StatusCode::CREATED);
    assert_eq!(response.body["status"], "signed_in");
    assert_eq!(response.body["user"]["user_metadata"]["display_name"], "Carol");
    assert_eq!(response.body["session"]["access_token"], "tok-carol");

    fixture.auth.set_confirm_sign_ups(false).await;

    let response = fixture
        .post(
            "/api/v1/auth/sign-up",
            json!({ "email": "dave@example.com", "password": "secret" }),
        )
        .await;
    assert_status!(response, StatusCode::ACCEPTED);
    assert_eq!(response.body["status"], "confirmation_pending");
    assert!(response.body.get("session").is_none());
}

#[tokio::test]
async fn test_refresh_exchanges_refresh_token() {
    let fixture = TestFixture::new().await;

    let response = fixture
        .post(
            "/api/v1/auth/refresh",
            json!({ "refresh_token": "refresh-alice" }),
        )
        .await;
    assert_status!(response, StatusCode::OK);
    assert_eq!(response.body["access_token"], "tok-alice");
    assert_eq!(response.body["user"]["id"], "alice");
    assert_eq!(fixture.auth.refresh_calls().await, 1);

    let response = fixture
        .post("/api/v1/auth/refresh", json!({ "refresh_token": "" }))
        .await;
    assert_status!(response, StatusCode::BAD_REQUEST);

    let response = fixture
        .post("/api/v1/auth/refresh", json!({ "refresh_token": "bogus" }))
        .await;
    assert_status!(response, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_oauth_url() {
    let fixture = TestFixture::new().await;

    let response = fixture
        .get("/api/v1/auth/oauth/GitHub?redirect_to=http://localhost:3000/callback")
        .await;
    assert_status!(response, StatusCode::OK);
    assert_eq!(response.body["provider"], "github");
    assert_eq!(
        response.body["url"],
        "https://auth.test/authorize?provider=github\
         &redirect_to=http%3A%2F%2Flocalhost%3A3000%2Fcallback"
    );

    let response = fixture.get("/api/v1/auth/oauth/myspace").await;
    assert_status!(response, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_oauth_callback_returns_session() {
    let fixture = TestFixture::new().await;

    let response = fixture
        .post(
            "/api/v1/auth/callback",
            json!({
                "url": "http://localhost:3000/callback#access_token=tok-bob\
                        &refresh_token=refresh-bob&expires_in=3600&token_type=bearer"
            }),
        )
        .await;
    assert_status!(response, StatusCode::OK);
    assert_eq!(response.body["access_token"], "tok-bob");
    assert_eq!(response.body["user"]["id"], "bob");

    // The callback does not make anyone else bob.
    let response = fixture.get("/api/v1/auth/session").await;
    assert_eq!(response.body["state"], "anonymous");
}

#[tokio::test]
async fn test_oauth_callback_error_is_reported() {
    let fixture = TestFixture::new().await;

    let response = fixture
        .post(
            "/api/v1/auth/callback",
            json!({
                "url": "http://localhost:3000/callback\
                        #error=access_denied&error_description=User+denied+access"
            }),
        )
        .await;
    assert_status!(response, StatusCode::BAD_REQUEST);
    assert!(response.body["error"]
        .as_str()
        .unwrap()
        .contains("User denied access"));
}

#[tokio::test]
async fn test_sign_out_requires_token() {
    let fixture = TestFixture::new().await;

    let response = fixture.post_empty("/api/v1/auth/sign-out").await;
    assert_status!(response, StatusCode::UNAUTHORIZED);
    assert_eq!(fixture.auth.sign_out_calls().await, 0);
}

// ============================================================================
// Collections
// ============================================================================

#[tokio::test]
async fn test_collections_require_token() {
    let fixture = TestFixture::new().await;

    let response = fixture.get("/api/v1/collections/favorites").await;
    assert_status!(response, StatusCode::UNAUTHORIZED);
    assert_eq!(response.body["kind"], "unauthenticated");

    let response = fixture
        .post("/api/v1/collections/watchlist", movie_body(1, "Heat"))
        .await;
    assert_status!(response, StatusCode::UNAUTHORIZED);

    let response = fixture
        .get_as("tok-", "/api/v1/collections/watchlist/1")
        .await;
    assert_status!(response, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_add_check_list_remove() {
    let fixture = TestFixture::new().await;
    let alice = fixture.sign_in("alice").await;

    let response = fixture
        .get_as(&alice, "/api/v1/collections/favorites/550")
        .await;
    assert_status!(response, StatusCode::OK);
    assert_eq!(response.body["member"], false);

    let response = fixture
        .post_as(&alice, "/api/v1/collections/favorites", movie_body(550, "Fight Club"))
        .await;
    assert_status!(response, StatusCode::CREATED);
    assert_eq!(response.body["title"], "Fight Club");
    assert_eq!(response.body["user_id"], "alice");
    assert_eq!(response.body["media_type"], "movie");
    assert_eq!(
        response.body["poster_url"],
        "https://image.tmdb.org/t/p/w500/poster.jpg"
    );

    let response = fixture
        .get_as(&alice, "/api/v1/collections/favorites/550")
        .await;
    assert_eq!(response.body["member"], true);
    assert_eq!(response.body["collection"], "favorites");

    fixture
        .post_as(&alice, "/api/v1/collections/favorites", movie_body(680, "Pulp Fiction"))
        .await;
    let response = fixture.get_as(&alice, "/api/v1/collections/favorites").await;
    assert_status!(response, StatusCode::OK);
    assert_eq!(media_ids(&response.body), vec![680, 550]);
    assert_eq!(
        response.body[0]["backdrop_url"],
        "https://image.tmdb.org/t/p/w1280/backdrop.jpg"
    );

    // The other collection is independent.
    let response = fixture
        .get_as(&alice, "/api/v1/collections/watchlist/550")
        .await;
    assert_eq!(response.body["member"], false);

    let response = fixture
        .delete_as(&alice, "/api/v1/collections/favorites/550")
        .await;
    assert_status!(response, StatusCode::NO_CONTENT);
    let response = fixture
        .get_as(&alice, "/api/v1/collections/favorites/550")
        .await;
    assert_eq!(response.body["member"], false);

    // Removing again is not an error.
    let response = fixture
        .delete_as(&alice, "/api/v1/collections/favorites/550")
        .await;
    assert_status!(response, StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn test_signed_in_user_is_not_shared_with_other_callers() {
    let fixture = TestFixture::new().await;
    let alice = fixture.sign_in("alice").await;
    let response = fixture
        .post_as(&alice, "/api/v1/collections/favorites", movie_body(550, "Fight Club"))
        .await;
    assert_status!(response, StatusCode::CREATED);

    // A caller without a token gets nothing of alice's.
    let response = fixture.get("/api/v1/collections/favorites").await;
    assert_status!(response, StatusCode::UNAUTHORIZED);
    let response = fixture.delete("/api/v1/collections/favorites/550").await;
    assert_status!(response, StatusCode::UNAUTHORIZED);
    let response = fixture.get("/api/v1/auth/session").await;
    assert_eq!(response.body["state"], "anonymous");

    let response = fixture
        .get_as(&alice, "/api/v1/collections/favorites/550")
        .await;
    assert_eq!(response.body["member"], true);
}

#[tokio::test]
async fn test_users_only_see_their_own_collections() {
    let fixture = TestFixture::new().await;
    let alice = fixture.sign_in("alice").await;
    let bob = fixture.sign_in("bob").await;

    fixture
        .post_as(&alice, "/api/v1/collections/favorites", movie_body(550, "Fight Club"))
        .await;
    fixture
        .post_as(&bob, "/api/v1/collections/favorites", movie_body(13, "Forrest Gump"))
        .await;

    let response = fixture.get_as(&alice, "/api/v1/collections/favorites").await;
    assert_eq!(media_ids(&response.body), vec![550]);
    let response = fixture.get_as(&bob, "/api/v1/collections/favorites").await;
    assert_eq!(media_ids(&response.body), vec![13]);

    let response = fixture
        .get_as(&bob, "/api/v1/collections/favorites/550")
        .await;
    assert_eq!(response.body["member"], false);

    // Bob removing 550 touches only bob's (empty) row set.
    let response = fixture
        .delete_as(&bob, "/api/v1/collections/favorites/550")
        .await;
    assert_status!(response, StatusCode::NO_CONTENT);
    let response = fixture
        .get_as(&alice, "/api/v1/collections/favorites/550")
        .await;
    assert_eq!(response.body["member"], true);
}

#[tokio::test]
async fn test_duplicate_add_conflicts_and_keeps_membership() {
    let fixture = TestFixture::new().await;
    let alice = fixture.sign_in("alice").await;

    let response = fixture
        .post_as(&alice, "/api/v1/collections/watchlist", movie_body(77, "Alien"))
        .await;
    assert_status!(response, StatusCode::CREATED);

    let response = fixture
        .post_as(&alice, "/api/v1/collections/watchlist", movie_body(77, "Alien"))
        .await;
    assert_status!(response, StatusCode::CONFLICT);
    assert_eq!(response.body["kind"], "duplicate");

    let response = fixture
        .get_as(&alice, "/api/v1/collections/watchlist/77")
        .await;
    assert_eq!(response.body["member"], true);
    let response = fixture.get_as(&alice, "/api/v1/collections/watchlist").await;
    assert_eq!(response.body.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_unknown_collection_is_bad_request() {
    let fixture = TestFixture::new().await;
    let alice = fixture.sign_in("alice").await;

    let response = fixture.get_as(&alice, "/api/v1/collections/bookmarks").await;
    assert_status!(response, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_sign_out_revokes_token() {
    let fixture = TestFixture::new().await;
    let alice = fixture.sign_in("alice").await;
    let bob = fixture.sign_in("bob").await;
    fixture
        .post_as(&alice, "/api/v1/collections/favorites", movie_body(1, "Up"))
        .await;

    let response = fixture.post_empty_as(&alice, "/api/v1/auth/sign-out").await;
    assert_status!(response, StatusCode::NO_CONTENT);
    assert_eq!(fixture.auth.sign_out_calls().await, 1);

    let response = fixture.get_as(&alice, "/api/v1/collections/favorites").await;
    assert_status!(response, StatusCode::UNAUTHORIZED);
    let response = fixture
        .delete_as(&alice, "/api/v1/collections/favorites/1")
        .await;
    assert_status!(response, StatusCode::UNAUTHORIZED);
    let response = fixture.get_as(&alice, "/api/v1/auth/session").await;
    assert_eq!(response.body["state"], "anonymous");

    // Bob is unaffected.
    let response = fixture.get_as(&bob, "/api/v1/collections/favorites").await;
    assert_status!(response, StatusCode::OK);

    // Signing in again restores access to the same data.
    let alice = fixture.sign_in("alice").await;
    let response = fixture.get_as(&alice, "/api/v1/collections/favorites").await;
    assert_eq!(media_ids(&response.body), vec![1]);
}

// ============================================================================
// Live updates
// ============================================================================

#[tokio::test]
async fn test_changes_are_broadcast_to_their_owner() {
    let fixture = TestFixture::new().await;
    let mut rx = fixture.state.ws_broadcaster().subscribe();
    let alice = fixture.sign_in("alice").await;

    fixture
        .post_as(&alice, "/api/v1/collections/favorites", movie_body(603, "The Matrix"))
        .await;
    let msg = assert_ok!(assert_ok!(timeout(Duration::from_secs(1), rx.recv()).await));
    assert!(msg.visible_to("alice"));
    assert!(!msg.visible_to("bob"));
    match msg {
        WsMessage::CollectionChanged {
            user_id,
            media_id,
            member,
            ..
        } => {
            assert_eq!(user_id, "alice");
            assert_eq!(media_id, 603);
            assert!(member);
        }
        other => panic!("unexpected message: {:?}", other),
    }

    fixture.post_empty_as(&alice, "/api/v1/auth/sign-out").await;
    let msg = assert_ok!(assert_ok!(timeout(Duration::from_secs(1), rx.recv()).await));
    let json = serde_json::to_value(&msg).unwrap();
    assert_eq!(json, json!({ "type": "signed_out" }));
    assert_eq!(msg.user_id(), "alice");
}
