//! Discovery, torrent and service endpoint tests.
//!
//! Run with: cargo test -p cinematicdb-server --test api_tests

mod common;

use axum::http::StatusCode;
use serde_json::Value;

use cinematicdb_core::metadata::{Genre, PLACEHOLDER_IMAGE};
use cinematicdb_core::testing::RecordedMetadataQuery;
use cinematicdb_core::{MediaKind, SearchFilters, SearchKind, ServiceError};
use common::{fixtures, TestFixture};

// ============================================================================
// Service endpoints
// ============================================================================

#[tokio::test]
async fn test_health() {
    let fixture = TestFixture::new().await;

    let response = fixture.get("/api/v1/health").await;
    assert_status!(response, StatusCode::OK);
    assert_eq!(response.body["status"], "ok");
}

#[tokio::test]
async fn test_config_is_sanitized() {
    let fixture = TestFixture::new().await;

    let response = fixture.get("/api/v1/config").await;
    assert_status!(response, StatusCode::OK);
    assert_eq!(response.body["tmdb"]["api_key_configured"], true);
    assert_eq!(response.body["supabase"]["anon_key_configured"], true);
    assert_eq!(response.body["supabase"]["url"], "https://project.supabase.co");

    let raw = response.body.to_string();
    assert!(!raw.contains("tmdb-secret"));
    assert!(!raw.contains("anon-secret"));
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let fixture = TestFixture::new().await;
    fixture.get("/api/v1/health").await;

    let (status, body) = fixture.get_text("/metrics").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("cinematicdb_http_requests_total"));
}

// ============================================================================
// Search and listings
// ============================================================================

#[tokio::test]
async fn test_search_passes_filters_through() {
    let fixture = TestFixture::new().await;
    fixture
        .metadata
        .set_results(vec![
            fixtures::movie(414906, "The Batman"),
            fixtures::tv(1399, "Batman: The Animated Series"),
        ])
        .await;

    let response = fixture
        .get("/api/v1/media/search?query=batman&kind=movie&year=2010&genre=28&min_rating=7")
        .await;
    assert_status!(response, StatusCode::OK);
    assert_eq!(response.body["page"], 1);
    let results = response.body["results"].as_array().unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0]["title"], "The Batman");
    assert_eq!(results[0]["media_type"], "movie");

    let queries = fixture.metadata.recorded_queries().await;
    assert_eq!(
        queries,
        vec![RecordedMetadataQuery::Search {
            query: "batman".to_string(),
            page: 1,
            kind: SearchKind::Movie,
            filters: SearchFilters::default()
                .with_genre(28)
                .with_year(2010)
                .with_min_rating(7.0),
        }]
    );
}

#[tokio::test]
async fn test_search_defaults_to_multi() {
    let fixture = TestFixture::new().await;
    fixture
        .metadata
        .set_results(vec![
            fixtures::movie(1, "Batman Begins"),
            fixtures::tv(2, "Batman Beyond"),
        ])
        .await;

    let response = fixture.get("/api/v1/media/search?query=batman").await;
    assert_status!(response, StatusCode::OK);
    let kinds: Vec<&str> = response.body["results"]
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["media_type"].as_str().unwrap())
        .collect();
    assert_eq!(kinds, vec!["movie", "tv"]);
}

#[tokio::test]
async fn test_search_rejects_blank_query() {
    let fixture = TestFixture::new().await;

    let response = fixture.get("/api/v1/media/search?query=%20%20").await;
    assert_status!(response, StatusCode::BAD_REQUEST);
    assert_eq!(response.body["kind"], "bad_request");
    assert!(fixture.metadata.recorded_queries().await.is_empty());
}

#[tokio::test]
async fn test_repeated_search_is_served_from_cache() {
    let fixture = TestFixture::new().await;
    fixture
        .metadata
        .set_results(vec![fixtures::movie(603, "The Matrix")])
        .await;

    for _ in 0..3 {
        let response = fixture.get("/api/v1/media/search?query=matrix&page=1").await;
        assert_status!(response, StatusCode::OK);
    }
    assert_eq!(fixture.metadata.recorded_queries().await.len(), 1);

    fixture.get("/api/v1/media/search?query=matrix&page=2").await;
    assert_eq!(fixture.metadata.recorded_queries().await.len(), 2);
}

#[tokio::test]
async fn test_listing_endpoints() {
    let fixture = TestFixture::new().await;
    fixture
        .metadata
        .set_results(vec![fixtures::movie(1, "Heat"), fixtures::tv(2, "Lost")])
        .await;

    let response = fixture.get("/api/v1/media/tv/popular?page=2").await;
    assert_status!(response, StatusCode::OK);
    assert_eq!(response.body["results"][0]["title"], "Lost");
    assert_eq!(
        response.body["results"][0]["poster_url"],
        "https://image.tmdb.org/t/p/w500/poster.jpg"
    );
    // No backdrop for the series
    assert_eq!(response.body["results"][0]["backdrop_url"], PLACEHOLDER_IMAGE);

    let response = fixture.get("/api/v1/media/movie/top-rated").await;
    assert_status!(response, StatusCode::OK);
    assert_eq!(response.body["results"][0]["title"], "Heat");

    let response = fixture.get("/api/v1/media/trending?scope=all").await;
    assert_status!(response, StatusCode::OK);
    assert_eq!(response.body["results"].as_array().unwrap().len(), 2);

    assert_status!(
        fixture.get("/api/v1/media/movie/now-playing").await,
        StatusCode::OK
    );
    assert_status!(
        fixture.get("/api/v1/media/movie/upcoming").await,
        StatusCode::OK
    );

    let queries = fixture.metadata.recorded_queries().await;
    assert!(queries.contains(&RecordedMetadataQuery::Popular {
        kind: MediaKind::Tv,
        page: 2
    }));
    assert!(queries.contains(&RecordedMetadataQuery::NowPlaying { page: 1 }));
    assert!(queries.contains(&RecordedMetadataQuery::Upcoming { page: 1 }));
}

#[tokio::test]
async fn test_movie_only_lists_reject_tv() {
    let fixture = TestFixture::new().await;

    let response = fixture.get("/api/v1/media/tv/now-playing").await;
    assert_status!(response, StatusCode::BAD_REQUEST);
    let response = fixture.get("/api/v1/media/tv/upcoming").await;
    assert_status!(response, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_unknown_kind_and_zero_page() {
    let fixture = TestFixture::new().await;

    let response = fixture.get("/api/v1/media/person/popular").await;
    assert_status!(response, StatusCode::BAD_REQUEST);
    assert!(response.body["error"]
        .as_str()
        .unwrap()
        .contains("unknown media kind"));

    let response = fixture.get("/api/v1/media/movie/popular?page=0").await;
    assert_status!(response, StatusCode::BAD_REQUEST);
}

// ============================================================================
// Details, credits, genres
// ============================================================================

#[tokio::test]
async fn test_details_and_credits() {
    let fixture = TestFixture::new().await;
    fixture
        .metadata
        .add_details(fixtures::details(
            fixtures::movie(27205, "Inception"),
            Some("tt1375666"),
        ))
        .await;

    let response = fixture.get("/api/v1/media/movie/27205").await;
    assert_status!(response, StatusCode::OK);
    assert_eq!(response.body["title"], "Inception");
    assert_eq!(response.body["imdb_id"], "tt1375666");
    assert_eq!(
        response.body["backdrop_url"],
        "https://image.tmdb.org/t/p/w1280/backdrop.jpg"
    );
    assert_eq!(response.body["credits"]["cast"][0]["profile_url"], PLACEHOLDER_IMAGE);

    let response = fixture.get("/api/v1/media/movie/27205/credits").await;
    assert_status!(response, StatusCode::OK);
    assert_eq!(response.body["cast"][0]["name"], "Leonardo DiCaprio");
    assert_eq!(response.body["cast"][0]["profile_url"], PLACEHOLDER_IMAGE);
    assert_eq!(response.body["crew"][0]["job"], "Director");
    assert_eq!(response.body["crew"][0]["profile_url"], PLACEHOLDER_IMAGE);
}

#[tokio::test]
async fn test_unknown_title_passes_upstream_404_through() {
    let fixture = TestFixture::new().await;

    let response = fixture.get("/api/v1/media/tv/999").await;
    assert_status!(response, StatusCode::NOT_FOUND);
    assert_eq!(response.body["kind"], "remote");
}

#[tokio::test]
async fn test_upstream_failures_map_to_gateway_errors() {
    let fixture = TestFixture::new().await;

    fixture
        .metadata
        .set_next_error(ServiceError::Transport("connection refused".into()))
        .await;
    let response = fixture.get("/api/v1/genres/movie").await;
    assert_status!(response, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(response.body["kind"], "transport");

    fixture
        .metadata
        .set_next_error(ServiceError::Validation("missing field `id`".into()))
        .await;
    let response = fixture.get("/api/v1/genres/movie").await;
    assert_status!(response, StatusCode::BAD_GATEWAY);

    fixture
        .metadata
        .set_next_error(ServiceError::RemoteService {
            status: 500,
            message: "boom".into(),
        })
        .await;
    let response = fixture.get("/api/v1/genres/movie").await;
    assert_status!(response, StatusCode::BAD_GATEWAY);
}

#[tokio::test]
async fn test_genres() {
    let fixture = TestFixture::new().await;
    fixture
        .metadata
        .set_genres(vec![
            Genre {
                id: 28,
                name: "Action".into(),
            },
            Genre {
                id: 35,
                name: "Comedy".into(),
            },
        ])
        .await;

    let response = fixture.get("/api/v1/genres/movie").await;
    assert_status!(response, StatusCode::OK);
    let names: Vec<&str> = response
        .body
        .as_array()
        .unwrap()
        .iter()
        .map(|g| g["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["Action", "Comedy"]);
}

// ============================================================================
// Torrents
// ============================================================================

#[tokio::test]
async fn test_torrents_listing_with_magnets() {
    let fixture = TestFixture::new().await;
    fixture
        .torrents
        .set_torrents(
            "tt0133093",
            vec![
                fixtures::torrent("720p", "AAA111"),
                fixtures::torrent("1080p", "BBB222"),
            ],
        )
        .await;

    let response = fixture
        .get("/api/v1/torrents/tt0133093?title=The%20Matrix")
        .await;
    assert_status!(response, StatusCode::OK);
    assert_eq!(response.body["imdb_id"], "tt0133093");

    let torrents = response.body["torrents"].as_array().unwrap();
    let qualities: Vec<&str> = torrents
        .iter()
        .map(|t| t["quality"].as_str().unwrap())
        .collect();
    assert_eq!(qualities, vec!["720p", "1080p"]);
    assert_eq!(torrents[0]["type"], "bluray");
    assert_eq!(
        torrents[1]["magnet"],
        "magnet:?xt=urn:btih:BBB222&dn=The%20Matrix"
    );
}

#[tokio::test]
async fn test_torrents_unknown_id_is_empty_not_error() {
    let fixture = TestFixture::new().await;

    let response = fixture.get("/api/v1/torrents/tt0000000").await;
    assert_status!(response, StatusCode::OK);
    assert_eq!(response.body["torrents"], Value::Array(Vec::new()));
    assert_eq!(fixture.torrents.lookup_count().await, 1);
}
