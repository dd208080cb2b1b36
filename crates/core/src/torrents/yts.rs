//! YTS torrent index client.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, warn};

use super::{TorrentIndex, TorrentVariant};
use crate::config::YtsConfig;
use crate::metrics::{record_external_call, TORRENT_LOOKUP_SOFT_FAILURES};

/// YTS API client.
pub struct YtsClient {
    client: Client,
    base_url: String,
}

impl YtsClient {
    pub fn new(config: YtsConfig) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs as u64))
            .build()
            .unwrap_or_else(|e| {
                warn!("Falling back to default HTTP client for YTS: {}", e);
                Client::new()
            });

        Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        }
    }

    async fn fetch(&self, external_id: &str) -> Result<Vec<TorrentVariant>, LookupFailure> {
        let url = format!("{}/list_movies.json", self.base_url);

        let response = self
            .client
            .get(&url)
            .query(&[("query_term", external_id)])
            .send()
            .await
            .map_err(|e| LookupFailure::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(LookupFailure::Status(status.as_u16()));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| LookupFailure::Transport(e.to_string()))?;

        parse_listing(&body).map_err(LookupFailure::Schema)
    }
}

#[derive(Debug, thiserror::Error)]
enum LookupFailure {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("HTTP status {0}")]
    Status(u16),
    #[error("schema mismatch: {0}")]
    Schema(String),
}

impl LookupFailure {
    fn reason(&self) -> &'static str {
        match self {
            LookupFailure::Transport(_) => "transport",
            LookupFailure::Status(_) => "status",
            LookupFailure::Schema(_) => "schema",
        }
    }
}

#[async_trait]
impl TorrentIndex for YtsClient {
    async fn lookup(&self, external_id: &str) -> Vec<TorrentVariant> {
        debug!("YTS lookup: external_id={}", external_id);

        let started = Instant::now();
        let result = self.fetch(external_id).await;
        record_external_call("yts", "list_movies", started, &result, LookupFailure::reason);

        match result {
            Ok(torrents) => torrents,
            Err(failure) => {
                warn!(
                    external_id = external_id,
                    "Torrent lookup failed, returning no torrents: {}", failure
                );
                TORRENT_LOOKUP_SOFT_FAILURES
                    .with_label_values(&[failure.reason()])
                    .inc();
                Vec::new()
            }
        }
    }
}

/// Validate a `list_movies.json` body and return the first movie's torrents.
///
/// The `data` object must match the index schema exactly: every field is
/// required with its declared type. A listing with no movies yields an empty
/// list.
pub fn parse_listing(body: &[u8]) -> Result<Vec<TorrentVariant>, String> {
    let envelope: Envelope = serde_json::from_slice(body).map_err(|e| e.to_string())?;
    Ok(envelope
        .data
        .movies
        .into_iter()
        .next()
        .map(|m| m.torrents)
        .unwrap_or_default())
}

// ============================================================================
// YTS API Response Types (private)
// ============================================================================

#[derive(Debug, Deserialize)]
struct Envelope {
    data: ListMovies,
}

// Fields are part of the validated schema even where they are not read.
#[allow(dead_code)]
#[derive(Debug, Deserialize)]
struct ListMovies {
    movie_count: u64,
    limit: u32,
    page_number: u32,
    movies: Vec<YtsMovie>,
}

#[allow(dead_code)]
#[derive(Debug, Deserialize)]
struct YtsMovie {
    id: u64,
    imdb_code: String,
    title: String,
    year: u32,
    rating: f32,
    runtime: u32,
    genres: Vec<String>,
    summary: String,
    description_full: String,
    synopsis: String,
    yt_trailer_code: String,
    language: String,
    mpa_rating: String,
    background_image: String,
    background_image_original: String,
    small_cover_image: String,
    medium_cover_image: String,
    large_cover_image: String,
    torrents: Vec<TorrentVariant>,
}
