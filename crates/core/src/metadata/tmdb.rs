//! TMDB (The Movie Database) API client.
//!
//! TMDB requires an API key for access, passed as the `api_key` query parameter.
//! Listings are normalized into [`MediaItem`]s with their kind always set.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::debug;

use super::types::{
    CastMember, Credits, CrewMember, Genre, MediaDetails, MediaItem, MediaKind, Page,
    ProductionCompany, ProductionCountry, SearchFilters, SearchKind, SearchResults,
    SpokenLanguage, TrendingScope,
};
use super::{infer_kind, MetadataProvider};
use crate::config::TmdbConfig;
use crate::error::ServiceError;
use crate::metrics::record_external_call;

/// TMDB API client.
pub struct TmdbClient {
    client: Client,
    base_url: String,
    api_key: String,
}

impl TmdbClient {
    /// Create a new TMDB client.
    pub fn new(config: TmdbConfig) -> Result<Self, ServiceError> {
        if config.api_key.is_empty() {
            return Err(ServiceError::Validation(
                "TMDB API key is required".to_string(),
            ));
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs as u64))
            .build()
            .map_err(|e| ServiceError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key,
        })
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        operation: &str,
        path: &str,
        params: &[(&str, String)],
    ) -> Result<T, ServiceError> {
        let started = Instant::now();
        let result = self.send_get(path, params).await;
        record_external_call("tmdb", operation, started, &result, ServiceError::kind);
        result
    }

    async fn send_get<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &[(&str, String)],
    ) -> Result<T, ServiceError> {
        let url = format!("{}{}", self.base_url, path);

        let response = self
            .client
            .get(&url)
            .query(&[("api_key", self.api_key.as_str())])
            .query(params)
            .send()
            .await
            .map_err(|e| ServiceError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ServiceError::remote(status, tmdb_status_message(&body)));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| ServiceError::Transport(e.to_string()))?;
        serde_json::from_slice(&body).map_err(|e| {
            ServiceError::Validation(format!("Failed to parse TMDB response for {}: {}", path, e))
        })
    }

    async fn listing(
        &self,
        operation: &str,
        path: &str,
        page: u32,
        kind: Option<MediaKind>,
    ) -> Result<SearchResults, ServiceError> {
        let raw: RawPage = self
            .get_json(operation, path, &[("page", page.to_string())])
            .await?;
        Ok(raw.normalize(kind))
    }
}

/// Query parameters for a search, in the order they are sent.
///
/// Filters are appended only when present and combine with AND semantics.
pub fn search_params(
    query: &str,
    page: u32,
    filters: &SearchFilters,
) -> Vec<(&'static str, String)> {
    let mut params = vec![("query", query.to_string()), ("page", page.to_string())];

    if let Some(genre) = filters.genre {
        params.push(("with_genres", genre.to_string()));
    }
    if let Some(year) = filters.year {
        params.push(("year", year.to_string()));
    }
    if let Some(rating) = filters.min_rating {
        params.push(("vote_average.gte", rating.to_string()));
    }

    params.push(("include_adult", "false".to_string()));
    params
}

/// Pull `status_message` out of a TMDB error body, falling back to the raw text.
fn tmdb_status_message(body: &str) -> String {
    #[derive(Deserialize)]
    struct ErrorBody {
        status_message: String,
    }

    serde_json::from_str::<ErrorBody>(body)
        .map(|b| b.status_message)
        .unwrap_or_else(|_| body.to_string())
}

#[async_trait]
impl MetadataProvider for TmdbClient {
    async fn search(
        &self,
        query: &str,
        page: u32,
        kind: SearchKind,
        filters: &SearchFilters,
    ) -> Result<SearchResults, ServiceError> {
        debug!(
            "TMDB search: query='{}', page={}, kind={}, filters={:?}",
            query,
            page,
            kind.as_str(),
            filters
        );

        let path = format!("/search/{}", kind.as_str());
        let raw: RawPage = self
            .get_json("search", &path, &search_params(query, page, filters))
            .await?;
        Ok(raw.normalize(kind.fixed_kind()))
    }

    async fn trending(
        &self,
        scope: TrendingScope,
        page: u32,
    ) -> Result<SearchResults, ServiceError> {
        debug!("TMDB trending: scope={}, page={}", scope.as_str(), page);
        let path = format!("/trending/{}/week", scope.as_str());
        self.listing("trending", &path, page, scope.fixed_kind())
            .await
    }

    async fn popular(&self, kind: MediaKind, page: u32) -> Result<SearchResults, ServiceError> {
        debug!("TMDB popular: kind={}, page={}", kind, page);
        let path = format!("/{}/popular", kind);
        self.listing("popular", &path, page, Some(kind)).await
    }

    async fn top_rated(&self, kind: MediaKind, page: u32) -> Result<SearchResults, ServiceError> {
        debug!("TMDB top rated: kind={}, page={}", kind, page);
        let path = format!("/{}/top_rated", kind);
        self.listing("top_rated", &path, page, Some(kind)).await
    }

    async fn now_playing(&self, page: u32) -> Result<SearchResults, ServiceError> {
        debug!("TMDB now playing: page={}", page);
        self.listing("now_playing", "/movie/now_playing", page, Some(MediaKind::Movie))
            .await
    }

    async fn upcoming(&self, page: u32) -> Result<SearchResults, ServiceError> {
        debug!("TMDB upcoming: page={}", page);
        self.listing("upcoming", "/movie/upcoming", page, Some(MediaKind::Movie))
            .await
    }

    async fn details(&self, kind: MediaKind, id: u64) -> Result<MediaDetails, ServiceError> {
        debug!("TMDB details: kind={}, id={}", kind, id);
        let path = format!("/{}/{}", kind, id);
        let raw: RawDetails = self
            .get_json(
                "details",
                &path,
                &[("append_to_response", "credits".to_string())],
            )
            .await?;
        Ok(raw.into_details(kind))
    }

    async fn credits(&self, kind: MediaKind, id: u64) -> Result<Credits, ServiceError> {
        debug!("TMDB credits: kind={}, id={}", kind, id);
        let path = format!("/{}/{}/credits", kind, id);
        self.get_json("credits", &path, &[]).await
    }

    async fn genres(&self, kind: MediaKind) -> Result<Vec<Genre>, ServiceError> {
        debug!("TMDB genres: kind={}", kind);
        let path = format!("/genre/{}/list", kind);
        let raw: RawGenreList = self.get_json("genres", &path, &[]).await?;
        Ok(raw.genres)
    }
}

// ============================================================================
// TMDB API Response Types (private)
// ============================================================================

#[derive(Debug, Deserialize)]
struct RawPage {
    #[serde(default = "first_page")]
    page: u32,
    results: Vec<RawMediaResult>,
    #[serde(default)]
    total_pages: u32,
    #[serde(default)]
    total_results: u32,
}

fn first_page() -> u32 {
    1
}

impl RawPage {
    /// Convert raw results, backfilling the kind. Results that are not movies
    /// or TV shows (e.g. people in a multi search) are dropped.
    fn normalize(self, fixed_kind: Option<MediaKind>) -> SearchResults {
        let results = self
            .results
            .into_iter()
            .filter_map(|r| {
                let kind = match fixed_kind {
                    Some(kind) => kind,
                    None => {
                        let has_title = r.title.as_deref().is_some_and(|t| !t.is_empty());
                        infer_kind(r.media_type.as_deref(), has_title)?
                    }
                };
                Some(r.into_item(kind))
            })
            .collect();

        Page {
            page: self.page,
            results,
            total_pages: self.total_pages,
            total_results: self.total_results,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawMediaResult {
    id: u64,
    #[serde(default)]
    media_type: Option<String>,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    overview: Option<String>,
    #[serde(default)]
    poster_path: Option<String>,
    #[serde(default)]
    backdrop_path: Option<String>,
    #[serde(default)]
    vote_average: Option<f32>,
    #[serde(default)]
    vote_count: Option<u32>,
    #[serde(default)]
    release_date: Option<String>,
    #[serde(default)]
    first_air_date: Option<String>,
    #[serde(default)]
    popularity: Option<f64>,
    #[serde(default)]
    genre_ids: Vec<u32>,
}

impl RawMediaResult {
    fn into_item(self, kind: MediaKind) -> MediaItem {
        MediaItem {
            id: self.id,
            kind,
            title: self
                .title
                .filter(|t| !t.is_empty())
                .or(self.name)
                .unwrap_or_default(),
            overview: self.overview.unwrap_or_default(),
            poster_path: self.poster_path,
            backdrop_path: self.backdrop_path,
            vote_average: self.vote_average.unwrap_or_default(),
            vote_count: self.vote_count.unwrap_or_default(),
            release_date: self.release_date,
            first_air_date: self.first_air_date,
            popularity: self.popularity.unwrap_or_default(),
            genre_ids: self.genre_ids,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawDetails {
    id: u64,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    overview: Option<String>,
    #[serde(default)]
    poster_path: Option<String>,
    #[serde(default)]
    backdrop_path: Option<String>,
    #[serde(default)]
    vote_average: Option<f32>,
    #[serde(default)]
    vote_count: Option<u32>,
    #[serde(default)]
    release_date: Option<String>,
    #[serde(default)]
    first_air_date: Option<String>,
    #[serde(default)]
    popularity: Option<f64>,
    #[serde(default)]
    genres: Vec<Genre>,
    #[serde(default)]
    runtime: Option<u32>,
    #[serde(default)]
    episode_run_time: Vec<u32>,
    #[serde(default)]
    number_of_seasons: Option<u32>,
    #[serde(default)]
    number_of_episodes: Option<u32>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    tagline: Option<String>,
    #[serde(default)]
    production_companies: Vec<ProductionCompany>,
    #[serde(default)]
    production_countries: Vec<ProductionCountry>,
    #[serde(default)]
    spoken_languages: Vec<SpokenLanguage>,
    #[serde(default)]
    budget: Option<u64>,
    #[serde(default)]
    revenue: Option<u64>,
    #[serde(default)]
    homepage: Option<String>,
    #[serde(default)]
    imdb_id: Option<String>,
    #[serde(default)]
    credits: Option<RawCredits>,
}

#[derive(Debug, Deserialize)]
struct RawCredits {
    #[serde(default)]
    cast: Vec<CastMember>,
    #[serde(default)]
    crew: Vec<CrewMember>,
}

#[derive(Debug, Deserialize)]
struct RawGenreList {
    genres: Vec<Genre>,
}

impl RawDetails {
    fn into_details(self, kind: MediaKind) -> MediaDetails {
        let genre_ids = self.genres.iter().map(|g| g.id).collect();
        let runtime = self
            .runtime
            .or_else(|| self.episode_run_time.first().copied());

        MediaDetails {
            item: MediaItem {
                id: self.id,
                kind,
                title: self.title.or(self.name).unwrap_or_default(),
                overview: self.overview.unwrap_or_default(),
                poster_path: self.poster_path,
                backdrop_path: self.backdrop_path,
                vote_average: self.vote_average.unwrap_or_default(),
                vote_count: self.vote_count.unwrap_or_default(),
                release_date: self.release_date,
                first_air_date: self.first_air_date,
                popularity: self.popularity.unwrap_or_default(),
                genre_ids,
            },
            genres: self.genres,
            runtime,
            number_of_seasons: self.number_of_seasons,
            number_of_episodes: self.number_of_episodes,
            status: self.status.unwrap_or_default(),
            tagline: self.tagline.unwrap_or_default(),
            production_companies: self.production_companies,
            production_countries: self.production_countries,
            spoken_languages: self.spoken_languages,
            budget: self.budget.filter(|b| *b > 0),
            revenue: self.revenue.filter(|r| *r > 0),
            homepage: self.homepage.unwrap_or_default(),
            imdb_id: self.imdb_id.filter(|id| !id.is_empty()),
            credits: self.credits.map(|c| Credits {
                cast: c.cast,
                crew: c.crew,
            }),
        }
    }
}
