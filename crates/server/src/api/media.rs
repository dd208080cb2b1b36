//! Media discovery handlers backed by the metadata service.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Deserialize;

use cinematicdb_core::metadata::{Genre, Page};
use cinematicdb_core::{MediaKind, SearchFilters, SearchKind, SearchResults, TrendingScope};

use super::error::ApiError;
use super::views::{page_view, CreditsView, DetailsView, MediaItemView};
use crate::state::AppState;

// ============================================================================
// Request types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct SearchParams {
    pub query: String,
    #[serde(default = "default_page")]
    pub page: u32,
    #[serde(default)]
    pub kind: SearchKind,
    #[serde(default)]
    pub genre: Option<u32>,
    #[serde(default)]
    pub year: Option<u32>,
    #[serde(default)]
    pub min_rating: Option<f32>,
}

impl SearchParams {
    fn filters(&self) -> SearchFilters {
        SearchFilters {
            genre: self.genre,
            year: self.year,
            min_rating: self.min_rating,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct TrendingParams {
    #[serde(default)]
    pub scope: TrendingScope,
    #[serde(default = "default_page")]
    pub page: u32,
}

#[derive(Debug, Deserialize)]
pub struct PageParams {
    #[serde(default = "default_page")]
    pub page: u32,
}

fn default_page() -> u32 {
    1
}

pub(crate) fn parse_kind(kind: &str) -> Result<MediaKind, ApiError> {
    kind.parse::<MediaKind>().map_err(ApiError::bad_request)
}

type PageResponse = Json<Page<MediaItemView>>;

fn page_response(state: &AppState, page: SearchResults) -> PageResponse {
    Json(page_view(page, state.images()))
}

fn check_page(page: u32) -> Result<u32, ApiError> {
    if page == 0 {
        return Err(ApiError::bad_request("page starts at 1"));
    }
    Ok(page)
}

fn movie_only(kind: &str, list: &str) -> Result<(), ApiError> {
    match parse_kind(kind)? {
        MediaKind::Movie => Ok(()),
        MediaKind::Tv => Err(ApiError::bad_request(format!(
            "{} is only available for movies",
            list
        ))),
    }
}

// ============================================================================
// Listings
// ============================================================================

/// GET /api/v1/media/search
///
/// Search movies, TV or both with optional genre/year/rating filters.
pub async fn search(
    State(state): State<Arc<AppState>>,
    Query(params): Query<SearchParams>,
) -> Result<PageResponse, ApiError> {
    let query = params.query.trim();
    if query.is_empty() {
        return Err(ApiError::bad_request("query must not be empty"));
    }
    let page = check_page(params.page)?;

    let results = state
        .discovery()
        .search(query, page, params.kind, &params.filters())
        .await?;
    Ok(page_response(&state, results))
}

/// GET /api/v1/media/trending
pub async fn trending(
    State(state): State<Arc<AppState>>,
    Query(params): Query<TrendingParams>,
) -> Result<PageResponse, ApiError> {
    let page = check_page(params.page)?;
    let results = state.discovery().trending(params.scope, page).await?;
    Ok(page_response(&state, results))
}

/// GET /api/v1/media/{kind}/popular
pub async fn popular(
    State(state): State<Arc<AppState>>,
    Path(kind): Path<String>,
    Query(params): Query<PageParams>,
) -> Result<PageResponse, ApiError> {
    let kind = parse_kind(&kind)?;
    let page = check_page(params.page)?;
    let results = state.discovery().popular(kind, page).await?;
    Ok(page_response(&state, results))
}

/// GET /api/v1/media/{kind}/top-rated
pub async fn top_rated(
    State(state): State<Arc<AppState>>,
    Path(kind): Path<String>,
    Query(params): Query<PageParams>,
) -> Result<PageResponse, ApiError> {
    let kind = parse_kind(&kind)?;
    let page = check_page(params.page)?;
    let results = state.discovery().top_rated(kind, page).await?;
    Ok(page_response(&state, results))
}

/// GET /api/v1/media/movie/now-playing
pub async fn now_playing(
    State(state): State<Arc<AppState>>,
    Path(kind): Path<String>,
    Query(params): Query<PageParams>,
) -> Result<PageResponse, ApiError> {
    movie_only(&kind, "now-playing")?;
    let page = check_page(params.page)?;
    let results = state.discovery().now_playing(page).await?;
    Ok(page_response(&state, results))
}

/// GET /api/v1/media/movie/upcoming
pub async fn upcoming(
    State(state): State<Arc<AppState>>,
    Path(kind): Path<String>,
    Query(params): Query<PageParams>,
) -> Result<PageResponse, ApiError> {
    movie_only(&kind, "upcoming")?;
    let page = check_page(params.page)?;
    let results = state.discovery().upcoming(page).await?;
    Ok(page_response(&state, results))
}

// ============================================================================
// Single title
// ============================================================================

/// GET /api/v1/media/{kind}/{id}
///
/// Full details with credits appended.
pub async fn details(
    State(state): State<Arc<AppState>>,
    Path((kind, id)): Path<(String, u64)>,
) -> Result<Json<DetailsView>, ApiError> {
    let kind = parse_kind(&kind)?;
    let details = state.discovery().details(kind, id).await?;
    Ok(Json(DetailsView::new(details, state.images())))
}

/// GET /api/v1/media/{kind}/{id}/credits
pub async fn credits(
    State(state): State<Arc<AppState>>,
    Path((kind, id)): Path<(String, u64)>,
) -> Result<Json<CreditsView>, ApiError> {
    let kind = parse_kind(&kind)?;
    let credits = state.discovery().credits(kind, id).await?;
    Ok(Json(CreditsView::new(credits, state.images())))
}

/// GET /api/v1/genres/{kind}
pub async fn genres(
    State(state): State<Arc<AppState>>,
    Path(kind): Path<String>,
) -> Result<Json<Vec<Genre>>, ApiError> {
    let kind = parse_kind(&kind)?;
    Ok(Json(state.discovery().genres(kind).await?))
}
