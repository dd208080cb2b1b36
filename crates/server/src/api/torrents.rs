//! Torrent listing handler. Lookups never fail; an unavailable index
//! yields an empty list.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::{Deserialize, Serialize};

use cinematicdb_core::TorrentVariant;

use super::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct TorrentParams {
    /// Display name used for the magnet links.
    #[serde(default)]
    pub title: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct TorrentEntry {
    #[serde(flatten)]
    pub variant: TorrentVariant,
    pub magnet: String,
}

#[derive(Debug, Serialize)]
pub struct TorrentListing {
    pub imdb_id: String,
    pub torrents: Vec<TorrentEntry>,
}

/// GET /api/v1/torrents/{imdb_id}
pub async fn list_torrents(
    State(state): State<Arc<AppState>>,
    Path(imdb_id): Path<String>,
    Query(params): Query<TorrentParams>,
) -> Result<Json<TorrentListing>, ApiError> {
    let imdb_id = imdb_id.trim().to_string();
    if imdb_id.is_empty() {
        return Err(ApiError::bad_request("imdb id must not be empty"));
    }

    let title = params.title.unwrap_or_else(|| imdb_id.clone());
    let torrents = state
        .discovery()
        .torrents(&imdb_id)
        .await
        .into_iter()
        .map(|variant| TorrentEntry {
            magnet: variant.magnet_uri(&title),
            variant,
        })
        .collect();

    Ok(Json(TorrentListing { imdb_id, torrents }))
}
