//! Favorites and watchlist handlers for the caller's own collections.
//!
//! Routes are mounted behind the auth middleware; each handler acts as the
//! user the bearer token belongs to and nobody else.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;
use tracing::debug;

use cinematicdb_core::{CollectionKind, MediaItem, NewCollectionEntry};

use super::error::ApiError;
use super::middleware::AuthUser;
use super::views::CollectionEntryView;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct MembershipResponse {
    pub collection: CollectionKind,
    pub media_id: u64,
    pub member: bool,
}

fn parse_collection(collection: &str) -> Result<CollectionKind, ApiError> {
    collection
        .parse::<CollectionKind>()
        .map_err(ApiError::bad_request)
}

/// GET /api/v1/collections/{collection}
///
/// Newest first.
pub async fn list_collection(
    State(state): State<Arc<AppState>>,
    AuthUser(session): AuthUser,
    Path(collection): Path<String>,
) -> Result<Json<Vec<CollectionEntryView>>, ApiError> {
    let collection = parse_collection(&collection)?;
    let user_id = session.user.id.clone();
    let entries = state
        .collections_for(session)
        .list(collection, &user_id)
        .await?;
    let images = state.images();
    Ok(Json(
        entries
            .into_iter()
            .map(|entry| CollectionEntryView::new(entry, images))
            .collect(),
    ))
}

/// POST /api/v1/collections/{collection}
///
/// Body is the media item as returned by the listing endpoints.
pub async fn add_to_collection(
    State(state): State<Arc<AppState>>,
    AuthUser(session): AuthUser,
    Path(collection): Path<String>,
    Json(item): Json<MediaItem>,
) -> Result<(StatusCode, Json<CollectionEntryView>), ApiError> {
    let collection = parse_collection(&collection)?;
    let user_id = session.user.id.clone();

    let entry = NewCollectionEntry::from_media(&user_id, &item);
    let created = state.collections_for(session).add(collection, entry).await?;
    debug!(%collection, %user_id, media_id = item.id, "Added to collection");
    state
        .ws_broadcaster()
        .collection_changed(&user_id, collection, item.id, true);

    Ok((
        StatusCode::CREATED,
        Json(CollectionEntryView::new(created, state.images())),
    ))
}

/// GET /api/v1/collections/{collection}/{media_id}
pub async fn get_membership(
    State(state): State<Arc<AppState>>,
    AuthUser(session): AuthUser,
    Path((collection, media_id)): Path<(String, u64)>,
) -> Result<Json<MembershipResponse>, ApiError> {
    let collection = parse_collection(&collection)?;
    let user_id = session.user.id.clone();
    let member = state
        .collections_for(session)
        .is_member(collection, &user_id, media_id)
        .await?;
    Ok(Json(MembershipResponse {
        collection,
        media_id,
        member,
    }))
}

/// DELETE /api/v1/collections/{collection}/{media_id}
///
/// Removing an item that is not in the collection succeeds.
pub async fn remove_from_collection(
    State(state): State<Arc<AppState>>,
    AuthUser(session): AuthUser,
    Path((collection, media_id)): Path<(String, u64)>,
) -> Result<StatusCode, ApiError> {
    let collection = parse_collection(&collection)?;
    let user_id = session.user.id.clone();

    state
        .collections_for(session)
        .remove(collection, &user_id, media_id)
        .await?;
    debug!(%collection, %user_id, media_id, "Removed from collection");
    state
        .ws_broadcaster()
        .collection_changed(&user_id, collection, media_id, false);

    Ok(StatusCode::NO_CONTENT)
}
