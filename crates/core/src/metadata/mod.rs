//! Metadata client for movie and TV listings.
//!
//! All operations are stateless request/response calls. Errors propagate to the
//! caller: a non-success status becomes [`ServiceError::RemoteService`], a
//! network failure becomes [`ServiceError::Transport`].

mod image;
mod tmdb;
mod types;

pub use image::{ImageSize, ImageUrls, PLACEHOLDER_IMAGE};
pub use tmdb::{search_params, TmdbClient};
pub use types::*;

use async_trait::async_trait;

use crate::error::ServiceError;

/// Trait for metadata providers.
///
/// Implemented by [`TmdbClient`] and by the mock in [`crate::testing`].
#[async_trait]
pub trait MetadataProvider: Send + Sync {
    /// Search titles. `filters` are combined with AND semantics.
    async fn search(
        &self,
        query: &str,
        page: u32,
        kind: SearchKind,
        filters: &SearchFilters,
    ) -> Result<SearchResults, ServiceError>;

    /// Weekly trending titles.
    async fn trending(&self, scope: TrendingScope, page: u32)
        -> Result<SearchResults, ServiceError>;

    async fn popular(&self, kind: MediaKind, page: u32) -> Result<SearchResults, ServiceError>;

    async fn top_rated(&self, kind: MediaKind, page: u32) -> Result<SearchResults, ServiceError>;

    /// Movies currently in theaters.
    async fn now_playing(&self, page: u32) -> Result<SearchResults, ServiceError>;

    /// Movies about to be released.
    async fn upcoming(&self, page: u32) -> Result<SearchResults, ServiceError>;

    /// Full details, including credits when the provider can append them.
    async fn details(&self, kind: MediaKind, id: u64) -> Result<MediaDetails, ServiceError>;

    async fn credits(&self, kind: MediaKind, id: u64) -> Result<Credits, ServiceError>;

    async fn genres(&self, kind: MediaKind) -> Result<Vec<Genre>, ServiceError>;
}

/// Work out the kind of a mixed listing result.
///
/// An explicit `movie`/`tv` media type wins. Without one, a movie-style
/// `title` field means `movie` and anything else is `tv`. Any other media type
/// (e.g. `person`) is not a title and yields `None`.
pub fn infer_kind(media_type: Option<&str>, has_title: bool) -> Option<MediaKind> {
    match media_type {
        Some("movie") => Some(MediaKind::Movie),
        Some("tv") => Some(MediaKind::Tv),
        None | Some("") if has_title => Some(MediaKind::Movie),
        None | Some("") => Some(MediaKind::Tv),
        Some(_) => None,
    }
}
