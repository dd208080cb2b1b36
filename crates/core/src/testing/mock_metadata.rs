//! Mock metadata provider for testing.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::error::ServiceError;
use crate::metadata::{
    Credits, Genre, MediaDetails, MediaItem, MediaKind, MetadataProvider, Page, SearchFilters,
    SearchKind, SearchResults, TrendingScope,
};

/// A recorded metadata query for test assertions.
#[derive(Debug, Clone, PartialEq)]
pub enum RecordedMetadataQuery {
    Search {
        query: String,
        page: u32,
        kind: SearchKind,
        filters: SearchFilters,
    },
    Trending { scope: TrendingScope, page: u32 },
    Popular { kind: MediaKind, page: u32 },
    TopRated { kind: MediaKind, page: u32 },
    NowPlaying { page: u32 },
    Upcoming { page: u32 },
    Details { kind: MediaKind, id: u64 },
    Credits { kind: MediaKind, id: u64 },
    Genres { kind: MediaKind },
}

/// Mock implementation of the MetadataProvider trait.
///
/// Listing endpoints serve the configured items (filtered by kind where the
/// endpoint has one); search additionally matches the query against titles.
#[derive(Debug)]
pub struct MockMetadataProvider {
    items: Arc<RwLock<Vec<MediaItem>>>,
    details: Arc<RwLock<HashMap<(MediaKind, u64), MediaDetails>>>,
    genres: Arc<RwLock<Vec<Genre>>>,
    queries: Arc<RwLock<Vec<RecordedMetadataQuery>>>,
    /// If set, the next operation will fail with this error.
    next_error: Arc<RwLock<Option<ServiceError>>>,
}

impl Default for MockMetadataProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl MockMetadataProvider {
    pub fn new() -> Self {
        Self {
            items: Arc::new(RwLock::new(Vec::new())),
            details: Arc::new(RwLock::new(HashMap::new())),
            genres: Arc::new(RwLock::new(Vec::new())),
            queries: Arc::new(RwLock::new(Vec::new())),
            next_error: Arc::new(RwLock::new(None)),
        }
    }

    /// Items served by listing and search endpoints.
    pub async fn set_results(&self, items: Vec<MediaItem>) {
        *self.items.write().await = items;
    }

    pub async fn add_details(&self, details: MediaDetails) {
        self.details
            .write()
            .await
            .insert((details.item.kind, details.item.id), details);
    }

    pub async fn set_genres(&self, genres: Vec<Genre>) {
        *self.genres.write().await = genres;
    }

    pub async fn set_next_error(&self, error: ServiceError) {
        *self.next_error.write().await = Some(error);
    }

    pub async fn recorded_queries(&self) -> Vec<RecordedMetadataQuery> {
        self.queries.read().await.clone()
    }

    pub async fn clear_recorded(&self) {
        self.queries.write().await.clear();
    }

    async fn begin(&self, query: RecordedMetadataQuery) -> Result<(), ServiceError> {
        self.queries.write().await.push(query);
        match self.next_error.write().await.take() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    async fn page_of(&self, page: u32, keep: impl Fn(&MediaItem) -> bool) -> SearchResults {
        let results: Vec<MediaItem> = self
            .items
            .read()
            .await
            .iter()
            .filter(|item| keep(item))
            .cloned()
            .collect();
        Page {
            page,
            total_pages: 1,
            total_results: results.len() as u32,
            results,
        }
    }

    fn not_found() -> ServiceError {
        ServiceError::RemoteService {
            status: 404,
            message: "The resource you requested could not be found.".to_string(),
        }
    }
}

#[async_trait]
impl MetadataProvider for MockMetadataProvider {
    async fn search(
        &self,
        query: &str,
        page: u32,
        kind: SearchKind,
        filters: &SearchFilters,
    ) -> Result<SearchResults, ServiceError> {
        self.begin(RecordedMetadataQuery::Search {
            query: query.to_string(),
            page,
            kind,
            filters: filters.clone(),
        })
        .await?;

        let needle = query.to_lowercase();
        let fixed = kind.fixed_kind();
        Ok(self
            .page_of(page, |item| {
                item.title.to_lowercase().contains(&needle)
                    && fixed.map_or(true, |k| item.kind == k)
                    && filters.year.map_or(true, |y| item.year() == Some(y))
                    && filters.genre.map_or(true, |g| item.genre_ids.contains(&g))
                    && filters.min_rating.map_or(true, |r| item.vote_average >= r)
            })
            .await)
    }

    async fn trending(
        &self,
        scope: TrendingScope,
        page: u32,
    ) -> Result<SearchResults, ServiceError> {
        self.begin(RecordedMetadataQuery::Trending { scope, page })
            .await?;
        let fixed = scope.fixed_kind();
        Ok(self
            .page_of(page, |item| fixed.map_or(true, |k| item.kind == k))
            .await)
    }

    async fn popular(&self, kind: MediaKind, page: u32) -> Result<SearchResults, ServiceError> {
        self.begin(RecordedMetadataQuery::Popular { kind, page }).await?;
        Ok(self.page_of(page, |item| item.kind == kind).await)
    }

    async fn top_rated(&self, kind: MediaKind, page: u32) -> Result<SearchResults, ServiceError> {
        self.begin(RecordedMetadataQuery::TopRated { kind, page })
            .await?;
        Ok(self.page_of(page, |item| item.kind == kind).await)
    }

    async fn now_playing(&self, page: u32) -> Result<SearchResults, ServiceError> {
        self.begin(RecordedMetadataQuery::NowPlaying { page }).await?;
        Ok(self.page_of(page, |item| item.kind == MediaKind::Movie).await)
    }

    async fn upcoming(&self, page: u32) -> Result<SearchResults, ServiceError> {
        self.begin(RecordedMetadataQuery::Upcoming { page }).await?;
        Ok(self.page_of(page, |item| item.kind == MediaKind::Movie).await)
    }

    async fn details(&self, kind: MediaKind, id: u64) -> Result<MediaDetails, ServiceError> {
        self.begin(RecordedMetadataQuery::Details { kind, id }).await?;
        self.details
            .read()
            .await
            .get(&(kind, id))
            .cloned()
            .ok_or_else(Self::not_found)
    }

    async fn credits(&self, kind: MediaKind, id: u64) -> Result<Credits, ServiceError> {
        self.begin(RecordedMetadataQuery::Credits { kind, id }).await?;
        self.details
            .read()
            .await
            .get(&(kind, id))
            .map(|d| d.credits.clone().unwrap_or_default())
            .ok_or_else(Self::not_found)
    }

    async fn genres(&self, kind: MediaKind) -> Result<Vec<Genre>, ServiceError> {
        self.begin(RecordedMetadataQuery::Genres { kind }).await?;
        Ok(self.genres.read().await.clone())
    }
}
