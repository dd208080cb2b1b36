//! Cached catalog browsing: metadata queries and torrent lookups.

use std::sync::Arc;

use crate::cache::{family, QueryCache, QueryKey};
use crate::error::ServiceError;
use crate::metadata::{
    Credits, Genre, MediaDetails, MediaKind, MetadataProvider, SearchFilters, SearchKind,
    SearchResults, TrendingScope,
};
use crate::torrents::{TorrentIndex, TorrentVariant};

/// Metadata and torrent lookups served through the query cache.
pub struct DiscoveryService {
    metadata: Arc<dyn MetadataProvider>,
    torrents: Arc<dyn TorrentIndex>,
    cache: Arc<QueryCache>,
}

fn opt<T: ToString>(value: Option<T>) -> String {
    value.map(|v| v.to_string()).unwrap_or_else(|| "-".to_string())
}

impl DiscoveryService {
    pub fn new(
        metadata: Arc<dyn MetadataProvider>,
        torrents: Arc<dyn TorrentIndex>,
        cache: Arc<QueryCache>,
    ) -> Self {
        Self {
            metadata,
            torrents,
            cache,
        }
    }

    pub fn cache(&self) -> &Arc<QueryCache> {
        &self.cache
    }

    pub async fn search(
        &self,
        query: &str,
        page: u32,
        kind: SearchKind,
        filters: &SearchFilters,
    ) -> Result<SearchResults, ServiceError> {
        let key = QueryKey::new(family::SEARCH)
            .param(kind.as_str())
            .param(query)
            .param(page)
            .param(opt(filters.genre))
            .param(opt(filters.year))
            .param(opt(filters.min_rating));

        let metadata = Arc::clone(&self.metadata);
        let query = query.to_string();
        let filters = filters.clone();
        self.cache
            .fetch(key, self.cache.defaults(), move || async move {
                metadata.search(&query, page, kind, &filters).await
            })
            .await
    }

    pub async fn trending(
        &self,
        scope: TrendingScope,
        page: u32,
    ) -> Result<SearchResults, ServiceError> {
        let key = QueryKey::new(family::TRENDING)
            .param(scope.as_str())
            .param(page);
        let metadata = Arc::clone(&self.metadata);
        self.cache
            .fetch(key, self.cache.defaults(), move || async move {
                metadata.trending(scope, page).await
            })
            .await
    }

    pub async fn popular(&self, kind: MediaKind, page: u32) -> Result<SearchResults, ServiceError> {
        let key = QueryKey::new(family::POPULAR).param(kind).param(page);
        let metadata = Arc::clone(&self.metadata);
        self.cache
            .fetch(key, self.cache.defaults(), move || async move {
                metadata.popular(kind, page).await
            })
            .await
    }

    pub async fn top_rated(
        &self,
        kind: MediaKind,
        page: u32,
    ) -> Result<SearchResults, ServiceError> {
        let key = QueryKey::new(family::TOP_RATED).param(kind).param(page);
        let metadata = Arc::clone(&self.metadata);
        self.cache
            .fetch(key, self.cache.defaults(), move || async move {
                metadata.top_rated(kind, page).await
            })
            .await
    }

    pub async fn now_playing(&self, page: u32) -> Result<SearchResults, ServiceError> {
        let key = QueryKey::new(family::NOW_PLAYING).param(page);
        let metadata = Arc::clone(&self.metadata);
        self.cache
            .fetch(key, self.cache.defaults(), move || async move {
                metadata.now_playing(page).await
            })
            .await
    }

    pub async fn upcoming(&self, page: u32) -> Result<SearchResults, ServiceError> {
        let key = QueryKey::new(family::UPCOMING).param(page);
        let metadata = Arc::clone(&self.metadata);
        self.cache
            .fetch(key, self.cache.defaults(), move || async move {
                metadata.upcoming(page).await
            })
            .await
    }

    pub async fn details(&self, kind: MediaKind, id: u64) -> Result<MediaDetails, ServiceError> {
        let key = QueryKey::new(family::DETAILS).param(kind).param(id);
        let metadata = Arc::clone(&self.metadata);
        self.cache
            .fetch(key, self.cache.defaults(), move || async move {
                metadata.details(kind, id).await
            })
            .await
    }

    pub async fn credits(&self, kind: MediaKind, id: u64) -> Result<Credits, ServiceError> {
        let key = QueryKey::new(family::CREDITS).param(kind).param(id);
        let metadata = Arc::clone(&self.metadata);
        self.cache
            .fetch(key, self.cache.defaults(), move || async move {
                metadata.credits(kind, id).await
            })
            .await
    }

    pub async fn genres(&self, kind: MediaKind) -> Result<Vec<Genre>, ServiceError> {
        let key = QueryKey::new(family::GENRES).param(kind);
        let metadata = Arc::clone(&self.metadata);
        self.cache
            .fetch(key, self.cache.defaults(), move || async move {
                metadata.genres(kind).await
            })
            .await
    }

    /// Torrents for an IMDb id. Never fails; lookup failures yield an empty
    /// list.
    ///
    /// An empty list is not kept: it is indistinguishable from an outage, so
    /// the next call asks the index again.
    pub async fn torrents(&self, imdb_id: &str) -> Vec<TorrentVariant> {
        let key = QueryKey::new(family::TORRENTS).param(imdb_id);
        let torrents = Arc::clone(&self.torrents);
        let external_id = imdb_id.to_string();
        let found: Vec<TorrentVariant> = self
            .cache
            .fetch(key.clone(), self.cache.defaults(), move || async move {
                Ok(torrents.lookup(&external_id).await)
            })
            .await
            .unwrap_or_default();

        if found.is_empty() {
            self.cache.invalidate(&key);
        }
        found
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{fixtures, MockMetadataProvider, MockTorrentIndex};

    fn service(
        metadata: Arc<MockMetadataProvider>,
        torrents: Arc<MockTorrentIndex>,
    ) -> DiscoveryService {
        DiscoveryService::new(metadata, torrents, Arc::new(QueryCache::default()))
    }

    #[tokio::test]
    async fn test_search_is_cached_per_parameters() {
        let metadata = Arc::new(MockMetadataProvider::new());
        metadata
            .set_results(vec![fixtures::movie(268, "Batman")])
            .await;
        let svc = service(metadata.clone(), Arc::new(MockTorrentIndex::new()));

        let filters = SearchFilters::default().with_year(1989);
        let first = svc.search("batman", 1, SearchKind::Multi, &filters).await.unwrap();
        let second = svc.search("batman", 1, SearchKind::Multi, &filters).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(metadata.recorded_queries().await.len(), 1);

        svc.search("batman", 2, SearchKind::Multi, &filters).await.unwrap();
        svc.search("batman", 1, SearchKind::Multi, &SearchFilters::default())
            .await
            .unwrap();
        assert_eq!(metadata.recorded_queries().await.len(), 3);
    }

    #[tokio::test]
    async fn test_errors_propagate() {
        let metadata = Arc::new(MockMetadataProvider::new());
        metadata
            .set_next_error(ServiceError::RemoteService {
                status: 401,
                message: "Invalid API key".into(),
            })
            .await;
        let svc = service(metadata, Arc::new(MockTorrentIndex::new()));

        let err = svc.popular(MediaKind::Movie, 1).await.unwrap_err();
        assert!(matches!(err, ServiceError::RemoteService { status: 401, .. }));
    }

    #[tokio::test]
    async fn test_torrents_cached() {
        let torrents = Arc::new(MockTorrentIndex::new());
        torrents
            .set_torrents("tt0133093", vec![fixtures::torrent("1080p", "ABC")])
            .await;
        let svc = service(Arc::new(MockMetadataProvider::new()), torrents.clone());

        assert_eq!(svc.torrents("tt0133093").await.len(), 1);
        assert_eq!(svc.torrents("tt0133093").await.len(), 1);
        assert_eq!(torrents.lookup_count().await, 1);
    }

    #[tokio::test]
    async fn test_empty_torrent_results_are_not_cached() {
        let torrents = Arc::new(MockTorrentIndex::new());
        let svc = service(Arc::new(MockMetadataProvider::new()), torrents.clone());

        assert!(svc.torrents("tt0000000").await.is_empty());
        assert!(svc.torrents("tt0000000").await.is_empty());
        assert_eq!(torrents.lookup_count().await, 2);

        torrents
            .set_torrents("tt0000000", vec![fixtures::torrent("720p", "DEF")])
            .await;
        assert_eq!(svc.torrents("tt0000000").await.len(), 1);
    }
}
