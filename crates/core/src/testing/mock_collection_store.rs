//! Mock collection store for testing.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::collections::{CollectionEntry, CollectionKind, CollectionStore, NewCollectionEntry};
use crate::error::ServiceError;
use crate::session::Session;

type RowKey = (CollectionKind, String, u64);

/// Mock implementation of the CollectionStore trait.
///
/// Enforces the (user, media id) uniqueness of the real tables and counts
/// calls so tests can tell whether a read reached the store.
#[derive(Debug, Default)]
pub struct MockCollectionStore {
    rows: Arc<RwLock<HashMap<RowKey, CollectionEntry>>>,
    next_id: Arc<RwLock<u64>>,
    contains_calls: Arc<RwLock<usize>>,
    /// If set, the next operation will fail with this error.
    next_error: Arc<RwLock<Option<ServiceError>>>,
}

impl MockCollectionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_next_error(&self, error: ServiceError) {
        *self.next_error.write().await = Some(error);
    }

    pub async fn contains_calls(&self) -> usize {
        *self.contains_calls.read().await
    }

    pub async fn row_count(&self) -> usize {
        self.rows.read().await.len()
    }

    async fn check_error(&self) -> Result<(), ServiceError> {
        match self.next_error.write().await.take() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl CollectionStore for MockCollectionStore {
    async fn insert(
        &self,
        session: &Session,
        collection: CollectionKind,
        entry: &NewCollectionEntry,
    ) -> Result<CollectionEntry, ServiceError> {
        self.check_error().await?;
        if entry.user_id != session.user.id {
            return Err(ServiceError::Unauthenticated);
        }

        let key = (collection, entry.user_id.clone(), entry.media_id);
        let mut rows = self.rows.write().await;
        if rows.contains_key(&key) {
            return Err(ServiceError::DuplicateEntry {
                collection,
                media_id: entry.media_id,
            });
        }

        let mut next_id = self.next_id.write().await;
        *next_id += 1;
        let row = CollectionEntry {
            id: next_id.to_string(),
            user_id: entry.user_id.clone(),
            media_id: entry.media_id,
            media_type: entry.media_type,
            title: entry.title.clone(),
            poster_path: entry.poster_path.clone(),
            backdrop_path: entry.backdrop_path.clone(),
            release_date: entry.release_date.clone(),
            vote_average: entry.vote_average,
            created_at: Utc::now(),
        };
        rows.insert(key, row.clone());
        Ok(row)
    }

    async fn delete(
        &self,
        session: &Session,
        collection: CollectionKind,
        media_id: u64,
    ) -> Result<(), ServiceError> {
        self.check_error().await?;
        self.rows
            .write()
            .await
            .remove(&(collection, session.user.id.clone(), media_id));
        Ok(())
    }

    async fn list(
        &self,
        session: &Session,
        collection: CollectionKind,
    ) -> Result<Vec<CollectionEntry>, ServiceError> {
        self.check_error().await?;
        let mut entries: Vec<CollectionEntry> = self
            .rows
            .read()
            .await
            .iter()
            .filter(|((c, user, _), _)| *c == collection && *user == session.user.id)
            .map(|(_, row)| row.clone())
            .collect();
        entries.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.id.len().cmp(&a.id.len()).then_with(|| b.id.cmp(&a.id)))
        });
        Ok(entries)
    }

    async fn contains(
        &self,
        session: &Session,
        collection: CollectionKind,
        media_id: u64,
    ) -> Result<bool, ServiceError> {
        *self.contains_calls.write().await += 1;
        self.check_error().await?;
        Ok(self
            .rows
            .read()
            .await
            .contains_key(&(collection, session.user.id.clone(), media_id)))
    }
}
