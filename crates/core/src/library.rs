//! Collection operations for the signed-in user, with optimistic updates.
//!
//! A mutation runs in two phases. [`CollectionService::prepare_add`] and
//! [`CollectionService::prepare_remove`] write the expected membership into
//! the cache right away and hand back an [`OptimisticMutation`]. Settling it
//! performs the remote call: success invalidates the user's cached lists and
//! membership flags, failure restores what the cache held before. A mutation
//! dropped without being settled is rolled back.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::cache::{FetchOptions, QueryCache, QueryKey, Snapshot};
use crate::collections::{CollectionEntry, CollectionKind, CollectionStore, NewCollectionEntry};
use crate::error::ServiceError;
use crate::metrics::COLLECTION_MUTATIONS;
use crate::session::{Session, SessionSource};

/// Cache key of a membership flag.
pub fn membership_key(collection: CollectionKind, user_id: &str, media_id: u64) -> QueryKey {
    QueryKey::new(collection.membership_family())
        .scoped(user_id)
        .param(media_id)
}

/// Cache key of a user's full list.
pub fn list_key(collection: CollectionKind, user_id: &str) -> QueryKey {
    QueryKey::new(collection.list_family()).scoped(user_id)
}

/// User-facing collection operations.
///
/// Every call acts with the session `sessions` supplies at that moment: the
/// long-lived [`SessionManager`](crate::session::SessionManager) of a client,
/// or a single verified [`Session`] for one server request.
pub struct CollectionService {
    store: Arc<dyn CollectionStore>,
    sessions: Arc<dyn SessionSource>,
    cache: Arc<QueryCache>,
}

impl CollectionService {
    pub fn new(
        store: Arc<dyn CollectionStore>,
        sessions: Arc<dyn SessionSource>,
        cache: Arc<QueryCache>,
    ) -> Self {
        Self {
            store,
            sessions,
            cache,
        }
    }

    /// The current session, provided it belongs to `user_id`.
    fn session_for(&self, user_id: &str) -> Result<Session, ServiceError> {
        let session = self
            .sessions
            .current_session()
            .ok_or(ServiceError::Unauthenticated)?;
        if session.user.id != user_id {
            debug!(
                "Rejecting collection access: session user {} != {}",
                session.user.id, user_id
            );
            return Err(ServiceError::Unauthenticated);
        }
        Ok(session)
    }

    /// Whether `media_id` is in the user's collection. Absent rows are `false`.
    pub async fn is_member(
        &self,
        collection: CollectionKind,
        user_id: &str,
        media_id: u64,
    ) -> Result<bool, ServiceError> {
        let session = self.session_for(user_id)?;
        let store = Arc::clone(&self.store);
        self.cache
            .fetch(
                membership_key(collection, user_id, media_id),
                FetchOptions::membership(),
                move || async move { store.contains(&session, collection, media_id).await },
            )
            .await
    }

    /// The user's collection, newest first.
    pub async fn list(
        &self,
        collection: CollectionKind,
        user_id: &str,
    ) -> Result<Vec<CollectionEntry>, ServiceError> {
        let session = self.session_for(user_id)?;
        let store = Arc::clone(&self.store);
        self.cache
            .fetch(
                list_key(collection, user_id),
                self.cache.defaults(),
                move || async move { store.list(&session, collection).await },
            )
            .await
    }

    /// Optimistically mark `entry` as a member and return the pending mutation.
    pub fn prepare_add(
        &self,
        collection: CollectionKind,
        entry: NewCollectionEntry,
    ) -> Result<OptimisticMutation, ServiceError> {
        let session = self.session_for(&entry.user_id)?;
        let key = membership_key(collection, &entry.user_id, entry.media_id);
        Ok(self.prepare(session, collection, key, Operation::Add(entry)))
    }

    /// Optimistically mark `media_id` as not a member and return the pending
    /// mutation.
    pub fn prepare_remove(
        &self,
        collection: CollectionKind,
        user_id: &str,
        media_id: u64,
    ) -> Result<OptimisticMutation, ServiceError> {
        let session = self.session_for(user_id)?;
        let key = membership_key(collection, user_id, media_id);
        Ok(self.prepare(session, collection, key, Operation::Remove(media_id)))
    }

    fn prepare(
        &self,
        session: Session,
        collection: CollectionKind,
        key: QueryKey,
        operation: Operation,
    ) -> OptimisticMutation {
        let snapshot = self.cache.snapshot(&key);
        self.cache.set(key.clone(), operation.desired_membership());
        debug!(key = %key, "Applied optimistic {}", operation.name());

        OptimisticMutation {
            store: Arc::clone(&self.store),
            cache: Arc::clone(&self.cache),
            session,
            collection,
            key,
            snapshot: Some(snapshot),
            operation,
        }
    }

    /// Add an entry. A duplicate fails with [`ServiceError::DuplicateEntry`].
    pub async fn add(
        &self,
        collection: CollectionKind,
        entry: NewCollectionEntry,
    ) -> Result<CollectionEntry, ServiceError> {
        match self.prepare_add(collection, entry)?.settle().await? {
            Settled::Added(entry) => Ok(entry),
            Settled::Removed => Err(ServiceError::Validation(
                "add settled as a removal".to_string(),
            )),
        }
    }

    /// Remove an entry. Removing an absent entry succeeds.
    pub async fn remove(
        &self,
        collection: CollectionKind,
        user_id: &str,
        media_id: u64,
    ) -> Result<(), ServiceError> {
        self.prepare_remove(collection, user_id, media_id)?
            .settle()
            .await
            .map(|_| ())
    }
}

#[derive(Debug)]
enum Operation {
    Add(NewCollectionEntry),
    Remove(u64),
}

impl Operation {
    fn desired_membership(&self) -> bool {
        matches!(self, Operation::Add(_))
    }

    fn name(&self) -> &'static str {
        match self {
            Operation::Add(_) => "add",
            Operation::Remove(_) => "remove",
        }
    }
}

/// Outcome of a settled mutation.
#[derive(Debug, Clone, PartialEq)]
pub enum Settled {
    Added(CollectionEntry),
    Removed,
}

/// A collection change applied to the cache but not yet to the store.
#[must_use = "an unsettled mutation is rolled back when dropped"]
pub struct OptimisticMutation {
    store: Arc<dyn CollectionStore>,
    cache: Arc<QueryCache>,
    session: Session,
    collection: CollectionKind,
    key: QueryKey,
    /// Taken once the mutation is settled or rolled back.
    snapshot: Option<Snapshot>,
    operation: Operation,
}

impl OptimisticMutation {
    pub fn collection(&self) -> CollectionKind {
        self.collection
    }

    /// Membership the cache currently shows for this mutation.
    pub fn optimistic_value(&self) -> bool {
        self.operation.desired_membership()
    }

    /// Perform the remote call and reconcile the cache with its outcome.
    pub async fn settle(mut self) -> Result<Settled, ServiceError> {
        let result = match &self.operation {
            Operation::Add(entry) => self
                .store
                .insert(&self.session, self.collection, entry)
                .await
                .map(Settled::Added),
            Operation::Remove(media_id) => self
                .store
                .delete(&self.session, self.collection, *media_id)
                .await
                .map(|_| Settled::Removed),
        };

        let operation = self.operation.name();
        match &result {
            Ok(_) => {
                self.snapshot = None;
                self.cache.invalidate_scope(
                    &[
                        self.collection.list_family(),
                        self.collection.membership_family(),
                    ],
                    &self.session.user.id,
                );
                self.cache
                    .set(self.key.clone(), self.operation.desired_membership());
                COLLECTION_MUTATIONS
                    .with_label_values(&[self.collection.table(), operation, "committed"])
                    .inc();
                debug!(key = %self.key, "Committed {}", operation);
            }
            Err(e) => {
                self.rollback();
                if matches!(e, ServiceError::DuplicateEntry { .. }) {
                    // The row exists after all; let the next read find out.
                    self.cache.invalidate(&self.key);
                }
                warn!(key = %self.key, "Rolled back {}: {}", operation, e);
            }
        }

        result
    }

    fn rollback(&mut self) {
        if let Some(snapshot) = self.snapshot.take() {
            self.cache.restore(self.key.clone(), snapshot);
            COLLECTION_MUTATIONS
                .with_label_values(&[self.collection.table(), self.operation.name(), "rolled_back"])
                .inc();
        }
    }
}

impl Drop for OptimisticMutation {
    fn drop(&mut self) {
        if self.snapshot.is_some() {
            debug!(key = %self.key, "Dropping unsettled mutation");
            self.rollback();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collections::SqliteCollectionStore;
    use crate::config::SessionConfig;
    use crate::session::{MemorySessionStorage, SessionManager};
    use crate::testing::{fixtures, MockAuthProvider, MockCollectionStore};

    async fn signed_in(user: &str) -> Arc<SessionManager> {
        let sessions = Arc::new(SessionManager::new(
            Arc::new(MockAuthProvider::new()),
            Arc::new(MemorySessionStorage::new()),
            &SessionConfig::default(),
        ));
        sessions
            .sign_in(&format!("{}@example.com", user), "secret")
            .await
            .unwrap();
        sessions
    }

    fn entry(user: &str, media_id: u64) -> NewCollectionEntry {
        NewCollectionEntry::from_media(user, &fixtures::movie(media_id, "Inception"))
    }

    #[tokio::test]
    async fn test_add_then_is_member() {
        let store = Arc::new(SqliteCollectionStore::in_memory().unwrap());
        let service = CollectionService::new(
            store,
            signed_in("alice").await,
            Arc::new(QueryCache::default()),
        );

        assert!(!service.is_member(CollectionKind::Favorites, "alice", 27205).await.unwrap());
        service.add(CollectionKind::Favorites, entry("alice", 27205)).await.unwrap();
        assert!(service.is_member(CollectionKind::Favorites, "alice", 27205).await.unwrap());

        let list = service.list(CollectionKind::Favorites, "alice").await.unwrap();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].title, "Inception");
    }

    #[tokio::test]
    async fn test_optimistic_value_visible_before_settle() {
        let store = Arc::new(MockCollectionStore::new());
        let cache = Arc::new(QueryCache::default());
        let service = CollectionService::new(store.clone(), signed_in("alice").await, cache);

        let mutation = service
            .prepare_add(CollectionKind::Watchlist, entry("alice", 1))
            .unwrap();
        assert!(service.is_member(CollectionKind::Watchlist, "alice", 1).await.unwrap());
        assert_eq!(store.contains_calls().await, 0);

        mutation.settle().await.unwrap();
        assert!(service.is_member(CollectionKind::Watchlist, "alice", 1).await.unwrap());
    }

    #[tokio::test]
    async fn test_failed_settle_restores_previous_value() {
        let store = Arc::new(MockCollectionStore::new());
        let cache = Arc::new(QueryCache::default());
        let service =
            CollectionService::new(store.clone(), signed_in("alice").await, cache.clone());

        assert!(!service.is_member(CollectionKind::Favorites, "alice", 5).await.unwrap());

        store
            .set_next_error(ServiceError::Transport("connection reset".into()))
            .await;
        let err = service
            .add(CollectionKind::Favorites, entry("alice", 5))
            .await
            .unwrap_err();
        assert_eq!(err, ServiceError::Transport("connection reset".into()));
        assert_eq!(
            cache.peek::<bool>(&membership_key(CollectionKind::Favorites, "alice", 5)),
            Some(false)
        );
    }

    #[tokio::test]
    async fn test_dropped_mutation_rolls_back() {
        let store = Arc::new(MockCollectionStore::new());
        let cache = Arc::new(QueryCache::default());
        let service = CollectionService::new(store, signed_in("alice").await, cache.clone());
        let key = membership_key(CollectionKind::Favorites, "alice", 8);

        let mutation = service
            .prepare_add(CollectionKind::Favorites, entry("alice", 8))
            .unwrap();
        assert_eq!(cache.peek::<bool>(&key), Some(true));
        drop(mutation);
        assert_eq!(cache.peek::<bool>(&key), None);
    }

    #[tokio::test]
    async fn test_remove_absent_entry_succeeds() {
        let store = Arc::new(SqliteCollectionStore::in_memory().unwrap());
        let service = CollectionService::new(
            store,
            signed_in("alice").await,
            Arc::new(QueryCache::default()),
        );

        service.remove(CollectionKind::Watchlist, "alice", 404).await.unwrap();
        assert!(!service.is_member(CollectionKind::Watchlist, "alice", 404).await.unwrap());
    }

    #[tokio::test]
    async fn test_success_invalidates_cached_list() {
        let store = Arc::new(SqliteCollectionStore::in_memory().unwrap());
        let cache = Arc::new(QueryCache::default());
        let service = CollectionService::new(store, signed_in("alice").await, cache.clone());

        assert!(service.list(CollectionKind::Favorites, "alice").await.unwrap().is_empty());
        service.add(CollectionKind::Favorites, entry("alice", 3)).await.unwrap();
        assert_eq!(service.list(CollectionKind::Favorites, "alice").await.unwrap().len(), 1);

        service.remove(CollectionKind::Favorites, "alice", 3).await.unwrap();
        assert!(service.list(CollectionKind::Favorites, "alice").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_add_is_rejected_and_membership_refetched() {
        let store = Arc::new(SqliteCollectionStore::in_memory().unwrap());
        let cache = Arc::new(QueryCache::default());
        let service = CollectionService::new(store, signed_in("alice").await, cache.clone());

        service.add(CollectionKind::Favorites, entry("alice", 3)).await.unwrap();
        cache.remove(&membership_key(CollectionKind::Favorites, "alice", 3));

        let err = service
            .add(CollectionKind::Favorites, entry("alice", 3))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::DuplicateEntry { media_id: 3, .. }));
        assert!(service.is_member(CollectionKind::Favorites, "alice", 3).await.unwrap());
    }

    #[tokio::test]
    async fn test_other_users_data_is_unauthenticated() {
        let store = Arc::new(MockCollectionStore::new());
        let service = CollectionService::new(
            store,
            signed_in("alice").await,
            Arc::new(QueryCache::default()),
        );

        assert_eq!(
            service.list(CollectionKind::Favorites, "bob").await.unwrap_err(),
            ServiceError::Unauthenticated
        );
        assert!(service
            .prepare_add(CollectionKind::Favorites, entry("bob", 1))
            .is_err());
    }

    #[tokio::test]
    async fn test_request_session_acts_only_as_its_user() {
        let store = Arc::new(SqliteCollectionStore::in_memory().unwrap());
        let cache = Arc::new(QueryCache::default());
        let alice = CollectionService::new(
            store.clone(),
            Arc::new(fixtures::session("alice")),
            cache.clone(),
        );
        let bob = CollectionService::new(store, Arc::new(fixtures::session("bob")), cache);

        alice
            .add(CollectionKind::Favorites, entry("alice", 550))
            .await
            .unwrap();

        assert!(!bob
            .is_member(CollectionKind::Favorites, "bob", 550)
            .await
            .unwrap());
        assert_eq!(
            bob.list(CollectionKind::Favorites, "alice").await.unwrap_err(),
            ServiceError::Unauthenticated
        );
        assert!(matches!(
            bob.add(CollectionKind::Favorites, entry("alice", 1)).await,
            Err(ServiceError::Unauthenticated)
        ));
    }
}
