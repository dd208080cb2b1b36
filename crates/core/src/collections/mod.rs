//! User-owned collections (favorites and watchlist).
//!
//! Every store operation is scoped by an authenticated [`Session`]: rows are
//! read and written for `session.user.id` only.

mod sqlite;
mod supabase;
mod types;

pub use sqlite::SqliteCollectionStore;
pub use supabase::SupabaseCollectionStore;
pub use types::{CollectionEntry, CollectionKind, NewCollectionEntry};

use async_trait::async_trait;

use crate::error::ServiceError;
use crate::session::Session;

/// Trait for collection storage backends.
#[async_trait]
pub trait CollectionStore: Send + Sync {
    /// Insert a row. A second row for the same (user, media id) fails with
    /// [`ServiceError::DuplicateEntry`].
    async fn insert(
        &self,
        session: &Session,
        collection: CollectionKind,
        entry: &NewCollectionEntry,
    ) -> Result<CollectionEntry, ServiceError>;

    /// Delete the row for `media_id`. Deleting an absent row succeeds.
    async fn delete(
        &self,
        session: &Session,
        collection: CollectionKind,
        media_id: u64,
    ) -> Result<(), ServiceError>;

    /// All rows of the user, newest first.
    async fn list(
        &self,
        session: &Session,
        collection: CollectionKind,
    ) -> Result<Vec<CollectionEntry>, ServiceError>;

    /// Whether the user has a row for `media_id`.
    async fn contains(
        &self,
        session: &Session,
        collection: CollectionKind,
        media_id: u64,
    ) -> Result<bool, ServiceError>;
}
