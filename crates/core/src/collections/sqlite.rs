//! SQLite-backed collection store for local use.

use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, ErrorCode};
use tracing::debug;

use super::{CollectionEntry, CollectionKind, CollectionStore, NewCollectionEntry};
use crate::error::ServiceError;
use crate::metadata::MediaKind;
use crate::session::Session;

/// SQLite-backed collection store.
pub struct SqliteCollectionStore {
    conn: Mutex<Connection>,
}

impl SqliteCollectionStore {
    /// Open (or create) the database file and tables.
    pub fn new(path: &Path) -> Result<Self, ServiceError> {
        let conn = Connection::open(path).map_err(db_error)?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory store (useful for testing).
    pub fn in_memory() -> Result<Self, ServiceError> {
        let conn = Connection::open_in_memory().map_err(db_error)?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn initialize_schema(conn: &Connection) -> Result<(), ServiceError> {
        for collection in CollectionKind::ALL {
            conn.execute_batch(&format!(
                r#"
                CREATE TABLE IF NOT EXISTS {table} (
                    id TEXT PRIMARY KEY,
                    user_id TEXT NOT NULL,
                    media_id INTEGER NOT NULL,
                    media_type TEXT NOT NULL,
                    title TEXT NOT NULL,
                    poster_path TEXT,
                    backdrop_path TEXT,
                    release_date TEXT,
                    vote_average REAL,
                    created_at TEXT NOT NULL,
                    UNIQUE (user_id, media_id)
                );

                CREATE INDEX IF NOT EXISTS idx_{table}_user_created
                    ON {table}(user_id, created_at DESC);
                "#,
                table = collection.table()
            ))
            .map_err(db_error)?;
        }
        Ok(())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn row_to_entry(row: &rusqlite::Row) -> rusqlite::Result<CollectionEntry> {
        let media_type: String = row.get("media_type")?;
        let created_at: String = row.get("created_at")?;

        let media_type = media_type.parse::<MediaKind>().map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(
                0,
                rusqlite::types::Type::Text,
                Box::new(std::io::Error::new(std::io::ErrorKind::InvalidData, e)),
            )
        })?;
        let created_at = DateTime::parse_from_rfc3339(&created_at)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(
                    0,
                    rusqlite::types::Type::Text,
                    Box::new(e),
                )
            })?;

        Ok(CollectionEntry {
            id: row.get("id")?,
            user_id: row.get("user_id")?,
            media_id: row.get::<_, i64>("media_id")? as u64,
            media_type,
            title: row.get("title")?,
            poster_path: row.get("poster_path")?,
            backdrop_path: row.get("backdrop_path")?,
            release_date: row.get("release_date")?,
            vote_average: row.get::<_, Option<f64>>("vote_average")?.map(|v| v as f32),
            created_at,
        })
    }
}

fn db_error(e: rusqlite::Error) -> ServiceError {
    ServiceError::Transport(format!("database error: {}", e))
}

#[async_trait]
impl CollectionStore for SqliteCollectionStore {
    async fn insert(
        &self,
        session: &Session,
        collection: CollectionKind,
        entry: &NewCollectionEntry,
    ) -> Result<CollectionEntry, ServiceError> {
        // Mirrors the row-level policy of the hosted tables.
        if entry.user_id != session.user.id {
            return Err(ServiceError::Unauthenticated);
        }

        let row = CollectionEntry {
            id: uuid::Uuid::new_v4().to_string(),
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

        let conn = self.lock();
        let result = conn.execute(
            &format!(
                r#"
                INSERT INTO {} (id, user_id, media_id, media_type, title, poster_path,
                                backdrop_path, release_date, vote_average, created_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
                "#,
                collection.table()
            ),
            params![
                row.id,
                row.user_id,
                row.media_id as i64,
                row.media_type.as_str(),
                row.title,
                row.poster_path,
                row.backdrop_path,
                row.release_date,
                row.vote_average.map(f64::from),
                row.created_at.to_rfc3339_opts(SecondsFormat::Micros, true),
            ],
        );

        match result {
            Ok(_) => {
                debug!(
                    "Inserted {} row: user_id={}, media_id={}",
                    collection, row.user_id, row.media_id
                );
                Ok(row)
            }
            Err(rusqlite::Error::SqliteFailure(err, _))
                if err.code == ErrorCode::ConstraintViolation =>
            {
                Err(ServiceError::DuplicateEntry {
                    collection,
                    media_id: entry.media_id,
                })
            }
            Err(e) => Err(db_error(e)),
        }
    }

    async fn delete(
        &self,
        session: &Session,
        collection: CollectionKind,
        media_id: u64,
    ) -> Result<(), ServiceError> {
        let conn = self.lock();
        conn.execute(
            &format!(
                "DELETE FROM {} WHERE user_id = ?1 AND media_id = ?2",
                collection.table()
            ),
            params![session.user.id, media_id as i64],
        )
        .map_err(db_error)?;
        Ok(())
    }

    async fn list(
        &self,
        session: &Session,
        collection: CollectionKind,
    ) -> Result<Vec<CollectionEntry>, ServiceError> {
        let conn = self.lock();
        let mut stmt = conn
            .prepare(&format!(
                "SELECT * FROM {} WHERE user_id = ?1 ORDER BY created_at DESC, rowid DESC",
                collection.table()
            ))
            .map_err(db_error)?;

        let entries = stmt
            .query_map(params![session.user.id], Self::row_to_entry)
            .map_err(db_error)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(db_error)?;
        Ok(entries)
    }

    async fn contains(
        &self,
        session: &Session,
        collection: CollectionKind,
        media_id: u64,
    ) -> Result<bool, ServiceError> {
        let conn = self.lock();
        let count: i64 = conn
            .query_row(
                &format!(
                    "SELECT COUNT(*) FROM {} WHERE user_id = ?1 AND media_id = ?2",
                    collection.table()
                ),
                params![session.user.id, media_id as i64],
                |row| row.get(0),
            )
            .map_err(db_error)?;
        Ok(count > 0)
    }
}
