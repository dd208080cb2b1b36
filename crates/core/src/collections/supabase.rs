//! Collection store backed by Supabase PostgREST tables.

use std::time::Instant;

use async_trait::async_trait;
use reqwest::{Method, Response, StatusCode};
use tracing::debug;

use super::{CollectionEntry, CollectionKind, CollectionStore, NewCollectionEntry};
use crate::config::SupabaseConfig;
use crate::error::ServiceError;
use crate::metrics::record_external_call;
use crate::session::Session;
use crate::supabase::{read_json, send, ErrorBody, SupabaseHttp};

const UNIQUE_VIOLATION: &str = "23505";

/// PostgREST client for the `favorites` and `watchlist` tables.
///
/// The tables, their `UNIQUE (user_id, media_id)` constraints and the
/// row-level security policies are created by
/// `supabase/migrations/20240601000000_collections.sql`. Requests carry the
/// user's access token, so those policies enforce the per-user scoping on the
/// server as well.
pub struct SupabaseCollectionStore {
    http: SupabaseHttp,
}

impl SupabaseCollectionStore {
    pub fn new(config: &SupabaseConfig) -> Result<Self, ServiceError> {
        Ok(Self {
            http: SupabaseHttp::new(config)?,
        })
    }

    fn path(collection: CollectionKind) -> String {
        format!("/rest/v1/{}", collection.table())
    }

    async fn check(
        response: Response,
        collection: CollectionKind,
        media_id: Option<u64>,
    ) -> Result<Response, ServiceError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = ErrorBody::parse(&response.text().await.unwrap_or_default());
        Err(map_error(status, &body, collection, media_id))
    }

    async fn timed<T>(
        operation: &str,
        fut: impl std::future::Future<Output = Result<T, ServiceError>>,
    ) -> Result<T, ServiceError> {
        let started = Instant::now();
        let result = fut.await;
        record_external_call("supabase", operation, started, &result, ServiceError::kind);
        result
    }
}

fn map_error(
    status: StatusCode,
    body: &ErrorBody,
    collection: CollectionKind,
    media_id: Option<u64>,
) -> ServiceError {
    let duplicate = status == StatusCode::CONFLICT || body.pg_code() == Some(UNIQUE_VIOLATION);
    match (duplicate, media_id) {
        (true, Some(media_id)) => ServiceError::DuplicateEntry {
            collection,
            media_id,
        },
        _ if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN => {
            ServiceError::Unauthenticated
        }
        _ => ServiceError::remote(status, body.message()),
    }
}

#[async_trait]
impl CollectionStore for SupabaseCollectionStore {
    async fn insert(
        &self,
        session: &Session,
        collection: CollectionKind,
        entry: &NewCollectionEntry,
    ) -> Result<CollectionEntry, ServiceError> {
        debug!(
            "Supabase insert: collection={}, user_id={}, media_id={}",
            collection, entry.user_id, entry.media_id
        );

        Self::timed("insert", async {
            let request = self
                .http
                .request(Method::POST, &Self::path(collection), Some(&session.access_token))
                .header("Prefer", "return=representation")
                .json(entry);
            let response =
                Self::check(send(request).await?, collection, Some(entry.media_id)).await?;

            let mut rows: Vec<CollectionEntry> = read_json(response).await?;
            if rows.is_empty() {
                return Err(ServiceError::Validation(
                    "insert returned no representation".to_string(),
                ));
            }
            Ok(rows.swap_remove(0))
        })
        .await
    }

    async fn delete(
        &self,
        session: &Session,
        collection: CollectionKind,
        media_id: u64,
    ) -> Result<(), ServiceError> {
        debug!(
            "Supabase delete: collection={}, user_id={}, media_id={}",
            collection, session.user.id, media_id
        );

        Self::timed("delete", async {
            let request = self
                .http
                .request(Method::DELETE, &Self::path(collection), Some(&session.access_token))
                .query(&[
                    ("user_id", format!("eq.{}", session.user.id)),
                    ("media_id", format!("eq.{}", media_id)),
                ]);
            Self::check(send(request).await?, collection, None).await?;
            Ok(())
        })
        .await
    }

    async fn list(
        &self,
        session: &Session,
        collection: CollectionKind,
    ) -> Result<Vec<CollectionEntry>, ServiceError> {
        debug!(
            "Supabase list: collection={}, user_id={}",
            collection, session.user.id
        );

        Self::timed("list", async {
            let request = self
                .http
                .request(Method::GET, &Self::path(collection), Some(&session.access_token))
                .query(&[
                    ("select", "*".to_string()),
                    ("user_id", format!("eq.{}", session.user.id)),
                    ("order", "created_at.desc".to_string()),
                ]);
            let response = Self::check(send(request).await?, collection, None).await?;
            read_json(response).await
        })
        .await
    }

    async fn contains(
        &self,
        session: &Session,
        collection: CollectionKind,
        media_id: u64,
    ) -> Result<bool, ServiceError> {
        Self::timed("contains", async {
            let request = self
                .http
                .request(Method::GET, &Self::path(collection), Some(&session.access_token))
                .query(&[
                    ("select", "id".to_string()),
                    ("user_id", format!("eq.{}", session.user.id)),
                    ("media_id", format!("eq.{}", media_id)),
                    ("limit", "1".to_string()),
                ]);
            let response = Self::check(send(request).await?, collection, None).await?;
            let rows: Vec<serde_json::Value> = read_json(response).await?;
            Ok(!rows.is_empty())
        })
        .await
    }
}
