//! Error taxonomy shared by the metadata, torrent and collection clients.

use thiserror::Error;

use crate::collections::CollectionKind;

/// Errors surfaced by remote service operations.
///
/// The type is `Clone` so that a single failed fetch can be handed to every
/// caller waiting on the same in-flight cache entry.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ServiceError {
    /// Network, DNS or timeout failure before a response was received.
    #[error("Transport error: {0}")]
    Transport(String),

    /// The remote service answered with a non-success status.
    #[error("Remote service error: {status} - {message}")]
    RemoteService { status: u16, message: String },

    /// The operation requires a signed-in user and there is none.
    #[error("Authentication required")]
    Unauthenticated,

    /// The response did not match the expected shape.
    #[error("Unexpected response shape: {0}")]
    Validation(String),

    /// An entry for this media item already exists in the collection.
    #[error("Media {media_id} is already in {collection}")]
    DuplicateEntry {
        collection: CollectionKind,
        media_id: u64,
    },
}

impl ServiceError {
    /// Build a `RemoteService` error from a status code and response body.
    pub fn remote(status: reqwest::StatusCode, message: impl Into<String>) -> Self {
        let message = message.into();
        let message = if message.is_empty() {
            status
                .canonical_reason()
                .unwrap_or("unknown status")
                .to_string()
        } else {
            message
        };
        ServiceError::RemoteService {
            status: status.as_u16(),
            message,
        }
    }

    /// Short label used for metrics and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            ServiceError::Transport(_) => "transport",
            ServiceError::RemoteService { .. } => "remote",
            ServiceError::Unauthenticated => "unauthenticated",
            ServiceError::Validation(_) => "validation",
            ServiceError::DuplicateEntry { .. } => "duplicate",
        }
    }
}

impl From<reqwest::Error> for ServiceError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            ServiceError::Validation(e.to_string())
        } else if let Some(status) = e.status() {
            ServiceError::RemoteService {
                status: status.as_u16(),
                message: e.to_string(),
            }
        } else {
            ServiceError::Transport(e.to_string())
        }
    }
}
