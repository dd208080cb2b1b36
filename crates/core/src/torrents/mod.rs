//! Torrent listings for movies, looked up by IMDb id.
//!
//! Lookups never fail: torrent data is supplementary, so transport errors,
//! bad statuses and schema mismatches all collapse to an empty list.

mod types;
mod yts;

pub use types::TorrentVariant;
pub use yts::{parse_listing, YtsClient};

use async_trait::async_trait;

/// Trait for torrent indexes.
#[async_trait]
pub trait TorrentIndex: Send + Sync {
    /// Torrents of the first movie matching `external_id`, in upstream order.
    async fn lookup(&self, external_id: &str) -> Vec<TorrentVariant>;
}
