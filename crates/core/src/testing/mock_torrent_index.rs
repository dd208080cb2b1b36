//! Mock torrent index for testing.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::torrents::{TorrentIndex, TorrentVariant};

/// Mock implementation of the TorrentIndex trait.
///
/// Unknown ids yield an empty list, matching the soft-failure contract.
#[derive(Debug, Default)]
pub struct MockTorrentIndex {
    torrents: Arc<RwLock<HashMap<String, Vec<TorrentVariant>>>>,
    lookups: Arc<RwLock<Vec<String>>>,
}

impl MockTorrentIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_torrents(&self, external_id: &str, torrents: Vec<TorrentVariant>) {
        self.torrents
            .write()
            .await
            .insert(external_id.to_string(), torrents);
    }

    /// Ids looked up so far, in call order.
    pub async fn recorded_lookups(&self) -> Vec<String> {
        self.lookups.read().await.clone()
    }

    pub async fn lookup_count(&self) -> usize {
        self.lookups.read().await.len()
    }
}

#[async_trait]
impl TorrentIndex for MockTorrentIndex {
    async fn lookup(&self, external_id: &str) -> Vec<TorrentVariant> {
        self.lookups.write().await.push(external_id.to_string());
        self.torrents
            .read()
            .await
            .get(external_id)
            .cloned()
            .unwrap_or_default()
    }
}
