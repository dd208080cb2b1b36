use serde::{Deserialize, Serialize};

/// One downloadable release of a movie.
///
/// Every field is required: a record missing any of them fails validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TorrentVariant {
    /// Download URL of the .torrent file.
    pub url: String,
    /// Info hash.
    pub hash: String,
    /// Quality label, e.g. "1080p".
    pub quality: String,
    /// Release type label, e.g. "bluray" or "web".
    #[serde(rename = "type")]
    pub release_type: String,
    pub seeds: u32,
    pub peers: u32,
    /// Human readable size, e.g. "1.9 GB".
    pub size: String,
    pub size_bytes: u64,
    pub date_uploaded: String,
    pub date_uploaded_unix: i64,
}

impl TorrentVariant {
    /// Magnet link built from the info hash.
    pub fn magnet_uri(&self, title: &str) -> String {
        format!(
            "magnet:?xt=urn:btih:{}&dn={}",
            self.hash,
            urlencoding::encode(title)
        )
    }
}
