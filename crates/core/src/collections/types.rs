use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::cache::family;
use crate::metadata::{MediaItem, MediaKind};

/// The two user-owned collections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CollectionKind {
    Favorites,
    Watchlist,
}

impl CollectionKind {
    pub const ALL: [CollectionKind; 2] = [CollectionKind::Favorites, CollectionKind::Watchlist];

    /// Backing table name.
    pub fn table(&self) -> &'static str {
        match self {
            CollectionKind::Favorites => "favorites",
            CollectionKind::Watchlist => "watchlist",
        }
    }

    /// Cache family holding the user's full list.
    pub fn list_family(&self) -> &'static str {
        match self {
            CollectionKind::Favorites => family::FAVORITES,
            CollectionKind::Watchlist => family::WATCHLIST,
        }
    }

    /// Cache family holding per-item membership flags.
    pub fn membership_family(&self) -> &'static str {
        match self {
            CollectionKind::Favorites => family::IS_FAVORITE,
            CollectionKind::Watchlist => family::IS_IN_WATCHLIST,
        }
    }
}

impl fmt::Display for CollectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.table())
    }
}

impl FromStr for CollectionKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "favorites" => Ok(CollectionKind::Favorites),
            "watchlist" => Ok(CollectionKind::Watchlist),
            other => Err(format!("unknown collection: {}", other)),
        }
    }
}

/// A stored collection row.
///
/// Display fields are copied from the media item when the row is created and
/// are never refreshed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionEntry {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    pub user_id: String,
    pub media_id: u64,
    pub media_type: MediaKind,
    pub title: String,
    #[serde(default)]
    pub poster_path: Option<String>,
    #[serde(default)]
    pub backdrop_path: Option<String>,
    #[serde(default)]
    pub release_date: Option<String>,
    #[serde(default)]
    pub vote_average: Option<f32>,
    pub created_at: DateTime<Utc>,
}

/// Insert payload for a collection row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewCollectionEntry {
    pub user_id: String,
    pub media_id: u64,
    pub media_type: MediaKind,
    pub title: String,
    #[serde(default)]
    pub poster_path: Option<String>,
    #[serde(default)]
    pub backdrop_path: Option<String>,
    #[serde(default)]
    pub release_date: Option<String>,
    #[serde(default)]
    pub vote_average: Option<f32>,
}

impl NewCollectionEntry {
    /// Denormalize a media item for `user_id`.
    pub fn from_media(user_id: impl Into<String>, item: &MediaItem) -> Self {
        let title = if item.title.trim().is_empty() {
            "Unknown".to_string()
        } else {
            item.title.clone()
        };

        Self {
            user_id: user_id.into(),
            media_id: item.id,
            media_type: item.kind,
            title,
            poster_path: item.poster_path.clone(),
            backdrop_path: item.backdrop_path.clone(),
            release_date: item.date().map(str::to_string),
            vote_average: Some(item.vote_average),
        }
    }
}

fn string_or_number<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Id {
        Str(String),
        Num(i64),
    }

    Ok(match Id::deserialize(deserializer)? {
        Id::Str(s) => s,
        Id::Num(n) => n.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(title: &str) -> MediaItem {
        serde_json::from_value(serde_json::json!({
            "id": 1396,
            "media_type": "tv",
            "title": title,
            "overview": "",
            "poster_path": "/p.jpg",
            "backdrop_path": null,
            "vote_average": 8.9,
            "vote_count": 100,
            "first_air_date": "2008-01-20",
            "popularity": 1.0,
            "genre_ids": []
        }))
        .unwrap()
    }

    #[test]
    fn test_from_media_denormalizes() {
        let entry = NewCollectionEntry::from_media("u1", &item("Breaking Bad"));
        assert_eq!(entry.user_id, "u1");
        assert_eq!(entry.media_id, 1396);
        assert_eq!(entry.media_type, MediaKind::Tv);
        assert_eq!(entry.title, "Breaking Bad");
        assert_eq!(entry.release_date.as_deref(), Some("2008-01-20"));
        assert_eq!(entry.poster_path.as_deref(), Some("/p.jpg"));
    }

    #[test]
    fn test_from_media_title_fallback() {
        let entry = NewCollectionEntry::from_media("u1", &item(""));
        assert_eq!(entry.title, "Unknown");
    }

    #[test]
    fn test_entry_accepts_numeric_id() {
        let entry: CollectionEntry = serde_json::from_value(serde_json::json!({
            "id": 17,
            "user_id": "u1",
            "media_id": 603,
            "media_type": "movie",
            "title": "The Matrix",
            "poster_path": null,
            "backdrop_path": null,
            "release_date": "1999-03-31",
            "vote_average": 8.2,
            "created_at": "2024-05-01T10:00:00.123456+00:00"
        }))
        .unwrap();
        assert_eq!(entry.id, "17");
        assert_eq!(entry.media_type, MediaKind::Movie);
    }

    #[test]
    fn test_collection_kind_names() {
        assert_eq!(CollectionKind::Watchlist.to_string(), "watchlist");
        assert_eq!(CollectionKind::Favorites.membership_family(), "isFavorite");
        assert_eq!(
            "watchlist".parse::<CollectionKind>(),
            Ok(CollectionKind::Watchlist)
        );
    }
}
