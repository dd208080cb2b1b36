//! Testing utilities and mock implementations.
//!
//! Mocks stand in for every remote seam (metadata, torrents, identity,
//! collection storage) so services and the HTTP layer can be exercised
//! without network access.
//!
//! # Example
//!
//! ```rust,ignore
//! use cinematicdb_core::testing::{fixtures, MockMetadataProvider, MockTorrentIndex};
//!
//! let metadata = MockMetadataProvider::new();
//! metadata.set_results(vec![fixtures::movie(603, "The Matrix")]).await;
//!
//! let torrents = MockTorrentIndex::new();
//! torrents.set_torrents("tt0133093", vec![fixtures::torrent("1080p", "ABC")]).await;
//! ```

mod mock_auth;
mod mock_collection_store;
mod mock_metadata;
mod mock_torrent_index;

pub use mock_auth::MockAuthProvider;
pub use mock_collection_store::MockCollectionStore;
pub use mock_metadata::{MockMetadataProvider, RecordedMetadataQuery};
pub use mock_torrent_index::MockTorrentIndex;

/// Test fixtures and helper functions.
pub mod fixtures {
    use chrono::{Duration, Utc};

    use crate::metadata::{
        CastMember, Credits, CrewMember, Genre, MediaDetails, MediaItem, MediaKind,
    };
    use crate::session::{Session, User};
    use crate::torrents::TorrentVariant;

    /// Create a test movie listing item.
    pub fn movie(id: u64, title: &str) -> MediaItem {
        MediaItem {
            id,
            kind: MediaKind::Movie,
            title: title.to_string(),
            overview: format!("A movie about {}.", title.to_lowercase()),
            poster_path: Some("/poster.jpg".to_string()),
            backdrop_path: Some("/backdrop.jpg".to_string()),
            vote_average: 7.5,
            vote_count: 1000,
            release_date: Some("2010-07-16".to_string()),
            first_air_date: None,
            popularity: 50.0,
            genre_ids: vec![28, 878],
        }
    }

    /// Create a test TV listing item.
    pub fn tv(id: u64, name: &str) -> MediaItem {
        MediaItem {
            id,
            kind: MediaKind::Tv,
            title: name.to_string(),
            overview: format!("A series about {}.", name.to_lowercase()),
            poster_path: Some("/poster.jpg".to_string()),
            backdrop_path: None,
            vote_average: 8.0,
            vote_count: 500,
            release_date: None,
            first_air_date: Some("2008-01-20".to_string()),
            popularity: 80.0,
            genre_ids: vec![18],
        }
    }

    /// Create a test detail record with credits for `item`.
    pub fn details(item: MediaItem, imdb_id: Option<&str>) -> MediaDetails {
        MediaDetails {
            item,
            genres: vec![Genre {
                id: 18,
                name: "Drama".to_string(),
            }],
            runtime: Some(148),
            number_of_seasons: None,
            number_of_episodes: None,
            status: "Released".to_string(),
            tagline: "Your mind is the scene of the crime.".to_string(),
            production_companies: Vec::new(),
            production_countries: Vec::new(),
            spoken_languages: Vec::new(),
            budget: Some(160_000_000),
            revenue: Some(836_800_000),
            homepage: String::new(),
            imdb_id: imdb_id.map(str::to_string),
            credits: Some(Credits {
                cast: vec![CastMember {
                    id: 6193,
                    name: "Leonardo DiCaprio".to_string(),
                    character: "Cobb".to_string(),
                    profile_path: None,
                    order: 0,
                }],
                crew: vec![CrewMember {
                    id: 525,
                    name: "Christopher Nolan".to_string(),
                    job: "Director".to_string(),
                    department: "Directing".to_string(),
                    profile_path: None,
                }],
            }),
        }
    }

    /// Create a test torrent.
    pub fn torrent(quality: &str, hash: &str) -> TorrentVariant {
        TorrentVariant {
            url: format!("https://yts.mx/torrent/download/{}", hash),
            hash: hash.to_string(),
            quality: quality.to_string(),
            release_type: "bluray".to_string(),
            seeds: 100,
            peers: 10,
            size: "1.9 GB".to_string(),
            size_bytes: 2_040_109_466,
            date_uploaded: "2015-11-01 00:00:00".to_string(),
            date_uploaded_unix: 1_446_336_000,
        }
    }

    pub fn user(id: &str) -> User {
        User {
            id: id.to_string(),
            email: Some(format!("{}@example.com", id)),
            user_metadata: serde_json::Value::Null,
        }
    }

    /// Create a session valid for an hour, using the same token scheme as
    /// [`MockAuthProvider`](super::MockAuthProvider).
    pub fn session(user_id: &str) -> Session {
        Session {
            access_token: format!("tok-{}", user_id),
            refresh_token: format!("refresh-{}", user_id),
            token_type: "bearer".to_string(),
            expires_at: Utc::now() + Duration::hours(1),
            user: user(user_id),
        }
    }

    /// Create a session that expired a minute ago.
    pub fn expired_session(user_id: &str) -> Session {
        let mut session = session(user_id);
        session.expires_at = Utc::now() - Duration::minutes(1);
        session
    }
}
