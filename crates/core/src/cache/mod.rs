//! Client-side query cache.
//!
//! Entries are addressed by a semantic [`QueryKey`] and carry their own
//! freshness window. Collection mutations write optimistic values through
//! [`QueryCache::set`] and roll back with [`QueryCache::restore`].

mod key;
mod query_cache;

pub use key::{FetchOptions, QueryKey};
pub use query_cache::{QueryCache, Snapshot};

/// Cache key families.
pub mod family {
    pub const FAVORITES: &str = "favorites";
    pub const IS_FAVORITE: &str = "isFavorite";
    pub const WATCHLIST: &str = "watchlist";
    pub const IS_IN_WATCHLIST: &str = "isInWatchlist";
    pub const SEARCH: &str = "search";
    pub const TRENDING: &str = "trending";
    pub const POPULAR: &str = "popular";
    pub const TOP_RATED: &str = "topRated";
    pub const NOW_PLAYING: &str = "nowPlaying";
    pub const UPCOMING: &str = "upcoming";
    pub const DETAILS: &str = "details";
    pub const CREDITS: &str = "credits";
    pub const GENRES: &str = "genres";
    pub const TORRENTS: &str = "torrents";
    pub const AUTH_USER: &str = "authUser";
}
