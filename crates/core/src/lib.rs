pub mod cache;
pub mod collections;
pub mod config;
pub mod discovery;
pub mod error;
pub mod library;
pub mod metadata;
pub mod metrics;
pub mod session;
pub mod testing;
pub mod torrents;

mod supabase;

pub use cache::{FetchOptions, QueryCache, QueryKey};
pub use collections::{
    CollectionEntry, CollectionKind, CollectionStore, NewCollectionEntry, SqliteCollectionStore,
    SupabaseCollectionStore,
};
pub use config::{
    load_config, load_config_from_env, load_config_from_str, validate_config, CollectionBackend,
    Config, ConfigError, SanitizedConfig,
};
pub use discovery::DiscoveryService;
pub use error::ServiceError;
pub use library::{CollectionService, OptimisticMutation, Settled};
pub use metadata::{
    ImageSize, ImageUrls, MediaDetails, MediaItem, MediaKind, MetadataProvider, SearchFilters,
    SearchKind, SearchResults, TmdbClient, TrendingScope,
};
pub use session::{
    session_from_callback, AuthProvider, AuthState, FileSessionStorage, GoTrueClient,
    MemorySessionStorage, OAuthProvider, Session, SessionEvent, SessionManager, SessionSource,
    SessionStorage, SignUpOutcome, TokenVerifier, User,
};
pub use torrents::{TorrentIndex, TorrentVariant, YtsClient};
