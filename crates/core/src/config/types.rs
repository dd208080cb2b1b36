use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::path::PathBuf;

/// Root configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub tmdb: TmdbConfig,
    pub supabase: SupabaseConfig,
    #[serde(default)]
    pub yts: YtsConfig,
    #[serde(default)]
    pub collections: CollectionsConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: IpAddr,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> IpAddr {
    IpAddr::from([0, 0, 0, 0])
}

fn default_port() -> u16 {
    8080
}

/// TMDB metadata service configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TmdbConfig {
    /// TMDB v3 API key (required)
    pub api_key: String,
    #[serde(default = "default_tmdb_base_url")]
    pub base_url: String,
    /// Image CDN base, joined with a size token and the relative path
    #[serde(default = "default_tmdb_image_base_url")]
    pub image_base_url: String,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u32,
}

fn default_tmdb_base_url() -> String {
    "https://api.themoviedb.org/3".to_string()
}

fn default_tmdb_image_base_url() -> String {
    "https://image.tmdb.org/t/p".to_string()
}

/// Supabase project configuration (auth + REST tables)
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SupabaseConfig {
    /// Project URL, e.g. "https://xyz.supabase.co"
    pub url: String,
    /// Public anon key, sent as the `apikey` header
    pub anon_key: String,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u32,
}

/// YTS torrent index configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct YtsConfig {
    #[serde(default = "default_yts_base_url")]
    pub base_url: String,
    #[serde(default = "default_yts_timeout")]
    pub timeout_secs: u32,
}

impl Default for YtsConfig {
    fn default() -> Self {
        Self {
            base_url: default_yts_base_url(),
            timeout_secs: default_yts_timeout(),
        }
    }
}

fn default_yts_base_url() -> String {
    "https://yts.mx/api/v2".to_string()
}

fn default_yts_timeout() -> u32 {
    15
}

fn default_timeout() -> u32 {
    30
}

/// Where favorites and watchlist rows live
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CollectionBackend {
    #[default]
    Supabase,
    Sqlite,
}

/// Collection store configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CollectionsConfig {
    #[serde(default)]
    pub backend: CollectionBackend,
    /// Database file for the sqlite backend
    #[serde(default = "default_sqlite_path")]
    pub sqlite_path: PathBuf,
}

impl Default for CollectionsConfig {
    fn default() -> Self {
        Self {
            backend: CollectionBackend::default(),
            sqlite_path: default_sqlite_path(),
        }
    }
}

fn default_sqlite_path() -> PathBuf {
    PathBuf::from("cinematicdb.db")
}

/// Session refresh and token verification configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SessionConfig {
    /// How long a verified access token is trusted before the identity
    /// provider is asked again
    #[serde(default = "default_token_cache_secs")]
    pub token_cache_secs: u64,
    /// Refresh the access token this many seconds before it expires
    #[serde(default = "default_refresh_margin")]
    pub refresh_margin_secs: u64,
    /// Redirect target handed to the OAuth provider
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub oauth_redirect_url: Option<String>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            token_cache_secs: default_token_cache_secs(),
            refresh_margin_secs: default_refresh_margin(),
            oauth_redirect_url: None,
        }
    }
}

fn default_token_cache_secs() -> u64 {
    30
}

fn default_refresh_margin() -> u64 {
    60
}

/// Query cache windows
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CacheConfig {
    /// Entries older than this are refetched on next read
    #[serde(default = "default_stale_secs")]
    pub stale_secs: u64,
    /// Entries unused for this long are evicted
    #[serde(default = "default_gc_secs")]
    pub gc_secs: u64,
    /// How often the eviction sweep runs
    #[serde(default = "default_gc_interval_secs")]
    pub gc_interval_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            stale_secs: default_stale_secs(),
            gc_secs: default_gc_secs(),
            gc_interval_secs: default_gc_interval_secs(),
        }
    }
}

fn default_stale_secs() -> u64 {
    60
}

fn default_gc_secs() -> u64 {
    300
}

fn default_gc_interval_secs() -> u64 {
    60
}

/// Sanitized config for API responses (secrets redacted)
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedConfig {
    pub tmdb: SanitizedTmdbConfig,
    pub supabase: SanitizedSupabaseConfig,
    pub yts: YtsConfig,
    pub collections: CollectionsConfig,
    pub cache: CacheConfig,
    pub server: ServerConfig,
}

/// Sanitized TMDB config (API key hidden)
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedTmdbConfig {
    pub base_url: String,
    pub image_base_url: String,
    pub api_key_configured: bool,
}

/// Sanitized Supabase config (anon key hidden)
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedSupabaseConfig {
    pub url: String,
    pub anon_key_configured: bool,
}

impl From<&Config> for SanitizedConfig {
    fn from(config: &Config) -> Self {
        Self {
            tmdb: SanitizedTmdbConfig {
                base_url: config.tmdb.base_url.clone(),
                image_base_url: config.tmdb.image_base_url.clone(),
                api_key_configured: !config.tmdb.api_key.is_empty(),
            },
            supabase: SanitizedSupabaseConfig {
                url: config.supabase.url.clone(),
                anon_key_configured: !config.supabase.anon_key.is_empty(),
            },
            yts: config.yts.clone(),
            collections: config.collections.clone(),
            cache: config.cache.clone(),
            server: config.server.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal() -> &'static str {
        r#"
[tmdb]
api_key = "tmdb-key"

[supabase]
url = "https://project.supabase.co"
anon_key = "anon-key"
"#
    }

    #[test]
    fn test_deserialize_defaults() {
        let config: Config = toml::from_str(minimal()).unwrap();
        assert_eq!(config.tmdb.base_url, "https://api.themoviedb.org/3");
        assert_eq!(config.tmdb.image_base_url, "https://image.tmdb.org/t/p");
        assert_eq!(config.yts.base_url, "https://yts.mx/api/v2");
        assert_eq!(config.collections.backend, CollectionBackend::Supabase);
        assert_eq!(config.cache.stale_secs, 60);
        assert_eq!(config.cache.gc_secs, 300);
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.host.to_string(), "0.0.0.0");
        assert!(config.session.oauth_redirect_url.is_none());
        assert_eq!(config.session.token_cache_secs, 30);
    }

    #[test]
    fn test_deserialize_missing_supabase_fails() {
        let toml = r#"
[tmdb]
api_key = "tmdb-key"
"#;
        let result: Result<Config, _> = toml::from_str(toml);
        assert!(result.is_err());
    }

    #[test]
    fn test_deserialize_sqlite_backend() {
        let toml = format!(
            "{}\n[collections]\nbackend = \"sqlite\"\nsqlite_path = \"/data/lists.db\"\n",
            minimal()
        );
        let config: Config = toml::from_str(&toml).unwrap();
        assert_eq!(config.collections.backend, CollectionBackend::Sqlite);
        assert_eq!(
            config.collections.sqlite_path.to_str().unwrap(),
            "/data/lists.db"
        );
    }

    #[test]
    fn test_sanitized_config_hides_secrets() {
        let config: Config = toml::from_str(minimal()).unwrap();
        let sanitized = SanitizedConfig::from(&config);
        assert!(sanitized.tmdb.api_key_configured);
        assert!(sanitized.supabase.anon_key_configured);

        let json = serde_json::to_string(&sanitized).unwrap();
        assert!(!json.contains("tmdb-key"));
        assert!(!json.contains("anon-key"));
    }
}
