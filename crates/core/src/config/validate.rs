use super::{types::Config, ConfigError};

/// Validate configuration.
///
/// Missing credentials abort startup here instead of failing on first use.
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.tmdb.api_key.trim().is_empty() {
        return Err(ConfigError::ValidationError(
            "tmdb.api_key is required (set CINEMATICDB_TMDB__API_KEY)".to_string(),
        ));
    }

    if config.supabase.url.trim().is_empty() {
        return Err(ConfigError::ValidationError(
            "supabase.url is required (set CINEMATICDB_SUPABASE__URL)".to_string(),
        ));
    }

    if !config.supabase.url.starts_with("http://") && !config.supabase.url.starts_with("https://")
    {
        return Err(ConfigError::ValidationError(format!(
            "supabase.url must be an http(s) URL, got '{}'",
            config.supabase.url
        )));
    }

    if config.supabase.anon_key.trim().is_empty() {
        return Err(ConfigError::ValidationError(
            "supabase.anon_key is required (set CINEMATICDB_SUPABASE__ANON_KEY)".to_string(),
        ));
    }

    if config.server.port == 0 {
        return Err(ConfigError::ValidationError(
            "server.port cannot be 0".to_string(),
        ));
    }

    if config.cache.stale_secs == 0 || config.cache.gc_secs == 0 {
        return Err(ConfigError::ValidationError(
            "cache.stale_secs and cache.gc_secs must be positive".to_string(),
        ));
    }

    if config.cache.gc_secs < config.cache.stale_secs {
        return Err(ConfigError::ValidationError(
            "cache.gc_secs must not be shorter than cache.stale_secs".to_string(),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::load_config_from_str;

    fn valid() -> Config {
        load_config_from_str(
            r#"
[tmdb]
api_key = "tmdb-key"

[supabase]
url = "https://project.supabase.co"
anon_key = "anon-key"
"#,
        )
        .unwrap()
    }

    #[test]
    fn test_validate_valid_config() {
        assert!(validate_config(&valid()).is_ok());
    }

    #[test]
    fn test_validate_empty_api_key_fails() {
        let mut config = valid();
        config.tmdb.api_key = "  ".to_string();
        let err = validate_config(&config).unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(_)));
        assert!(err.to_string().contains("tmdb.api_key"));
    }

    #[test]
    fn test_validate_missing_anon_key_fails() {
        let mut config = valid();
        config.supabase.anon_key = String::new();
        let err = validate_config(&config).unwrap_err();
        assert!(err.to_string().contains("supabase.anon_key"));
    }

    #[test]
    fn test_validate_bad_supabase_url_fails() {
        let mut config = valid();
        config.supabase.url = "project.supabase.co".to_string();
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_validate_port_zero_fails() {
        let mut config = valid();
        config.server.port = 0;
        assert!(matches!(
            validate_config(&config),
            Err(ConfigError::ValidationError(_))
        ));
    }

    #[test]
    fn test_validate_cache_windows() {
        let mut config = valid();
        config.cache.gc_secs = 10;
        config.cache.stale_secs = 60;
        assert!(validate_config(&config).is_err());
    }
}
