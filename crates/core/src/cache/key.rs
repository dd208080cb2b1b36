use std::fmt;
use std::time::Duration;

use crate::config::CacheConfig;

/// Semantic cache key: an operation family, an optional owner scope and the
/// operation's parameters.
///
/// The scope carries the user id for user-owned data so that invalidation can
/// target one user's entries without touching anyone else's.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QueryKey {
    family: String,
    scope: Option<String>,
    params: Vec<String>,
}

impl QueryKey {
    pub fn new(family: impl Into<String>) -> Self {
        Self {
            family: family.into(),
            scope: None,
            params: Vec::new(),
        }
    }

    pub fn scoped(mut self, scope: impl Into<String>) -> Self {
        self.scope = Some(scope.into());
        self
    }

    pub fn param(mut self, param: impl ToString) -> Self {
        self.params.push(param.to_string());
        self
    }

    pub fn family(&self) -> &str {
        &self.family
    }

    pub fn scope(&self) -> Option<&str> {
        self.scope.as_deref()
    }

    pub fn params(&self) -> &[String] {
        &self.params
    }
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.family)?;
        if let Some(scope) = &self.scope {
            write!(f, "[{}]", scope)?;
        }
        for p in &self.params {
            write!(f, "/{}", p)?;
        }
        Ok(())
    }
}

/// Freshness and retention windows for one query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchOptions {
    /// Cached data younger than this is served without refetching.
    pub stale_time: Duration,
    /// Entries not accessed for this long are evicted.
    pub gc_time: Duration,
}

impl FetchOptions {
    pub fn new(stale_time: Duration, gc_time: Duration) -> Self {
        Self {
            stale_time,
            gc_time,
        }
    }

    /// Windows used for collection membership checks.
    pub fn membership() -> Self {
        Self::new(Duration::from_secs(60), Duration::from_secs(5 * 60))
    }
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self::from(&CacheConfig::default())
    }
}

impl From<&CacheConfig> for FetchOptions {
    fn from(config: &CacheConfig) -> Self {
        Self::new(
            Duration::from_secs(config.stale_secs),
            Duration::from_secs(config.gc_secs),
        )
    }
}
