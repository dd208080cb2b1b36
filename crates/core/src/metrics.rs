//! Prometheus metrics for core components.
//!
//! This module provides metrics for:
//! - External services (TMDB, Supabase, YTS)
//! - Query cache (hits, misses, shared in-flight fetches, evictions)
//! - Collection mutations and rollbacks

use once_cell::sync::Lazy;
use prometheus::{HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts};

// =============================================================================
// External Services
// =============================================================================

/// External service request duration.
pub static EXTERNAL_SERVICE_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "cinematicdb_external_service_duration_seconds",
            "Duration of external service calls",
        )
        .buckets(vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]),
        &["service", "operation"],
    )
    .unwrap()
});

/// External service requests total.
pub static EXTERNAL_SERVICE_REQUESTS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "cinematicdb_external_service_requests_total",
            "Total external service requests",
        ),
        &["service", "operation", "status"], // status: "success" or an error kind
    )
    .unwrap()
});

/// Torrent lookups that fell back to an empty list.
pub static TORRENT_LOOKUP_SOFT_FAILURES: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "cinematicdb_torrent_lookup_soft_failures_total",
            "Torrent lookups answered with an empty list after a failure",
        ),
        &["reason"], // "transport", "status", "schema"
    )
    .unwrap()
});

// =============================================================================
// Query Cache
// =============================================================================

/// Cache lookups by key family and outcome.
pub static CACHE_LOOKUPS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("cinematicdb_cache_lookups_total", "Query cache lookups"),
        &["family", "result"], // "hit", "miss", "joined"
    )
    .unwrap()
});

/// Completed fetches whose result was discarded as superseded.
pub static CACHE_DISCARDED_WRITES: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "cinematicdb_cache_discarded_writes_total",
        "Fetch results discarded because newer data was already cached",
    )
    .unwrap()
});

/// Entries evicted by garbage collection.
pub static CACHE_EVICTIONS: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "cinematicdb_cache_evictions_total",
        "Query cache entries evicted after the gc window",
    )
    .unwrap()
});

// =============================================================================
// Collections
// =============================================================================

/// Collection mutations by collection, operation and result.
pub static COLLECTION_MUTATIONS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "cinematicdb_collection_mutations_total",
            "Favorite and watchlist mutations",
        ),
        &["collection", "operation", "result"], // result: "committed", "rolled_back"
    )
    .unwrap()
});

/// Get all core metrics for registration.
pub fn all_metrics() -> Vec<Box<dyn prometheus::core::Collector>> {
    vec![
        // External services
        Box::new(EXTERNAL_SERVICE_DURATION.clone()),
        Box::new(EXTERNAL_SERVICE_REQUESTS.clone()),
        Box::new(TORRENT_LOOKUP_SOFT_FAILURES.clone()),
        // Cache
        Box::new(CACHE_LOOKUPS.clone()),
        Box::new(CACHE_DISCARDED_WRITES.clone()),
        Box::new(CACHE_EVICTIONS.clone()),
        // Collections
        Box::new(COLLECTION_MUTATIONS.clone()),
    ]
}

/// Record the outcome of one external call.
pub(crate) fn record_external_call<T, E>(
    service: &str,
    operation: &str,
    started: std::time::Instant,
    result: &Result<T, E>,
    error_kind: impl Fn(&E) -> &'static str,
) {
    EXTERNAL_SERVICE_DURATION
        .with_label_values(&[service, operation])
        .observe(started.elapsed().as_secs_f64());
    let status = match result {
        Ok(_) => "success",
        Err(e) => error_kind(e),
    };
    EXTERNAL_SERVICE_REQUESTS
        .with_label_values(&[service, operation, status])
        .inc();
}
