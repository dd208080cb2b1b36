use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use super::middleware::{auth_middleware, metrics_middleware};
use super::{auth, collections, handlers, media, torrents, ws};
use crate::state::AppState;

pub fn create_router(state: Arc<AppState>) -> Router {
    // Routes acting on the caller's own data need a valid bearer token
    let protected_routes = Router::new()
        .route("/auth/sign-out", post(auth::sign_out))
        // Favorites and watchlist
        .route(
            "/collections/{collection}",
            get(collections::list_collection).post(collections::add_to_collection),
        )
        .route(
            "/collections/{collection}/{media_id}",
            get(collections::get_membership).delete(collections::remove_from_collection),
        )
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    // API routes
    let api_routes = Router::new()
        // Health and config
        .route("/health", get(handlers::health))
        .route("/config", get(handlers::get_config))
        // Discovery
        .route("/media/search", get(media::search))
        .route("/media/trending", get(media::trending))
        .route("/media/{kind}/popular", get(media::popular))
        .route("/media/{kind}/top-rated", get(media::top_rated))
        .route("/media/{kind}/now-playing", get(media::now_playing))
        .route("/media/{kind}/upcoming", get(media::upcoming))
        .route("/media/{kind}/{id}", get(media::details))
        .route("/media/{kind}/{id}/credits", get(media::credits))
        .route("/genres/{kind}", get(media::genres))
        // Torrents (never fails, empty when unavailable)
        .route("/torrents/{imdb_id}", get(torrents::list_torrents))
        // Session
        .route("/auth/session", get(auth::get_session))
        .route("/auth/sign-in", post(auth::sign_in))
        .route("/auth/sign-up", post(auth::sign_up))
        .route("/auth/refresh", post(auth::refresh))
        .route("/auth/oauth/{provider}", get(auth::oauth_url))
        .route("/auth/callback", post(auth::oauth_callback))
        // Live updates (authenticates the upgrade itself)
        .route("/ws", get(ws::ws_handler))
        .merge(protected_routes)
        .with_state(state);

    Router::new()
        .nest("/api/v1", api_routes)
        .route("/metrics", get(handlers::metrics))
        .layer(middleware::from_fn(metrics_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}
