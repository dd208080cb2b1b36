use std::sync::Arc;

use cinematicdb_core::{
    AuthProvider, CollectionService, CollectionStore, Config, DiscoveryService, ImageUrls,
    QueryCache, SanitizedConfig, Session, TokenVerifier,
};

use crate::api::WsBroadcaster;

/// Shared application state
///
/// Holds no signed-in identity: every protected request brings its own
/// access token, verified through `verifier`.
pub struct AppState {
    config: Config,
    discovery: DiscoveryService,
    store: Arc<dyn CollectionStore>,
    auth: Arc<dyn AuthProvider>,
    verifier: TokenVerifier,
    cache: Arc<QueryCache>,
    images: ImageUrls,
    ws_broadcaster: WsBroadcaster,
}

impl AppState {
    pub fn new(
        config: Config,
        discovery: DiscoveryService,
        store: Arc<dyn CollectionStore>,
        auth: Arc<dyn AuthProvider>,
        cache: Arc<QueryCache>,
        ws_broadcaster: WsBroadcaster,
    ) -> Self {
        let verifier = TokenVerifier::new(Arc::clone(&auth), Arc::clone(&cache), &config.session);
        let images = ImageUrls::new(&config.tmdb.image_base_url);
        Self {
            config,
            discovery,
            store,
            auth,
            verifier,
            cache,
            images,
            ws_broadcaster,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn sanitized_config(&self) -> SanitizedConfig {
        SanitizedConfig::from(&self.config)
    }

    pub fn discovery(&self) -> &DiscoveryService {
        &self.discovery
    }

    /// Collection operations acting as the owner of `session`.
    pub fn collections_for(&self, session: Session) -> CollectionService {
        CollectionService::new(
            Arc::clone(&self.store),
            Arc::new(session),
            Arc::clone(&self.cache),
        )
    }

    pub fn auth(&self) -> &Arc<dyn AuthProvider> {
        &self.auth
    }

    pub fn verifier(&self) -> &TokenVerifier {
        &self.verifier
    }

    pub fn cache(&self) -> &Arc<QueryCache> {
        &self.cache
    }

    pub fn images(&self) -> &ImageUrls {
        &self.images
    }

    pub fn ws_broadcaster(&self) -> &WsBroadcaster {
        &self.ws_broadcaster
    }
}
