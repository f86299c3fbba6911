use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::config::AppConfig;

use super::{
    forwarder_services::{DynStreamForwarder, StreamForwarder},
    resolution_cache_services::{DynResolutionCache, ResolutionCache},
    resolver_services::{ConsumetResolverClient, DynResolverClient},
};

/// everything a handler can reach, built once at startup and handed out through an Extension.
/// nothing in here is global so tests can build as many isolated copies as they want
#[derive(Clone)]
pub struct AppServices {
    pub resolution_cache: DynResolutionCache,
    pub resolver: DynResolverClient,
    pub forwarder: DynStreamForwarder,
    pub config: Arc<AppConfig>,
}

impl AppServices {
    pub fn new(config: Arc<AppConfig>) -> Self {
        info!("starting relay services...");

        let upstream_timeout = Duration::from_secs(config.upstream_timeout_secs);

        let resolver = Arc::new(ConsumetResolverClient::new(
            &config.resolver_base_url,
            &config.preferred_server,
            upstream_timeout,
        )) as DynResolverClient;

        let resolution_cache = Arc::new(ResolutionCache::new(
            Duration::from_secs(config.resolution_ttl_secs),
            config.resolution_cache_capacity,
            upstream_timeout,
        ));

        Self::with_parts(config, resolver, resolution_cache)
    }

    /// same as `new` but with the resolver and cache supplied by the caller
    pub fn with_parts(
        config: Arc<AppConfig>,
        resolver: DynResolverClient,
        resolution_cache: DynResolutionCache,
    ) -> Self {
        let forwarder = Arc::new(StreamForwarder::new(&config));

        info!("resolver, cache and forwarder ok");

        Self {
            resolution_cache,
            resolver,
            forwarder,
            config,
        }
    }
}
