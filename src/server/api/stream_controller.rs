use axum::{
    Extension, Json, Router,
    extract::Query,
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use tracing::{error, info};

use crate::server::{
    dtos::resolver_dto::{StreamQuery, StreamSources},
    error::{AppResult, Error},
    services::{AppServices, resolution_cache_services::ResolutionKey},
};

pub struct StreamController;

impl StreamController {
    pub fn app() -> Router {
        Router::new()
            .route("/m3u8", get(Self::m3u8))
            .route("/fetch-stream", get(Self::fetch_stream))
    }

    // missing or blank ids fall back to the configured defaults
    fn resolution_key(services: &AppServices, query: StreamQuery) -> ResolutionKey {
        let config = &services.config;
        let pick = |value: Option<String>, default: &str| {
            value
                .filter(|v| !v.trim().is_empty())
                .unwrap_or_else(|| default.to_string())
        };

        ResolutionKey::new(
            pick(query.episode_id, &config.default_episode_id),
            pick(query.media_id, &config.default_media_id),
        )
    }

    /// resolve (or reuse) the episode's source and send the player through /proxy for it
    async fn m3u8(
        Extension(services): Extension<AppServices>,
        Query(query): Query<StreamQuery>,
    ) -> AppResult<Response> {
        let key = Self::resolution_key(&services, query);
        let resolver = &services.resolver;
        let key_ref = &key;

        let source_url = services
            .resolution_cache
            .get_or_resolve(key_ref, move || async move {
                let sources = resolver.resolve(key_ref).await?;
                sources
                    .select_variant()
                    .map(|variant| variant.url.clone())
                    .ok_or_else(|| {
                        error!("resolver returned no variants for {}", key_ref);
                        Error::Resolution("no playable source variant".to_string())
                    })
            })
            .await?;

        info!("redirecting {} to {}", key, source_url);

        Ok(Self::redirect_to_proxy(&source_url))
    }

    /// the raw resolver payload, straight from the api every time
    async fn fetch_stream(
        Extension(services): Extension<AppServices>,
        Query(query): Query<StreamQuery>,
    ) -> AppResult<Json<StreamSources>> {
        let key = Self::resolution_key(&services, query);
        info!("[API] Fetching stream data for {}", key);

        let sources = services.resolver.resolve(&key).await?;

        Ok(Json(sources))
    }

    fn redirect_to_proxy(source_url: &str) -> Response {
        let location = format!("/proxy?url={}", urlencoding::encode(source_url));
        (StatusCode::FOUND, [(header::LOCATION, location)]).into_response()
    }
}
