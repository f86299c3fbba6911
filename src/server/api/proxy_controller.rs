use axum::{
    Extension, Router,
    extract::Query,
    http::{HeaderMap, HeaderValue, header},
    response::{IntoResponse, Response},
    routing::get,
};
use serde::Deserialize;
use tracing::{debug, error, info};
use url::Url;

use crate::server::{
    error::{AppResult, Error},
    services::AppServices,
    utils::{
        content_encoding::ContentEncoding,
        manifest_rewriter::{self, ProxyOrigin},
    },
};

const MANIFEST_EXTENSION: &str = ".m3u8";
const MANIFEST_CONTENT_TYPE: &str = "application/vnd.apple.mpegurl";

#[derive(Deserialize)]
struct ProxyQuery {
    url: Option<String>,
}

/// one inbound /proxy call
#[derive(Debug, Clone)]
pub struct ProxyRequest {
    pub target_url: Url,
    pub is_manifest: bool,
}

impl ProxyRequest {
    /// `url` comes in already percent decoded by the query extractor
    pub fn parse(url_param: Option<&str>) -> AppResult<Self> {
        let raw = url_param
            .map(str::trim)
            .filter(|url| !url.is_empty())
            .ok_or_else(|| Error::BadRequest("Missing url parameter".to_string()))?;

        let target_url = Url::parse(raw).map_err(|e| {
            debug!("unparseable target {:?}: {}", raw, e);
            Error::BadRequest("Invalid url parameter".to_string())
        })?;

        if target_url.scheme() != "http" && target_url.scheme() != "https" {
            return Err(Error::BadRequest("Invalid url parameter".to_string()));
        }

        // only the path decides, tokens in the query string can end in anything
        let is_manifest = target_url
            .path()
            .to_ascii_lowercase()
            .ends_with(MANIFEST_EXTENSION);

        Ok(Self {
            target_url,
            is_manifest,
        })
    }
}

/// a rewritten playlist, already encoded for the player that asked for it
pub struct ManifestResponse {
    pub body: Vec<u8>,
    pub encoding: ContentEncoding,
}

impl IntoResponse for ManifestResponse {
    fn into_response(self) -> Response {
        let mut response = (
            [
                (header::CONTENT_TYPE, HeaderValue::from_static(MANIFEST_CONTENT_TYPE)),
                // live playlists change every target duration
                (header::CACHE_CONTROL, HeaderValue::from_static("no-cache")),
                (header::VARY, HeaderValue::from_static("accept-encoding")),
            ],
            self.body,
        )
            .into_response();

        if let Some(value) = self.encoding.header_value() {
            response.headers_mut().insert(header::CONTENT_ENCODING, value);
        }

        response
    }
}

pub struct ProxyController;

impl ProxyController {
    pub fn app() -> Router {
        Router::new().route("/proxy", get(Self::proxy_get))
    }

    async fn proxy_get(
        Extension(services): Extension<AppServices>,
        origin: ProxyOrigin,
        Query(params): Query<ProxyQuery>,
        headers: HeaderMap,
    ) -> AppResult<Response> {
        let request = ProxyRequest::parse(params.url.as_deref())?;

        info!(
            "[Proxy] Fetching ({}): {}",
            if request.is_manifest { "manifest" } else { "passthrough" },
            request.target_url
        );

        if request.is_manifest {
            let manifest = services
                .forwarder
                .fetch_manifest(&request.target_url)
                .await?;

            let base = manifest_rewriter::base_url(&request.target_url);
            let rewritten = manifest_rewriter::rewrite(&manifest, &base, &origin)?;
            debug!(
                "rewrote manifest against {} ({} -> {} bytes)",
                base,
                manifest.len(),
                rewritten.len()
            );

            let encoding = ContentEncoding::negotiate(&headers);
            let body = encoding.encode(rewritten.into_bytes()).map_err(|e| {
                error!("failed to encode manifest as {:?}: {}", encoding, e);
                Error::Proxy("failed to compress manifest".to_string())
            })?;

            Ok(ManifestResponse { body, encoding }.into_response())
        } else {
            services
                .forwarder
                .relay(&request.target_url, headers.get(header::RANGE))
                .await
        }
    }
}
