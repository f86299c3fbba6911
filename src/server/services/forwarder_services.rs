use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    http::{HeaderValue, header},
    response::Response,
};
use futures::TryStreamExt;
use tracing::{debug, error, warn};
use url::Url;

use crate::{
    config::AppConfig,
    server::{
        error::{AppResult, Error},
        utils::content_encoding::ContentEncoding,
    },
};

// headers copied from the upstream segment response onto ours
const RELAYED_HEADERS: [header::HeaderName; 5] = [
    header::CONTENT_TYPE,
    header::CONTENT_LENGTH,
    header::CONTENT_RANGE,
    header::ACCEPT_RANGES,
    header::CONTENT_ENCODING,
];

pub type DynStreamForwarder = Arc<StreamForwarder>;

/// fetches from the media host dressed up as the embed page
pub struct StreamForwarder {
    http: reqwest::Client,
    user_agent: String,
    referer: String,
    origin: String,
    // until response headers arrive, and for the whole body on manifests. segment bodies aren't
    // capped since a slow player is allowed to take its time reading them
    timeout: Duration,
}

impl StreamForwarder {
    pub fn new(config: &AppConfig) -> Self {
        let timeout = Duration::from_secs(config.upstream_timeout_secs);

        let http = reqwest::Client::builder()
            .connect_timeout(timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            http,
            user_agent: config.upstream_user_agent.clone(),
            referer: config.upstream_referer.clone(),
            origin: config.upstream_origin.clone(),
            timeout,
        }
    }

    // without all three the cdn answers 403
    fn request(&self, target_url: &Url) -> reqwest::RequestBuilder {
        self.http
            .get(target_url.as_str())
            .header(header::USER_AGENT, &self.user_agent)
            .header(header::REFERER, &self.referer)
            .header(header::ORIGIN, &self.origin)
            .header(header::ACCEPT, "*/*")
    }

    async fn send(
        &self,
        request: reqwest::RequestBuilder,
        target_url: &Url,
    ) -> AppResult<reqwest::Response> {
        let response = tokio::time::timeout(self.timeout, request.send())
            .await
            .map_err(|_| {
                error!("upstream timed out after {:?}: {}", self.timeout, target_url);
                Error::Proxy("upstream timed out".to_string())
            })?
            .map_err(|e| {
                error!("upstream request failed: {}", e);
                Error::Proxy(format!("upstream request failed: {}", e))
            })?;

        let status = response.status();
        debug!("upstream answered {} for {}", status, target_url);

        if !status.is_success() {
            // body is usually a cloudflare html page, not worth logging
            error!("upstream not successful: {} for {}", status, target_url);
            return Err(Error::Proxy(format!("upstream returned {}", status)));
        }

        Ok(response)
    }

    /// whole manifest body as text, decompressed if the upstream compressed it anyway
    pub async fn fetch_manifest(&self, target_url: &Url) -> AppResult<String> {
        let response = self.send(self.request(target_url), target_url).await?;

        let encoding = ContentEncoding::of_upstream(response.headers());

        let bytes = tokio::time::timeout(self.timeout, response.bytes())
            .await
            .map_err(|_| {
                error!("manifest body timed out: {}", target_url);
                Error::Proxy("upstream timed out".to_string())
            })?
            .map_err(|e| {
                error!("failed to read manifest body: {}", e);
                Error::Proxy(format!("failed to read manifest: {}", e))
            })?;

        let received = bytes.len();
        let decompressed = encoding.decode(bytes.to_vec()).map_err(|e| {
            error!("failed to decompress {:?} manifest: {}", encoding, e);
            Error::Proxy("failed to decompress manifest".to_string())
        })?;

        debug!(
            "read manifest ({} bytes, {} decompressed)",
            received,
            decompressed.len()
        );

        String::from_utf8(decompressed).map_err(|e| {
            error!("manifest is not utf-8: {}", e);
            Error::Proxy("manifest is not valid utf-8".to_string())
        })
    }

    /// relay a non manifest resource chunk by chunk as the upstream sends it.
    ///
    /// nothing is buffered, the upstream body goes straight into the response body. when the
    /// player hangs up axum drops the body, which drops the upstream response and closes that
    /// connection too.
    pub async fn relay(&self, target_url: &Url, range: Option<&HeaderValue>) -> AppResult<Response> {
        let mut request = self.request(target_url);
        if let Some(range) = range {
            debug!("forwarding range {:?}", range);
            request = request.header(header::RANGE, range.clone());
        }

        let upstream = self.send(request, target_url).await?;

        let mut response = Response::builder().status(upstream.status());
        for name in RELAYED_HEADERS {
            if let Some(value) = upstream.headers().get(&name) {
                response = response.header(name, value.clone());
            }
        }

        // headers are already gone by the time a chunk fails, all that is left is to log it
        let target = target_url.to_string();
        let body = upstream
            .bytes_stream()
            .inspect_err(move |e| warn!("upstream body for {} broke off: {}", target, e));

        response
            .body(Body::from_stream(body))
            .map_err(|e| {
                error!("failed to build relay response: {}", e);
                Error::Proxy(format!("failed to build response: {}", e))
            })
    }
}
