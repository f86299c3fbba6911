// client for the metadata api that turns an episode/media pair into something playable
use async_trait::async_trait;
use mockall::automock;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use crate::server::{
    dtos::resolver_dto::{ServerDescriptor, StreamSources},
    error::{AppResult, Error},
    services::resolution_cache_services::ResolutionKey,
};

pub type DynResolverClient = Arc<dyn ResolverClientTrait + Send + Sync>;

#[automock]
#[async_trait]
pub trait ResolverClientTrait {
    /// full watch payload for the preferred server of `key`
    async fn resolve(&self, key: &ResolutionKey) -> AppResult<StreamSources>;
}

pub struct ConsumetResolverClient {
    http_client: reqwest::Client,
    base_url: String,
    preferred_server: String,
}

impl ConsumetResolverClient {
    pub fn new(base_url: &str, preferred_server: &str, timeout: Duration) -> Self {
        // the api doesn't care about the user agent, it's just nicer than reqwest's default
        let http_client = reqwest::Client::builder()
            .user_agent("Mozilla/5.0 (Macintosh; Intel Mac OS X 10.15; rv:144.0) Gecko/20100101 Firefox/144.0")
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            http_client,
            base_url: base_url.trim_end_matches('/').to_string(),
            preferred_server: preferred_server.to_string(),
        }
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        query: &[(&str, &str)],
    ) -> AppResult<T> {
        let url = format!("{}/{}", self.base_url, endpoint);

        let response = self
            .http_client
            .get(&url)
            .header("Accept", "application/json")
            .query(query)
            .send()
            .await
            .map_err(|e| {
                error!("resolver request to {} failed: {}", url, e);
                Error::Resolution(format!("resolver request failed: {}", e))
            })?;

        let status = response.status();
        if !status.is_success() {
            error!("resolver {} returned status: {}", endpoint, status);
            return Err(Error::Resolution(format!(
                "resolver {} returned status {}",
                endpoint, status
            )));
        }

        response.json::<T>().await.map_err(|e| {
            error!("failed to parse resolver {} response: {}", endpoint, e);
            Error::Resolution(format!("failed to parse resolver response: {}", e))
        })
    }

    async fn servers(&self, key: &ResolutionKey) -> AppResult<Vec<ServerDescriptor>> {
        self.get_json(
            "servers",
            &[("episodeId", key.episode_id.as_str()), ("mediaId", key.media_id.as_str())],
        )
        .await
    }

    async fn sources(&self, key: &ResolutionKey, server: &str) -> AppResult<StreamSources> {
        self.get_json(
            "watch",
            &[
                ("episodeId", key.episode_id.as_str()),
                ("mediaId", key.media_id.as_str()),
                ("server", server),
            ],
        )
        .await
    }
}

#[async_trait]
impl ResolverClientTrait for ConsumetResolverClient {
    async fn resolve(&self, key: &ResolutionKey) -> AppResult<StreamSources> {
        info!("resolving sources for {}", key);

        let servers = self.servers(key).await?;
        let server = servers
            .iter()
            .find(|server| server.name == self.preferred_server)
            .ok_or_else(|| {
                error!(
                    "{} not in the {} servers returned for {}",
                    self.preferred_server,
                    servers.len(),
                    key
                );
                Error::Resolution(format!("{} server not found", self.preferred_server))
            })?;

        // the api takes either the name or the id as `server` and which one works changes per
        // title, so name first and the id once if that fails
        match self.sources(key, &server.name).await {
            Ok(sources) => Ok(sources),
            Err(err) => match server.fallback_identifier() {
                Some(id) => {
                    warn!(
                        "watch with server name {} failed ({}), retrying with id {}",
                        server.name, err, id
                    );
                    self.sources(key, id).await
                }
                None => Err(err),
            },
        }
    }
}
