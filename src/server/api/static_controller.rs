use axum::{
    Extension, Router,
    http::{StatusCode, header},
    response::{Html, IntoResponse, Response},
    routing::get,
};
use tracing::debug;

use crate::server::{
    error::{AppResult, Error},
    services::AppServices,
};

const USAGE: &str = "Local Proxy is running. Usage: /proxy?url=TARGET_URL";

pub struct StaticController;

impl StaticController {
    pub fn app() -> Router {
        Router::new()
            .route("/", get(Self::player))
            .fallback(Self::usage)
    }

    // read on every hit so the page can be edited without a restart
    async fn player(Extension(services): Extension<AppServices>) -> AppResult<Html<Vec<u8>>> {
        let path = &services.config.player_path;

        let page = tokio::fs::read(path)
            .await
            .map_err(|e| Error::StaticAsset(format!("failed to read {}: {}", path, e)))?;
        debug!("serving player page ({} bytes)", page.len());

        Ok(Html(page))
    }

    async fn usage() -> Response {
        (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            USAGE,
        )
            .into_response()
    }
}
