use axum::{
    Json,
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;
use tracing::{error, warn};

use crate::server::utils::manifest_rewriter::RewriteError;

pub type AppResult<T> = Result<T, Error>;

/// request boundary errors, each one maps to exactly one response shape
#[derive(Error, Debug)]
pub enum Error {
    /// caller sent something we can't work with, 400 plain text
    #[error("{0}")]
    BadRequest(String),

    /// metadata api failed or had nothing playable, 500 json
    #[error("{0}")]
    Resolution(String),

    /// media host failed, 500 plain text. kept as text so the hot path stays cheap
    #[error("{0}")]
    Proxy(String),

    #[error(transparent)]
    Rewrite(#[from] RewriteError),

    #[error("{0}")]
    StaticAsset(String),
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        match self {
            Self::BadRequest(message) => {
                warn!("bad request: {}", message);
                (
                    StatusCode::BAD_REQUEST,
                    [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
                    message,
                )
                    .into_response()
            }
            Self::Resolution(message) => {
                error!("resolution failed: {}", message);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({ "error": message })),
                )
                    .into_response()
            }
            Self::Proxy(message) => {
                error!("proxy failed: {}", message);
                Self::proxy_failure(&message)
            }
            Self::Rewrite(err) => {
                // never send a half rewritten manifest, the player would escape the relay
                error!("manifest rewrite failed: {}", err);
                Self::proxy_failure(&err.to_string())
            }
            Self::StaticAsset(message) => {
                error!("static asset failed: {}", message);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
                    "Error loading player.html",
                )
                    .into_response()
            }
        }
    }
}

impl Error {
    fn proxy_failure(message: &str) -> Response {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            format!("Proxy Error: {}", message),
        )
            .into_response()
    }
}
