pub mod api;
pub mod dtos;
pub mod error;
pub mod extractors;
pub mod services;
pub mod utils;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;
use axum::{
    Extension, Router, ServiceExt,
    extract::Request,
    http::{HeaderValue, Method, header},
    routing::get,
};
use once_cell::sync::Lazy;
use tower::Layer;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    normalize_path::NormalizePathLayer,
    trace::TraceLayer,
};
use tracing::{info, warn};

use crate::config::AppConfig;
use api::{ProxyController, StaticController, StreamController, health_controller};
use services::AppServices;

static STARTED_AT: Lazy<Instant> = Lazy::new(Instant::now);

pub fn get_uptime_seconds() -> u64 {
    STARTED_AT.elapsed().as_secs()
}

pub fn get_app_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

pub struct ApplicationServer;

impl ApplicationServer {
    /// every route with services and cors attached, without binding anything
    pub fn router(services: AppServices) -> Router {
        let cors = Self::cors_layer(&services.config.cors_origin);

        Router::new()
            .route("/health", get(health_controller::health_endpoint))
            .merge(ProxyController::app())
            .merge(StreamController::app())
            .merge(StaticController::app())
            .layer(Extension(services))
            .layer(cors)
            .layer(TraceLayer::new_for_http())
    }

    // errors and the fallback get the headers too, and any OPTIONS is answered as a preflight
    // with an empty 200 before it reaches a route
    fn cors_layer(cors_origin: &str) -> CorsLayer {
        let allow_origin = if cors_origin == "*" {
            AllowOrigin::any()
        } else {
            match HeaderValue::from_str(cors_origin) {
                Ok(origin) => AllowOrigin::exact(origin),
                Err(_) => {
                    warn!("cors origin {:?} isn't a valid header value, using *", cors_origin);
                    AllowOrigin::any()
                }
            }
        };

        CorsLayer::new()
            .allow_origin(allow_origin)
            .allow_methods([Method::GET, Method::OPTIONS])
            .allow_headers([header::CONTENT_TYPE, header::RANGE])
            .expose_headers([header::CONTENT_LENGTH, header::CONTENT_RANGE])
    }

    pub async fn serve(config: Arc<AppConfig>) -> anyhow::Result<()> {
        Lazy::force(&STARTED_AT);

        let services = AppServices::new(config.clone());
        let app = NormalizePathLayer::trim_trailing_slash().layer(Self::router(services));

        let address = SocketAddr::from(([0, 0, 0, 0], config.port));
        let listener = tokio::net::TcpListener::bind(address)
            .await
            .with_context(|| format!("failed to bind {}", address))?;

        info!(">>> relay running at http://localhost:{}", config.port);
        info!(
            ">>> use this in your player: http://localhost:{}/proxy?url=...",
            config.port
        );

        axum::serve(
            listener,
            ServiceExt::<Request>::into_make_service(app),
        )
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("error while serving")?;

        Ok(())
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("failed to listen for ctrl-c: {}", e);
        // without a signal handler just run until killed
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received, draining connections");
}
