pub mod api;
pub mod dtos;
pub mod error;
pub mod extractors;
pub mod services;
pub mod utils;

use std::net::SocketAddr;
use std::sync::{Arc, OnceLock};
use std::time::Instant;

use anyhow::Context;
use axum::{
    Extension, Router,
    http::{HeaderName, HeaderValue, Method, header},
    routing::get,
};
use lazy_static::lazy_static;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{info, warn};

use crate::config::AppConfig;
use crate::server::{
    api::{
        embed_controller::EmbedController, health_controller::health_endpoint,
        metrics_controller::metrics_endpoint,
    },
    services::edge_services::EdgeServices,
};

lazy_static! {
    static ref START_TIME: Instant = Instant::now();
}

static PROMETHEUS: OnceLock<PrometheusHandle> = OnceLock::new();

pub fn get_uptime_seconds() -> u64 {
    START_TIME.elapsed().as_secs()
}

pub fn get_app_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

pub fn prometheus_handle() -> Option<&'static PrometheusHandle> {
    PROMETHEUS.get()
}

/// global recorder, can only happen once per process so a second call is just a warning
pub fn install_metrics_recorder() {
    if PROMETHEUS.get().is_some() {
        return;
    }

    match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => {
            let _ = PROMETHEUS.set(handle);
        }
        Err(e) => warn!("failed to install prometheus recorder: {}", e),
    }
}

pub struct EdgeApplicationServer;

impl EdgeApplicationServer {
    /// the full app, no listener. tests drive this directly with `oneshot`
    pub fn router(services: EdgeServices) -> Router {
        let cors = Self::cors_layer(&services.config);

        Router::new()
            .merge(EmbedController::app())
            .route("/health", get(health_endpoint))
            .route("/metrics", get(metrics_endpoint))
            .layer(Extension(services))
            .layer(cors)
            .layer(TraceLayer::new_for_http())
    }

    pub async fn serve(config: Arc<AppConfig>) -> anyhow::Result<()> {
        // touch it so uptime counts from boot, not from the first health check
        let _ = *START_TIME;
        install_metrics_recorder();

        let services = EdgeServices::new(config.clone());
        let router = Self::router(services);

        let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .with_context(|| format!("failed to bind {}", addr))?;

        info!("edge server listening on {}", addr);

        axum::serve(listener, router)
            .with_graceful_shutdown(Self::shutdown_signal())
            .await
            .context("server error")?;

        info!("edge server stopped");
        Ok(())
    }

    fn cors_layer(config: &AppConfig) -> CorsLayer {
        let origin = config.cors_origin.trim();

        let allow_origin = if origin.is_empty() || origin == "*" {
            AllowOrigin::from(Any)
        } else {
            let origins: Vec<HeaderValue> = origin
                .split(',')
                .map(str::trim)
                .filter(|o| !o.is_empty())
                .filter_map(|o| match HeaderValue::from_str(o) {
                    Ok(value) => Some(value),
                    Err(_) => {
                        warn!("ignoring invalid cors origin {:?}", o);
                        None
                    }
                })
                .collect();
            AllowOrigin::list(origins)
        };

        CorsLayer::new()
            .allow_origin(allow_origin)
            .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
            .allow_headers([
                header::AUTHORIZATION,
                header::CONTENT_TYPE,
                HeaderName::from_static("apikey"),
                HeaderName::from_static("x-client-info"),
            ])
    }

    async fn shutdown_signal() {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("failed to listen for ctrl-c: {}", e);
            // nothing to wait on, park forever instead of shutting down straight away
            std::future::pending::<()>().await;
        }
        info!("shutdown signal received");
    }
}
