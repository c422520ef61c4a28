use std::time::Instant;

use axum::{
    Json, Router,
    http::{HeaderMap, HeaderName, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use metrics::{counter, histogram};
use tracing::{info, warn};

use crate::server::{
    dtos::embed_dto::{EmbedMode, EmbedRequest, ExtractionDebug, ExtractionResult},
    extractors::ValidatedEmbedRequest,
    services::{edge_services::EdgeServices, proxy_services::ProxyService},
};

const EMBED_MODE_HEADER: &str = "x-embed-mode";

pub struct EmbedController;

impl EmbedController {
    pub fn app() -> Router {
        Router::new().route("/", get(Self::embed_get))
    }

    async fn embed_get(
        ValidatedEmbedRequest(request, services): ValidatedEmbedRequest,
    ) -> Response {
        let started = Instant::now();
        let mode = request.mode.as_str();

        counter!("embed_requests_total", "mode" => mode).increment(1);
        info!(
            "{} request for {}",
            mode,
            request.target_url.host_str().unwrap_or_default()
        );

        let response = match request.mode {
            EmbedMode::Extract => Self::extract(&request, &services, started).await,
            EmbedMode::Proxy => Self::proxy(&request, &services).await,
            EmbedMode::Wrapper => Self::wrapper(&request),
        };

        histogram!("embed_request_duration_ms", "mode" => mode)
            .record(started.elapsed().as_millis() as f64);

        response
    }

    async fn extract(request: &EmbedRequest, services: &EdgeServices, started: Instant) -> Response {
        let result = services
            .extraction
            .extract(&request.target_url, request.timeout_ms)
            .await;
        let execution_time_ms = started.elapsed().as_millis() as u64;

        match result {
            Ok(outcome) => {
                counter!("embed_sources_found_total").increment(outcome.sources.len() as u64);
                counter!("embed_blocked_candidates_total")
                    .increment(u64::from(outcome.blocked_candidates));

                let debug = ExtractionDebug {
                    total_requests: outcome.total_candidates,
                    blocked_requests: outcome.blocked_candidates,
                    detected_videos: outcome.sources.len() as u32,
                    execution_time_ms,
                };
                let body = ExtractionResult::from_sources(outcome.sources, debug);

                // an empty page is a 404, the fetch itself was fine
                let status = if body.success {
                    StatusCode::OK
                } else {
                    StatusCode::NOT_FOUND
                };

                (status, Json(body)).into_response()
            }
            Err(e) => {
                warn!("extract failed for {}: {}", request.target_url, e);
                counter!("embed_fetch_failures_total", "mode" => "extract").increment(1);

                let body = ExtractionResult {
                    success: false,
                    sources: None,
                    error: Some(e.to_string()),
                    debug: ExtractionDebug {
                        execution_time_ms,
                        ..Default::default()
                    },
                };

                (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
            }
        }
    }

    async fn proxy(request: &EmbedRequest, services: &EdgeServices) -> Response {
        match services
            .proxy
            .proxy(&request.target_url, request.timeout_ms)
            .await
        {
            Ok(document) => Self::html_response(StatusCode::OK, document.html, None),
            Err(e) => {
                warn!("proxy failed for {}: {}", request.target_url, e);
                counter!("embed_fetch_failures_total", "mode" => "proxy").increment(1);

                Self::html_response(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ProxyService::error_page(&format!("Failed to load embed: {}", e)),
                    None,
                )
            }
        }
    }

    fn wrapper(request: &EmbedRequest) -> Response {
        Self::html_response(
            StatusCode::OK,
            ProxyService::wrapper(&request.target_url),
            Some("wrapper-degraded"),
        )
    }

    /// html goes back frameable by anyone and never cached
    fn html_response(status: StatusCode, body: String, embed_mode: Option<&'static str>) -> Response {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("text/html; charset=utf-8"),
        );
        headers.insert(header::X_FRAME_OPTIONS, HeaderValue::from_static("ALLOWALL"));
        headers.insert(
            header::CONTENT_SECURITY_POLICY,
            HeaderValue::from_static("frame-ancestors *"),
        );
        headers.insert(
            header::CACHE_CONTROL,
            HeaderValue::from_static("no-cache, no-store, must-revalidate"),
        );
        headers.insert(header::PRAGMA, HeaderValue::from_static("no-cache"));
        headers.insert(header::EXPIRES, HeaderValue::from_static("0"));

        if let Some(mode) = embed_mode {
            headers.insert(
                HeaderName::from_static(EMBED_MODE_HEADER),
                HeaderValue::from_static(mode),
            );
        }

        (status, headers, body).into_response()
    }
}
