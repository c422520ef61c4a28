use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};

use crate::server::prometheus_handle;

/// prometheus text format, only there when the recorder was installed at startup
pub async fn metrics_endpoint() -> Response {
    match prometheus_handle() {
        Some(handle) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            handle.render(),
        )
            .into_response(),
        None => (StatusCode::NOT_FOUND, "metrics recorder not installed").into_response(),
    }
}
