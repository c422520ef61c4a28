use std::sync::Arc;

use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Request, StatusCode, header},
    response::Response,
};
use serde_json::{Value, json};
use tower::ServiceExt;

use embed_adblocker::{
    AppConfig,
    server::{
        EdgeApplicationServer,
        services::{
            edge_services::EdgeServices,
            fetch_services::{FetchError, FetchedPage, MockPageFetcherTrait},
        },
    },
};

const EMBED_PAGE: &str = r#"<html><head><script>if (typeof blockAdBlock === 'undefined') { adBlockDetected(); }</script></head><body>
<video><source src="https://cdn.example/master.m3u8"></video>
<script>var file = "https://ads.doubleclick.net/x.mp4";</script>
</body></html>"#;

fn app(fetcher: MockPageFetcherTrait) -> Router {
    let services = EdgeServices::with_fetcher(Arc::new(AppConfig::default()), Arc::new(fetcher));
    EdgeApplicationServer::router(services)
}

fn serving(body: &'static str) -> MockPageFetcherTrait {
    let mut fetcher = MockPageFetcherTrait::new();
    fetcher.expect_fetch_page().times(1).returning(move |url, _| {
        Ok(FetchedPage {
            final_url: url.to_string(),
            body: body.to_string(),
        })
    });
    fetcher
}

fn failing(error: FetchError) -> MockPageFetcherTrait {
    let mut fetcher = MockPageFetcherTrait::new();
    fetcher
        .expect_fetch_page()
        .times(1)
        .returning(move |_, _| Err(error.clone()));
    fetcher
}

async fn get(app: Router, uri: &str) -> Response {
    app.oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap()
}

async fn body_text(response: Response) -> String {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

async fn body_json(response: Response) -> Value {
    serde_json::from_str(&body_text(response).await).unwrap()
}

#[tokio::test]
async fn test_extract_returns_stream_without_ads() {
    let mut fetcher = MockPageFetcherTrait::new();
    fetcher
        .expect_fetch_page()
        .withf(|url, timeout| url.as_str() == "https://embed.example/v/1" && *timeout == 30_000)
        .times(1)
        .returning(|url, _| {
            Ok(FetchedPage {
                final_url: url.to_string(),
                body: EMBED_PAGE.to_string(),
            })
        });

    let response = get(app(fetcher), "/?url=https://embed.example/v/1&mode=extract").await;

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["success"], json!(true));
    assert_eq!(
        body["sources"],
        json!([{"url": "https://cdn.example/master.m3u8", "type": "hls"}])
    );
    assert_eq!(body["debug"]["detectedVideos"], json!(1));
    assert_eq!(body["debug"]["blockedRequests"], json!(1));
    assert!(body.get("error").is_none());
}

#[tokio::test]
async fn test_extract_is_the_default_mode() {
    let response = get(app(serving(EMBED_PAGE)), "/?url=https://embed.example/v/1").await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["success"], json!(true));
}

#[tokio::test]
async fn test_empty_page_is_not_found() {
    let response = get(
        app(serving("<html><body><p>nothing here</p></body></html>")),
        "/?url=https://embed.example/v/1",
    )
    .await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = body_json(response).await;
    assert_eq!(body["success"], json!(false));
    assert_eq!(body["error"], json!("No video sources found"));
    assert!(body.get("sources").is_none());
}

#[tokio::test]
async fn test_fetch_failure_is_server_error() {
    let response = get(
        app(failing(FetchError::Timeout(500))),
        "/?url=https://embed.example/v/1&timeout=500",
    )
    .await;

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = body_json(response).await;
    assert_eq!(body["success"], json!(false));
    assert_eq!(body["error"], json!("request timed out after 500ms"));
}

#[tokio::test]
async fn test_missing_url_is_rejected_before_fetching() {
    let response = get(app(MockPageFetcherTrait::new()), "/").await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        body_json(response).await,
        json!({"success": false, "error": "Missing required parameter: url"})
    );
}

#[tokio::test]
async fn test_bad_parameters_are_rejected() {
    let cases = [
        ("/?url=not%20a%20url", "Invalid URL format"),
        ("/?url=javascript%3Aalert(1)", "Invalid URL format"),
        ("/?url=https://embed.example/v/1&timeout=0", "Invalid timeout parameter"),
        ("/?url=https://embed.example/v/1&timeout=soon", "Invalid timeout parameter"),
        ("/?url=https://embed.example/v/1&mode=scrape", "Invalid mode parameter"),
    ];

    for (uri, message) in cases {
        let response = get(app(MockPageFetcherTrait::new()), uri).await;

        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{}", uri);
        assert_eq!(body_json(response).await["error"], json!(message), "{}", uri);
    }
}

#[tokio::test]
async fn test_proxy_serves_rewritten_html() {
    let response = get(
        app(serving(EMBED_PAGE)),
        "/?url=https://embed.example/v/1&mode=proxy",
    )
    .await;

    assert_eq!(response.status(), StatusCode::OK);
    let headers = response.headers();
    assert_eq!(headers[header::CONTENT_TYPE], "text/html; charset=utf-8");
    assert_eq!(headers[header::X_FRAME_OPTIONS], "ALLOWALL");
    assert_eq!(headers[header::CONTENT_SECURITY_POLICY], "frame-ancestors *");
    assert_eq!(headers[header::CACHE_CONTROL], "no-cache, no-store, must-revalidate");
    assert_eq!(headers[header::PRAGMA], "no-cache");
    assert_eq!(headers[header::EXPIRES], "0");

    let html = body_text(response).await;
    assert!(html.contains("detector script removed"));
    assert!(!html.contains("adBlockDetected"));
    assert!(html.contains("VIDEO_EXTRACTED"));
    assert!(html.contains(r#"<base href="https://embed.example/v/1">"#));
}

#[tokio::test]
async fn test_proxy_failure_is_an_html_error_page() {
    let response = get(
        app(failing(FetchError::Status(403))),
        "/?url=https://embed.example/v/1&mode=proxy",
    )
    .await;

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(
        response.headers()[header::CONTENT_TYPE],
        "text/html; charset=utf-8"
    );
    let html = body_text(response).await;
    assert!(html.contains("upstream returned status 403"));
}

#[tokio::test]
async fn test_wrapper_never_fetches() {
    let response = get(
        app(MockPageFetcherTrait::new()),
        "/?url=https://embed.example/v/1&mode=wrapper",
    )
    .await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["x-embed-mode"], "wrapper-degraded");
    let html = body_text(response).await;
    assert!(html.contains(r#"<iframe src="https://embed.example/v/1""#));
}

#[tokio::test]
async fn test_encoded_target_url_keeps_its_own_escapes() {
    let response = get(
        app(MockPageFetcherTrait::new()),
        "/?url=https%3A%2F%2Fembed.example%2Fe%3Fid%3Da%2526b%253Dc&mode=wrapper",
    )
    .await;

    assert_eq!(response.status(), StatusCode::OK);
    let html = body_text(response).await;
    assert!(html.contains(r#"<iframe src="https://embed.example/e?id=a%26b%3Dc""#));
}

#[tokio::test]
async fn test_options_gets_permissive_cors() {
    let response = app(MockPageFetcherTrait::new())
        .oneshot(
            Request::builder()
                .method("OPTIONS")
                .uri("/")
                .header(header::ORIGIN, "https://player.example")
                .header(header::ACCESS_CONTROL_REQUEST_METHOD, "GET")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let headers = response.headers();
    assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
    let methods = headers[header::ACCESS_CONTROL_ALLOW_METHODS].to_str().unwrap();
    assert!(methods.contains("GET") && methods.contains("POST") && methods.contains("OPTIONS"));
    let allowed = headers[header::ACCESS_CONTROL_ALLOW_HEADERS].to_str().unwrap();
    assert!(allowed.contains("authorization") && allowed.contains("content-type"));
}

#[tokio::test]
async fn test_json_responses_carry_cors_origin() {
    let response = app(serving(EMBED_PAGE))
        .oneshot(
            Request::builder()
                .uri("/?url=https://embed.example/v/1")
                .header(header::ORIGIN, "https://player.example")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
}

#[tokio::test]
async fn test_health_reports_liveness() {
    let response = get(app(MockPageFetcherTrait::new()), "/health").await;

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], json!("healthy"));
    assert_eq!(body["environment"], json!("development"));
    assert!(body["uptimeSeconds"].is_u64());
}
