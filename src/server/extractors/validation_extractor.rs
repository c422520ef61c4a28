use axum::Extension;
use axum::extract::{FromRequestParts, Query};
use axum::http::request::Parts;
use base64::{Engine as _, engine::general_purpose::URL_SAFE};
use tracing::debug;
use url::Url;
use validator::Validate;

use crate::config::AppConfig;
use crate::server::dtos::embed_dto::{EmbedMode, EmbedQuery, EmbedRequest, EmbedRequestDraft};
use crate::server::error::{AppResult, Error};
use crate::server::services::edge_services::EdgeServices;

const MISSING_URL: &str = "Missing required parameter: url";
const INVALID_URL: &str = "Invalid URL format";
const INVALID_TIMEOUT: &str = "Invalid timeout parameter";
const INVALID_MODE: &str = "Invalid mode parameter";

/// a checked embed request plus the services to run it with. nothing invalid gets past this
pub struct ValidatedEmbedRequest(pub EmbedRequest, pub EdgeServices);

impl<S> FromRequestParts<S> for ValidatedEmbedRequest
where
    S: Send + Sync,
{
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Extension(services): Extension<EdgeServices> =
            Extension::from_request_parts(parts, state)
                .await
                .map_err(|err| Error::InternalServerErrorWithContext(err.to_string()))?;

        let Query(query): Query<EmbedQuery> = Query::from_request_parts(parts, state)
            .await
            .map_err(|err| {
                debug!("unreadable query string: {}", err);
                Error::BadRequest(INVALID_URL.to_string())
            })?;

        let request = validate_embed_query(query, &services.config)?;
        debug!(
            "validated {} request for {} (timeout {}ms)",
            request.mode.as_str(),
            request.target_url,
            request.timeout_ms
        );

        Ok(ValidatedEmbedRequest(request, services))
    }
}

/// query params to a typed request, every rejection is a 400 with a fixed message
pub fn validate_embed_query(query: EmbedQuery, config: &AppConfig) -> AppResult<EmbedRequest> {
    let raw_url = query
        .url
        .as_deref()
        .map(str::trim)
        .filter(|u| !u.is_empty())
        .ok_or_else(|| Error::BadRequest(MISSING_URL.to_string()))?;

    let target_url = decode_url(raw_url)?;

    let timeout_ms = match non_empty(query.timeout.as_deref()) {
        None => config.default_timeout_ms,
        Some(value) => value
            .parse::<u64>()
            .ok()
            .filter(|ms| *ms <= config.max_timeout_ms)
            .ok_or_else(|| Error::BadRequest(INVALID_TIMEOUT.to_string()))?,
    };

    let mode = match non_empty(query.mode.as_deref()) {
        None => EmbedMode::default(),
        Some(value) => {
            EmbedMode::parse(value).ok_or_else(|| Error::BadRequest(INVALID_MODE.to_string()))?
        }
    };

    let draft = EmbedRequestDraft {
        target_url,
        timeout_ms,
        mode,
    };

    if let Err(errors) = draft.validate() {
        let field_errors = errors.field_errors();
        let message = if field_errors.contains_key("target_url") {
            INVALID_URL
        } else {
            INVALID_TIMEOUT
        };
        return Err(Error::BadRequest(message.to_string()));
    }

    let target_url = Url::parse(&draft.target_url)
        .ok()
        .filter(|u| matches!(u.scheme(), "http" | "https") && u.host_str().is_some())
        .ok_or_else(|| Error::BadRequest(INVALID_URL.to_string()))?;

    Ok(EmbedRequest {
        target_url,
        timeout_ms: draft.timeout_ms,
        mode: draft.mode,
    })
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

// `Query` already percent-decoded the value, a plain url is used exactly as it arrived. anything
// else is treated as unpadded url-safe base64
fn decode_url(url_param: &str) -> AppResult<String> {
    if url_param.starts_with("http://") || url_param.starts_with("https://") {
        return Ok(url_param.to_string());
    }

    let mut padded = url_param.to_string();
    while !padded.len().is_multiple_of(4) {
        padded.push('=');
    }

    let decoded = URL_SAFE
        .decode(&padded)
        .ok()
        .and_then(|bytes| String::from_utf8(bytes).ok())
        .ok_or_else(|| {
            debug!("url parameter is neither a url nor base64: {}", url_param);
            Error::BadRequest(INVALID_URL.to_string())
        })?;

    if decoded.starts_with("http://") || decoded.starts_with("https://") {
        Ok(decoded)
    } else {
        Err(Error::BadRequest(INVALID_URL.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;

    use super::*;

    fn query(url: Option<&str>, timeout: Option<&str>, mode: Option<&str>) -> EmbedQuery {
        EmbedQuery {
            url: url.map(str::to_string),
            timeout: timeout.map(str::to_string),
            mode: mode.map(str::to_string),
        }
    }

    fn rejection(result: AppResult<EmbedRequest>) -> String {
        match result {
            Err(Error::BadRequest(message)) => message,
            other => panic!("expected a bad request, got {:?}", other.map(|r| r.target_url)),
        }
    }

    #[test]
    fn defaults_fill_in() {
        let request = validate_embed_query(
            query(Some("https://embed.example/v/1"), None, None),
            &AppConfig::default(),
        )
        .expect("request should validate");

        assert_eq!(request.target_url.as_str(), "https://embed.example/v/1");
        assert_eq!(request.timeout_ms, 30_000);
        assert_eq!(request.mode, EmbedMode::Extract);
    }

    #[test]
    fn missing_or_blank_url() {
        let config = AppConfig::default();

        assert_eq!(rejection(validate_embed_query(query(None, None, None), &config)), MISSING_URL);
        assert_eq!(
            rejection(validate_embed_query(query(Some("  "), None, None), &config)),
            MISSING_URL
        );
    }

    #[test]
    fn bad_urls() {
        let config = AppConfig::default();

        for url in ["not a url", "https://", "javascript:alert(1)", "ftp://files.example/a"] {
            assert_eq!(
                rejection(validate_embed_query(query(Some(url), None, None), &config)),
                INVALID_URL,
                "{} should be rejected",
                url
            );
        }
    }

    #[test]
    fn plain_urls_are_not_decoded_twice() {
        let config = AppConfig::default();

        let escaped = validate_embed_query(
            query(Some("https://embed.example/e?id=a%26b%3Dc"), None, None),
            &config,
        )
        .expect("escaped query should validate");
        assert_eq!(escaped.target_url.as_str(), "https://embed.example/e?id=a%26b%3Dc");

        let raw_byte = validate_embed_query(
            query(Some("https://embed.example/v/1?x=%FF"), None, None),
            &config,
        )
        .expect("percent escaped byte should validate");
        assert_eq!(raw_byte.target_url.as_str(), "https://embed.example/v/1?x=%FF");
    }

    #[test]
    fn base64_urls_are_accepted() {
        let encoded = URL_SAFE_NO_PAD.encode("https://embed.example/v/1?x=1");

        let request = validate_embed_query(
            query(Some(&encoded), Some("5000"), Some("PROXY")),
            &AppConfig::default(),
        )
        .expect("request should validate");

        assert_eq!(request.target_url.as_str(), "https://embed.example/v/1?x=1");
        assert_eq!(request.timeout_ms, 5000);
        assert_eq!(request.mode, EmbedMode::Proxy);
    }

    #[test]
    fn timeout_bounds() {
        let config = AppConfig::default();
        let url = Some("https://embed.example/v/1");

        for timeout in ["0", "-5", "abc", "120001"] {
            assert_eq!(
                rejection(validate_embed_query(query(url, Some(timeout), None), &config)),
                INVALID_TIMEOUT,
                "{} should be rejected",
                timeout
            );
        }
        assert!(validate_embed_query(query(url, Some("120000"), None), &config).is_ok());
    }

    #[test]
    fn unknown_modes() {
        assert_eq!(
            rejection(validate_embed_query(
                query(Some("https://embed.example/v/1"), None, Some("scrape")),
                &AppConfig::default()
            )),
            INVALID_MODE
        );
    }
}
