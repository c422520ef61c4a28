// the one outbound request a call is allowed to make. everything upstream of this is pure
use std::io::Read;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use flate2::read::{DeflateDecoder, GzDecoder, ZlibDecoder};
use mockall::automock;
use reqwest::header;
use tracing::{debug, warn};
use url::Url;

use crate::server::utils::url_utils::origin;

pub type DynPageFetcher = Arc<dyn PageFetcherTrait + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FetchError {
    #[error("request timed out after {0}ms")]
    Timeout(u64),
    #[error("request failed: {0}")]
    Request(String),
    #[error("upstream returned status {0}")]
    Status(u16),
    #[error("failed to read response: {0}")]
    Body(String),
}

#[derive(Debug, Clone)]
pub struct FetchedPage {
    /// where we ended up after redirects, relative urls resolve against the requested url though
    pub final_url: String,
    pub body: String,
}

#[automock]
#[async_trait]
pub trait PageFetcherTrait {
    /// single GET with a hard deadline, no retries. non-2xx is an error
    async fn fetch_page(&self, target_url: &Url, timeout_ms: u64) -> Result<FetchedPage, FetchError>;
}

#[derive(Clone)]
pub struct PageFetcher {
    http_client: reqwest::Client,
}

impl PageFetcher {
    pub fn new(user_agent: &str) -> Self {
        // i like to make it look like a real browser, embed hosts actually check here
        let http_client = reqwest::Client::builder()
            .user_agent(user_agent)
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self { http_client }
    }

    async fn fetch_within_deadline(
        &self,
        target_url: &Url,
        timeout: Duration,
    ) -> Result<FetchedPage, FetchError> {
        // a lot of embed hosts 403 without a plausible referer, their own origin is the safest bet
        let referer = format!("{}/", origin(target_url));

        let response = self
            .http_client
            .get(target_url.as_str())
            .timeout(timeout)
            .header(
                header::ACCEPT,
                "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8",
            )
            .header(header::ACCEPT_LANGUAGE, "en-US,en;q=0.9")
            // only what we can decode ourselves below
            .header(header::ACCEPT_ENCODING, "gzip, deflate, zstd")
            .header(header::REFERER, referer)
            .header("Sec-Fetch-Dest", "iframe")
            .header("Sec-Fetch-Mode", "navigate")
            .header("Sec-Fetch-Site", "cross-site")
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    FetchError::Timeout(timeout.as_millis() as u64)
                } else {
                    FetchError::Request(e.to_string())
                }
            })?;

        let status = response.status();
        debug!("received {} from {}", status, target_url);

        if !status.is_success() {
            // don't log the body, it's nearly always a cloudflare page that clogs everything
            return Err(FetchError::Status(status.as_u16()));
        }

        let final_url = response.url().to_string();
        let content_encoding = response
            .headers()
            .get(header::CONTENT_ENCODING)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string());

        let bytes = response.bytes().await.map_err(|e| {
            if e.is_timeout() {
                FetchError::Timeout(timeout.as_millis() as u64)
            } else {
                FetchError::Body(e.to_string())
            }
        })?;

        // inflating is plain cpu work, off the runtime it goes so the deadline above can still fire
        let raw_len = bytes.len();
        let encoding = content_encoding.clone();
        let decoded = tokio::task::spawn_blocking(move || decode_body(&bytes, encoding.as_deref()))
            .await
            .map_err(|e| FetchError::Body(format!("decode task failed: {}", e)))??;
        debug!(
            "read {} bytes ({} decoded, encoding {:?})",
            raw_len,
            decoded.len(),
            content_encoding
        );

        Ok(FetchedPage {
            final_url,
            body: String::from_utf8_lossy(&decoded).into_owned(),
        })
    }
}

#[async_trait]
impl PageFetcherTrait for PageFetcher {
    async fn fetch_page(&self, target_url: &Url, timeout_ms: u64) -> Result<FetchedPage, FetchError> {
        let timeout = Duration::from_millis(timeout_ms);

        // reqwest's own timeout covers the request, this one also covers the decode. a decode that
        // overruns keeps its blocking thread until the size cap stops it, the caller doesn't wait
        match tokio::time::timeout(timeout, self.fetch_within_deadline(target_url, timeout)).await {
            Ok(result) => result,
            Err(_) => {
                warn!("fetch of {} exceeded {}ms", target_url, timeout_ms);
                Err(FetchError::Timeout(timeout_ms))
            }
        }
    }
}

/// nothing we scan is anywhere near this, a body that inflates past it is a compression bomb
pub const MAX_DECODED_BYTES: u64 = 32 * 1024 * 1024;

/// undo the content-encoding ourselves, same as the segment proxy does
pub fn decode_body(bytes: &[u8], content_encoding: Option<&str>) -> Result<Vec<u8>, FetchError> {
    decode_body_with_limit(bytes, content_encoding, MAX_DECODED_BYTES)
}

pub fn decode_body_with_limit(
    bytes: &[u8],
    content_encoding: Option<&str>,
    limit: u64,
) -> Result<Vec<u8>, FetchError> {
    let encoding = content_encoding.map(|e| e.trim().to_ascii_lowercase());

    match encoding.as_deref() {
        Some("zstd") => {
            let decoder = zstd::stream::read::Decoder::new(bytes)
                .map_err(|e| FetchError::Body(format!("failed to decompress zstd: {}", e)))?;
            read_capped(decoder, limit, "zstd")
        }
        Some("gzip") | Some("x-gzip") => read_capped(GzDecoder::new(bytes), limit, "gzip"),
        Some("deflate") => {
            // "deflate" is supposed to be zlib wrapped but plenty of servers send it raw
            match read_capped(ZlibDecoder::new(bytes), limit, "deflate") {
                Err(FetchError::Body(e)) if !e.contains("exceeds") => {
                    read_capped(DeflateDecoder::new(bytes), limit, "deflate")
                }
                other => other,
            }
        }
        _ if bytes.len() as u64 > limit => Err(too_large(limit)),
        _ => Ok(bytes.to_vec()),
    }
}

fn read_capped<R: Read>(reader: R, limit: u64, encoding: &str) -> Result<Vec<u8>, FetchError> {
    let mut decompressed: Vec<u8> = Vec::new();
    // one byte over the limit is enough to know it's too big
    reader
        .take(limit + 1)
        .read_to_end(&mut decompressed)
        .map_err(|e| FetchError::Body(format!("failed to decompress {}: {}", encoding, e)))?;

    if decompressed.len() as u64 > limit {
        return Err(too_large(limit));
    }
    Ok(decompressed)
}

fn too_large(limit: u64) -> FetchError {
    FetchError::Body(format!("decoded body exceeds {} bytes", limit))
}
