use serde::{Deserialize, Serialize};
use url::Url;
use validator::Validate;

use crate::server::utils::video_patterns::{SourceType, VideoClassification};

/// raw query string, everything optional so the validation messages are ours and not axum's
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EmbedQuery {
    pub url: Option<String>,
    pub timeout: Option<String>,
    pub mode: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbedMode {
    #[default]
    Extract,
    Proxy,
    /// iframe wrapper that never touches the embed's html, see `ProxyService::wrapper`
    Wrapper,
}

impl EmbedMode {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "extract" => Some(Self::Extract),
            "proxy" => Some(Self::Proxy),
            "wrapper" => Some(Self::Wrapper),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Extract => "extract",
            Self::Proxy => "proxy",
            Self::Wrapper => "wrapper",
        }
    }
}

/// the typed request before it's checked, `validator` runs over this
#[derive(Debug, Validate)]
pub struct EmbedRequestDraft {
    #[validate(url)]
    pub target_url: String,
    #[validate(range(min = 1))]
    pub timeout_ms: u64,
    pub mode: EmbedMode,
}

/// a request that made it through validation, only these ever reach the fetch stage
#[derive(Debug, Clone)]
pub struct EmbedRequest {
    pub target_url: Url,
    pub timeout_ms: u64,
    pub mode: EmbedMode,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedSource {
    pub url: String,
    #[serde(rename = "type")]
    pub source_type: SourceType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quality: Option<String>,
}

impl ExtractedSource {
    pub fn new(url: String, classification: VideoClassification) -> Self {
        Self {
            url,
            source_type: classification.source_type,
            quality: classification.quality,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionDebug {
    pub total_requests: u32,
    pub blocked_requests: u32,
    pub detected_videos: u32,
    pub execution_time_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionResult {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sources: Option<Vec<ExtractedSource>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub debug: ExtractionDebug,
}

impl ExtractionResult {
    /// success is decided here and only here: at least one source
    pub fn from_sources(sources: Vec<ExtractedSource>, debug: ExtractionDebug) -> Self {
        if sources.is_empty() {
            Self {
                success: false,
                sources: None,
                error: Some("No video sources found".to_string()),
                debug,
            }
        } else {
            Self {
                success: true,
                sources: Some(sources),
                error: None,
                debug,
            }
        }
    }
}
