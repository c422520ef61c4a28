use base64::{
    Engine,
    alphabet,
    engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig},
};
use lazy_static::lazy_static;
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;
use url::Url;

use crate::server::dtos::embed_dto::ExtractedSource;
use crate::server::utils::{
    blocklist::Blocklist,
    url_utils::{resolve, unescape_js},
    video_patterns::{classify, quality_from_label},
};

/// keys that tend to hold the stream inside decoded player configs
pub const SOURCE_KEYS: &[&str] = &[
    "file", "url", "src", "source", "sources", "media", "video", "stream", "playlist",
];

/// shortest literal worth trying when it's only bound to a suspicious name
const MIN_LITERAL_LEN: usize = 50;

// padding is all over the place in embed scripts, some strip it and some don't
const PADDING_INDIFFERENT: GeneralPurposeConfig =
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent);
const STANDARD_ANY_PAD: GeneralPurpose = GeneralPurpose::new(&alphabet::STANDARD, PADDING_INDIFFERENT);
const URL_SAFE_ANY_PAD: GeneralPurpose = GeneralPurpose::new(&alphabet::URL_SAFE, PADDING_INDIFFERENT);

lazy_static! {
    static ref DECODE_CALL_PATTERN: Regex = Regex::new(
        r#"(?i)(?:atob|base64_decode|b64decode|decodebase64|base64\.decode)\s*\(\s*["'`]([A-Za-z0-9+/_\-]+={0,2})["'`]\s*\)"#
    )
    .expect("decode call pattern should compile");
    static ref SUSPICIOUS_LITERAL_PATTERN: Regex = Regex::new(
        r#"(?i)\b[\w$]*(?:data|config)[\w$]*["']?\s*[:=]\s*["'`]([A-Za-z0-9+/_\-]+={0,2})["'`]"#
    )
    .expect("suspicious literal pattern should compile");
}

/// everything that can go wrong with a single candidate, none of it leaves this module
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("not valid base64")]
    Base64,
    #[error("decoded bytes are not utf-8")]
    Utf8,
    #[error("decoded text is not json: {0}")]
    Json(#[from] serde_json::Error),
}

/// the shapes a source can take inside a decoded payload, anything else gets skipped instead of
/// guessed at
///
/// list has to be tried before nested, serde will happily build a struct out of a json array
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum SourcePayload {
    Url(String),
    List(Vec<SourceEntry>),
    Nested(NestedSource),
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum SourceEntry {
    Url(String),
    Nested(NestedSource),
}

#[derive(Debug, Default, Deserialize)]
struct NestedSource {
    file: Option<String>,
    src: Option<String>,
    url: Option<String>,
    label: Option<Value>,
    quality: Option<Value>,
}

impl NestedSource {
    fn target(&self) -> Option<&str> {
        self.file
            .as_deref()
            .or(self.src.as_deref())
            .or(self.url.as_deref())
    }

    // jwplayer style `label: "720p"` or `quality: 1080`
    fn quality_hint(&self) -> Option<String> {
        [&self.label, &self.quality]
            .into_iter()
            .flatten()
            .find_map(|value| match value {
                Value::String(s) => quality_from_label(s),
                Value::Number(n) => quality_from_label(&n.to_string()),
                _ => None,
            })
    }
}

impl SourcePayload {
    fn collect(self, out: &mut Vec<(String, Option<String>)>) {
        match self {
            Self::Url(url) => out.push((url, None)),
            Self::List(entries) => {
                for entry in entries {
                    match entry {
                        SourceEntry::Url(url) => out.push((url, None)),
                        SourceEntry::Nested(nested) => nested.collect(out),
                    }
                }
            }
            Self::Nested(nested) => nested.collect(out),
        }
    }
}

impl NestedSource {
    fn collect(self, out: &mut Vec<(String, Option<String>)>) {
        let hint = self.quality_hint();
        if let Some(target) = self.target() {
            out.push((target.to_string(), hint));
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ObfuscationDecoder {
    blocklist: Blocklist,
}

impl ObfuscationDecoder {
    pub fn new(blocklist: Blocklist) -> Self {
        Self { blocklist }
    }

    /// base64 looking tokens in the order they show up, duplicates removed
    pub fn candidates(text: &str) -> Vec<&str> {
        let mut tokens: Vec<&str> = Vec::new();

        let calls = DECODE_CALL_PATTERN
            .captures_iter(text)
            .filter_map(|captures| captures.get(1));
        let literals = SUSPICIOUS_LITERAL_PATTERN
            .captures_iter(text)
            .filter_map(|captures| captures.get(1))
            .filter(|token| token.as_str().len() >= MIN_LITERAL_LEN);

        for token in calls.chain(literals) {
            if !tokens.contains(&token.as_str()) {
                tokens.push(token.as_str());
            }
        }

        tokens
    }

    /// never fails, a candidate that doesn't decode just doesn't contribute
    pub fn decode(&self, text: &str, base: &Url) -> Vec<ExtractedSource> {
        let mut sources: Vec<ExtractedSource> = Vec::new();

        for token in Self::candidates(text) {
            match self.decode_candidate(token, base) {
                Ok(found) => {
                    for source in found {
                        if !sources.iter().any(|s| s.url == source.url) {
                            sources.push(source);
                        }
                    }
                }
                Err(e) => debug!("skipping obfuscated candidate ({} chars): {}", token.len(), e),
            }
        }

        sources
    }

    fn decode_candidate(&self, token: &str, base: &Url) -> Result<Vec<ExtractedSource>, DecodeError> {
        let decoded = decode_base64(token)?;
        let decoded = decoded.trim();

        if looks_like_url(decoded) && classify(decoded).is_video {
            return Ok(self.record(decoded, None, base).into_iter().collect());
        }

        let value: Value = serde_json::from_str(decoded)?;

        let mut found: Vec<(String, Option<String>)> = Vec::new();
        match &value {
            Value::Object(object) => {
                for key in SOURCE_KEYS {
                    let Some(entry) = object.get(*key) else {
                        continue;
                    };
                    // unknown shape under a known key, move on to the next key
                    if let Ok(payload) = SourcePayload::deserialize(entry) {
                        payload.collect(&mut found);
                    }
                }
            }
            Value::Array(_) | Value::String(_) => {
                if let Ok(payload) = SourcePayload::deserialize(&value) {
                    payload.collect(&mut found);
                }
            }
            _ => {}
        }

        Ok(found
            .into_iter()
            .filter_map(|(candidate, hint)| self.record(&candidate, hint, base))
            .collect())
    }

    fn record(&self, candidate: &str, hint: Option<String>, base: &Url) -> Option<ExtractedSource> {
        let candidate = unescape_js(candidate);
        if self.blocklist.is_blocked(&candidate) {
            debug!("decoded candidate blocked: {}", candidate);
            return None;
        }

        let mut classification = classify(&candidate);
        if !classification.is_video {
            return None;
        }
        if classification.quality.is_none() {
            classification.quality = hint;
        }

        let url = resolve(base, &candidate)?;
        if self.blocklist.is_blocked(&url) {
            debug!("decoded candidate blocked after resolution: {}", url);
            return None;
        }
        Some(ExtractedSource::new(url, classification))
    }
}

fn decode_base64(token: &str) -> Result<String, DecodeError> {
    let bytes = STANDARD_ANY_PAD
        .decode(token)
        .or_else(|_| URL_SAFE_ANY_PAD.decode(token))
        .map_err(|_| DecodeError::Base64)?;

    String::from_utf8(bytes).map_err(|_| DecodeError::Utf8)
}

fn looks_like_url(text: &str) -> bool {
    (text.starts_with("http://") || text.starts_with("https://") || text.starts_with('/'))
        && !text.contains(char::is_whitespace)
        && !text.contains(['"', '{', '}', '<', '>'])
}
