use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use lazy_static::lazy_static;
use mockall::automock;
use regex::Regex;
use tracing::{debug, info};
use url::Url;

use crate::server::{
    dtos::embed_dto::ExtractedSource,
    services::fetch_services::{DynPageFetcher, FetchError},
    utils::{
        blocklist::Blocklist,
        obfuscation::ObfuscationDecoder,
        url_utils::{resolve, unescape_js},
        video_patterns::{classify, quality_from_label},
    },
};

pub type DynExtractionService = Arc<dyn ExtractionServiceTrait + Send + Sync>;

lazy_static! {
    /// url-bearing attributes and bare stream literals, group 1 is the url
    static ref ATTRIBUTE_PATTERNS: Vec<Regex> = [
        r#"(?i)\b(?:src|href|data-src|data-video|data-url|data-file|file)\s*=\s*["']([^"'<>\s]+)["']"#,
        r#"(?i)["']([^"'\s<>]+?\.(?:m3u8|mp4)(?:\?[^"'\s<>]*)?)["']"#,
        r#"(?i)(?:^|[\s(=,>])(https?://[^"'\s<>()]+?\.(?:m3u8|mp4)(?:\?[^"'\s<>()]*)?)"#,
    ]
    .iter()
    .map(|pattern| Regex::new(pattern).expect("attribute pattern should compile"))
    .collect();

    /// player setup calls and source variables, group 1 is the url and group 2 an optional label
    static ref SCRIPT_PATTERNS: Vec<Regex> = [
        r#"(?i)sources["']?\s*[:=]\s*\[\s*\{[^}]*?["']?(?:file|src)["']?\s*:\s*["']([^"']+)["'](?:[^}]*?["']?(?:label|quality)["']?\s*:\s*["']?([^"',}]+))?"#,
        r#"(?i)sources["']?\s*[:=]\s*\[\s*["']([^"']+)["']"#,
        r#"(?i)player\.source\s*=\s*\{[^}]*?["']?src["']?\s*:\s*["']([^"']+)["']"#,
        r#"(?i)\.setup\(\s*\{[^}]*?["']?file["']?\s*:\s*["']([^"']+)["']"#,
        r#"(?i)\b(?:videoSource|videoSrc|videoUrl|video_url|streamUrl|stream_url|hlsUrl|hls_url|mp4Url|playlistUrl|manifestUrl|source|file|src|hls|url)["']?\s*[:=]\s*["']([^"']+)["']"#,
    ]
    .iter()
    .map(|pattern| Regex::new(pattern).expect("script pattern should compile"))
    .collect();
}

/// sources plus the numbers that end up in the debug block
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractionOutcome {
    pub sources: Vec<ExtractedSource>,
    pub total_candidates: u32,
    pub blocked_candidates: u32,
}

#[automock]
#[async_trait]
pub trait ExtractionServiceTrait {
    /// fetch once, scan once. only a failed fetch is an error, an empty list is not
    async fn extract(&self, target_url: &Url, timeout_ms: u64) -> Result<ExtractionOutcome, FetchError>;
}

/// keeps discovery order and the seen-set for a single page
struct SourceRecorder<'a> {
    base: &'a Url,
    blocklist: Blocklist,
    // keyed by the literal as matched, before unescaping or resolving
    seen: HashSet<String>,
    outcome: ExtractionOutcome,
}

impl<'a> SourceRecorder<'a> {
    fn new(base: &'a Url, blocklist: Blocklist) -> Self {
        Self {
            base,
            blocklist,
            seen: HashSet::new(),
            outcome: ExtractionOutcome::default(),
        }
    }

    fn offer(&mut self, literal: &str, label: Option<&str>) {
        let literal = literal.trim();
        if literal.is_empty() {
            return;
        }
        if !self.seen.insert(literal.to_string()) {
            // the attribute scan usually finds a player's urls before the script scan sees labels
            if let Some(quality) = label.and_then(quality_from_label) {
                self.label_existing(literal, quality);
            }
            return;
        }
        self.outcome.total_candidates += 1;

        let cleaned = unescape_js(literal);
        if self.blocklist.is_blocked(&cleaned) {
            debug!("blocked candidate: {}", cleaned);
            self.outcome.blocked_candidates += 1;
            return;
        }

        let mut classification = classify(&cleaned);
        if !classification.is_video {
            return;
        }
        if classification.quality.is_none() {
            classification.quality = label.and_then(quality_from_label);
        }

        let Some(url) = resolve(self.base, &cleaned) else {
            return;
        };
        // `ads/pre.mp4` only looks clean until it's joined onto the page path
        if self.blocklist.is_blocked(&url) {
            debug!("blocked candidate after resolution: {}", url);
            self.outcome.blocked_candidates += 1;
            return;
        }
        self.push(ExtractedSource::new(url, classification));
    }

    fn label_existing(&mut self, literal: &str, quality: String) {
        let Some(url) = resolve(self.base, &unescape_js(literal)) else {
            return;
        };
        if let Some(source) = self
            .outcome
            .sources
            .iter_mut()
            .find(|s| s.url == url && s.quality.is_none())
        {
            source.quality = Some(quality);
        }
    }

    fn merge(&mut self, source: ExtractedSource) {
        if !self.seen.insert(source.url.clone()) {
            return;
        }
        self.outcome.total_candidates += 1;
        self.push(source);
    }

    fn push(&mut self, source: ExtractedSource) {
        // a relative and an absolute literal can still land on the same url, the response never
        // lists a url twice
        if self.outcome.sources.iter().any(|s| s.url == source.url) {
            debug!("duplicate after resolution: {}", source.url);
            return;
        }
        debug!("recorded {:?} source: {}", source.source_type, source.url);
        self.outcome.sources.push(source);
    }
}

#[derive(Clone)]
pub struct ExtractionService {
    fetcher: DynPageFetcher,
    blocklist: Blocklist,
    decoder: ObfuscationDecoder,
}

impl ExtractionService {
    pub fn new(fetcher: DynPageFetcher, blocklist: Blocklist) -> Self {
        Self {
            fetcher,
            blocklist,
            decoder: ObfuscationDecoder::new(blocklist),
        }
    }

    /// attributes, then script patterns, then obfuscated payloads. order of discovery is kept
    pub fn extract_from_html(&self, html: &str, base: &Url) -> ExtractionOutcome {
        let mut recorder = SourceRecorder::new(base, self.blocklist);

        for pattern in ATTRIBUTE_PATTERNS.iter() {
            for captures in pattern.captures_iter(html) {
                if let Some(literal) = captures.get(1) {
                    recorder.offer(literal.as_str(), None);
                }
            }
        }

        for pattern in SCRIPT_PATTERNS.iter() {
            for captures in pattern.captures_iter(html) {
                if let Some(literal) = captures.get(1) {
                    recorder.offer(literal.as_str(), captures.get(2).map(|m| m.as_str()));
                }
            }
        }

        for source in self.decoder.decode(html, base) {
            recorder.merge(source);
        }

        recorder.outcome
    }
}

#[async_trait]
impl ExtractionServiceTrait for ExtractionService {
    async fn extract(&self, target_url: &Url, timeout_ms: u64) -> Result<ExtractionOutcome, FetchError> {
        info!("extracting sources from {}", target_url);

        let page = self.fetcher.fetch_page(target_url, timeout_ms).await?;
        if page.final_url != target_url.as_str() {
            debug!("{} redirected to {}", target_url, page.final_url);
        }

        // resolve against what the caller asked for, not where the redirects went
        let outcome = self.extract_from_html(&page.body, target_url);

        info!(
            "found {} sources ({} candidates, {} blocked) on {}",
            outcome.sources.len(),
            outcome.total_candidates,
            outcome.blocked_candidates,
            target_url
        );

        Ok(outcome)
    }
}
