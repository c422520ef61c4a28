use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

lazy_static! {
    // manifests first so a master.m3u8?fallback=x.mp4 style url still reads as hls
    static ref HLS_PATTERN: Regex =
        Regex::new(r"(?i)(?:\.m3u8(?:[?#&/]|$)|/(?:master|playlist|index)\.m3u8)")
            .expect("hls pattern should compile");
    static ref MP4_PATTERN: Regex =
        Regex::new(r"(?i)\.mp4(?:[?#&/]|$)").expect("mp4 pattern should compile");
    static ref OTHER_VIDEO_PATTERN: Regex =
        Regex::new(r"(?i)\.(?:mkv|webm)(?:[?#&/]|$)").expect("container pattern should compile");
    // tokens have to stand alone, otherwise `sd` fires on every `/sdk/` path
    static ref QUALITY_PATTERN: Regex =
        Regex::new(r"(?i)(?:^|[^a-z0-9])(\d{3,4}p|fhd|uhd|hd|sd|4k)(?:[^a-z0-9]|$)")
            .expect("quality pattern should compile");
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    Hls,
    Mp4,
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoClassification {
    pub is_video: bool,
    pub source_type: SourceType,
    pub quality: Option<String>,
}

/// decides whether a url points at a stream, purely from its text
pub fn classify(url: &str) -> VideoClassification {
    let source_type = if HLS_PATTERN.is_match(url) {
        SourceType::Hls
    } else if MP4_PATTERN.is_match(url) {
        SourceType::Mp4
    } else {
        SourceType::Unknown
    };

    let is_video = source_type != SourceType::Unknown || OTHER_VIDEO_PATTERN.is_match(url);

    VideoClassification {
        is_video,
        source_type,
        quality: extract_quality(url),
    }
}

/// first quality token in the text, lowercased. `None` when there isn't one
pub fn extract_quality(text: &str) -> Option<String> {
    QUALITY_PATTERN
        .captures(text)
        .and_then(|captures| captures.get(1))
        .map(|token| token.as_str().to_ascii_lowercase())
}

/// player configs label renditions as `"720p"`, `"HD"` or just `1080`
pub fn quality_from_label(label: &str) -> Option<String> {
    let label = label.trim();
    extract_quality(label).or_else(|| {
        label
            .parse::<u16>()
            .ok()
            .and_then(|height| extract_quality(&format!("{}p", height)))
    })
}
