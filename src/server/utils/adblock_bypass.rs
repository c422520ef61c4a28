use std::ops::Range;

use lazy_static::lazy_static;
use regex::Regex;

/// lowercase needles that mark an inline or external script as a detector
pub const SCRIPT_DETECTOR_SIGNATURES: &[&str] = &[
    "adblock",
    "blockadblock",
    "fuckadblock",
    "sandbox",
    "frameelement",
    "parent.location",
];

/// lowercase needles for the "please turn off your blocker" overlays, checked against class and id
pub const NOTICE_SIGNATURES: &[&str] = &[
    "adblock",
    "ad-block",
    "ad_block",
    "adb-notice",
    "adb-overlay",
    "disable-ad",
];

pub const REMOVED_SCRIPT_MARKER: &str = "<!-- embed-adblocker: detector script removed -->";
pub const REMOVED_NOTICE_MARKER: &str = "<!-- embed-adblocker: blocker notice removed -->";

/// runs ahead of everything else we inject. makes the page think its ads loaded and keeps
/// popups shut. careful editing this, none of the signature strings above may appear in here or
/// the proxied output stops being clean
pub const COUNTER_DETECTION_SHIM: &str = r#"(function () {
  try {
    var noop = function () { return null; };
    try {
      Object.defineProperty(window, 'open', { value: noop, writable: false, configurable: false });
    } catch (e) {
      window.open = noop;
    }
    window.adsbygoogle = window.adsbygoogle || [];
    window.adsbygoogle.loaded = true;
    window.adsbygoogle.push = function () { return 0; };
    window.canRunAds = true;
    window.isAdsDisplayed = true;
    window.google_ad_status = 1;
  } catch (e) {}
})();"#;

lazy_static! {
    static ref ELEMENT_OPEN: Regex =
        Regex::new(r"(?i)<(script|div)\b[^>]*>").expect("element open pattern should compile");
    static ref SCRIPT_CLOSE: Regex =
        Regex::new(r"(?i)</script(?:[\s/][^>]*)?>").expect("script close pattern should compile");
    static ref SCRIPT_OPEN: Regex =
        Regex::new(r"(?i)<script\b[^>]*>").expect("script open pattern should compile");
    static ref DIV_TAG: Regex =
        Regex::new(r"(?i)<(/?)div\b[^>]*>").expect("div tag pattern should compile");
    static ref MARKER_ATTRIBUTE: Regex =
        Regex::new(r#"(?i)\b(?:class|id)\s*=\s*["']([^"']*)["']"#)
            .expect("marker attribute pattern should compile");
}

/// what came out of a rewrite, the counts are only for logging
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StrippedDocument {
    pub html: String,
    pub removed_scripts: usize,
    pub removed_notices: usize,
}

/// replaces detector scripts and blocker notices with comment markers
///
/// best effort. it raises the bar for the embed, it doesn't promise every detector is gone
pub fn strip_detectors(html: &str) -> String {
    strip_detectors_with_report(html).html
}

pub fn strip_detectors_with_report(html: &str) -> StrippedDocument {
    let mut report = StrippedDocument {
        html: String::with_capacity(html.len()),
        ..Default::default()
    };
    let mut cursor = 0;

    while let Some(captures) = ELEMENT_OPEN.captures_at(html, cursor) {
        let (Some(open), Some(tag)) = (captures.get(0), captures.get(1)) else {
            break;
        };
        report.html.push_str(&html[cursor..open.start()]);

        if tag.as_str().eq_ignore_ascii_case("script") {
            let end = script_end(html, open.end());
            let block = &html[open.start()..end];

            if contains_any(block, SCRIPT_DETECTOR_SIGNATURES) {
                report.html.push_str(REMOVED_SCRIPT_MARKER);
                report.removed_scripts += 1;
            } else {
                report.html.push_str(block);
            }
            cursor = end;
        } else if is_notice(open.as_str()) {
            let end = matching_div_close(html, open.end()).unwrap_or(open.end());
            report.html.push_str(REMOVED_NOTICE_MARKER);
            report.removed_notices += 1;
            cursor = end;
        } else {
            report.html.push_str(open.as_str());
            cursor = open.end();
        }
    }

    report.html.push_str(&html[cursor..]);
    report
}

/// byte ranges of every `<script>` element, open tag through close tag
///
/// anything inside these is script text as far as the browser is concerned, markup-looking
/// strings included
pub fn script_spans(html: &str) -> Vec<Range<usize>> {
    let mut spans = Vec::new();
    let mut cursor = 0;

    while let Some(open) = SCRIPT_OPEN.find_at(html, cursor) {
        let end = script_end(html, open.end());
        spans.push(open.start()..end);
        cursor = end;
    }

    spans
}

// an unclosed script runs to the end of the document as far as the browser cares
fn script_end(html: &str, from: usize) -> usize {
    SCRIPT_CLOSE
        .find_at(html, from)
        .map_or(html.len(), |close| close.end())
}

fn contains_any(text: &str, needles: &[&str]) -> bool {
    let lowered = text.to_ascii_lowercase();
    needles.iter().any(|needle| lowered.contains(needle))
}

fn is_notice(open_tag: &str) -> bool {
    MARKER_ATTRIBUTE
        .captures_iter(open_tag)
        .filter_map(|captures| captures.get(1))
        .any(|value| contains_any(value.as_str(), NOTICE_SIGNATURES))
}

/// end offset of the `</div>` that closes a div whose opening tag ends at `from`
fn matching_div_close(html: &str, from: usize) -> Option<usize> {
    let mut depth = 1usize;
    for captures in DIV_TAG.captures_iter(&html[from..]) {
        let (Some(tag), Some(slash)) = (captures.get(0), captures.get(1)) else {
            continue;
        };
        if slash.as_str().is_empty() {
            depth += 1;
        } else {
            depth -= 1;
            if depth == 0 {
                return Some(from + tag.end());
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn removes_detector_scripts_with_a_marker() {
        let html = r#"<html><head><script>if (!window.canRunAds) { showAdblockWall(); }</script><script>var player = 1;</script></head></html>"#;

        let report = strip_detectors_with_report(html);

        assert_eq!(report.removed_scripts, 1);
        assert!(report.html.contains(REMOVED_SCRIPT_MARKER));
        assert!(report.html.contains("<script>var player = 1;</script>"));
        assert!(!report.html.contains("showAdblockWall"));
    }

    #[test]
    fn external_detector_scripts_go_too() {
        let html = r#"<script src="https://cdn.example/fuckadblock.min.js"></script><p>hi</p>"#;

        let stripped = strip_detectors(html);

        assert_eq!(stripped, format!("{}<p>hi</p>", REMOVED_SCRIPT_MARKER));
    }

    #[test]
    fn frame_checks_are_detectors() {
        let html = r#"<SCRIPT type="text/javascript">if (window.frameElement || parent.location != location) { top.location = self.location; }</SCRIPT >"#;

        assert_eq!(strip_detectors(html), REMOVED_SCRIPT_MARKER);
    }

    #[test]
    fn unclosed_script_is_handled() {
        let html = "<p>x</p><script>detectSandbox()";

        assert_eq!(strip_detectors(html), format!("<p>x</p>{}", REMOVED_SCRIPT_MARKER));
    }

    #[test]
    fn removes_nested_notice_divs_whole() {
        let html = r#"<div class="wrap"><div class="adblock-notice"><div>Please disable your blocker</div></div><video></video></div>"#;

        let report = strip_detectors_with_report(html);

        assert_eq!(report.removed_notices, 1);
        assert_eq!(
            report.html,
            format!(r#"<div class="wrap">{}<video></video></div>"#, REMOVED_NOTICE_MARKER)
        );
    }

    #[test]
    fn notice_matched_by_id() {
        let html = r#"<div id="AdBlock_overlay">turn it off</div><span>ok</span>"#;

        assert_eq!(
            strip_detectors(html),
            format!("{}<span>ok</span>", REMOVED_NOTICE_MARKER)
        );
    }

    #[test]
    fn clean_documents_pass_through() {
        let html = r#"<!doctype html><html><body><div class="player"><video src="/a.mp4"></video></div><script>jwplayer().setup({file:"/a.m3u8"})</script></body></html>"#;

        assert_eq!(strip_detectors(html), html);
    }

    #[test]
    fn script_spans_cover_open_to_close() {
        let html = r#"<p>a</p><script>var t = "</head>";</script><p>b</p><script src="/x.js">"#;

        let spans = script_spans(html);

        assert_eq!(spans.len(), 2);
        assert_eq!(&html[spans[0].clone()], r#"<script>var t = "</head>";</script>"#);
        assert_eq!(spans[1].end, html.len());
    }

    #[test]
    fn shim_is_clean() {
        assert!(!contains_any(COUNTER_DETECTION_SHIM, SCRIPT_DETECTOR_SIGNATURES));
    }
}
