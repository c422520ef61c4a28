//! text we ship inside proxied documents. none of it runs here, it runs later in the caller's
//! frame inside the embed's own context and reports back over `postMessage`.
use serde::{Deserialize, Serialize};

use crate::server::dtos::embed_dto::ExtractedSource;
use crate::server::utils::{adblock_bypass::COUNTER_DETECTION_SHIM, blocklist::Blocklist};

pub const VIDEO_EXTRACTED: &str = "VIDEO_EXTRACTED";
pub const EXTRACTION_FAILED: &str = "EXTRACTION_FAILED";

/// marks our own script tags in the output so they're easy to find (and skip) later
pub const INJECTED_ATTRIBUTE: &str = "data-embed-guard";

// placeholders get swapped in `ClientScriptConfig::render`. the loop catches per tick so one
// broken scan doesn't kill the remaining attempts
const CLIENT_EXTRACTOR_TEMPLATE: &str = r#"(function () {
  var POLL_INTERVAL_MS = __POLL_INTERVAL_MS__;
  var MAX_ATTEMPTS = __MAX_ATTEMPTS__;
  var BLOCKED = __BLOCKED_FRAGMENTS__;
  var attempts = 0;
  var done = false;
  var timer = null;

  try { window.open = function () { return null; }; } catch (e) {}

  function post(message) {
    try { window.parent.postMessage(message, '*'); } catch (e) {}
  }

  function blocked(url) {
    var lowered = url.toLowerCase();
    for (var i = 0; i < BLOCKED.length; i++) {
      if (lowered.indexOf(BLOCKED[i]) !== -1) return true;
    }
    return false;
  }

  function absolute(value) {
    if (!value) return null;
    try {
      var resolved = new URL(value, document.baseURI).href;
      return /^https?:/i.test(resolved) ? resolved : null;
    } catch (e) {
      return null;
    }
  }

  function kind(url) {
    if (/\.m3u8/i.test(url)) return 'hls';
    if (/\.mp4/i.test(url)) return 'mp4';
    return 'unknown';
  }

  function scanMedia() {
    var found = [];
    var media = document.querySelectorAll('video, audio');
    for (var i = 0; i < media.length; i++) {
      var el = media[i];
      found.push(el.currentSrc || el.src || el.getAttribute('src'));
      var nested = el.querySelectorAll('source');
      for (var j = 0; j < nested.length; j++) {
        found.push(nested[j].src || nested[j].getAttribute('src'));
      }
    }
    return found;
  }

  function scanMarkup() {
    var root = document.documentElement;
    var html = root ? root.outerHTML : '';
    return html.match(/https?:\/\/[^\s"'<>\\]+?\.(?:m3u8|mp4)(?:\?[^\s"'<>\\]*)?/gi) || [];
  }

  function collect() {
    var seen = {};
    var out = [];
    var all = scanMedia().concat(scanMarkup());
    for (var i = 0; i < all.length; i++) {
      var url = absolute(all[i]);
      if (!url || seen[url] || blocked(url)) continue;
      seen[url] = true;
      out.push({ url: url, type: kind(url) });
    }
    return out;
  }

  function stop() {
    done = true;
    if (timer !== null) clearInterval(timer);
  }

  function tick() {
    if (done) return;
    attempts += 1;
    try {
      var sources = collect();
      if (sources.length > 0) {
        stop();
        post({ type: 'VIDEO_EXTRACTED', sources: sources, pageUrl: location.href });
        return;
      }
    } catch (e) {}
    if (attempts >= MAX_ATTEMPTS) {
      stop();
      post({ type: 'EXTRACTION_FAILED', attempts: attempts, pageUrl: location.href });
    }
  }

  timer = setInterval(tick, POLL_INTERVAL_MS);
})();"#;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientScriptConfig {
    pub poll_interval_ms: u32,
    pub max_attempts: u32,
}

impl Default for ClientScriptConfig {
    // 50 x 300ms, roughly 15 seconds before we give up
    fn default() -> Self {
        Self {
            poll_interval_ms: 300,
            max_attempts: 50,
        }
    }
}

impl ClientScriptConfig {
    pub fn render(&self, blocklist: &Blocklist) -> String {
        // a json array of plain strings is also a valid js literal
        let fragments =
            serde_json::to_string(blocklist.fragments()).unwrap_or_else(|_| "[]".to_string());

        CLIENT_EXTRACTOR_TEMPLATE
            .replace("__POLL_INTERVAL_MS__", &self.poll_interval_ms.to_string())
            .replace("__MAX_ATTEMPTS__", &self.max_attempts.to_string())
            .replace("__BLOCKED_FRAGMENTS__", &fragments)
    }

    /// shim first, extractor second, both tagged so they can be told apart from the embed's own
    pub fn injection_block(&self, blocklist: &Blocklist) -> String {
        format!(
            "<script {attr}=\"shim\">{shim}</script><script {attr}=\"extractor\">{extractor}</script>",
            attr = INJECTED_ATTRIBUTE,
            shim = COUNTER_DETECTION_SHIM,
            extractor = self.render(blocklist),
        )
    }
}

/// what the injected extractor posts back to whoever hosts the frame
///
/// the channel is untrusted (any script in the embed can post to the parent too), so hosts
/// should only act on what `HostMessage::parse` accepts
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum HostMessage {
    #[serde(rename = "VIDEO_EXTRACTED", rename_all = "camelCase")]
    VideoExtracted {
        sources: Vec<ExtractedSource>,
        #[serde(default)]
        page_url: Option<String>,
    },
    #[serde(rename = "EXTRACTION_FAILED", rename_all = "camelCase")]
    ExtractionFailed {
        attempts: u32,
        #[serde(default)]
        page_url: Option<String>,
    },
}

impl HostMessage {
    /// unknown tags, wrong shapes, empty results and non-http sources all come back as `None`
    pub fn parse(raw: &str) -> Option<Self> {
        let message: Self = serde_json::from_str(raw).ok()?;

        let acceptable = match &message {
            Self::VideoExtracted { sources, .. } => {
                !sources.is_empty()
                    && sources
                        .iter()
                        .all(|s| s.url.starts_with("http://") || s.url.starts_with("https://"))
            }
            Self::ExtractionFailed { .. } => true,
        };

        acceptable.then_some(message)
    }

    pub fn tag(&self) -> &'static str {
        match self {
            Self::VideoExtracted { .. } => VIDEO_EXTRACTED,
            Self::ExtractionFailed { .. } => EXTRACTION_FAILED,
        }
    }
}
