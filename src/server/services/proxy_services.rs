use std::ops::Range;
use std::sync::Arc;

use async_trait::async_trait;
use lazy_static::lazy_static;
use mockall::automock;
use regex::Regex;
use tracing::{debug, info};
use url::Url;

use crate::server::{
    services::fetch_services::{DynPageFetcher, FetchError},
    utils::{
        adblock_bypass::{script_spans, strip_detectors_with_report},
        blocklist::Blocklist,
        client_script::ClientScriptConfig,
        url_utils::escape_html,
    },
};

pub type DynProxyService = Arc<dyn ProxyServiceTrait + Send + Sync>;

lazy_static! {
    static ref HEAD_OPEN: Regex =
        Regex::new(r"(?i)<head\b[^>]*>").expect("head pattern should compile");
    static ref BASE_TAG: Regex = Regex::new(r"(?i)<base\b").expect("base pattern should compile");
    static ref HEAD_CLOSE: Regex =
        Regex::new(r"(?i)</head\s*>").expect("head close pattern should compile");
    static ref BODY_CLOSE: Regex =
        Regex::new(r"(?i)</body\s*>").expect("body close pattern should compile");
}

const WRAPPER_TEMPLATE: &str = r#"<!DOCTYPE html>
<!-- embed-adblocker: wrapper mode (degraded). the embed is framed as-is, nothing inside it was rewritten -->
<html>
<head>
<meta charset="utf-8">
<meta name="viewport" content="width=device-width, initial-scale=1">
<title>embed</title>
<style>html,body{margin:0;padding:0;width:100%;height:100%;overflow:hidden;background:#000}iframe{border:0;width:100%;height:100%;display:block}</style>
<script>
(function () {
  var home = location.href;
  try { window.open = function () { return null; }; } catch (e) {}
  window.addEventListener('beforeunload', function (event) {
    event.preventDefault();
    event.returnValue = '';
    return '';
  });
  setInterval(function () {
    try {
      if (window.top === window && location.href !== home) { location.replace(home); }
    } catch (e) {}
  }, 500);
})();
</script>
</head>
<body>
<iframe src="__TARGET__" sandbox="allow-scripts allow-same-origin allow-forms allow-presentation" allow="autoplay; fullscreen; encrypted-media; picture-in-picture" allowfullscreen referrerpolicy="origin"></iframe>
</body>
</html>"#;

const ERROR_PAGE_TEMPLATE: &str = r#"<!DOCTYPE html>
<html>
<head><meta charset="utf-8"><title>embed unavailable</title></head>
<body style="margin:0;background:#000;color:#aaa;font-family:sans-serif;display:flex;align-items:center;justify-content:center;height:100vh">
<p>__MESSAGE__</p>
</body>
</html>"#;

/// the rewritten embed page, served as-is
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RewrittenDocument {
    pub html: String,
}

#[automock]
#[async_trait]
pub trait ProxyServiceTrait {
    /// fetch, strip detectors, inject the client extractor. fails only when the fetch does
    async fn proxy(&self, target_url: &Url, timeout_ms: u64) -> Result<RewrittenDocument, FetchError>;
}

#[derive(Clone)]
pub struct ProxyService {
    fetcher: DynPageFetcher,
    blocklist: Blocklist,
    client_script: ClientScriptConfig,
}

impl ProxyService {
    pub fn new(fetcher: DynPageFetcher, blocklist: Blocklist) -> Self {
        Self {
            fetcher,
            blocklist,
            client_script: ClientScriptConfig::default(),
        }
    }

    /// the pure half of `proxy`, split out so it can be tested without a fetch
    pub fn rewrite(&self, html: &str, target_url: &Url) -> RewrittenDocument {
        let stripped = strip_detectors_with_report(html);
        if stripped.removed_scripts > 0 || stripped.removed_notices > 0 {
            debug!(
                "removed {} detector scripts and {} notices from {}",
                stripped.removed_scripts, stripped.removed_notices, target_url
            );
        }

        let mut document = stripped.html;
        let mut injection = String::new();

        if find_outside_scripts(&BASE_TAG, &document).is_none() {
            let base = format!(r#"<base href="{}">"#, escape_html(target_url.as_str()));
            match find_outside_scripts(&HEAD_OPEN, &document) {
                Some(head) => document.insert_str(head.end, &base),
                // no head to hang it off, it rides along with the scripts instead
                None => injection.push_str(&base),
            }
        }

        injection.push_str(&self.client_script.injection_block(&self.blocklist));

        let at = find_outside_scripts(&HEAD_CLOSE, &document)
            .or_else(|| find_outside_scripts(&BODY_CLOSE, &document))
            .map(|m| m.start);
        match at {
            Some(at) => document.insert_str(at, &injection),
            None => document.push_str(&injection),
        }

        RewrittenDocument { html: document }
    }

    /// fallback that frames the embed untouched, everything here runs on the wrapper's side only.
    /// it can't reach into the cross-origin frame, so it's a lot weaker than `proxy`
    pub fn wrapper(target_url: &Url) -> String {
        WRAPPER_TEMPLATE.replace("__TARGET__", &escape_html(target_url.as_str()))
    }

    pub fn error_page(message: &str) -> String {
        ERROR_PAGE_TEMPLATE.replace("__MESSAGE__", &escape_html(message))
    }
}

/// first match that is real markup, `"</head>"` inside a script string doesn't count
fn find_outside_scripts(pattern: &Regex, html: &str) -> Option<Range<usize>> {
    let spans = script_spans(html);

    pattern
        .find_iter(html)
        .map(|m| m.range())
        .find(|m| !spans.iter().any(|span| span.start <= m.start && m.start < span.end))
}

#[async_trait]
impl ProxyServiceTrait for ProxyService {
    async fn proxy(&self, target_url: &Url, timeout_ms: u64) -> Result<RewrittenDocument, FetchError> {
        info!("proxying {}", target_url);

        let page = self.fetcher.fetch_page(target_url, timeout_ms).await?;
        let document = self.rewrite(&page.body, target_url);

        debug!(
            "rewrote {} ({} bytes in, {} bytes out)",
            target_url,
            page.body.len(),
            document.html.len()
        );

        Ok(document)
    }
}
