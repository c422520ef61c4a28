use url::Url;

/// `scheme://host[:port]` of a url, this is what goes out as the referer
pub fn origin(url: &Url) -> String {
    url.origin().ascii_serialization()
}

/// undo the escapes that show up when urls live inside js strings or json blobs
///
/// `https:\/\/cdn\/a.m3u8` and `https:\u002F\u002Fcdn\u002Fa.m3u8` are both common
pub fn unescape_js(literal: &str) -> String {
    literal
        .replace("\\/", "/")
        .replace("\\u002F", "/")
        .replace("\\u002f", "/")
        .replace("\\u0026", "&")
        .replace("&amp;", "&")
}

/// resolves a discovered literal against the page it was found on
///
/// handles absolute, protocol relative (`//cdn/...`) and plain relative references. anything that
/// still isn't http(s) afterwards (`javascript:`, `data:`, `blob:`) is dropped
pub fn resolve(base: &Url, literal: &str) -> Option<String> {
    let cleaned = unescape_js(literal.trim());
    if cleaned.is_empty() {
        return None;
    }

    let resolved = base.join(&cleaned).ok()?;

    match resolved.scheme() {
        "http" | "https" => Some(resolved.to_string()),
        _ => None,
    }
}

/// minimal escaping for dropping a value into an html attribute or text node
pub fn escape_html(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#x27;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Url {
        Url::parse("https://host.example/embed/42").expect("test base should parse")
    }

    #[test]
    fn resolves_root_relative_paths() {
        assert_eq!(
            resolve(&base(), "/streams/a.m3u8").as_deref(),
            Some("https://host.example/streams/a.m3u8")
        );
    }

    #[test]
    fn resolves_path_relative_and_protocol_relative() {
        assert_eq!(
            resolve(&base(), "hls/b.m3u8").as_deref(),
            Some("https://host.example/embed/hls/b.m3u8")
        );
        assert_eq!(
            resolve(&base(), "//cdn.example/c.mp4").as_deref(),
            Some("https://cdn.example/c.mp4")
        );
    }

    #[test]
    fn keeps_absolute_urls() {
        assert_eq!(
            resolve(&base(), "https://cdn.example/master.m3u8").as_deref(),
            Some("https://cdn.example/master.m3u8")
        );
    }

    #[test]
    fn unescapes_js_literals() {
        assert_eq!(
            resolve(&base(), r"https:\/\/cdn.example\/a.m3u8").as_deref(),
            Some("https://cdn.example/a.m3u8")
        );
        assert_eq!(
            resolve(&base(), r"https:\u002F\u002Fcdn.example\u002Fa.m3u8").as_deref(),
            Some("https://cdn.example/a.m3u8")
        );
    }

    #[test]
    fn drops_non_http_schemes() {
        assert_eq!(resolve(&base(), "javascript:alert(1)"), None);
        assert_eq!(resolve(&base(), "blob:https://host.example/abc"), None);
        assert_eq!(resolve(&base(), "   "), None);
    }

    #[test]
    fn origin_strips_path() {
        let url = Url::parse("https://host.example:8443/embed/42?x=1").expect("should parse");
        assert_eq!(origin(&url), "https://host.example:8443");
    }

    #[test]
    fn escapes_attribute_breakers() {
        assert_eq!(
            escape_html(r#"https://x/"><script>"#),
            "https://x/&quot;&gt;&lt;script&gt;"
        );
    }
}
