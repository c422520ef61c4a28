/// known ad and tracker infrastructure, matched as lowercase substrings anywhere in the url
///
/// blunt on purpose, `analytics` will catch the odd innocent url too. add entries here rather than
/// making the matching smarter
pub const AD_BLOCKLIST: &[&str] = &[
    // networks
    "doubleclick.net",
    "googlesyndication.com",
    "googleadservices.com",
    "google-analytics.com",
    "googletagmanager.com",
    "googletagservices.com",
    "adservice.google.",
    "imasdk.googleapis.com",
    "amazon-adsystem.com",
    "adnxs.com",
    "adsrvr.org",
    "criteo.com",
    "taboola.com",
    "outbrain.com",
    "popads.net",
    "popcash.net",
    "propellerads",
    "adsterra",
    "exoclick.com",
    "juicyads.com",
    "trafficjunky",
    "adcash.com",
    "hilltopads",
    "clickadu",
    "onclickads",
    "mgid.com",
    "zedo.com",
    "scorecardresearch.com",
    "quantserve.com",
    "hotjar.com",
    "mc.yandex.ru",
    "connect.facebook.net",
    // path and keyword fragments
    "/ads/",
    "/ad/",
    "/adv/",
    "/advert",
    "/banner/",
    "/vast/",
    "/vpaid/",
    "preroll",
    "popup",
    "popunder",
    "analytics",
    "tracker",
    "tracking",
    "/pixel",
];

/// url classifier backed by a static fragment table
///
/// copies are free, so every component that needs it just holds its own
#[derive(Debug, Clone, Copy)]
pub struct Blocklist {
    fragments: &'static [&'static str],
}

impl Default for Blocklist {
    fn default() -> Self {
        Self::new(AD_BLOCKLIST)
    }
}

impl Blocklist {
    pub const fn new(fragments: &'static [&'static str]) -> Self {
        Self { fragments }
    }

    /// case-insensitive substring test, no io and no state
    pub fn is_blocked(&self, url: &str) -> bool {
        let lowered = url.to_ascii_lowercase();
        self.fragments
            .iter()
            .any(|fragment| lowered.contains(fragment))
    }

    pub fn fragments(&self) -> &'static [&'static str] {
        self.fragments
    }
}
