use std::sync::Arc;

use tracing::info;

use crate::{
    config::AppConfig,
    server::{
        services::{
            extraction_services::ExtractionService,
            fetch_services::{DynPageFetcher, PageFetcher},
            proxy_services::ProxyService,
        },
        utils::blocklist::Blocklist,
    },
};

use super::{extraction_services::DynExtractionService, proxy_services::DynProxyService};

/// everything a handler needs, cloned into each request through `Extension`
/// nothing in here is mutable so clones are just arc bumps
#[derive(Clone)]
pub struct EdgeServices {
    pub fetcher: DynPageFetcher,
    pub extraction: DynExtractionService,
    pub proxy: DynProxyService,
    pub config: Arc<AppConfig>,
}

impl EdgeServices {
    pub fn new(config: Arc<AppConfig>) -> Self {
        info!("starting edge services...");

        let fetcher = Arc::new(PageFetcher::new(&config.user_agent)) as DynPageFetcher;

        Self::with_fetcher(config, fetcher)
    }

    /// same wiring with a different fetcher, tests hand in a mock here
    pub fn with_fetcher(config: Arc<AppConfig>, fetcher: DynPageFetcher) -> Self {
        let blocklist = Blocklist::default();

        let extraction =
            Arc::new(ExtractionService::new(fetcher.clone(), blocklist)) as DynExtractionService;
        let proxy = Arc::new(ProxyService::new(fetcher.clone(), blocklist)) as DynProxyService;

        info!("fetcher, extraction and proxy services ok");

        Self {
            fetcher,
            extraction,
            proxy,
            config,
        }
    }
}
