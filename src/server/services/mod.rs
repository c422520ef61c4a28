pub mod edge_services;
pub mod extraction_services;
pub mod fetch_services;
pub mod proxy_services;

pub use extraction_services::DynExtractionService;
pub use fetch_services::DynPageFetcher;
pub use proxy_services::DynProxyService;
