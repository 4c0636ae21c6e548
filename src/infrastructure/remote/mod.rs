pub mod cache;
pub mod catalog_client;
pub mod download;
pub mod http_client;
pub mod listing;
pub mod mirror_selector;

#[cfg(test)]
pub(crate) mod test_server;

pub use cache::{CachedCatalog, LocalCache, NetworkErrorPolicy};
pub use catalog_client::{CatalogClient, HttpCatalogClient, ProgressFn};
pub use download::DownloadSummary;
pub use http_client::HttpClient;
pub use mirror_selector::MirrorSelector;
