//! Network and persistence boundaries: the page fetcher used by source
//! adapters and the `Store` used by reconciliation and expiry.

pub mod http;
pub mod memory;
pub mod pg;
pub mod store;

pub use http::{
    BackoffPolicy, FetchError, FetchedPage, HttpClientConfig, HttpFetcher, PageFetcher,
    PageRequest, DEFAULT_USER_AGENT,
};
pub use memory::MemoryStore;
pub use pg::PgStore;
pub use store::Store;

pub const CRATE_NAME: &str = "railhub-storage";
