//! Search over remote, versioned documentation sites.
//!
//! [`SiteSearch`] resolves versions against the site's manifest, keeps built
//! indices in a bounded cache, and ranks results grouped by article.
//! [`DocsiteServer`] exposes it as MCP tools.

pub mod cache;
pub mod config;
pub mod error;
pub mod fetch;
pub mod search;
pub mod server;
pub mod site;
pub mod tools;
pub mod tracing;
pub mod version;

pub use cache::{BoundedCache, CacheRecord, CacheStats, EstimateSize};
pub use config::Config;
pub use error::{FetchError, Result, SearchError};
pub use fetch::{DocSource, HttpSource, RetryPolicy};
#[cfg(any(test, feature = "test-util"))]
pub use fetch::MemorySource;
pub use search::{DocumentRecord, GroupedResult, SearchIndexEntry, SearchResponse};
pub use server::DocsiteServer;
pub use site::SiteSearch;
pub use version::{VersionInfo, VersionResolution, VersionResolver};
