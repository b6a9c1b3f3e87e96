//! Tool handlers: thin wrappers that render [`SiteSearch`](crate::site::SiteSearch)
//! output as text for MCP clients.

pub mod search;
pub mod stats;
pub mod versions;

pub use search::*;
pub use stats::*;
pub use versions::*;
