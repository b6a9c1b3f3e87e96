//! Error handling types and utilities.

use thiserror::Error;

/// A specialized Result type for binary and tool glue.
///
/// This is an alias for `anyhow::Result` with context added via `.context()` and
/// `.with_context()` methods. Library operations return [`SearchError`] instead.
pub type Result<T> = anyhow::Result<T>;

/// Error returned by a [`DocSource`](crate::fetch::DocSource) when a remote document
/// cannot be retrieved or decoded.
#[derive(Debug, Error)]
pub enum FetchError {
    /// The URL could not be parsed or uses an unsupported scheme.
    #[error("invalid URL '{0}'")]
    InvalidUrl(String),

    /// The request never produced a response (DNS, connect, timeout, body read).
    #[error("request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// The server answered with a non-success status.
    #[error("{url} returned HTTP {status}")]
    Status { url: String, status: u16 },

    /// The body was not the JSON we expected.
    #[error("failed to decode JSON from {url}: {source}")]
    Decode {
        url: String,
        #[source]
        source: serde_json::Error,
    },
}

impl FetchError {
    /// Whether retrying the same request could plausibly succeed.
    ///
    /// Timeouts, connection failures, 429 and 5xx responses are transient.
    /// A 404 or a malformed body will look the same on every attempt.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Request { source, .. } => {
                source.is_timeout() || source.is_connect() || source.is_request() || source.is_body()
            }
            Self::Status { status, .. } => *status == 429 || (500..600).contains(status),
            Self::InvalidUrl(_) | Self::Decode { .. } => false,
        }
    }

    /// Whether the remote reported that the resource does not exist.
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::Status { status: 404, .. })
    }
}

/// Errors surfaced by the search core to its callers.
#[derive(Debug, Error)]
pub enum SearchError {
    /// An explicitly requested version is not in a non-empty manifest.
    #[error("Version '{requested}' not found. Available versions: {}", available.join(", "))]
    VersionNotFound {
        requested: String,
        available: Vec<String>,
    },

    /// A versioned URL was requested for a version that does not resolve.
    #[error("{0}")]
    VersionUnavailable(String),

    /// The per-version corpus could not be fetched.
    #[error("failed to load search index from {base_url}{}: {source}", version_suffix(version.as_deref()))]
    IndexLoad {
        base_url: String,
        version: Option<String>,
        #[source]
        source: FetchError,
    },

    /// A shared in-flight build failed; waiters only see the rendered cause.
    #[error("failed to build search index from {base_url} (version {version}): {message}")]
    Build {
        base_url: String,
        version: String,
        message: String,
    },

    /// The engine rejected or failed the primary query.
    #[error("search for '{query}' failed (version {version}): {message}")]
    Query {
        query: String,
        version: String,
        message: String,
    },
}

fn version_suffix(version: Option<&str>) -> String {
    version.map(|v| format!(" (version {v})")).unwrap_or_default()
}
