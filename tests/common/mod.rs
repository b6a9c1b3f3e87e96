//! Shared test fixtures for integration tests.
//!
//! # Test Isolation Strategy
//!
//! Every test gets its own [`FakeSite`]: an in-memory [`MemorySource`] that
//! serves a manifest and per-version corpora, plus a fresh [`SiteSearch`] with
//! empty caches. Nothing touches the network.
//!
//! # Available Fixtures
//!
//! - `versioned_site`: manifest with `v2.0` (aliased `latest`) and `v1.0`
//! - `unversioned_site`: no manifest, one corpus at the site root

use docsite_mcp::config::CacheConfig;
use docsite_mcp::search::TfIdfEngine;
use docsite_mcp::{Config, MemorySource, SiteSearch};
use rstest::fixture;
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;

pub const BASE_URL: &str = "https://docs.example.com";

/// A documentation site served from memory.
#[allow(dead_code)] // Fields used across different integration test crates
pub struct FakeSite {
    pub source: Arc<MemorySource>,
    pub site: SiteSearch,
}

#[allow(dead_code)] // Methods used across different integration test crates
impl FakeSite {
    pub fn new(source: MemorySource, cache: CacheConfig) -> Self {
        let source = Arc::new(source);
        let mut config = Config::for_site(BASE_URL);
        config.cache = cache;
        config.retry.base_delay_ms = 10;
        let site = SiteSearch::new(config, source.clone(), Arc::new(TfIdfEngine));
        Self { source, site }
    }

    pub fn manifest_url() -> String {
        format!("{BASE_URL}/versions.json")
    }

    /// Corpus URL for a version, or the site root corpus when `None`.
    pub fn corpus_url(version: Option<&str>) -> String {
        match version {
            Some(version) => format!("{BASE_URL}/{version}/search/search_index.json"),
            None => format!("{BASE_URL}/search/search_index.json"),
        }
    }

    pub fn corpus_requests(&self, version: Option<&str>) -> usize {
        self.source.requests(&Self::corpus_url(version))
    }
}

/// A corpus with one article and two sections, titled for `release`.
pub fn corpus(release: &str) -> Value {
    json!({
        "config": {"lang": ["en"]},
        "docs": [
            {
                "location": "",
                "title": "Home",
                "text": format!("Documentation for release {release}.")
            },
            {
                "location": "getting-started/",
                "title": "Getting started",
                "text": "Install the package and write your first configuration file."
            },
            {
                "location": "getting-started/#installation",
                "title": "Installation",
                "text": "Use pip to install the package from the index."
            },
            {
                "location": "getting-started/#configuration",
                "title": "Configuration",
                "text": "Create a configuration file next to your project."
            },
            {
                "location": "plugins/",
                "title": "Plugins",
                "text": "Plugins extend the build with new commands.",
                "tags": ["extensions"]
            },
            {
                "location": "changelog/",
                "title": format!("Release notes {release}"),
                "text": format!("Changes shipped in {release}.")
            }
        ]
    })
}

pub fn manifest() -> Value {
    json!([
        {"version": "v2.0", "title": "2.0", "aliases": ["latest"]},
        {"version": "v1.0", "title": "1.0", "aliases": []}
    ])
}

pub fn versioned_source() -> MemorySource {
    let source = MemorySource::new();
    source.insert(FakeSite::manifest_url(), manifest());
    source.insert(FakeSite::corpus_url(Some("v2.0")), corpus("v2.0"));
    source.insert(FakeSite::corpus_url(Some("v1.0")), corpus("v1.0"));
    source
}

#[fixture]
pub fn versioned_site() -> FakeSite {
    FakeSite::new(versioned_source(), CacheConfig::default())
}

#[fixture]
pub fn unversioned_site() -> FakeSite {
    let source = MemorySource::new();
    source.insert(FakeSite::corpus_url(None), corpus("1.0"));
    FakeSite::new(source, CacheConfig::default())
}

/// A versioned site whose responses take `latency` to arrive.
#[allow(dead_code)]
pub fn slow_versioned_site(latency: Duration) -> FakeSite {
    let source = versioned_source().with_latency(latency);
    FakeSite::new(source, CacheConfig::default())
}
