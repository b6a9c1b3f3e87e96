//! The cached per-version search index.

use super::builder::{BuiltIndex, IndexedDocument};
use super::engine::EngineIndex;
use crate::cache::EstimateSize;
use crate::version::join_url;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::SystemTime;

/// Fixed allowance for the engine's own structures.
const ENGINE_OVERHEAD_BYTES: u64 = 512 * 1024;

/// Allowance per document for postings and graph bookkeeping.
const PER_DOCUMENT_BYTES: u64 = 2 * 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexMetadata {
    pub loaded_at: SystemTime,
    pub estimated_size_bytes: u64,
    pub document_count: usize,
    /// Built for a non-versioned site or for the default/latest version.
    pub is_default: bool,
}

/// A built index for one (site, resolved version). Immutable once created.
pub struct SearchIndexEntry {
    pub version: String,
    /// Root that document locations are relative to.
    pub site_url: String,
    /// Corpus URL the index was built from.
    pub source_url: String,
    pub engine: Arc<dyn EngineIndex>,
    pub documents: HashMap<String, Arc<IndexedDocument>>,
    pub metadata: IndexMetadata,
}

impl std::fmt::Debug for SearchIndexEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SearchIndexEntry")
            .field("version", &self.version)
            .field("site_url", &self.site_url)
            .field("source_url", &self.source_url)
            .field("metadata", &self.metadata)
            .finish_non_exhaustive()
    }
}

impl SearchIndexEntry {
    pub fn new(
        version: impl Into<String>,
        site_url: impl Into<String>,
        source_url: impl Into<String>,
        built: BuiltIndex,
        is_default: bool,
    ) -> Self {
        let estimated_size_bytes = estimate_index_bytes(&built.documents);
        let document_count = built.documents.len();
        Self {
            version: version.into(),
            site_url: site_url.into(),
            source_url: source_url.into(),
            engine: built.engine,
            documents: built.documents,
            metadata: IndexMetadata {
                loaded_at: SystemTime::now(),
                estimated_size_bytes,
                document_count,
                is_default,
            },
        }
    }

    pub fn document(&self, location: &str) -> Option<&Arc<IndexedDocument>> {
        self.documents.get(location)
    }

    /// Absolute link to a document location.
    pub fn page_url(&self, location: &str) -> String {
        join_url(&self.site_url, location)
    }
}

fn estimate_index_bytes(documents: &HashMap<String, Arc<IndexedDocument>>) -> u64 {
    let content: u64 = documents
        .iter()
        .map(|(location, doc)| (location.len() + doc.heap_bytes()) as u64)
        .sum();
    ENGINE_OVERHEAD_BYTES + PER_DOCUMENT_BYTES * documents.len() as u64 + content
}

impl EstimateSize for SearchIndexEntry {
    fn estimate_size(&self) -> anyhow::Result<u64> {
        Ok(self.metadata.estimated_size_bytes)
    }
}
