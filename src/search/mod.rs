//! Search over a documentation site's corpus.
//!
//! This module provides the pieces between a raw per-version corpus and ranked,
//! grouped results: the engine seam and built-in TF-IDF engine, the index
//! builder that links sections to their articles, the cached index entry, and
//! the post-query ranking.

// Module declarations
pub(crate) mod builder;
pub(crate) mod engine;
pub(crate) mod index;
pub(crate) mod ranking;
pub(crate) mod tokenize;

// Public re-exports (used via lib.rs)
pub use builder::{BuiltIndex, IndexBuilder, IndexedDocument, article_path, make_preview};
pub use engine::{
    Clause, EngineHit, EngineIndex, Field, FieldWeights, MatchMetadata, Query, SearchEngine,
    TfIdfEngine, TfIdfIndex, Wildcard,
};
pub use index::{IndexMetadata, SearchIndexEntry};
pub use ranking::{GroupedResult, SearchResponse, search};

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One searchable page or in-page section, as published by the site.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentRecord {
    /// Page path, optionally followed by `#anchor`. Unique within a corpus.
    pub location: String,
    pub title: String,
    pub text: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// Lenient view of a corpus entry; incomplete entries are skipped, not fatal.
#[derive(Debug, Deserialize)]
struct RawDocument {
    location: Option<String>,
    title: Option<String>,
    text: Option<String>,
    #[serde(default)]
    tags: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
struct RawCorpus {
    docs: Vec<Value>,
}

/// Parse a corpus body shaped `{"docs": [{location, title, text, tags?}, ...]}`.
///
/// Entries missing (or with empty) `location`, `title`, or `text` are dropped.
pub fn parse_corpus(body: &Value) -> Result<Vec<DocumentRecord>, serde_json::Error> {
    let corpus = RawCorpus::deserialize(body)?;
    let total = corpus.docs.len();

    let records: Vec<_> = corpus
        .docs
        .into_iter()
        .filter_map(|entry| serde_json::from_value::<RawDocument>(entry).ok())
        .filter_map(|raw| {
            let location = raw.location.filter(|s| !s.is_empty())?;
            let title = raw.title.filter(|s| !s.is_empty())?;
            let text = raw.text.filter(|s| !s.is_empty())?;
            Some(DocumentRecord {
                location,
                title,
                text,
                tags: raw.tags.unwrap_or_default(),
            })
        })
        .collect();

    if records.len() < total {
        tracing::debug!(
            "Skipped {} of {} corpus entries without location, title, or text",
            total - records.len(),
            total
        );
    }

    Ok(records)
}
