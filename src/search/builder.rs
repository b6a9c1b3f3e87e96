//! Builds engine indices and the article/section document graph.

use super::DocumentRecord;
use super::engine::{EngineIndex, FieldWeights, SearchEngine};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Weak};

/// Separates a page path from an in-page anchor.
pub const ANCHOR_MARKER: char = '#';

/// Preview length in characters, before the ellipsis.
pub const PREVIEW_CHARS: usize = 200;

const ELLIPSIS: &str = "...";

/// A document as seen by ranking: display fields plus its place in the
/// article/section graph.
#[derive(Debug)]
pub struct IndexedDocument {
    pub title: String,
    pub location: String,
    pub preview: String,
    pub tags: Vec<String>,
    /// True when `location` carries an anchor.
    pub is_section: bool,
    /// `location` without its anchor.
    pub article_path: String,
    /// The article this section belongs to. Never keeps the article alive.
    parent: Option<Weak<IndexedDocument>>,
}

impl IndexedDocument {
    fn from_record(record: &DocumentRecord) -> Self {
        let article_path = article_path(&record.location).to_string();
        Self {
            title: record.title.clone(),
            location: record.location.clone(),
            preview: make_preview(&record.text),
            tags: record.tags.clone(),
            is_section: record.location.contains(ANCHOR_MARKER),
            article_path,
            parent: None,
        }
    }

    /// The article owning this section, if it exists in the same index.
    pub fn parent(&self) -> Option<Arc<Self>> {
        self.parent.as_ref().and_then(Weak::upgrade)
    }

    /// Approximate heap footprint of the display fields.
    pub(crate) fn heap_bytes(&self) -> usize {
        self.title.len()
            + self.location.len()
            + self.preview.len()
            + self.article_path.len()
            + self.tags.iter().map(String::len).sum::<usize>()
    }
}

/// `location` with any `#anchor` removed.
pub fn article_path(location: &str) -> &str {
    location
        .split_once(ANCHOR_MARKER)
        .map_or(location, |(path, _)| path)
}

/// First [`PREVIEW_CHARS`] characters of `text` with whitespace collapsed,
/// followed by `...` when truncated.
pub fn make_preview(text: &str) -> String {
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    match collapsed.char_indices().nth(PREVIEW_CHARS) {
        Some((cut, _)) => format!("{}{}", &collapsed[..cut], ELLIPSIS),
        None => collapsed,
    }
}

/// Output of [`IndexBuilder::build`].
pub struct BuiltIndex {
    pub engine: Arc<dyn EngineIndex>,
    /// Every indexed document by location.
    pub documents: HashMap<String, Arc<IndexedDocument>>,
}

impl std::fmt::Debug for BuiltIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BuiltIndex")
            .field("documents", &self.documents.len())
            .finish_non_exhaustive()
    }
}

/// Turns a corpus into an engine index and a document graph.
#[derive(Clone)]
pub struct IndexBuilder {
    engine: Arc<dyn SearchEngine>,
    weights: FieldWeights,
}

impl std::fmt::Debug for IndexBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexBuilder")
            .field("weights", &self.weights)
            .finish_non_exhaustive()
    }
}

impl IndexBuilder {
    pub fn new(engine: Arc<dyn SearchEngine>, weights: FieldWeights) -> Self {
        Self { engine, weights }
    }

    /// Index `records` and link each section to its article.
    ///
    /// Records without a location, title, or text are ignored. Articles are
    /// collected before sections are linked, so a section listed ahead of its
    /// article still gets a parent. A location listed more than once is
    /// indexed once, from its last occurrence.
    pub fn build(&self, records: &[DocumentRecord]) -> BuiltIndex {
        let mut seen: HashSet<&str> = HashSet::with_capacity(records.len());
        let mut records: Vec<DocumentRecord> = records
            .iter()
            .rev()
            .filter(|r| !r.location.is_empty() && !r.title.is_empty() && !r.text.is_empty())
            .filter(|&r| seen.insert(r.location.as_str()))
            .cloned()
            .collect();
        records.reverse();

        let mut documents: HashMap<String, Arc<IndexedDocument>> =
            HashMap::with_capacity(records.len());
        let mut articles: HashMap<String, Arc<IndexedDocument>> = HashMap::new();

        for record in records.iter().filter(|r| !r.location.contains(ANCHOR_MARKER)) {
            let article = Arc::new(IndexedDocument::from_record(record));
            articles.insert(article.article_path.clone(), article.clone());
            documents.insert(article.location.clone(), article);
        }

        let mut orphans = 0;
        for record in records.iter().filter(|r| r.location.contains(ANCHOR_MARKER)) {
            let mut section = IndexedDocument::from_record(record);
            section.parent = articles.get(&section.article_path).map(Arc::downgrade);
            if section.parent.is_none() {
                orphans += 1;
            }
            documents.insert(section.location.clone(), Arc::new(section));
        }

        if orphans > 0 {
            tracing::debug!("{} sections have no article in the corpus", orphans);
        }

        BuiltIndex {
            engine: self.engine.build_index(&self.weights, &records),
            documents,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::TfIdfEngine;
    use assert2::{check, let_assert};
    use rstest::rstest;

    fn record(location: &str, title: &str) -> DocumentRecord {
        DocumentRecord {
            location: location.to_string(),
            title: title.to_string(),
            text: format!("Text of {}", title),
            tags: Vec::new(),
        }
    }

    fn builder() -> IndexBuilder {
        IndexBuilder::new(Arc::new(TfIdfEngine), FieldWeights::default())
    }

    #[rstest]
    #[case("page.html", "page.html")]
    #[case("page.html#section", "page.html")]
    #[case("guide/#a#b", "guide/")]
    #[case("#top", "")]
    fn test_article_path(#[case] location: &str, #[case] expected: &str) {
        check!(article_path(location) == expected);
    }

    #[test]
    fn test_section_links_to_earlier_article() {
        let built = builder().build(&[record("page.html", "Page"), record("page.html#section", "Section")]);

        let_assert!(Some(section) = built.documents.get("page.html#section"));
        check!(section.is_section);
        check!(section.article_path == "page.html");
        let_assert!(Some(parent) = section.parent());
        check!(parent.location == "page.html");
        check!(!parent.is_section);
        check!(parent.parent().is_none());
    }

    #[test]
    fn test_section_links_to_later_article() {
        let built = builder().build(&[record("page.html#section", "Section"), record("page.html", "Page")]);

        let_assert!(Some(section) = built.documents.get("page.html#section"));
        let_assert!(Some(parent) = section.parent());
        check!(parent.location == "page.html");
    }

    #[test]
    fn test_repeated_location_indexed_once_from_last_record() {
        let built = builder().build(&[
            record("a/", "Alpha"),
            record("a/#intro", "Intro"),
            record("a/", "Alpha again"),
        ]);

        check!(built.documents.len() == 2);
        check!(built.documents["a/"].title == "Alpha again");
        let_assert!(Some(parent) = built.documents["a/#intro"].parent());
        check!(parent.title == "Alpha again");

        let_assert!(Ok(hits) = built.engine.search("alpha"));
        let refs: Vec<_> = hits.iter().map(|h| h.reference.as_str()).collect();
        check!(refs == vec!["a/"]);
    }

    #[test]
    fn test_orphan_section_has_no_parent() {
        let built = builder().build(&[record("other.html", "Other"), record("page.html#section", "Section")]);
        let_assert!(Some(section) = built.documents.get("page.html#section"));
        check!(section.parent().is_none());
    }

    #[test]
    fn test_parent_reference_does_not_own_article() {
        let built = builder().build(&[record("page.html", "Page"), record("page.html#s", "S")]);
        let section = built.documents["page.html#s"].clone();
        drop(built);
        check!(section.parent().is_none());
    }

    #[test]
    fn test_incomplete_records_are_skipped() {
        let mut untitled = record("blank.html", "");
        untitled.title.clear();
        let mut empty = record("empty.html", "Empty");
        empty.text.clear();

        let built = builder().build(&[record("page.html", "Page"), untitled, empty]);

        check!(built.documents.len() == 1);
        check!(built.engine.document_count() == 1);
    }

    #[rstest]
    #[case("short text", "short text")]
    #[case("  spaced \n\t out  ", "spaced out")]
    fn test_preview_untruncated(#[case] text: &str, #[case] expected: &str) {
        check!(make_preview(text) == expected);
    }

    #[test]
    fn test_preview_truncates_on_char_boundary() {
        let text = "é".repeat(250);
        let preview = make_preview(&text);
        check!(preview.ends_with("..."));
        check!(preview.chars().count() == PREVIEW_CHARS + 3);

        let exact = "x".repeat(PREVIEW_CHARS);
        check!(make_preview(&exact) == exact);
    }
}
