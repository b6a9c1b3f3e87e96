//! Post-query ranking, grouping by article, and query suggestions.

use super::builder::IndexedDocument;
use super::engine::{Clause, EngineHit, Field, Query};
use super::index::SearchIndexEntry;
use crate::error::SearchError;
use serde::Serialize;
use std::collections::HashMap;

/// Added once per query term found in the title.
const TITLE_TERM_BOOST: f64 = 0.5;
/// Added when the title equals the query.
const EXACT_TITLE_BOOST: f64 = 2.0;
/// Added for articles, so a page edges out its own sections.
const ARTICLE_BOOST: f64 = 0.2;
/// Added once per query term found in any tag.
const TAG_TERM_BOOST: f64 = 0.3;

/// Suggestions are only offered below this many results.
const SUGGESTION_THRESHOLD: usize = 3;
const SUGGESTION_SOURCE_HITS: usize = 5;
const MAX_SUGGESTIONS: usize = 5;
const SUGGESTION_TITLE_BOOST: f64 = 10.0;

/// One ranked document, article or section.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupedResult {
    pub location: String,
    pub title: String,
    pub preview: String,
    pub tags: Vec<String>,
    pub is_section: bool,
    /// Group key shared by an article and its sections.
    pub article_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_title: Option<String>,
    pub url: String,
    /// Boosted score. Zero for an article added only to complete its group.
    pub score: f64,
    /// Engine score before boosting.
    pub base_score: f64,
}

impl GroupedResult {
    fn new(entry: &SearchIndexEntry, doc: &IndexedDocument, score: f64, base_score: f64) -> Self {
        Self {
            location: doc.location.clone(),
            title: doc.title.clone(),
            preview: doc.preview.clone(),
            tags: doc.tags.clone(),
            is_section: doc.is_section,
            article_path: doc.article_path.clone(),
            parent_title: doc.parent().map(|parent| parent.title.clone()),
            url: entry.page_url(&doc.location),
            score,
            base_score,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchResponse {
    pub query: String,
    pub version: String,
    /// Groups in rank order, flattened.
    pub results: Vec<GroupedResult>,
    pub total: usize,
    pub group_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestions: Option<Vec<String>>,
}

/// Query terms used for boosting: lowercase, longer than one character, distinct.
fn query_terms(query: &str) -> Vec<String> {
    let mut terms: Vec<String> = Vec::new();
    for term in query.to_lowercase().split_whitespace() {
        if term.chars().count() > 1 && !terms.iter().any(|t| t == term) {
            terms.push(term.to_string());
        }
    }
    terms
}

fn boost_for(doc: &IndexedDocument, terms: &[String], query: &str) -> f64 {
    let title = doc.title.to_lowercase();
    let tags: Vec<String> = doc.tags.iter().map(|t| t.to_lowercase()).collect();

    let mut boost = 1.0;
    for term in terms {
        if title.contains(term.as_str()) {
            boost += TITLE_TERM_BOOST;
        }
        if tags.iter().any(|tag| tag.contains(term.as_str())) {
            boost += TAG_TERM_BOOST;
        }
    }
    if title == query {
        boost += EXACT_TITLE_BOOST;
    }
    if !doc.is_section {
        boost += ARTICLE_BOOST;
    }
    boost
}

fn top_score(members: &[GroupedResult]) -> f64 {
    members.first().map_or(0.0, |m| m.score)
}

/// Run `query` against one built index and group the ranked results by article.
pub fn search(entry: &SearchIndexEntry, query: &str, version: &str) -> Result<SearchResponse, SearchError> {
    let hits = entry.engine.search(query).map_err(|e| SearchError::Query {
        query: query.to_string(),
        version: version.to_string(),
        message: format!("{e:#}"),
    })?;

    let normalized = query.trim().to_lowercase();
    let terms = query_terms(query);

    let mut groups: Vec<(String, Vec<GroupedResult>)> = Vec::new();
    let mut group_index: HashMap<String, usize> = HashMap::new();

    for hit in &hits {
        let Some(doc) = entry.document(&hit.reference) else {
            tracing::debug!("Engine returned unknown document '{}'", hit.reference);
            continue;
        };
        let score = hit.score * boost_for(doc, &terms, &normalized);
        let result = GroupedResult::new(entry, doc, score, hit.score);

        let slot = *group_index.entry(doc.article_path.clone()).or_insert_with(|| {
            groups.push((doc.article_path.clone(), Vec::new()));
            groups.len() - 1
        });
        groups[slot].1.push(result);
    }

    for (article_path, members) in &mut groups {
        if !members.iter().any(|m| m.location == *article_path)
            && let Some(article) = entry.document(article_path)
        {
            members.push(GroupedResult::new(entry, article, 0.0, 0.0));
        }
        members.sort_by(|a, b| b.score.total_cmp(&a.score));
    }

    groups.sort_by(|(_, a), (_, b)| top_score(b).total_cmp(&top_score(a)));

    let group_count = groups.len();
    let results: Vec<GroupedResult> = groups.into_iter().flat_map(|(_, members)| members).collect();
    let total = results.len();

    let suggestions = if total < SUGGESTION_THRESHOLD {
        suggest(entry, &terms, &normalized)
    } else {
        None
    };

    Ok(SearchResponse {
        query: query.to_string(),
        version: version.to_string(),
        results,
        total,
        group_count,
        suggestions,
    })
}

/// Related index terms from a looser prefix query. Failures yield no suggestions.
fn suggest(entry: &SearchIndexEntry, terms: &[String], query: &str) -> Option<Vec<String>> {
    if terms.is_empty() {
        return None;
    }

    let expanded = Query::build(|q| {
        for term in terms {
            q.clause(
                Clause::new(term.as_str())
                    .fields(&[Field::Title])
                    .boost(SUGGESTION_TITLE_BOOST)
                    .trailing_wildcard(),
            );
            q.clause(Clause::new(term.as_str()).fields(&[Field::Title, Field::Text]));
        }
    });

    let hits: Vec<EngineHit> = match entry.engine.query(&expanded) {
        Ok(hits) => hits,
        Err(e) => {
            tracing::debug!("Suggestion query failed: {:#}", e);
            return None;
        }
    };

    let mut suggestions: Vec<String> = Vec::new();
    for term in hits
        .iter()
        .take(SUGGESTION_SOURCE_HITS)
        .flat_map(|hit| hit.matches.keys())
    {
        if suggestions.len() == MAX_SUGGESTIONS {
            break;
        }
        if term.chars().count() > 2 && !query.contains(term.as_str()) && !suggestions.contains(term) {
            suggestions.push(term.clone());
        }
    }

    (!suggestions.is_empty()).then_some(suggestions)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::{DocumentRecord, EngineIndex, FieldWeights, IndexBuilder, MatchMetadata, TfIdfEngine};
    use assert2::{check, let_assert};
    use rstest::rstest;
    use std::collections::BTreeSet;
    use std::sync::Arc;

    /// Engine double that answers every query with canned hits.
    struct FixedHits {
        search: anyhow::Result<Vec<EngineHit>>,
        query: anyhow::Result<Vec<EngineHit>>,
    }

    fn clone_result(result: &anyhow::Result<Vec<EngineHit>>) -> anyhow::Result<Vec<EngineHit>> {
        match result {
            Ok(hits) => Ok(hits.clone()),
            Err(e) => Err(anyhow::anyhow!("{e}")),
        }
    }

    impl EngineIndex for FixedHits {
        fn search(&self, _query: &str) -> anyhow::Result<Vec<EngineHit>> {
            clone_result(&self.search)
        }

        fn query(&self, _query: &Query) -> anyhow::Result<Vec<EngineHit>> {
            clone_result(&self.query)
        }

        fn document_count(&self) -> usize {
            0
        }
    }

    fn hit(reference: &str, score: f64) -> EngineHit {
        EngineHit {
            reference: reference.to_string(),
            score,
            matches: MatchMetadata::new(),
        }
    }

    fn hit_matching(reference: &str, terms: &[&str]) -> EngineHit {
        EngineHit {
            reference: reference.to_string(),
            score: 1.0,
            matches: terms
                .iter()
                .map(|t| (t.to_string(), BTreeSet::from([Field::Title])))
                .collect(),
        }
    }

    fn doc(location: &str, title: &str, tags: &[&str]) -> DocumentRecord {
        DocumentRecord {
            location: location.to_string(),
            title: title.to_string(),
            text: format!("About {title}"),
            tags: tags.iter().map(|t| t.to_string()).collect(),
        }
    }

    fn entry_with(records: &[DocumentRecord], search: Vec<EngineHit>, query: anyhow::Result<Vec<EngineHit>>) -> SearchIndexEntry {
        let built = IndexBuilder::new(Arc::new(TfIdfEngine), FieldWeights::default()).build(records);
        let mut entry = SearchIndexEntry::new(
            "v1.0",
            "https://docs.example.com/v1.0",
            "https://docs.example.com/v1.0/search/search_index.json",
            built,
            false,
        );
        entry.engine = Arc::new(FixedHits { search: Ok(search), query });
        entry
    }

    fn locations(response: &SearchResponse) -> Vec<&str> {
        response.results.iter().map(|r| r.location.as_str()).collect()
    }

    #[test]
    fn test_group_includes_unmatched_article() {
        let entry = entry_with(
            &[doc("page.html", "Page", &[]), doc("page.html#section", "Section", &[])],
            vec![hit("page.html#section", 1.0)],
            Ok(Vec::new()),
        );

        let_assert!(Ok(response) = search(&entry, "section", "v1.0"));
        check!(locations(&response) == vec!["page.html#section", "page.html"]);
        check!(response.group_count == 1);
        check!(response.total == 2);

        let article = &response.results[1];
        check!(article.score == 0.0);
        check!(article.base_score == 0.0);
        check!(!article.is_section);

        let section = &response.results[0];
        check!(section.parent_title.as_deref() == Some("Page"));
        check!(section.url == "https://docs.example.com/v1.0/page.html#section");
    }

    #[test]
    fn test_exact_title_outranks_partial_title() {
        let entry = entry_with(
            &[doc("guide/", "Install guide", &[]), doc("install/", "Install", &[])],
            vec![hit("guide/", 1.0), hit("install/", 1.0)],
            Ok(Vec::new()),
        );

        let_assert!(Ok(response) = search(&entry, "Install", "v1.0"));
        check!(locations(&response) == vec!["install/", "guide/"]);
        check!(response.results[0].score > response.results[1].score);
        check!(response.results[0].base_score == 1.0);
    }

    #[rstest]
    #[case::title_term("alpha", &[], 1.0 + 0.5 + 0.2)]
    #[case::exact_title("alpha beta", &[], 1.0 + 0.5 + 0.5 + 2.0 + 0.2)]
    #[case::tag_term("gamma", &["Gamma-rays"], 1.0 + 0.3 + 0.2)]
    #[case::single_chars_ignored("a b", &[], 1.0 + 0.2)]
    #[case::repeated_terms("alpha alpha", &[], 1.0 + 0.5 + 0.2)]
    fn test_boost_components(#[case] query: &str, #[case] tags: &[&str], #[case] expected: f64) {
        let entry = entry_with(&[doc("a/", "Alpha Beta", tags)], vec![hit("a/", 2.0)], Ok(Vec::new()));

        let_assert!(Ok(response) = search(&entry, query, "v1.0"));
        let result = &response.results[0];
        check!((result.score - 2.0 * expected).abs() < 1e-9);
        check!(result.base_score == 2.0);
    }

    #[test]
    fn test_groups_ordered_by_top_member() {
        let entry = entry_with(
            &[
                doc("a/", "Alpha", &[]),
                doc("a/#one", "One", &[]),
                doc("b/", "Bravo", &[]),
                doc("b/#two", "Two", &[]),
            ],
            vec![hit("a/", 1.0), hit("b/#two", 5.0), hit("a/#one", 3.0), hit("b/", 2.0)],
            Ok(Vec::new()),
        );

        let_assert!(Ok(response) = search(&entry, "zzz", "v1.0"));
        check!(locations(&response) == vec!["b/#two", "b/", "a/#one", "a/"]);
        check!(response.group_count == 2);
        check!(response.suggestions.is_none());
    }

    #[test]
    fn test_unknown_references_are_dropped() {
        let entry = entry_with(&[doc("a/", "Alpha", &[])], vec![hit("gone/", 9.0), hit("a/", 1.0)], Ok(Vec::new()));
        let_assert!(Ok(response) = search(&entry, "alpha", "v1.0"));
        check!(locations(&response) == vec!["a/"]);
    }

    #[test]
    fn test_suggestions_for_sparse_results() {
        let entry = entry_with(
            &[doc("a/", "Configuration", &[])],
            Vec::new(),
            Ok(vec![
                hit_matching("a/", &["conf", "configur", "in"]),
                hit_matching("b/", &["configur", "plugin"]),
            ]),
        );

        let_assert!(Ok(response) = search(&entry, "conf", "v1.0"));
        check!(response.total == 0);
        check!(response.suggestions == Some(vec!["configur".to_string(), "plugin".to_string()]));
    }

    #[test]
    fn test_suggestions_capped_at_five() {
        let terms = ["alpha", "bravo", "charlie", "delta", "echo", "foxtrot"];
        let entry = entry_with(&[], Vec::new(), Ok(vec![hit_matching("a/", &terms)]));

        let_assert!(Ok(response) = search(&entry, "xy", "v1.0"));
        let_assert!(Some(suggestions) = response.suggestions);
        check!(suggestions.len() == 5);
    }

    #[test]
    fn test_suggestion_failure_is_swallowed() {
        let entry = entry_with(&[], Vec::new(), Err(anyhow::anyhow!("engine offline")));
        let_assert!(Ok(response) = search(&entry, "anything", "v1.0"));
        check!(response.suggestions.is_none());
    }

    #[test]
    fn test_primary_query_failure_is_reported() {
        let mut entry = entry_with(&[], Vec::new(), Ok(Vec::new()));
        entry.engine = Arc::new(FixedHits {
            search: Err(anyhow::anyhow!("bad syntax")),
            query: Ok(Vec::new()),
        });

        let_assert!(Err(SearchError::Query { message, .. }) = search(&entry, "a:b", "v1.0"));
        check!(message.contains("bad syntax"));
    }

    #[test]
    fn test_with_builtin_engine() {
        let built = IndexBuilder::new(Arc::new(TfIdfEngine), FieldWeights::default()).build(&[
            doc("install/", "Installation", &[]),
            doc("install/#pip", "Using pip", &[]),
            doc("config/", "Configuration", &["setup"]),
        ]);
        let entry = SearchIndexEntry::new("default", "https://docs.example.com", "", built, true);

        let_assert!(Ok(response) = search(&entry, "pip", "default"));
        check!(locations(&response) == vec!["install/#pip", "install/"]);
        check!(response.results[0].url == "https://docs.example.com/install/#pip");
    }
}
