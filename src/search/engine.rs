//! Full-text engine seam and the built-in TF-IDF engine.
//!
//! The search core never scores text itself. It hands documents to a
//! [`SearchEngine`], which returns an [`EngineIndex`] that answers free-text
//! queries and structured [`Query`]s with ranked [`EngineHit`]s.

use super::DocumentRecord;
use super::tokenize::tokenize_and_stem;
use ahash::AHashMap;
use rust_stemmers::{Algorithm, Stemmer};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

/// Searchable document fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Field {
    Title,
    Text,
    Tags,
}

impl Field {
    pub const ALL: [Self; 3] = [Self::Title, Self::Text, Self::Tags];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Title => "title",
            Self::Text => "text",
            Self::Tags => "tags",
        }
    }
}

/// Per-field score multipliers. Only the ordering `tags > title > text` matters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FieldWeights {
    pub title: f64,
    pub text: f64,
    pub tags: f64,
}

impl Default for FieldWeights {
    fn default() -> Self {
        Self {
            text: 1.0,
            title: 100.0,
            tags: 10_000.0,
        }
    }
}

impl FieldWeights {
    pub const fn weight(&self, field: Field) -> f64 {
        match field {
            Field::Title => self.title,
            Field::Text => self.text,
            Field::Tags => self.tags,
        }
    }
}

/// Which index terms matched a hit, and in which fields.
pub type MatchMetadata = BTreeMap<String, BTreeSet<Field>>;

/// A document returned by the engine with its relevance score.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineHit {
    /// The document's location.
    pub reference: String,
    pub score: f64,
    pub matches: MatchMetadata,
}

/// How a clause term is compared against index terms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Wildcard {
    #[default]
    None,
    /// Matches every index term starting with the clause term.
    Trailing,
}

/// One term of a structured query.
#[derive(Debug, Clone, PartialEq)]
pub struct Clause {
    pub term: String,
    /// Fields to search; empty means all fields.
    pub fields: Vec<Field>,
    pub boost: f64,
    pub wildcard: Wildcard,
}

impl Clause {
    pub fn new(term: impl Into<String>) -> Self {
        Self {
            term: term.into(),
            fields: Vec::new(),
            boost: 1.0,
            wildcard: Wildcard::None,
        }
    }

    #[must_use]
    pub fn fields(mut self, fields: &[Field]) -> Self {
        self.fields = fields.to_vec();
        self
    }

    #[must_use]
    pub const fn boost(mut self, boost: f64) -> Self {
        self.boost = boost;
        self
    }

    #[must_use]
    pub const fn trailing_wildcard(mut self) -> Self {
        self.wildcard = Wildcard::Trailing;
        self
    }

    fn applies_to(&self, field: Field) -> bool {
        self.fields.is_empty() || self.fields.contains(&field)
    }
}

/// A structured query: the sum of its clauses.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    pub clauses: Vec<Clause>,
}

impl Query {
    /// Build a query through a callback, mirroring engines with builder-style query APIs.
    pub fn build(f: impl FnOnce(&mut Self)) -> Self {
        let mut query = Self::default();
        f(&mut query);
        query
    }

    pub fn clause(&mut self, clause: Clause) -> &mut Self {
        self.clauses.push(clause);
        self
    }

    /// Parse free text: whitespace-separated terms, a trailing `*` marks a wildcard.
    pub fn parse(text: &str) -> Self {
        Self::build(|q| {
            for raw in text.split_whitespace() {
                match raw.strip_suffix('*') {
                    Some(prefix) if !prefix.is_empty() => {
                        q.clause(Clause::new(prefix).trailing_wildcard());
                    }
                    Some(_) => {}
                    None => {
                        q.clause(Clause::new(raw));
                    }
                }
            }
        })
    }
}

/// A built, queryable index.
pub trait EngineIndex: Send + Sync {
    /// Run a free-text query.
    fn search(&self, query: &str) -> anyhow::Result<Vec<EngineHit>>;

    /// Run a structured query.
    fn query(&self, query: &Query) -> anyhow::Result<Vec<EngineHit>>;

    fn document_count(&self) -> usize;
}

/// Builds engine indices from document records.
pub trait SearchEngine: Send + Sync {
    fn build_index(&self, weights: &FieldWeights, documents: &[DocumentRecord]) -> Arc<dyn EngineIndex>;
}

/// The built-in engine: stemmed, field-weighted TF-IDF.
#[derive(Debug, Clone, Copy, Default)]
pub struct TfIdfEngine;

impl SearchEngine for TfIdfEngine {
    fn build_index(&self, weights: &FieldWeights, documents: &[DocumentRecord]) -> Arc<dyn EngineIndex> {
        let mut builder = TermBuilder::new(*weights);
        for document in documents {
            builder.add_document(document);
        }
        Arc::new(builder.finalize())
    }
}

/// Term saturation constant: repeated occurrences add less and less.
const TF_SATURATION: f64 = 1.2;

/// One (document, field) occurrence of a term with its final weighted score.
#[derive(Debug, Clone, Copy)]
struct Posting {
    doc: usize,
    field: Field,
    score: f64,
}

/// Accumulates raw term frequencies before TF-IDF finalization.
struct TermBuilder {
    weights: FieldWeights,
    stemmer: Stemmer,
    refs: Vec<String>,
    /// term → (doc, field) → raw count
    term_docs: BTreeMap<String, AHashMap<(usize, Field), u32>>,
    /// (doc, field) → token count
    field_lengths: AHashMap<(usize, Field), usize>,
}

impl TermBuilder {
    fn new(weights: FieldWeights) -> Self {
        Self {
            weights,
            stemmer: Stemmer::create(Algorithm::English),
            refs: Vec::new(),
            term_docs: BTreeMap::new(),
            field_lengths: AHashMap::new(),
        }
    }

    fn add_document(&mut self, document: &DocumentRecord) {
        let doc = self.refs.len();
        self.refs.push(document.location.clone());

        self.add_field(doc, Field::Title, &document.title);
        self.add_field(doc, Field::Text, &document.text);
        self.add_field(doc, Field::Tags, &document.tags.join(" "));
    }

    fn add_field(&mut self, doc: usize, field: Field, text: &str) {
        let tokens = tokenize_and_stem(text, &self.stemmer);
        if tokens.is_empty() {
            return;
        }
        self.field_lengths.insert((doc, field), tokens.len());
        for token in tokens {
            *self
                .term_docs
                .entry(token)
                .or_default()
                .entry((doc, field))
                .or_insert(0) += 1;
        }
    }

    /// Scores each posting as `idf * saturated_tf * field_weight`, where
    /// `idf = ln(1 + N / df)` and the term frequency is normalized by the
    /// field's length relative to that field's average length.
    fn finalize(self) -> TfIdfIndex {
        let start = std::time::Instant::now();
        let total_docs = self.refs.len() as f64;

        let mut length_sums: AHashMap<Field, (usize, usize)> = AHashMap::new();
        for ((_, field), len) in &self.field_lengths {
            let entry = length_sums.entry(*field).or_insert((0, 0));
            entry.0 += len;
            entry.1 += 1;
        }
        let avg_length = |field: Field| {
            length_sums
                .get(&field)
                .map_or(1.0, |(sum, count)| *sum as f64 / *count as f64)
        };

        let mut terms = BTreeMap::new();
        let mut posting_count = 0;
        for (term, occurrences) in self.term_docs {
            let doc_freq = occurrences
                .keys()
                .map(|(doc, _)| *doc)
                .collect::<BTreeSet<_>>()
                .len() as f64;
            let idf = (1.0 + total_docs / doc_freq).ln();

            let mut postings: Vec<Posting> = occurrences
                .into_iter()
                .map(|((doc, field), count)| {
                    let length = self.field_lengths.get(&(doc, field)).copied().unwrap_or(1) as f64;
                    // Clamp to prevent over-penalizing long fields
                    let length_norm = (length / avg_length(field)).max(0.5);
                    let tf = f64::from(count) / length_norm;
                    let saturated = tf / (tf + TF_SATURATION);
                    Posting {
                        doc,
                        field,
                        score: idf * saturated * self.weights.weight(field),
                    }
                })
                .collect();
            postings.sort_by_key(|p| (p.doc, p.field));
            posting_count += postings.len();
            terms.insert(term, postings);
        }

        let index = TfIdfIndex {
            refs: self.refs,
            terms,
            stemmer: Stemmer::create(Algorithm::English),
        };

        tracing::debug!(
            "Built engine index: {} unique terms, {} documents, {} postings in {:?}",
            index.terms.len(),
            index.refs.len(),
            posting_count,
            start.elapsed()
        );

        index
    }
}

/// Inverted index produced by [`TfIdfEngine`].
pub struct TfIdfIndex {
    refs: Vec<String>,
    /// Ordered so trailing wildcards are a range scan.
    terms: BTreeMap<String, Vec<Posting>>,
    stemmer: Stemmer,
}

impl std::fmt::Debug for TfIdfIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TfIdfIndex")
            .field("documents", &self.refs.len())
            .field("terms", &self.terms.len())
            .finish()
    }
}

impl TfIdfIndex {
    /// Index terms a clause expands to. Exact terms go through the same
    /// tokenizer and stemmer as indexed text; wildcard prefixes are only lowercased.
    fn expand(&self, clause: &Clause) -> Vec<&str> {
        match clause.wildcard {
            Wildcard::Trailing => {
                let prefix = clause.term.to_lowercase();
                self.terms
                    .range::<str, _>((std::ops::Bound::Included(prefix.as_str()), std::ops::Bound::Unbounded))
                    .take_while(|(term, _)| term.starts_with(&prefix))
                    .map(|(term, _)| term.as_str())
                    .collect()
            }
            Wildcard::None => tokenize_and_stem(&clause.term, &self.stemmer)
                .into_iter()
                .filter_map(|token| self.terms.get_key_value(token.as_str()).map(|(k, _)| k.as_str()))
                .collect(),
        }
    }

    fn run(&self, query: &Query) -> Vec<EngineHit> {
        let mut scores: AHashMap<usize, f64> = AHashMap::new();
        let mut matches: AHashMap<usize, MatchMetadata> = AHashMap::new();

        for clause in &query.clauses {
            for term in self.expand(clause) {
                let Some(postings) = self.terms.get(term) else {
                    continue;
                };
                for posting in postings.iter().filter(|p| clause.applies_to(p.field)) {
                    *scores.entry(posting.doc).or_insert(0.0) += posting.score * clause.boost;
                    matches
                        .entry(posting.doc)
                        .or_default()
                        .entry(term.to_string())
                        .or_default()
                        .insert(posting.field);
                }
            }
        }

        let mut hits: Vec<_> = scores.into_iter().collect();
        hits.sort_by(|(doc_a, a), (doc_b, b)| b.total_cmp(a).then(doc_a.cmp(doc_b)));

        hits.into_iter()
            .map(|(doc, score)| EngineHit {
                reference: self.refs[doc].clone(),
                score,
                matches: matches.remove(&doc).unwrap_or_default(),
            })
            .collect()
    }
}

impl EngineIndex for TfIdfIndex {
    fn search(&self, query: &str) -> anyhow::Result<Vec<EngineHit>> {
        Ok(self.run(&Query::parse(query)))
    }

    fn query(&self, query: &Query) -> anyhow::Result<Vec<EngineHit>> {
        Ok(self.run(query))
    }

    fn document_count(&self) -> usize {
        self.refs.len()
    }
}
