//! Text tokenization and stemming for the built-in engine.

use rust_stemmers::Stemmer;

/// Common English stop words to filter out from indexing.
/// These high-frequency words add little value to search relevance.
pub(crate) const STOP_WORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "by", "for", "from", "has", "he", "in", "is", "it",
    "its", "of", "on", "that", "the", "to", "was", "will", "with",
];

/// Characters that join sub-words into one compound identifier.
fn is_joiner(c: char) -> bool {
    c == '_' || c == '-'
}

/// Splits text into lowercase terms, without stemming.
///
/// Words are maximal runs of alphanumerics and joiners (`_`, `-`). Each word
/// contributes its parts, split on joiners and on lower→upper case changes,
/// and, if it had more than one part, the whole word as well:
/// - "HttpServer" → ["http", "server", "httpserver"]
/// - "parse_json" → ["parse", "json", "parse_json"]
/// - "v2" → ["v2"]
pub(crate) fn tokenize(text: &str) -> Vec<String> {
    let mut tokens = Vec::new();

    for word in text
        .split(|c: char| !(c.is_alphanumeric() || is_joiner(c)))
        .map(|w| w.trim_matches(is_joiner))
        .filter(|w| !w.is_empty())
    {
        let parts = split_word(word);
        let compound = parts.len() > 1;
        for part in parts {
            push_token(part, &mut tokens);
        }
        if compound {
            push_token(word, &mut tokens);
        }
    }

    tokens
}

/// Tokenizes and stems text, so "configuring" and "configured" share a term.
pub(crate) fn tokenize_and_stem(text: &str, stemmer: &Stemmer) -> Vec<String> {
    tokenize(text)
        .into_iter()
        .map(|token| stemmer.stem(&token).into_owned())
        .collect()
}

/// Split one word on joiners and camelCase boundaries.
fn split_word(word: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut start = 0;
    let mut prev_lower = false;

    for (i, c) in word.char_indices() {
        if is_joiner(c) {
            if start < i {
                parts.push(&word[start..i]);
            }
            start = i + c.len_utf8();
            prev_lower = false;
            continue;
        }

        if prev_lower && c.is_uppercase() && start < i {
            parts.push(&word[start..i]);
            start = i;
        }
        prev_lower = c.is_lowercase();
    }

    if start < word.len() {
        parts.push(&word[start..]);
    }
    parts
}

fn push_token(token: &str, tokens: &mut Vec<String>) {
    let lowercase = token.to_lowercase();
    if STOP_WORDS.contains(&lowercase.as_str()) {
        return;
    }
    tokens.push(lowercase);
}
