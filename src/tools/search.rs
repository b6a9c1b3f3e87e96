//! Full-text search handler for a documentation site.

use crate::search::{GroupedResult, SearchResponse};
use crate::site::SiteSearch;
use rmcp::schemars;
use serde::Deserialize;
use std::fmt::Write as _;

/// Groups shown when the request does not set a limit.
pub const DEFAULT_LIMIT: usize = 10;

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct SearchRequest {
    /// Search query
    pub query: String,
    /// Version or alias to search, such as "v2.0" or "latest" (default: latest)
    #[serde(default)]
    pub version: Option<String>,
    /// Maximum number of pages to return, each with its matching sections (default: 10)
    #[serde(default)]
    pub limit: Option<usize>,
}

/// Search the site and render the top groups.
pub async fn handle_search(site: &SiteSearch, request: SearchRequest) -> Result<String, String> {
    let query = request.query.trim();
    if query.is_empty() {
        return Err("Search query must not be empty".to_string());
    }

    let response = site
        .search(query, request.version.as_deref())
        .await
        .map_err(|e| e.to_string())?;

    let Some(response) = response else {
        return Ok(format!(
            "No searchable documentation versions are available for {}.",
            site.config().base_url
        ));
    };

    Ok(format_response(&response, request.limit.unwrap_or(DEFAULT_LIMIT)))
}

/// Split flattened results back into their article groups.
fn groups(results: &[GroupedResult]) -> Vec<&[GroupedResult]> {
    results
        .chunk_by(|a, b| a.article_path == b.article_path)
        .collect()
}

pub fn format_response(response: &SearchResponse, limit: usize) -> String {
    let mut output = String::new();

    if response.total == 0 {
        let _ = writeln!(
            output,
            "No results for '{}' (version {}).",
            response.query, response.version
        );
    } else {
        let groups = groups(&response.results);
        let shown = groups.len().min(limit.max(1));
        let _ = writeln!(
            output,
            "Found {} results in {} pages for '{}' (version {}), showing {}:\n",
            response.total, response.group_count, response.query, response.version, shown
        );

        for (rank, group) in groups.iter().take(shown).enumerate() {
            for (i, result) in group.iter().enumerate() {
                format_result(&mut output, rank + 1, i == 0, result);
            }
            output.push('\n');
        }
    }

    if let Some(suggestions) = &response.suggestions {
        let _ = writeln!(output, "Related terms: {}", suggestions.join(", "));
    }

    output.trim_end().to_string()
}

fn format_result(output: &mut String, rank: usize, leads_group: bool, result: &GroupedResult) {
    if leads_group {
        let _ = write!(output, "{}. ", rank);
    } else {
        output.push_str("   ");
    }

    if result.is_section {
        let _ = write!(output, "§ {}", result.title);
        if let Some(parent) = &result.parent_title {
            let _ = write!(output, " (in {})", parent);
        }
    } else {
        output.push_str(&result.title);
    }
    let _ = writeln!(output, " [{:.2}]", result.score);

    let _ = writeln!(output, "   {}", result.url);
    if !result.preview.is_empty() {
        let _ = writeln!(output, "   {}", result.preview);
    }
    if !result.tags.is_empty() {
        let _ = writeln!(output, "   tags: {}", result.tags.join(", "));
    }
}
