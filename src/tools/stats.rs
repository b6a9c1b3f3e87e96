//! Index cache statistics handler.

use crate::cache::CacheStats;
use crate::site::SiteSearch;
use std::fmt::Write as _;

pub async fn handle_cache_stats(site: &SiteSearch) -> String {
    format_stats(&site.cache_stats().await)
}

pub fn format_stats(stats: &CacheStats) -> String {
    let mut output = String::from("Search index cache:\n\n");
    let _ = writeln!(output, "• Indices: {}/{}", stats.size, stats.max_size);
    let _ = writeln!(
        output,
        "• Memory: {:.2}/{} MB",
        stats.memory_usage_mb, stats.max_memory_mb
    );
    let _ = writeln!(
        output,
        "• Hits: {}, misses: {} (hit rate {:.1}%)",
        stats.hits,
        stats.misses,
        stats.hit_rate * 100.0
    );
    let _ = write!(output, "• Evictions: {}", stats.evictions);
    output
}
