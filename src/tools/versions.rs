//! Version listing handler.

use crate::site::SiteSearch;
use crate::version::VersionInfo;
use std::fmt::Write as _;

pub async fn handle_list_versions(site: &SiteSearch) -> String {
    match site.available_versions().await {
        None => format!(
            "{} is not versioned. Searches always use the single published version.",
            site.config().base_url
        ),
        Some(versions) if versions.is_empty() => format!(
            "{} publishes a version manifest, but it lists no usable versions.",
            site.config().base_url
        ),
        Some(versions) => format_versions(&site.config().base_url, &versions),
    }
}

/// Render versions in manifest order, which is the site's own "newest first" order.
pub fn format_versions(base_url: &str, versions: &[VersionInfo]) -> String {
    let mut output = format!("Versions of {} ({}):\n\n", base_url, versions.len());
    for info in versions {
        let _ = write!(output, "• {}", info.version);
        if info.title != info.version {
            let _ = write!(output, " ({})", info.title);
        }
        if !info.aliases.is_empty() {
            let aliases: Vec<&str> = info.aliases.iter().map(String::as_str).collect();
            let _ = write!(output, " [aliases: {}]", aliases.join(", "));
        }
        output.push('\n');
    }
    output.trim_end().to_string()
}
