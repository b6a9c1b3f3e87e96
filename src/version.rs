//! Version discovery and resolution for documentation sites.
//!
//! A site is versioned when it publishes a manifest (`versions.json`) listing
//! its versions and their aliases, newest first. Sites without a manifest are
//! served from their root under the [`DEFAULT_VERSION`] key.

use crate::error::SearchError;
use crate::fetch::{DocSource, RetryPolicy};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// Resolved version key used for sites that publish no manifest.
pub const DEFAULT_VERSION: &str = "default";

/// Version string that selects the newest published version.
pub const LATEST: &str = "latest";

/// One entry of a site's version manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VersionInfo {
    pub version: String,
    pub title: String,
    pub aliases: BTreeSet<String>,
}

impl VersionInfo {
    /// Parse a single manifest entry, returning `None` if it is malformed.
    ///
    /// `version` and `title` must be strings. `aliases` may be missing, but if
    /// present must be a list; non-string aliases inside it are ignored.
    pub fn from_manifest_entry(entry: &Value) -> Option<Self> {
        let version = entry.get("version")?.as_str()?;
        let title = entry.get("title")?.as_str()?;
        let aliases = match entry.get("aliases") {
            None | Some(Value::Null) => BTreeSet::new(),
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect(),
            Some(_) => return None,
        };

        Some(Self {
            version: version.to_string(),
            title: title.to_string(),
            aliases,
        })
    }
}

/// Parse a manifest body. Returns `None` when the body is not a JSON array.
pub fn parse_manifest(body: &Value) -> Option<Vec<VersionInfo>> {
    let entries = body.as_array()?;
    let versions: Vec<_> = entries
        .iter()
        .filter_map(VersionInfo::from_manifest_entry)
        .collect();

    let dropped = entries.len() - versions.len();
    if dropped > 0 {
        tracing::warn!("Dropped {} malformed version manifest entries", dropped);
    }

    Some(versions)
}

/// Outcome of resolving a requested version against a site.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VersionResolution {
    pub valid: bool,
    /// Canonical version identifier, or [`DEFAULT_VERSION`] for non-versioned sites.
    pub resolved: String,
    /// Whether the version was chosen by default rather than explicitly requested.
    pub is_default: bool,
    pub available: Option<Vec<VersionInfo>>,
    pub error: Option<String>,
}

impl VersionResolution {
    fn non_versioned() -> Self {
        Self {
            valid: true,
            resolved: DEFAULT_VERSION.to_string(),
            is_default: true,
            available: None,
            error: None,
        }
    }

    fn found(resolved: &str, is_default: bool, available: Vec<VersionInfo>) -> Self {
        Self {
            valid: true,
            resolved: resolved.to_string(),
            is_default,
            available: Some(available),
            error: None,
        }
    }

    /// Convert an invalid resolution into the error callers should see.
    ///
    /// Returns `None` when the manifest was absent or empty: there is nothing
    /// actionable to report, so callers produce an empty result instead.
    pub fn into_error(self, requested: &str) -> Option<SearchError> {
        let available = self.available.filter(|versions| !versions.is_empty())?;
        Some(SearchError::VersionNotFound {
            requested: requested.to_string(),
            available: sorted_version_names(&available),
        })
    }
}

fn sorted_version_names(versions: &[VersionInfo]) -> Vec<String> {
    let mut names: Vec<_> = versions.iter().map(|v| v.version.clone()).collect();
    names.sort();
    names
}

/// Join a base URL and a relative path with exactly one `/` between them.
pub(crate) fn join_url(base: &str, path: &str) -> String {
    let base = base.trim_end_matches('/');
    let path = path.trim_start_matches('/');
    if path.is_empty() {
        base.to_string()
    } else {
        format!("{}/{}", base, path)
    }
}

struct CachedManifest {
    fetched_at: Instant,
    versions: Vec<VersionInfo>,
}

/// Discovers and resolves the versions of one documentation site.
///
/// Owns the per-site detection and manifest caches. Detection is remembered
/// until [`invalidate`](Self::invalidate); the manifest is refetched once it is
/// older than the configured timeout.
pub struct VersionResolver {
    base_url: String,
    manifest_url: String,
    source: Arc<dyn DocSource>,
    retry: RetryPolicy,
    manifest_timeout: Duration,
    detection: Mutex<Option<bool>>,
    manifest: Mutex<Option<CachedManifest>>,
}

impl std::fmt::Debug for VersionResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VersionResolver")
            .field("base_url", &self.base_url)
            .field("manifest_url", &self.manifest_url)
            .field("retry", &self.retry)
            .field("manifest_timeout", &self.manifest_timeout)
            .finish_non_exhaustive()
    }
}

impl VersionResolver {
    pub fn new(
        base_url: impl Into<String>,
        versions_path: &str,
        source: Arc<dyn DocSource>,
        retry: RetryPolicy,
        manifest_timeout: Duration,
    ) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        let manifest_url = join_url(&base_url, versions_path);
        Self {
            base_url,
            manifest_url,
            source,
            retry,
            manifest_timeout,
            detection: Mutex::new(None),
            manifest: Mutex::new(None),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Whether the site publishes a version manifest.
    ///
    /// Probes once and remembers the answer. Transport failures count as
    /// "not versioned" and are logged rather than returned.
    pub async fn detect_versioning(&self) -> bool {
        let mut detection = self.detection.lock().await;
        if let Some(versioned) = *detection {
            return versioned;
        }

        let versioned = match self.retry.fetch_json(self.source.as_ref(), &self.manifest_url).await {
            Ok(body) => match parse_manifest(&body) {
                Some(versions) => {
                    // The probe already fetched the manifest; keep it.
                    *self.manifest.lock().await = Some(CachedManifest {
                        fetched_at: Instant::now(),
                        versions,
                    });
                    true
                }
                None => {
                    tracing::debug!("{} is not a JSON array; treating site as unversioned", self.manifest_url);
                    false
                }
            },
            Err(err) if err.is_not_found() => {
                tracing::debug!("No version manifest at {}", self.manifest_url);
                false
            }
            Err(err) => {
                tracing::warn!(
                    "Version detection for {} failed, assuming unversioned: {}",
                    self.base_url,
                    err
                );
                false
            }
        };

        tracing::info!(
            "Detected {} site at {}",
            if versioned { "versioned" } else { "unversioned" },
            self.base_url
        );
        *detection = Some(versioned);
        versioned
    }

    /// Fetch the validated version list, reusing a recent copy when available.
    ///
    /// Returns `None` when the manifest cannot be fetched or is not a list.
    pub async fn fetch_versions(&self) -> Option<Vec<VersionInfo>> {
        let mut manifest = self.manifest.lock().await;
        if let Some(cached) = manifest.as_ref()
            && cached.fetched_at.elapsed() < self.manifest_timeout
        {
            return Some(cached.versions.clone());
        }

        let body = match self.retry.fetch_json(self.source.as_ref(), &self.manifest_url).await {
            Ok(body) => body,
            Err(err) => {
                tracing::warn!("Failed to fetch version manifest {}: {}", self.manifest_url, err);
                return None;
            }
        };

        let Some(versions) = parse_manifest(&body) else {
            tracing::warn!("Version manifest {} is not a JSON array", self.manifest_url);
            return None;
        };

        tracing::debug!("Fetched {} versions from {}", versions.len(), self.manifest_url);
        *manifest = Some(CachedManifest {
            fetched_at: Instant::now(),
            versions: versions.clone(),
        });
        Some(versions)
    }

    /// Versions offered by the site, or `None` for unversioned sites.
    pub async fn available_versions(&self) -> Option<Vec<VersionInfo>> {
        if !self.detect_versioning().await {
            return None;
        }
        self.fetch_versions().await
    }

    /// Resolve a requested version (or alias, or nothing) to a canonical version.
    ///
    /// - Unversioned sites always resolve to [`DEFAULT_VERSION`].
    /// - No request, an empty string, or `latest` picks the first manifest entry.
    /// - Otherwise an exact version match wins over an alias match.
    pub async fn resolve_version(&self, requested: Option<&str>) -> VersionResolution {
        if !self.detect_versioning().await {
            return VersionResolution::non_versioned();
        }

        let requested = requested.map(str::trim).filter(|r| !r.is_empty());
        let versions = self.fetch_versions().await.unwrap_or_default();

        if versions.is_empty() {
            return VersionResolution {
                valid: false,
                resolved: requested.unwrap_or_default().to_string(),
                is_default: requested.is_none(),
                available: None,
                error: Some(format!("No versions available for {}", self.base_url)),
            };
        }

        resolve_in(&versions, requested)
    }

    /// Build `<base>/<version>/<path>` for versioned sites or `<base>/<path>` otherwise.
    pub async fn build_versioned_url(
        &self,
        path: &str,
        version: Option<&str>,
    ) -> Result<String, SearchError> {
        if !self.detect_versioning().await {
            return Ok(join_url(&self.base_url, path));
        }

        let resolution = self.resolve_version(version).await;
        if !resolution.valid {
            return Err(SearchError::VersionUnavailable(
                resolution
                    .error
                    .unwrap_or_else(|| "Version could not be resolved".to_string()),
            ));
        }

        Ok(join_url(
            &join_url(&self.base_url, &resolution.resolved),
            path,
        ))
    }

    /// Forget the detection result and the cached manifest.
    pub async fn invalidate(&self) {
        *self.detection.lock().await = None;
        *self.manifest.lock().await = None;
        tracing::debug!("Invalidated version caches for {}", self.base_url);
    }
}

/// Resolve against a non-empty version list.
fn resolve_in(versions: &[VersionInfo], requested: Option<&str>) -> VersionResolution {
    let requested = match requested {
        Some(r) if !r.eq_ignore_ascii_case(LATEST) => r,
        // Manifest order defines "latest".
        _ => {
            return match versions.first() {
                Some(first) => VersionResolution::found(&first.version, true, versions.to_vec()),
                None => VersionResolution {
                    valid: false,
                    resolved: String::new(),
                    is_default: true,
                    available: None,
                    error: Some("No versions available".to_string()),
                },
            };
        }
    };

    if let Some(exact) = versions.iter().find(|v| v.version == requested) {
        return VersionResolution::found(&exact.version, false, versions.to_vec());
    }

    if let Some(aliased) = versions.iter().find(|v| v.aliases.contains(requested)) {
        return VersionResolution::found(&aliased.version, false, versions.to_vec());
    }

    VersionResolution {
        valid: false,
        resolved: requested.to_string(),
        is_default: false,
        available: Some(versions.to_vec()),
        error: Some(format!(
            "Version '{}' not found. Available versions: {}",
            requested,
            sorted_version_names(versions).join(", ")
        )),
    }
}
