//! Search orchestration for one documentation site.
//!
//! A search resolves the requested version, looks the version's index up in the
//! bounded cache, builds it on a miss, then ranks. Concurrent misses for the
//! same version share one in-flight build.

use crate::cache::{BoundedCache, CacheStats};
use crate::config::Config;
use crate::error::{FetchError, SearchError};
use crate::fetch::{DocSource, HttpSource, RetryPolicy};
use crate::search::{
    FieldWeights, IndexBuilder, SearchEngine, SearchIndexEntry, SearchResponse, TfIdfEngine, parse_corpus,
};
use crate::version::{VersionInfo, VersionResolution, VersionResolver, join_url};
use anyhow::Context;
use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::time::Instant;

type IndexCache = BoundedCache<String, Arc<SearchIndexEntry>>;

/// A build that any number of callers can await.
type SharedBuild = Shared<BoxFuture<'static, Result<Arc<SearchIndexEntry>, Arc<SearchError>>>>;

/// Everything a detached build needs, so it can outlive the caller that started it.
struct BuildJob {
    key: String,
    base_url: String,
    /// Version for error context; `None` on non-versioned sites.
    version: Option<String>,
    site_url: String,
    source_url: String,
    is_default: bool,
    source: Arc<dyn DocSource>,
    retry: RetryPolicy,
    builder: IndexBuilder,
}

pub struct SiteSearch {
    config: Config,
    resolver: VersionResolver,
    source: Arc<dyn DocSource>,
    builder: IndexBuilder,
    retry: RetryPolicy,
    cache: Arc<Mutex<IndexCache>>,
    in_flight: Arc<Mutex<HashMap<String, SharedBuild>>>,
}

impl std::fmt::Debug for SiteSearch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SiteSearch")
            .field("base_url", &self.config.base_url)
            .field("resolver", &self.resolver)
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

impl SiteSearch {
    pub fn new(config: Config, source: Arc<dyn DocSource>, engine: Arc<dyn SearchEngine>) -> Self {
        let retry = RetryPolicy::from(config.retry);
        let resolver = VersionResolver::new(
            config.base_url.clone(),
            &config.versions_path,
            source.clone(),
            retry,
            config.versions.cache_timeout(),
        );
        Self {
            cache: Arc::new(Mutex::new(BoundedCache::new(config.cache))),
            in_flight: Arc::new(Mutex::new(HashMap::new())),
            builder: IndexBuilder::new(engine, FieldWeights::default()),
            resolver,
            source,
            retry,
            config,
        }
    }

    /// Production wiring: HTTP transport and the built-in engine.
    pub fn from_config(config: Config) -> anyhow::Result<Self> {
        config.validate()?;
        let source = HttpSource::new(&config.http).context("Failed to create HTTP client")?;
        Ok(Self::new(config, Arc::new(source), Arc::new(TfIdfEngine)))
    }

    pub const fn config(&self) -> &Config {
        &self.config
    }

    pub const fn resolver(&self) -> &VersionResolver {
        &self.resolver
    }

    /// Search `query` in the requested version (or the default one).
    ///
    /// Returns `Ok(None)` when the version cannot be resolved and there are no
    /// versions to offer instead.
    pub async fn search(&self, query: &str, version: Option<&str>) -> Result<Option<SearchResponse>, SearchError> {
        let resolution = self.resolver.resolve_version(version).await;
        if !resolution.valid {
            let requested = version.map(str::trim).unwrap_or_default().to_string();
            let message = resolution.error.clone().unwrap_or_default();
            return match resolution.into_error(&requested) {
                Some(err) => Err(err),
                None => {
                    tracing::warn!("No searchable version for {}: {}", self.config.base_url, message);
                    Ok(None)
                }
            };
        }

        let entry = self.index_for(&resolution).await?;
        crate::search::search(&entry, query, &resolution.resolved).map(Some)
    }

    /// Versions published by the site, or `None` for non-versioned sites.
    pub async fn available_versions(&self) -> Option<Vec<VersionInfo>> {
        self.resolver.available_versions().await
    }

    /// Drop the cached index for one version. Returns whether one was cached.
    pub async fn invalidate(&self, version: Option<&str>) -> bool {
        let resolution = self.resolver.resolve_version(version).await;
        let removed = self.cache.lock().await.delete(&resolution.resolved);
        tracing::debug!("Invalidated index for version {} (cached: {})", resolution.resolved, removed);
        removed
    }

    /// Drop every cached index and the resolver's detection and manifest caches.
    pub async fn clear(&self) {
        self.cache.lock().await.clear();
        self.resolver.invalidate().await;
        tracing::info!("Cleared all caches for {}", self.config.base_url);
    }

    pub async fn cache_stats(&self) -> CacheStats {
        self.cache.lock().await.stats()
    }

    /// Cached index for a resolved version, building it on a miss.
    async fn index_for(&self, resolution: &VersionResolution) -> Result<Arc<SearchIndexEntry>, SearchError> {
        let key = resolution.resolved.clone();

        if let Some(entry) = self.cache.lock().await.get(&key) {
            tracing::debug!("Cache hit for version {}", key);
            return Ok(entry);
        }

        let build = {
            let mut in_flight = self.in_flight.lock().await;
            if let Some(build) = in_flight.get(&key) {
                tracing::debug!("Awaiting in-flight build for version {}", key);
                build.clone()
            } else {
                // A build may have finished between the miss above and taking the lock.
                // The miss is already counted, so look without counting again.
                if let Some(entry) = self.cache.lock().await.peek(&key) {
                    return Ok(entry);
                }

                let job = self.build_job(resolution).await;
                let build = run_build(job, self.cache.clone(), self.in_flight.clone())
                    .boxed()
                    .shared();
                in_flight.insert(key.clone(), build.clone());
                build
            }
        };

        build.await.map_err(|shared| {
            Arc::try_unwrap(shared).unwrap_or_else(|shared| SearchError::Build {
                base_url: self.config.base_url.clone(),
                version: key,
                message: shared.to_string(),
            })
        })
    }

    async fn build_job(&self, resolution: &VersionResolution) -> BuildJob {
        let base_url = self.resolver.base_url().to_string();
        let versioned = self.resolver.detect_versioning().await;
        let site_url = if versioned {
            join_url(&base_url, &resolution.resolved)
        } else {
            base_url.clone()
        };
        BuildJob {
            key: resolution.resolved.clone(),
            version: versioned.then(|| resolution.resolved.clone()),
            source_url: join_url(&site_url, &self.config.index_path),
            site_url,
            base_url,
            is_default: resolution.is_default,
            source: self.source.clone(),
            retry: self.retry,
            builder: self.builder.clone(),
        }
    }
}

/// Load and cache one index, then retire the in-flight marker.
///
/// Cache insertion and marker removal happen inside the shared future, so a
/// caller dropped mid-build leaves the work for the next waiter to finish.
async fn run_build(
    job: BuildJob,
    cache: Arc<Mutex<IndexCache>>,
    in_flight: Arc<Mutex<HashMap<String, SharedBuild>>>,
) -> Result<Arc<SearchIndexEntry>, Arc<SearchError>> {
    let key = job.key.clone();
    let result = load_index(job).await.map(Arc::new).map_err(Arc::new);

    if let Ok(entry) = &result {
        cache.lock().await.set(key.clone(), entry.clone());
    }
    in_flight.lock().await.remove(&key);
    result
}

async fn load_index(job: BuildJob) -> Result<SearchIndexEntry, SearchError> {
    let start = Instant::now();
    tracing::info!("Loading search index from {}", job.source_url);

    let load_error = |source: FetchError| SearchError::IndexLoad {
        base_url: job.base_url.clone(),
        version: job.version.clone(),
        source,
    };

    let body = job
        .retry
        .fetch_json(job.source.as_ref(), &job.source_url)
        .await
        .map_err(load_error)?;
    let records = parse_corpus(&body).map_err(|source| {
        load_error(FetchError::Decode {
            url: job.source_url.clone(),
            source,
        })
    })?;

    let builder = job.builder.clone();
    let built = tokio::task::spawn_blocking(move || builder.build(&records))
        .await
        .map_err(|e| SearchError::Build {
            base_url: job.base_url.clone(),
            version: job.key.clone(),
            message: e.to_string(),
        })?;

    let entry = SearchIndexEntry::new(job.key, job.site_url, job.source_url, built, job.is_default);
    tracing::info!(
        "Built index for version {} with {} documents in {:?}",
        entry.version,
        entry.metadata.document_count,
        start.elapsed()
    );
    Ok(entry)
}
