use super::DocSource;
use crate::error::FetchError;
use futures::future::BoxFuture;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

/// In-memory [`DocSource`] serving fixed JSON bodies.
///
/// Unknown URLs answer with HTTP 404. Every request is counted per URL, and an
/// optional latency makes each fetch yield to the runtime before answering.
#[derive(Debug, Default)]
pub struct MemorySource {
    routes: Mutex<HashMap<String, Route>>,
    requests: Mutex<HashMap<String, usize>>,
    latency: Option<Duration>,
}

#[derive(Debug, Clone)]
enum Route {
    Json(Value),
    Status(u16),
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every response by `latency`.
    #[must_use]
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Serve `body` at `url`, replacing any previous route.
    pub fn insert(&self, url: impl Into<String>, body: Value) {
        self.lock_routes().insert(url.into(), Route::Json(body));
    }

    /// Answer requests for `url` with an HTTP error status.
    pub fn fail(&self, url: impl Into<String>, status: u16) {
        self.lock_routes().insert(url.into(), Route::Status(status));
    }

    /// Stop serving `url`; later requests get a 404.
    pub fn remove(&self, url: &str) {
        self.lock_routes().remove(url);
    }

    /// Number of requests made for `url`.
    pub fn requests(&self, url: &str) -> usize {
        self.lock_requests().get(url).copied().unwrap_or(0)
    }

    /// Number of requests made for any URL.
    pub fn total_requests(&self) -> usize {
        self.lock_requests().values().sum()
    }

    fn lock_routes(&self) -> std::sync::MutexGuard<'_, HashMap<String, Route>> {
        self.routes
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn lock_requests(&self) -> std::sync::MutexGuard<'_, HashMap<String, usize>> {
        self.requests
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn respond(&self, url: &str) -> Result<Value, FetchError> {
        *self.lock_requests().entry(url.to_string()).or_insert(0) += 1;
        match self.lock_routes().get(url) {
            Some(Route::Json(body)) => Ok(body.clone()),
            Some(Route::Status(status)) => Err(FetchError::Status {
                url: url.to_string(),
                status: *status,
            }),
            None => Err(FetchError::Status {
                url: url.to_string(),
                status: 404,
            }),
        }
    }
}

impl DocSource for MemorySource {
    fn fetch_json<'a>(&'a self, url: &'a str) -> BoxFuture<'a, Result<Value, FetchError>> {
        Box::pin(async move {
            if let Some(latency) = self.latency {
                tokio::time::sleep(latency).await;
            }
            self.respond(url)
        })
    }
}
