//! TTL-bounded preview cache with request coalescing.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use futures::future::{BoxFuture, Shared};
use futures::FutureExt;
use tokio::time::{Duration, Instant};
use tracing::debug;

use crate::backend::CatalogBackend;
use crate::discovery::types::PreviewResult;

type InFlight = Shared<BoxFuture<'static, PreviewResult>>;

#[derive(Default)]
struct CacheState {
    results: HashMap<String, PreviewResult>,
    in_flight: HashMap<String, InFlight>,
}

/// Per-source preview cache.
///
/// Failures are cached like successes so a broken source is not re-fetched
/// inside the TTL window. Concurrent callers asking for the same id share a
/// single backend request.
#[derive(Clone)]
pub struct PreviewCache {
    backend: Arc<dyn CatalogBackend>,
    ttl: Duration,
    timeout: Duration,
    state: Arc<Mutex<CacheState>>,
}

impl PreviewCache {
    /// Create an empty cache.
    pub fn new(backend: Arc<dyn CatalogBackend>, ttl: Duration, timeout: Duration) -> Self {
        Self {
            backend,
            ttl,
            timeout,
            state: Arc::new(Mutex::new(CacheState::default())),
        }
    }

    /// Fresh cached result for `source_id`, without touching the network.
    pub fn get_fresh(&self, source_id: &str) -> Option<PreviewResult> {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state
            .results
            .get(source_id)
            .filter(|r| r.is_fresh(Instant::now(), self.ttl))
            .cloned()
    }

    /// Seed the cache with a result obtained elsewhere (e.g. precomputed cards).
    pub fn insert(&self, result: PreviewResult) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.results.insert(result.source_id.clone(), result);
    }

    /// Whether a fetch for `source_id` is currently running.
    pub fn is_in_flight(&self, source_id: &str) -> bool {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.in_flight.contains_key(source_id)
    }

    /// Resolve the preview of `source_id`.
    ///
    /// A fresh cached result is returned without suspending. Otherwise the
    /// caller joins the running fetch for that id, or starts one bounded by the
    /// fetch timeout.
    pub async fn fetch(&self, source_id: &str) -> PreviewResult {
        let pending = {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            if let Some(hit) = state.results.get(source_id) {
                if hit.is_fresh(Instant::now(), self.ttl) {
                    return hit.clone();
                }
            }
            match state.in_flight.get(source_id) {
                Some(pending) => pending.clone(),
                None => {
                    let pending = self.start_fetch(source_id.to_string());
                    state
                        .in_flight
                        .insert(source_id.to_string(), pending.clone());
                    pending
                }
            }
        };
        pending.await
    }

    fn start_fetch(&self, source_id: String) -> InFlight {
        let backend = Arc::clone(&self.backend);
        let state = Arc::clone(&self.state);
        let timeout = self.timeout;

        async move {
            let result = match tokio::time::timeout(timeout, backend.preview(&source_id)).await {
                Ok(Ok(preview)) => {
                    PreviewResult::success(&source_id, preview.title, preview.entries)
                }
                Ok(Err(e)) => PreviewResult::failure(&source_id, e.to_string()),
                Err(_) => PreviewResult::failure(
                    &source_id,
                    format!("preview timed out after {} ms", timeout.as_millis()),
                ),
            };
            debug!(
                source_id = %source_id,
                ok = result.ok,
                entries = result.entries.len(),
                error = ?result.error,
                "preview resolved"
            );

            let mut state = state.lock().unwrap_or_else(PoisonError::into_inner);
            state.in_flight.remove(&source_id);
            state.results.insert(source_id, result.clone());
            result
        }
        .boxed()
        .shared()
    }
}

impl std::fmt::Debug for PreviewCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        f.debug_struct("PreviewCache")
            .field("ttl", &self.ttl)
            .field("timeout", &self.timeout)
            .field("cached", &state.results.len())
            .field("in_flight", &state.in_flight.len())
            .finish()
    }
}
