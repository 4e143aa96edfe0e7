//! State shared by the components of one pipeline instance.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};

use tracing::{debug, warn};

use crate::backend::CatalogBackend;
use crate::config::DiscoveryConfig;
use crate::discovery::filter::CandidateFilter;
use crate::discovery::finder::ValidCardFinder;
use crate::discovery::pager::CatalogPager;
use crate::discovery::presenter::{Presenter, Status};
use crate::discovery::types::{Mode, View, WarmupPriority};
use crate::store::{get_json, namespaced_key, set_json, KeyValueStore, SeenReason, SeenSetStore};
use crate::Result;

/// Everything a cursor or batch manager needs from its pipeline.
///
/// Each pipeline owns exactly one session; nothing here is shared across
/// namespaces.
pub(crate) struct Session {
    pub(crate) namespace: String,
    pub(crate) mode: Mode,
    pub(crate) entries_per_card: usize,
    pub(crate) tuning: DiscoveryConfig,
    pub(crate) backend: Arc<dyn CatalogBackend>,
    pub(crate) store: Arc<dyn KeyValueStore>,
    pub(crate) presenter: Arc<dyn Presenter>,
    pub(crate) finder: ValidCardFinder,
    pub(crate) pager: tokio::sync::Mutex<CatalogPager>,
    seen: Mutex<SeenSetStore>,
    subscribed: Mutex<HashSet<String>>,
    cursor_key: String,
}

impl Session {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        namespace: &str,
        mode: Mode,
        entries_per_card: usize,
        tuning: DiscoveryConfig,
        backend: Arc<dyn CatalogBackend>,
        store: Arc<dyn KeyValueStore>,
        presenter: Arc<dyn Presenter>,
        finder: ValidCardFinder,
        pager: CatalogPager,
    ) -> Self {
        let seen = SeenSetStore::load(store.as_ref(), namespace, tuning.seen_capacity);
        Self {
            namespace: namespace.to_string(),
            mode,
            entries_per_card: entries_per_card.max(1),
            tuning,
            backend,
            store,
            presenter,
            finder,
            pager: tokio::sync::Mutex::new(pager),
            seen: Mutex::new(seen),
            subscribed: Mutex::new(HashSet::new()),
            cursor_key: namespaced_key(namespace, "cursor"),
        }
    }

    /// Whether `source_id` must not be offered, given the caller's displayed ids.
    pub(crate) fn should_skip(&self, source_id: &str, displayed: &HashSet<String>) -> bool {
        let subscribed = self.subscribed.lock().unwrap_or_else(PoisonError::into_inner);
        let seen = self.seen.lock().unwrap_or_else(PoisonError::into_inner);
        CandidateFilter::new(&subscribed, &seen, displayed)
            .skip_shown_this_session(self.mode == Mode::Batch)
            .should_skip(source_id)
    }

    pub(crate) fn mark_seen(&self, source_id: &str, reason: SeenReason) {
        self.seen
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .mark(source_id, reason);
    }

    #[cfg(test)]
    pub(crate) fn seen_reason(&self, source_id: &str) -> Option<SeenReason> {
        self.seen
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .session_reason(source_id)
    }

    pub(crate) fn session_seen_ids(&self) -> Vec<String> {
        self.seen
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .session_ids()
            .to_vec()
    }

    pub(crate) fn set_subscribed(&self, ids: impl IntoIterator<Item = String>) {
        let mut subscribed = self.subscribed.lock().unwrap_or_else(PoisonError::into_inner);
        subscribed.clear();
        subscribed.extend(ids);
    }

    pub(crate) fn add_subscribed(&self, source_id: &str) {
        self.subscribed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(source_id.to_string());
    }

    pub(crate) fn is_subscribed(&self, source_id: &str) -> bool {
        self.subscribed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(source_id)
    }

    /// Persisted cursor, `0` when absent or unreadable.
    pub(crate) fn load_cursor(&self) -> usize {
        match get_json::<usize>(self.store.as_ref(), &self.cursor_key) {
            Ok(Some(cursor)) => cursor,
            Ok(None) => 0,
            Err(e) => {
                warn!(namespace = %self.namespace, error = %e, "failed to load cursor, starting at 0");
                0
            }
        }
    }

    pub(crate) fn persist_cursor(&self, cursor: usize) {
        if let Err(e) = set_json(self.store.as_ref(), &self.cursor_key, &cursor) {
            warn!(namespace = %self.namespace, cursor, error = %e, "failed to persist cursor");
        }
    }

    pub(crate) fn persist_seen(&self) -> Result<()> {
        self.seen
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .merge_and_persist(self.store.as_ref())
    }

    /// Fire-and-forget warm-up hint.
    pub(crate) fn spawn_warmup(&self, source_ids: Vec<String>, priority: WarmupPriority) {
        if source_ids.is_empty() {
            return;
        }
        let backend = Arc::clone(&self.backend);
        tokio::spawn(async move {
            if let Err(e) = backend.warmup(&source_ids, priority).await {
                debug!(error = %e, ?priority, "warmup request failed");
            }
        });
    }

    pub(crate) fn present(&self, view: View) {
        self.presenter.present(view);
    }

    pub(crate) fn status(&self, status: Status) {
        self.presenter.status(status);
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("namespace", &self.namespace)
            .field("mode", &self.mode)
            .finish_non_exhaustive()
    }
}
