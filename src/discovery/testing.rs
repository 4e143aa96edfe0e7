//! In-crate fakes shared by the discovery unit tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::backend::{
    CatalogBackend, CatalogPage, ExploreRequest, ExploredCard, FeedPreview, SearchRequest,
};
use crate::config::DiscoveryConfig;
use crate::discovery::cache::PreviewCache;
use crate::discovery::finder::ValidCardFinder;
use crate::discovery::pager::CatalogPager;
use crate::discovery::presenter::{Presenter, Status};
use crate::discovery::session::Session;
use crate::discovery::types::{Card, CatalogQuery, Entry, Mode, Source, View, WarmupPriority};
use crate::store::{KeyValueStore, MemoryStore};
use crate::{Result, ScoutError};

pub(crate) fn entries(source_id: &str, n: usize) -> Vec<Entry> {
    (0..n)
        .map(|i| Entry {
            title: format!("{source_id} item {i}"),
            link: format!("https://{source_id}.example/{i}"),
            published_at: None,
        })
        .collect()
}

/// Catalog in a fixed order; each source previews with a fixed entry count.
#[derive(Default)]
pub(crate) struct ScriptedBackend {
    catalog: Vec<Source>,
    entry_counts: HashMap<String, usize>,
    preview_delay: Duration,
    pub(crate) explore: Mutex<Vec<ExploredCard>>,
    pub(crate) fail_search: AtomicBool,
    pub(crate) searches: AtomicUsize,
    pub(crate) previews: Mutex<Vec<String>>,
    pub(crate) warmups: Mutex<Vec<(Vec<String>, WarmupPriority)>>,
}

impl ScriptedBackend {
    pub(crate) fn new(spec: &[(&str, usize)]) -> Self {
        Self {
            catalog: spec
                .iter()
                .map(|(id, _)| Source::new(*id, format!("https://{id}.example/feed"), id.to_uppercase()))
                .collect(),
            entry_counts: spec.iter().map(|(id, n)| (id.to_string(), *n)).collect(),
            ..Self::default()
        }
    }

    pub(crate) fn with_explore(self, cards: Vec<ExploredCard>) -> Self {
        *self.explore.lock().unwrap() = cards;
        self
    }

    /// Every preview answers after `delay`.
    pub(crate) fn with_preview_delay(mut self, delay: Duration) -> Self {
        self.preview_delay = delay;
        self
    }

    pub(crate) fn preview_calls(&self, source_id: &str) -> usize {
        self.previews
            .lock()
            .unwrap()
            .iter()
            .filter(|id| id.as_str() == source_id)
            .count()
    }
}

pub(crate) fn explored(source_id: &str, n: usize) -> ExploredCard {
    ExploredCard {
        source_id: source_id.to_string(),
        url: format!("https://{source_id}.example/feed"),
        platform_name: source_id.to_uppercase(),
        feed_title: Some(format!("Explored {source_id}")),
        entries: entries(source_id, n),
    }
}

#[async_trait]
impl CatalogBackend for ScriptedBackend {
    async fn search(&self, request: &SearchRequest) -> Result<CatalogPage> {
        self.searches.fetch_add(1, Ordering::SeqCst);
        if self.fail_search.load(Ordering::SeqCst) {
            return Err(ScoutError::Catalog("catalog unavailable".into()));
        }
        let end = (request.offset + request.limit).min(self.catalog.len());
        let start = request.offset.min(end);
        Ok(CatalogPage {
            sources: self.catalog[start..end].to_vec(),
            total: Some(self.catalog.len()),
            next_offset: None,
        })
    }

    async fn preview(&self, source_id: &str) -> Result<FeedPreview> {
        self.previews.lock().unwrap().push(source_id.to_string());
        if !self.preview_delay.is_zero() {
            tokio::time::sleep(self.preview_delay).await;
        }
        let n = self.entry_counts.get(source_id).copied().unwrap_or(0);
        Ok(FeedPreview {
            title: Some(format!("Feed {source_id}")),
            entries: entries(source_id, n),
        })
    }

    async fn explore_cards(&self, request: &ExploreRequest) -> Result<Vec<ExploredCard>> {
        let mut pool = self.explore.lock().unwrap();
        let mut out = Vec::new();
        pool.retain(|card| {
            if out.len() < request.count && !request.exclude_ids.contains(&card.source_id) {
                out.push(card.clone());
                false
            } else {
                true
            }
        });
        Ok(out)
    }

    async fn warmup(&self, source_ids: &[String], priority: WarmupPriority) -> Result<()> {
        self.warmups
            .lock()
            .unwrap()
            .push((source_ids.to_vec(), priority));
        Ok(())
    }
}

/// Presenter that records every call.
#[derive(Default)]
pub(crate) struct RecordingPresenter {
    pub(crate) views: Mutex<Vec<View>>,
    pub(crate) replacements: Mutex<Vec<(usize, Option<String>)>>,
    pub(crate) statuses: Mutex<Vec<Status>>,
    pub(crate) exits: Mutex<Vec<String>>,
}

impl RecordingPresenter {
    /// Source id of each single-card view, `None` for the empty state.
    pub(crate) fn shown(&self) -> Vec<Option<String>> {
        self.views
            .lock()
            .unwrap()
            .iter()
            .filter_map(|view| match view {
                View::Card(card) => Some(Some(card.card.source_id.clone())),
                View::Empty => Some(None),
                View::Batch(_) => None,
            })
            .collect()
    }

    pub(crate) fn last_view(&self) -> Option<View> {
        self.views.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl Presenter for RecordingPresenter {
    fn present(&self, view: View) {
        self.views.lock().unwrap().push(view);
    }

    fn replace_card(&self, position: usize, card: Option<&Card>) {
        self.replacements
            .lock()
            .unwrap()
            .push((position, card.map(|c| c.source_id.clone())));
    }

    fn status(&self, status: Status) {
        self.statuses.lock().unwrap().push(status);
    }

    async fn exit_transition(&self, source_id: &str) {
        self.exits.lock().unwrap().push(source_id.to_string());
    }
}

pub(crate) struct Harness {
    pub(crate) backend: Arc<ScriptedBackend>,
    pub(crate) presenter: Arc<RecordingPresenter>,
    pub(crate) store: Arc<MemoryStore>,
    pub(crate) session: Arc<Session>,
}

pub(crate) fn tuning() -> DiscoveryConfig {
    DiscoveryConfig {
        page_size: 4,
        prefetch_count: 0,
        batch_size: 3,
        entries_per_card: 2,
        ..DiscoveryConfig::default()
    }
}

pub(crate) fn harness(backend: ScriptedBackend, mode: Mode, tuning: DiscoveryConfig) -> Harness {
    harness_with_store(backend, mode, tuning, Arc::new(MemoryStore::new()))
}

pub(crate) fn harness_with_store(
    backend: ScriptedBackend,
    mode: Mode,
    tuning: DiscoveryConfig,
    store: Arc<MemoryStore>,
) -> Harness {
    let backend = Arc::new(backend);
    let presenter = Arc::new(RecordingPresenter::default());
    let cache = PreviewCache::new(backend.clone(), tuning.preview_ttl(), tuning.preview_timeout());
    let finder = ValidCardFinder::new(cache, tuning.concurrency_limit);
    let pager = CatalogPager::new(
        backend.clone(),
        CatalogQuery::all(),
        tuning.page_size,
        tuning.max_catalog_pages,
    );
    let kv: Arc<dyn KeyValueStore> = store.clone();
    let session = Arc::new(Session::new(
        "test",
        mode,
        tuning.entries_per_card,
        tuning.clone(),
        backend.clone(),
        kv,
        presenter.clone(),
        finder,
        pager,
    ));
    Harness {
        backend,
        presenter,
        store,
        session,
    }
}
