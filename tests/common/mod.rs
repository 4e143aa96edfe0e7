//! Test helpers for pipeline integration tests.
//!
//! Provides in-memory fakes for every pipeline collaborator.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use feedscout::backend::{CatalogPage, ExploreRequest, ExploredCard, FeedPreview, SearchRequest};
use feedscout::config::DiscoveryConfig;
use feedscout::discovery::WarmupPriority;
use feedscout::{
    Card, CatalogBackend, Collaborators, DiscoveryPipeline, Entry, KeyValueStore, MemoryStore,
    PipelineOptions, Presenter, Result, ScoutError, Source, Status, Subscription,
    SubscriptionStore, View,
};

/// Build `n` entries for a source.
pub fn entries(source_id: &str, n: usize) -> Vec<Entry> {
    (0..n)
        .map(|i| Entry {
            title: format!("{source_id} #{i}"),
            link: format!("https://{source_id}.example/posts/{i}"),
            published_at: None,
        })
        .collect()
}

/// Catalog backend with a fixed source order and entry count per source.
#[derive(Default)]
pub struct FakeBackend {
    catalog: Vec<Source>,
    entry_counts: HashMap<String, usize>,
    preview_delay: Duration,
    explore_pool: Mutex<Vec<ExploredCard>>,
    pub fail_search: AtomicBool,
    pub search_calls: AtomicUsize,
    pub preview_calls: Mutex<Vec<String>>,
    pub warmups: Mutex<Vec<(Vec<String>, WarmupPriority)>>,
}

impl FakeBackend {
    /// Catalog `[(id, entry_count)]` in order.
    pub fn new(spec: &[(&str, usize)]) -> Self {
        Self {
            catalog: spec
                .iter()
                .map(|(id, _)| {
                    Source::new(*id, format!("https://{id}.example/feed"), format!("Source {id}"))
                })
                .collect(),
            entry_counts: spec.iter().map(|(id, n)| (id.to_string(), *n)).collect(),
            ..Self::default()
        }
    }

    /// Catalog of `count` sources named `s0..`, each with `entries` entries.
    pub fn uniform(count: usize, entries: usize) -> Self {
        let ids: Vec<String> = (0..count).map(|i| format!("s{i}")).collect();
        let spec: Vec<(&str, usize)> = ids.iter().map(|id| (id.as_str(), entries)).collect();
        Self::new(&spec)
    }

    /// Delay every preview response.
    pub fn with_preview_delay(mut self, delay: Duration) -> Self {
        self.preview_delay = delay;
        self
    }

    /// Precomputed cards served by the explore endpoint, each served once.
    pub fn with_explore(self, cards: Vec<ExploredCard>) -> Self {
        *self.explore_pool.lock().unwrap() = cards;
        self
    }

    pub fn previews_of(&self, source_id: &str) -> usize {
        self.preview_calls
            .lock()
            .unwrap()
            .iter()
            .filter(|id| id.as_str() == source_id)
            .count()
    }

    pub fn warmups(&self) -> Vec<(Vec<String>, WarmupPriority)> {
        self.warmups.lock().unwrap().clone()
    }
}

/// An explore-endpoint card with `n` entries.
pub fn explored(source_id: &str, n: usize) -> ExploredCard {
    ExploredCard {
        source_id: source_id.to_string(),
        url: format!("https://{source_id}.example/feed"),
        platform_name: format!("Source {source_id}"),
        feed_title: Some(format!("Explored {source_id}")),
        entries: entries(source_id, n),
    }
}

#[async_trait]
impl CatalogBackend for FakeBackend {
    async fn search(&self, request: &SearchRequest) -> Result<CatalogPage> {
        self.search_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_search.load(Ordering::SeqCst) {
            return Err(ScoutError::Catalog("search unavailable".into()));
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
        self.preview_calls
            .lock()
            .unwrap()
            .push(source_id.to_string());
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
        let mut pool = self.explore_pool.lock().unwrap();
        let mut served = Vec::new();
        pool.retain(|card| {
            let take =
                served.len() < request.count && !request.exclude_ids.contains(&card.source_id);
            if take {
                served.push(card.clone());
            }
            !take
        });
        Ok(served)
    }

    async fn warmup(&self, source_ids: &[String], priority: WarmupPriority) -> Result<()> {
        self.warmups
            .lock()
            .unwrap()
            .push((source_ids.to_vec(), priority));
        Ok(())
    }
}

/// Subscription list kept in memory.
#[derive(Default)]
pub struct FakeSubscriptions {
    list: Mutex<Vec<Subscription>>,
    pub fail_commit: AtomicBool,
    pub commits: AtomicUsize,
}

impl FakeSubscriptions {
    pub fn with_ids(ids: &[&str]) -> Self {
        let list = ids
            .iter()
            .map(|id| Subscription {
                source_id: id.to_string(),
                url: format!("https://{id}.example/feed"),
                feed_title: format!("Feed {id}"),
                collection: "Existing".to_string(),
            })
            .collect();
        Self {
            list: Mutex::new(list),
            ..Self::default()
        }
    }

    pub fn ids(&self) -> Vec<String> {
        self.list
            .lock()
            .unwrap()
            .iter()
            .map(|s| s.source_id.clone())
            .collect()
    }

    pub fn collection_of(&self, source_id: &str) -> Option<String> {
        self.list
            .lock()
            .unwrap()
            .iter()
            .find(|s| s.source_id == source_id)
            .map(|s| s.collection.clone())
    }
}

#[async_trait]
impl SubscriptionStore for FakeSubscriptions {
    async fn get_subscriptions(&self) -> Result<Vec<Subscription>> {
        Ok(self.list.lock().unwrap().clone())
    }

    async fn set_subscriptions(&self, list: Vec<Subscription>) -> Result<()> {
        *self.list.lock().unwrap() = list;
        Ok(())
    }

    async fn commit(&self) -> Result<Vec<Subscription>> {
        self.commits.fetch_add(1, Ordering::SeqCst);
        if self.fail_commit.load(Ordering::SeqCst) {
            return Err(ScoutError::Subscription("server rejected the list".into()));
        }
        Ok(self.list.lock().unwrap().clone())
    }
}

/// Presenter recording everything it receives.
#[derive(Default)]
pub struct RecordingPresenter {
    views: Mutex<Vec<View>>,
    replacements: Mutex<Vec<(usize, Option<String>)>>,
    statuses: Mutex<Vec<Status>>,
    exit_delay: Option<Duration>,
}

impl RecordingPresenter {
    /// Presenter whose exit transition takes `delay`.
    pub fn with_exit_delay(delay: Duration) -> Self {
        Self {
            exit_delay: Some(delay),
            ..Self::default()
        }
    }

    /// Source id of every single-card view, `None` for the empty state.
    pub fn shown(&self) -> Vec<Option<String>> {
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

    /// Source ids of the latest batch view.
    pub fn last_batch(&self) -> Vec<String> {
        self.views
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find_map(|view| match view {
                View::Batch(cards) => Some(cards.iter().map(|c| c.source_id.clone()).collect()),
                _ => None,
            })
            .unwrap_or_default()
    }

    pub fn last_view(&self) -> Option<View> {
        self.views.lock().unwrap().last().cloned()
    }

    pub fn replacements(&self) -> Vec<(usize, Option<String>)> {
        self.replacements.lock().unwrap().clone()
    }

    pub fn statuses(&self) -> Vec<Status> {
        self.statuses.lock().unwrap().clone()
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

    async fn exit_transition(&self, _source_id: &str) {
        if let Some(delay) = self.exit_delay {
            tokio::time::sleep(delay).await;
        }
    }
}

/// Tuning used by the integration tests: small pages, no prefetch noise.
pub fn test_tuning() -> DiscoveryConfig {
    DiscoveryConfig {
        page_size: 5,
        prefetch_count: 0,
        ..DiscoveryConfig::default()
    }
}

/// A pipeline together with handles on its fakes.
pub struct TestPipeline {
    pub pipeline: DiscoveryPipeline,
    pub backend: Arc<FakeBackend>,
    pub subscriptions: Arc<FakeSubscriptions>,
    pub presenter: Arc<RecordingPresenter>,
    pub store: Arc<MemoryStore>,
}

/// Builder for [`TestPipeline`].
pub struct PipelineBuilder {
    options: PipelineOptions,
    backend: FakeBackend,
    subscriptions: FakeSubscriptions,
    presenter: RecordingPresenter,
    store: Arc<MemoryStore>,
    tuning: DiscoveryConfig,
}

impl PipelineBuilder {
    pub fn new(options: PipelineOptions, backend: FakeBackend) -> Self {
        Self {
            options,
            backend,
            subscriptions: FakeSubscriptions::default(),
            presenter: RecordingPresenter::default(),
            store: Arc::new(MemoryStore::new()),
            tuning: test_tuning(),
        }
    }

    pub fn subscriptions(mut self, subscriptions: FakeSubscriptions) -> Self {
        self.subscriptions = subscriptions;
        self
    }

    pub fn presenter(mut self, presenter: RecordingPresenter) -> Self {
        self.presenter = presenter;
        self
    }

    pub fn store(mut self, store: Arc<MemoryStore>) -> Self {
        self.store = store;
        self
    }

    pub fn tuning(mut self, tuning: DiscoveryConfig) -> Self {
        self.tuning = tuning;
        self
    }

    pub fn build(self) -> TestPipeline {
        let backend = Arc::new(self.backend);
        let subscriptions = Arc::new(self.subscriptions);
        let presenter = Arc::new(self.presenter);
        let kv: Arc<dyn KeyValueStore> = self.store.clone();
        let pipeline = DiscoveryPipeline::with_tuning(
            self.options,
            Collaborators {
                backend: backend.clone(),
                subscriptions: subscriptions.clone(),
                store: kv,
                presenter: presenter.clone(),
            },
            self.tuning,
        );
        TestPipeline {
            pipeline,
            backend,
            subscriptions,
            presenter,
            store: self.store,
        }
    }
}

/// Let spawned background tasks run.
pub async fn settle() {
    for _ in 0..20 {
        tokio::task::yield_now().await;
    }
}
