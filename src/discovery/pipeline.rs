//! The discovery pipeline facade.
//!
//! One [`DiscoveryPipeline`] is created per presentation site. It owns every
//! piece of mutable state (cursor, caches, seen set, loading flags), so two
//! carousels on the same page never interfere with each other.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tracing::{debug, info, warn};

use crate::backend::CatalogBackend;
use crate::config::DiscoveryConfig;
use crate::discovery::batch::BatchManager;
use crate::discovery::cache::PreviewCache;
use crate::discovery::cursor::{NavOutcome, NavigationCursor};
use crate::discovery::finder::ValidCardFinder;
use crate::discovery::pager::CatalogPager;
use crate::discovery::presenter::{Presenter, Status};
use crate::discovery::session::Session;
use crate::discovery::staging::{SubscriptionSnapshot, SubscriptionStaging, SubscriptionStore};
use crate::discovery::types::{Card, CatalogQuery, Intent, Mode};
use crate::store::{KeyValueStore, SeenReason};
use crate::{Result, ScoutError};

/// Per-site pipeline parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineOptions {
    /// Single-card or grid presentation.
    pub mode: Mode,
    /// Prefix of every persisted key.
    pub namespace: String,
    /// Entries per card page.
    pub entries_per_card: usize,
    /// Initial grid size; ignored in single mode.
    pub batch_size: usize,
    /// Catalog narrowing.
    pub query: CatalogQuery,
}

impl PipelineOptions {
    /// Single-card carousel over the whole catalog.
    pub fn carousel() -> Self {
        Self {
            mode: Mode::Single,
            namespace: "carousel".to_string(),
            entries_per_card: 5,
            batch_size: 1,
            query: CatalogQuery::all(),
        }
    }

    /// Single-card preview of a narrowed catalog.
    pub fn catalog_modal(query: CatalogQuery) -> Self {
        Self {
            namespace: "catalog".to_string(),
            query,
            ..Self::carousel()
        }
    }

    /// Embedded grid of cards.
    pub fn grid() -> Self {
        Self {
            mode: Mode::Batch,
            namespace: "grid".to_string(),
            entries_per_card: 3,
            batch_size: 6,
            query: CatalogQuery::all(),
        }
    }

    /// Options of `mode` under `namespace`, sized from `tuning`.
    pub fn from_tuning(mode: Mode, namespace: impl Into<String>, tuning: &DiscoveryConfig) -> Self {
        Self {
            mode,
            namespace: namespace.into(),
            entries_per_card: tuning.entries_per_card,
            batch_size: tuning.batch_size,
            query: CatalogQuery::all(),
        }
    }

    /// Set the catalog narrowing.
    pub fn with_query(mut self, query: CatalogQuery) -> Self {
        self.query = query;
        self
    }
}

/// External services a pipeline talks to.
#[derive(Clone)]
pub struct Collaborators {
    /// Catalog, preview and explore endpoints.
    pub backend: Arc<dyn CatalogBackend>,
    /// The user's subscription list.
    pub subscriptions: Arc<dyn SubscriptionStore>,
    /// Local persistence for seen set and cursor.
    pub store: Arc<dyn KeyValueStore>,
    /// Receiver of views and status messages.
    pub presenter: Arc<dyn Presenter>,
}

enum Engine {
    Single(NavigationCursor),
    Batch(BatchManager),
}

/// One discovery session bound to a presenter.
pub struct DiscoveryPipeline {
    options: PipelineOptions,
    session: Arc<Session>,
    engine: Engine,
    staging: SubscriptionStaging,
    snapshot: Mutex<SubscriptionSnapshot>,
    opened: AtomicBool,
}

impl DiscoveryPipeline {
    /// Create a pipeline with default tuning.
    pub fn new(options: PipelineOptions, collaborators: Collaborators) -> Self {
        Self::with_tuning(options, collaborators, DiscoveryConfig::default())
    }

    /// Create a pipeline with explicit tuning.
    ///
    /// The seen set and cursor of `options.namespace` are loaded here.
    pub fn with_tuning(
        options: PipelineOptions,
        collaborators: Collaborators,
        tuning: DiscoveryConfig,
    ) -> Self {
        let Collaborators {
            backend,
            subscriptions,
            store,
            presenter,
        } = collaborators;

        let cache = PreviewCache::new(
            Arc::clone(&backend),
            tuning.preview_ttl(),
            tuning.preview_timeout(),
        );
        let finder = ValidCardFinder::new(cache, tuning.concurrency_limit);
        let pager = CatalogPager::new(
            Arc::clone(&backend),
            options.query.clone(),
            tuning.page_size,
            tuning.max_catalog_pages,
        );
        let session = Arc::new(Session::new(
            &options.namespace,
            options.mode,
            options.entries_per_card,
            tuning,
            Arc::clone(&backend),
            store,
            presenter,
            finder,
            pager,
        ));

        let engine = match options.mode {
            Mode::Single => Engine::Single(NavigationCursor::new(Arc::clone(&session))),
            Mode::Batch => Engine::Batch(BatchManager::new(
                Arc::clone(&session),
                options.batch_size,
            )),
        };

        Self {
            staging: SubscriptionStaging::new(subscriptions, backend),
            options,
            session,
            engine,
            snapshot: Mutex::new(SubscriptionSnapshot::default()),
            opened: AtomicBool::new(false),
        }
    }

    /// Options this pipeline was created with.
    pub fn options(&self) -> &PipelineOptions {
        &self.options
    }

    /// Single-card navigator, when in single mode.
    pub fn cursor(&self) -> Option<&NavigationCursor> {
        match &self.engine {
            Engine::Single(cursor) => Some(cursor),
            Engine::Batch(_) => None,
        }
    }

    /// Grid batch, when in batch mode.
    pub fn batch(&self) -> Option<&BatchManager> {
        match &self.engine {
            Engine::Batch(batch) => Some(batch),
            Engine::Single(_) => None,
        }
    }

    /// Whether `open` has run and `close` has not.
    pub fn is_open(&self) -> bool {
        self.opened.load(Ordering::SeqCst)
    }

    /// Snapshot subscriptions and present the first card or batch.
    pub async fn open(&self) -> Result<()> {
        let subscriptions = self.staging.store().get_subscriptions().await?;
        *self.snapshot.lock().unwrap_or_else(PoisonError::into_inner) =
            SubscriptionSnapshot::capture(&subscriptions);
        self.session
            .set_subscribed(subscriptions.into_iter().map(|s| s.source_id));
        self.opened.store(true, Ordering::SeqCst);
        info!(namespace = %self.options.namespace, mode = ?self.options.mode, "pipeline opened");

        match &self.engine {
            Engine::Single(cursor) => {
                cursor.show_current().await?;
            }
            Engine::Batch(batch) => {
                batch.fill_to_size().await?;
            }
        }
        Ok(())
    }

    /// Fold this session's seen ids into the persisted set and save the cursor.
    pub async fn close(&self) -> Result<()> {
        let cursor = match &self.engine {
            Engine::Single(cursor) => cursor.state().cursor,
            Engine::Batch(batch) => batch.scan_cursor(),
        };
        self.session.persist_cursor(cursor);
        self.session.persist_seen()?;
        self.opened.store(false, Ordering::SeqCst);
        info!(namespace = %self.options.namespace, cursor, "pipeline closed");
        Ok(())
    }

    /// Show the next eligible card.
    pub async fn next(&self) -> Result<NavOutcome> {
        self.single()?.next().await
    }

    /// Show the previous eligible card.
    pub async fn prev(&self) -> Result<NavOutcome> {
        self.single()?.prev().await
    }

    /// Page through the entries of the card on screen.
    pub fn page_entries(&self, delta: i64) -> bool {
        match &self.engine {
            Engine::Single(cursor) => cursor.page_entries(delta),
            Engine::Batch(_) => false,
        }
    }

    /// Add the card on screen to the `target` collection.
    pub async fn add_to_collection(&self, target: &str) -> Result<Card> {
        self.adopt(None, target).await
    }

    /// Add a specific card to the `target` collection.
    pub async fn add_card_to_collection(&self, source_id: &str, target: &str) -> Result<Card> {
        self.adopt(Some(source_id), target).await
    }

    /// Pass over a card.
    ///
    /// In single mode `None` means the card on screen, which is then replaced
    /// by the next one. In batch mode the card is swapped in place.
    pub async fn dismiss(&self, source_id: Option<&str>) -> Result<()> {
        match &self.engine {
            Engine::Single(cursor) => {
                let current = cursor.current_card().map(|c| c.source_id);
                let Some(id) = source_id.map(str::to_string).or_else(|| current.clone()) else {
                    return Ok(());
                };
                self.session.mark_seen(&id, SeenReason::Dismissed);
                debug!(source_id = %id, "source dismissed");
                if current.as_deref() == Some(id.as_str()) {
                    cursor.next().await?;
                }
                Ok(())
            }
            Engine::Batch(batch) => {
                let id = source_id.ok_or_else(|| {
                    ScoutError::Validation("dismiss in batch mode needs a source id".into())
                })?;
                batch.replace_in_place(id).await?;
                Ok(())
            }
        }
    }

    /// Grow the grid by `n` cards. Single mode has nothing to grow.
    pub async fn load_more(&self, n: usize) -> Result<usize> {
        match &self.engine {
            Engine::Batch(batch) => batch.load_more(n).await,
            Engine::Single(_) => Ok(0),
        }
    }

    /// Dispatch a presenter intent.
    pub async fn handle(&self, intent: Intent) -> Result<()> {
        match intent {
            Intent::Next => self.next().await.map(drop),
            Intent::Prev => self.prev().await.map(drop),
            Intent::PageEntries(delta) => {
                self.page_entries(delta);
                Ok(())
            }
            Intent::AddToCollection { target, source_id } => {
                self.adopt(source_id.as_deref(), &target).await.map(drop)
            }
            Intent::Dismiss(source_id) => self.dismiss(source_id.as_deref()).await,
            Intent::LoadMore(n) => self.load_more(n).await.map(drop),
        }
    }

    /// Sources subscribed since `open`.
    pub async fn newly_added_ids(&self) -> Result<Vec<String>> {
        let current = self.staging.store().get_subscriptions().await?;
        let snapshot = self.snapshot.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(snapshot.newly_added(&current))
    }

    fn single(&self) -> Result<&NavigationCursor> {
        self.cursor().ok_or_else(|| {
            ScoutError::Validation("navigation is only available in single-card mode".into())
        })
    }

    async fn adopt(&self, source_id: Option<&str>, target: &str) -> Result<Card> {
        if target.trim().is_empty() {
            return Err(ScoutError::Validation("collection name is empty".into()));
        }

        let card = match (&self.engine, source_id) {
            (Engine::Single(cursor), wanted) => cursor
                .current_card()
                .filter(|card| wanted.map_or(true, |id| card.source_id == id)),
            (Engine::Batch(batch), Some(id)) => batch.card(id),
            (Engine::Batch(_), None) => None,
        };
        let mut card = card.ok_or_else(|| ScoutError::Validation("no such card on screen".into()))?;
        if card.already_added || self.session.is_subscribed(&card.source_id) {
            debug!(source_id = %card.source_id, "card already added");
            return Ok(card);
        }

        if let Err(e) = self.staging.stage(&mut card, target).await {
            self.session
                .status(Status::Error(format!("Could not add {}: {e}", card.title)));
            return Err(e);
        }
        self.session.add_subscribed(&card.source_id);
        match &self.engine {
            Engine::Single(cursor) => cursor.update_current(card.clone()),
            Engine::Batch(batch) => {
                batch.update_card(card.clone());
            }
        }

        match self.staging.commit(&[card.source_id.clone()]).await {
            Ok(saved) => {
                for subscription in &saved {
                    self.session.add_subscribed(&subscription.source_id);
                }
                self.session
                    .status(Status::Info(format!("Added {} to {target}", card.title)));
                Ok(card)
            }
            Err(e) => {
                warn!(source_id = %card.source_id, error = %e, "card stays marked as added after failed commit");
                self.session
                    .status(Status::Error(format!("Could not save {}: {e}", card.title)));
                Err(e)
            }
        }
    }
}

impl std::fmt::Debug for DiscoveryPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiscoveryPipeline")
            .field("options", &self.options)
            .field("open", &self.is_open())
            .finish_non_exhaustive()
    }
}
