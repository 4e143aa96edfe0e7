//! Optimistic "add to collection" staging.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::backend::CatalogBackend;
use crate::discovery::types::{Card, Subscription, WarmupPriority};
use crate::Result;

/// External subscription list.
#[async_trait]
pub trait SubscriptionStore: Send + Sync {
    /// Current local list.
    async fn get_subscriptions(&self) -> Result<Vec<Subscription>>;

    /// Replace the local list.
    async fn set_subscriptions(&self, list: Vec<Subscription>) -> Result<()>;

    /// Persist the local list to the server, returning the saved list.
    async fn commit(&self) -> Result<Vec<Subscription>>;
}

/// Subscription ids captured once per pipeline session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubscriptionSnapshot {
    ids: HashSet<String>,
}

impl SubscriptionSnapshot {
    /// Capture the ids of `list`.
    pub fn capture(list: &[Subscription]) -> Self {
        Self {
            ids: list.iter().map(|s| s.source_id.clone()).collect(),
        }
    }

    /// Whether `source_id` was subscribed when the snapshot was taken.
    pub fn contains(&self, source_id: &str) -> bool {
        self.ids.contains(source_id)
    }

    /// Ids in `current` that were not subscribed at capture time, in list order.
    pub fn newly_added(&self, current: &[Subscription]) -> Vec<String> {
        let mut seen = HashSet::new();
        current
            .iter()
            .filter(|s| !self.ids.contains(&s.source_id))
            .filter(|s| seen.insert(s.source_id.as_str()))
            .map(|s| s.source_id.clone())
            .collect()
    }
}

/// Stages cards into the subscription list and commits them.
#[derive(Clone)]
pub struct SubscriptionStaging {
    store: Arc<dyn SubscriptionStore>,
    backend: Arc<dyn CatalogBackend>,
}

impl SubscriptionStaging {
    /// Create a staging helper.
    pub fn new(store: Arc<dyn SubscriptionStore>, backend: Arc<dyn CatalogBackend>) -> Self {
        Self { store, backend }
    }

    /// The subscription collaborator.
    pub fn store(&self) -> &Arc<dyn SubscriptionStore> {
        &self.store
    }

    /// Upsert `card` into the subscription list under `collection`.
    ///
    /// `card.already_added` is set as soon as the local list accepts the entry.
    pub async fn stage(&self, card: &mut Card, collection: &str) -> Result<Subscription> {
        let subscription = Subscription {
            source_id: card.source_id.clone(),
            url: card.url.clone(),
            feed_title: card.title.clone(),
            collection: collection.to_string(),
        };

        let mut list = self.store.get_subscriptions().await?;
        match list
            .iter_mut()
            .find(|s| s.source_id == subscription.source_id)
        {
            Some(existing) => *existing = subscription.clone(),
            None => list.push(subscription.clone()),
        }
        self.store.set_subscriptions(list).await?;

        card.already_added = true;
        debug!(source_id = %card.source_id, collection, "source staged");
        Ok(subscription)
    }

    /// Persist staged changes.
    ///
    /// On success the backend is asked, at high priority, to warm its cache for
    /// `staged_ids`. A failure is returned as is; the caller decides how to
    /// surface it and nothing staged is rolled back.
    pub async fn commit(&self, staged_ids: &[String]) -> Result<Vec<Subscription>> {
        let saved = match self.store.commit().await {
            Ok(saved) => saved,
            Err(e) => {
                warn!(error = %e, staged = staged_ids.len(), "subscription commit failed");
                return Err(e);
            }
        };
        info!(staged = staged_ids.len(), total = saved.len(), "subscriptions committed");

        if !staged_ids.is_empty() {
            let backend = Arc::clone(&self.backend);
            let ids = staged_ids.to_vec();
            tokio::spawn(async move {
                if let Err(e) = backend.warmup(&ids, WarmupPriority::High).await {
                    debug!(error = %e, "warmup after commit failed");
                }
            });
        }
        Ok(saved)
    }
}

impl std::fmt::Debug for SubscriptionStaging {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionStaging").finish_non_exhaustive()
    }
}
