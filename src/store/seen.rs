//! Persisted set of sources the user has passed over.

use std::collections::{HashMap, HashSet, VecDeque};

use tracing::{debug, warn};

use crate::store::{get_json, namespaced_key, set_json, KeyValueStore};
use crate::Result;

/// Why a source entered the session working set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeenReason {
    /// The card was displayed.
    Shown,
    /// The user explicitly dismissed the card.
    Dismissed,
}

/// Size-capped seen set with a session-local working set.
///
/// Session ids are only folded into the persisted set by
/// [`merge_and_persist`](Self::merge_and_persist), so an interrupted session
/// never hides sources the user merely scrolled past.
#[derive(Debug, Clone)]
pub struct SeenSetStore {
    key: String,
    capacity: usize,
    /// Oldest first.
    persisted: VecDeque<String>,
    persisted_index: HashSet<String>,
    session: HashMap<String, SeenReason>,
    session_order: Vec<String>,
}

impl SeenSetStore {
    /// Empty seen set for `namespace`.
    pub fn new(namespace: &str, capacity: usize) -> Self {
        Self {
            key: namespaced_key(namespace, "seen"),
            capacity,
            persisted: VecDeque::new(),
            persisted_index: HashSet::new(),
            session: HashMap::new(),
            session_order: Vec::new(),
        }
    }

    /// Load the persisted seen set for `namespace`.
    ///
    /// Unreadable data is logged and treated as empty.
    pub fn load(store: &dyn KeyValueStore, namespace: &str, capacity: usize) -> Self {
        let mut seen = Self::new(namespace, capacity);
        match get_json::<Vec<String>>(store, &seen.key) {
            Ok(Some(ids)) => {
                for id in ids {
                    seen.push_persisted(id);
                }
                seen.enforce_capacity();
                debug!(namespace, count = seen.persisted.len(), "seen set loaded");
            }
            Ok(None) => {}
            Err(e) => warn!(namespace, error = %e, "failed to load seen set, starting empty"),
        }
        seen
    }

    fn push_persisted(&mut self, id: String) {
        if self.persisted_index.insert(id.clone()) {
            self.persisted.push_back(id);
        }
    }

    fn enforce_capacity(&mut self) {
        while self.persisted.len() > self.capacity {
            if let Some(oldest) = self.persisted.pop_front() {
                self.persisted_index.remove(&oldest);
            }
        }
    }

    /// Whether `id` was persisted by an earlier session.
    pub fn contains_persisted(&self, id: &str) -> bool {
        self.persisted_index.contains(id)
    }

    /// Why `id` is in the session working set, if it is.
    pub fn session_reason(&self, id: &str) -> Option<SeenReason> {
        self.session.get(id).copied()
    }

    /// Record `id` in the session working set.
    ///
    /// A dismissal is never downgraded back to `Shown`.
    pub fn mark(&mut self, id: &str, reason: SeenReason) {
        match self.session.get_mut(id) {
            Some(existing) => {
                if reason == SeenReason::Dismissed {
                    *existing = SeenReason::Dismissed;
                }
            }
            None => {
                self.session.insert(id.to_string(), reason);
                self.session_order.push(id.to_string());
            }
        }
    }

    /// Session ids in the order they were first recorded.
    pub fn session_ids(&self) -> &[String] {
        &self.session_order
    }

    /// Number of persisted ids.
    pub fn persisted_len(&self) -> usize {
        self.persisted.len()
    }

    /// Fold the session working set into the persisted set and write it.
    ///
    /// Oldest ids are dropped first once the cap is exceeded.
    pub fn merge_and_persist(&mut self, store: &dyn KeyValueStore) -> Result<()> {
        let merged = self.session_order.len();
        for id in std::mem::take(&mut self.session_order) {
            self.push_persisted(id);
        }
        self.session.clear();
        self.enforce_capacity();

        let ids: Vec<&String> = self.persisted.iter().collect();
        set_json(store, &self.key, &ids)?;
        debug!(key = %self.key, merged, total = ids.len(), "seen set persisted");
        Ok(())
    }
}
