//! Discovery types for Feedscout.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::time::{Duration, Instant};

/// A catalog entry describing one discoverable syndication source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Source {
    /// Catalog identifier.
    pub id: String,
    /// Feed URL.
    pub url: String,
    /// Human readable name.
    #[serde(rename = "name")]
    pub display_name: String,
}

impl Source {
    /// Create a new source.
    pub fn new(
        id: impl Into<String>,
        url: impl Into<String>,
        display_name: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            url: url.into(),
            display_name: display_name.into(),
        }
    }
}

/// One syndication item of a preview.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    /// Item title.
    pub title: String,
    /// Absolute link to the item.
    pub link: String,
    /// Publication time, when the feed provides one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published_at: Option<DateTime<Utc>>,
}

/// Outcome of one preview fetch, successful or not.
#[derive(Debug, Clone)]
pub struct PreviewResult {
    /// Source the preview belongs to.
    pub source_id: String,
    /// Whether the fetch and parse succeeded.
    pub ok: bool,
    /// Feed title reported by the preview.
    pub feed_title: Option<String>,
    /// Parsed entries; entries without a usable link are already dropped.
    pub entries: Vec<Entry>,
    /// When the result was stored.
    pub fetched_at: Instant,
    /// Failure description for negative results.
    pub error: Option<String>,
}

impl PreviewResult {
    /// Build a successful result stamped with the current time.
    pub fn success(
        source_id: impl Into<String>,
        feed_title: Option<String>,
        entries: Vec<Entry>,
    ) -> Self {
        Self {
            source_id: source_id.into(),
            ok: true,
            feed_title,
            entries,
            fetched_at: Instant::now(),
            error: None,
        }
    }

    /// Build a negative result stamped with the current time.
    pub fn failure(source_id: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            source_id: source_id.into(),
            ok: false,
            feed_title: None,
            entries: Vec::new(),
            fetched_at: Instant::now(),
            error: Some(error.into()),
        }
    }

    /// Whether the result is still inside its freshness window.
    pub fn is_fresh(&self, now: Instant, ttl: Duration) -> bool {
        now.saturating_duration_since(self.fetched_at) <= ttl
    }

    /// Whether the result can back a card.
    ///
    /// A successful fetch with zero entries counts as a parse failure here.
    pub fn is_usable(&self) -> bool {
        self.ok && !self.entries.is_empty()
    }
}

/// A source plus its latest usable preview, ready to present.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Card {
    /// Source identifier.
    pub source_id: String,
    /// Feed URL.
    pub url: String,
    /// Display title.
    pub title: String,
    /// Preview entries.
    pub entries: Vec<Entry>,
    /// Set once the card has been staged into a collection.
    pub already_added: bool,
}

impl Card {
    /// Build a card from a source and its preview.
    ///
    /// Returns `None` when the preview cannot back a card.
    pub fn from_preview(source: &Source, preview: &PreviewResult) -> Option<Self> {
        if !preview.is_usable() {
            return None;
        }
        let title = preview
            .feed_title
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .unwrap_or(&source.display_name)
            .to_string();
        Some(Self {
            source_id: source.id.clone(),
            url: source.url.clone(),
            title,
            entries: preview.entries.clone(),
            already_added: false,
        })
    }

    /// Number of entry pages at `per_page` entries each.
    pub fn page_count(&self, per_page: usize) -> usize {
        let per_page = per_page.max(1);
        self.entries.len().div_ceil(per_page).max(1)
    }

    /// Entries visible on `page`.
    pub fn entry_page(&self, page: usize, per_page: usize) -> &[Entry] {
        let per_page = per_page.max(1);
        let start = (page * per_page).min(self.entries.len());
        let end = (start + per_page).min(self.entries.len());
        &self.entries[start..end]
    }
}

/// A card together with the entry page currently visible.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CardView {
    /// The card.
    pub card: Card,
    /// Zero-based entry page.
    pub page: usize,
    /// Total entry pages.
    pub page_count: usize,
    /// Entries on the visible page.
    pub entries: Vec<Entry>,
}

impl CardView {
    /// Build the view of `card` at `page`.
    pub fn new(card: Card, page: usize, per_page: usize) -> Self {
        let page_count = card.page_count(per_page);
        let page = page.min(page_count - 1);
        let entries = card.entry_page(page, per_page).to_vec();
        Self {
            card,
            page,
            page_count,
            entries,
        }
    }
}

/// What the presenter is asked to display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum View {
    /// A single card.
    Card(CardView),
    /// No eligible source is left in either direction.
    Empty,
    /// The whole grid batch.
    Batch(Vec<Card>),
}

/// Scan direction through the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Towards higher catalog indices.
    Forward,
    /// Towards lower catalog indices.
    Backward,
}

impl Direction {
    /// Index delta for one step.
    pub fn step(self) -> i64 {
        match self {
            Direction::Forward => 1,
            Direction::Backward => -1,
        }
    }
}

/// Presentation mode of a pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// One card at a time with next/prev navigation.
    Single,
    /// A fixed-size grid of cards.
    Batch,
}

/// Backend cache-warm priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WarmupPriority {
    /// Background hint for a source that was merely shown.
    Low,
    /// A source the user just subscribed to.
    High,
}

/// Single-card navigation state.
///
/// Only `cursor` survives a reload; the rest is transient.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NavigationState {
    /// Catalog index of the card on screen.
    pub cursor: usize,
    /// Coalesced destination recorded while a scan is running.
    pub pending_target: Option<i64>,
    /// Index the running scan started from.
    pub in_flight_index: Option<i64>,
    /// Whether a scan is running.
    pub loading: bool,
}

/// Catalog narrowing used by the search endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CatalogQuery {
    /// Free-text query.
    pub query: Option<String>,
    /// Category filter.
    pub category: Option<String>,
}

impl CatalogQuery {
    /// Query matching the whole catalog.
    pub fn all() -> Self {
        Self::default()
    }

    /// Set the free-text query.
    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        self.query = Some(query.into());
        self
    }

    /// Set the category filter.
    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }
}

/// One entry of the external subscription list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription {
    /// Source identifier.
    pub source_id: String,
    /// Feed URL.
    pub url: String,
    /// Feed title at the time of subscribing.
    pub feed_title: String,
    /// Collection the source was added to.
    pub collection: String,
}

/// User intents emitted by the presenter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Intent {
    /// Show the next eligible card.
    Next,
    /// Show the previous eligible card.
    Prev,
    /// Move through the entries of the current card.
    PageEntries(i64),
    /// Adopt a card into the `target` collection.
    ///
    /// Single-card mode uses the card on screen when `source_id` is `None`.
    AddToCollection {
        /// Collection name.
        target: String,
        /// Card to adopt.
        source_id: Option<String>,
    },
    /// Pass over a card; the current one when no id is given.
    Dismiss(Option<String>),
    /// Grow the grid by the given number of cards.
    LoadMore(usize),
}
