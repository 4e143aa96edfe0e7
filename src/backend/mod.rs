//! Backend collaborators for Feedscout.
//!
//! The discovery engine talks to the catalog service only through
//! [`CatalogBackend`]; [`HttpBackend`] is the production implementation.

pub mod http;
pub mod parse;

use async_trait::async_trait;

use crate::discovery::types::{Entry, Source, WarmupPriority};
use crate::Result;

pub use http::HttpBackend;
pub use parse::{parse_feed, parse_preview_body, usable_link};

/// One catalog search request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchRequest {
    /// Page size.
    pub limit: usize,
    /// Offset of the first source.
    pub offset: usize,
    /// Free-text query.
    pub query: Option<String>,
    /// Category filter.
    pub category: Option<String>,
    /// Source ids the backend should leave out.
    pub exclude_ids: Vec<String>,
}

/// One page of catalog results.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CatalogPage {
    /// Sources on this page.
    pub sources: Vec<Source>,
    /// Total number of sources, when the backend reports it.
    pub total: Option<usize>,
    /// Offset to request next, when the backend reports it.
    pub next_offset: Option<usize>,
}

/// A parsed preview: feed title plus usable entries.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeedPreview {
    /// Feed title.
    pub title: Option<String>,
    /// Entries with a usable link.
    pub entries: Vec<Entry>,
}

/// Request for server-side precomputed cards.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExploreRequest {
    /// Number of cards wanted.
    pub count: usize,
    /// Entries to include per card.
    pub entries_per_card: usize,
    /// Source ids the backend should leave out.
    pub exclude_ids: Vec<String>,
}

/// A precomputed card returned by the explore endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExploredCard {
    /// Source identifier.
    pub source_id: String,
    /// Feed URL.
    pub url: String,
    /// Catalog display name.
    pub platform_name: String,
    /// Feed title.
    pub feed_title: Option<String>,
    /// Entries with a usable link.
    pub entries: Vec<Entry>,
}

impl ExploredCard {
    /// Catalog view of this card's source.
    pub fn source(&self) -> Source {
        Source::new(&self.source_id, &self.url, &self.platform_name)
    }
}

/// Remote catalog service.
#[async_trait]
pub trait CatalogBackend: Send + Sync {
    /// Fetch one page of the catalog.
    async fn search(&self, request: &SearchRequest) -> Result<CatalogPage>;

    /// Fetch and parse the preview of one source.
    async fn preview(&self, source_id: &str) -> Result<FeedPreview>;

    /// Fetch precomputed cards.
    async fn explore_cards(&self, request: &ExploreRequest) -> Result<Vec<ExploredCard>>;

    /// Ask the backend to warm its own cache for the given sources.
    async fn warmup(&self, source_ids: &[String], priority: WarmupPriority) -> Result<()>;
}
