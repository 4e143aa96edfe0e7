//! Paginated access to the remote source catalog.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::backend::{CatalogBackend, SearchRequest};
use crate::discovery::types::{CatalogQuery, Source};
use crate::Result;

/// Ordered buffer over the remote catalog, filled one page at a time.
///
/// Exhaustion is monotonic: once the backend reports an empty page or the
/// cumulative offset reaches the reported total, no further page is requested.
pub struct CatalogPager {
    backend: Arc<dyn CatalogBackend>,
    query: CatalogQuery,
    page_size: usize,
    max_pages: usize,
    buffer: Vec<Source>,
    known_ids: HashSet<String>,
    next_offset: usize,
    total: Option<usize>,
    pages_fetched: usize,
    exhausted: bool,
}

impl CatalogPager {
    /// Create an empty pager.
    pub fn new(
        backend: Arc<dyn CatalogBackend>,
        query: CatalogQuery,
        page_size: usize,
        max_pages: usize,
    ) -> Self {
        Self {
            backend,
            query,
            page_size: page_size.max(1),
            max_pages: max_pages.max(1),
            buffer: Vec::new(),
            known_ids: HashSet::new(),
            next_offset: 0,
            total: None,
            pages_fetched: 0,
            exhausted: false,
        }
    }

    /// Sources loaded so far.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Whether no source has been loaded.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Whether the whole catalog is in the buffer.
    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    /// Total reported by the backend, if any.
    pub fn total(&self) -> Option<usize> {
        self.total
    }

    /// Source at `index`, if loaded.
    pub fn get(&self, index: usize) -> Option<&Source> {
        self.buffer.get(index)
    }

    /// Loaded sources in catalog order.
    pub fn sources(&self) -> &[Source] {
        &self.buffer
    }

    /// Make sure the buffer holds at least `index + 1` sources, unless the
    /// catalog runs out first.
    ///
    /// Page fetch errors propagate; nothing is retried here.
    pub async fn ensure_loaded_up_to(&mut self, index: usize) -> Result<()> {
        while self.buffer.len() <= index && !self.exhausted {
            self.fetch_next_page().await?;
        }
        Ok(())
    }

    /// Drain the whole catalog, bounded by the page ceiling.
    pub async fn ensure_all_loaded(&mut self) -> Result<()> {
        while !self.exhausted {
            self.fetch_next_page().await?;
        }
        Ok(())
    }

    async fn fetch_next_page(&mut self) -> Result<()> {
        if self.pages_fetched >= self.max_pages {
            warn!(
                pages = self.pages_fetched,
                "catalog page ceiling reached, treating catalog as exhausted"
            );
            self.exhausted = true;
            return Ok(());
        }

        let request = SearchRequest {
            limit: self.page_size,
            offset: self.next_offset,
            query: self.query.query.clone(),
            category: self.query.category.clone(),
            exclude_ids: Vec::new(),
        };
        let page = self.backend.search(&request).await?;
        self.pages_fetched += 1;

        let received = page.sources.len();
        if page.total.is_some() {
            self.total = page.total;
        }
        self.next_offset = page
            .next_offset
            .filter(|next| *next > self.next_offset)
            .unwrap_or(self.next_offset + received);

        for source in page.sources {
            if self.known_ids.insert(source.id.clone()) {
                self.buffer.push(source);
            }
        }

        let past_total = self.total.is_some_and(|total| self.next_offset >= total);
        if received == 0 || past_total {
            self.exhausted = true;
        }

        debug!(
            received,
            buffered = self.buffer.len(),
            next_offset = self.next_offset,
            exhausted = self.exhausted,
            "catalog page loaded"
        );
        Ok(())
    }
}

impl std::fmt::Debug for CatalogPager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CatalogPager")
            .field("query", &self.query)
            .field("buffered", &self.buffer.len())
            .field("next_offset", &self.next_offset)
            .field("total", &self.total)
            .field("exhausted", &self.exhausted)
            .finish()
    }
}
