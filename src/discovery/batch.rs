//! Fixed-size card batches for grid presentation.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, info, warn};

use crate::backend::ExploreRequest;
use crate::discovery::presenter::Status;
use crate::discovery::session::Session;
use crate::discovery::types::{Card, PreviewResult, View};
use crate::store::SeenReason;
use crate::{Result, ScoutError};

#[derive(Debug, Default)]
struct BatchState {
    cards: Vec<Card>,
    capacity: usize,
    /// Next catalog index the scanner looks at.
    scan_cursor: usize,
    loading: bool,
}

impl BatchState {
    fn ids(&self) -> HashSet<String> {
        self.cards.iter().map(|c| c.source_id.clone()).collect()
    }
}

/// Clears the loading flag however the fill that set it ends.
struct LoadingGuard<'a>(&'a BatchManager);

impl Drop for LoadingGuard<'_> {
    fn drop(&mut self) {
        self.0.lock().loading = false;
    }
}

/// Keeps a batch of distinct, eligible cards filled.
///
/// Cards come from the backend's precomputed explore endpoint when it has
/// any, and from a catalog scan otherwise.
pub struct BatchManager {
    session: Arc<Session>,
    state: Mutex<BatchState>,
}

impl BatchManager {
    pub(crate) fn new(session: Arc<Session>, batch_size: usize) -> Self {
        let scan_cursor = session.load_cursor();
        Self {
            session,
            state: Mutex::new(BatchState {
                capacity: batch_size.max(1),
                scan_cursor,
                ..BatchState::default()
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, BatchState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Cards currently in the batch, in display order.
    pub fn cards(&self) -> Vec<Card> {
        self.lock().cards.clone()
    }

    /// Maximum number of cards the batch may hold.
    pub fn capacity(&self) -> usize {
        self.lock().capacity
    }

    /// Whether a fill is running.
    pub fn is_loading(&self) -> bool {
        self.lock().loading
    }

    /// Next catalog index the scanner looks at.
    pub fn scan_cursor(&self) -> usize {
        self.lock().scan_cursor
    }

    /// Replace a card in the batch with an updated copy and re-present the batch.
    pub(crate) fn update_card(&self, card: Card) -> bool {
        let updated = {
            let mut state = self.lock();
            match state
                .cards
                .iter_mut()
                .find(|c| c.source_id == card.source_id)
            {
                Some(slot) => {
                    *slot = card;
                    true
                }
                None => false,
            }
        };
        if updated {
            self.present_batch();
        }
        updated
    }

    /// Find a card of the batch by source id.
    pub fn card(&self, source_id: &str) -> Option<Card> {
        self.lock()
            .cards
            .iter()
            .find(|c| c.source_id == source_id)
            .cloned()
    }

    /// Top the batch up to its capacity and present it.
    ///
    /// Returns the number of cards added. A call made while another fill is
    /// running does nothing.
    pub async fn fill_to_size(&self) -> Result<usize> {
        let want = {
            let mut state = self.lock();
            if state.loading {
                debug!("fill already running");
                return Ok(0);
            }
            state.loading = true;
            state.capacity.saturating_sub(state.cards.len())
        };
        let _loading = LoadingGuard(self);

        let cards = self.collect(want, true).await.inspect_err(|e| self.report(e))?;
        let added = self.append(cards);
        self.session.persist_cursor(self.scan_cursor());
        self.present_batch();
        info!(namespace = %self.session.namespace, added, "batch filled");
        Ok(added)
    }

    /// Grow the batch by `n` cards without wrapping around the catalog.
    pub async fn load_more(&self, n: usize) -> Result<usize> {
        if n == 0 {
            return Ok(0);
        }
        {
            let mut state = self.lock();
            if state.loading {
                return Ok(0);
            }
            state.loading = true;
            state.capacity += n;
        }
        let _loading = LoadingGuard(self);

        let cards = self.collect(n, false).await.inspect_err(|e| self.report(e))?;
        let added = self.append(cards);
        self.session.persist_cursor(self.scan_cursor());
        self.present_batch();
        debug!(requested = n, added, "batch grown");
        Ok(added)
    }

    /// Swap the card `old_id` for a fresh one at the same position.
    ///
    /// The old card is marked seen once a replacement has been looked for.
    /// When no replacement exists the slot is removed. A catalog failure
    /// leaves the batch untouched. Returns the replacement, if any.
    pub async fn replace_in_place(&self, old_id: &str) -> Result<Option<Card>> {
        let exclude = {
            let state = self.lock();
            if !state.cards.iter().any(|c| c.source_id == old_id) {
                debug!(source_id = old_id, "card not in batch, nothing to replace");
                return Ok(None);
            }
            state.ids()
        };

        let bulk = self.bulk_cards(1, &exclude);
        let scan = self.scan_cards(1, true, &exclude);
        tokio::pin!(bulk, scan);
        let raced = tokio::select! {
            cards = &mut bulk => match cards.into_iter().next() {
                Some(card) => Ok(Some(card)),
                None => scan.await.map(|cards| cards.into_iter().next()),
            },
            cards = &mut scan => match cards {
                Ok(cards) if !cards.is_empty() => Ok(cards.into_iter().next()),
                Ok(_) => Ok(bulk.await.into_iter().next()),
                Err(e) => match bulk.await.into_iter().next() {
                    Some(card) => {
                        warn!(error = %e, "catalog scan for replacement failed, using explore card");
                        Ok(Some(card))
                    }
                    None => Err(e),
                },
            },
        };
        let replacement = raced.inspect_err(|e| self.report(e))?;
        self.session.mark_seen(old_id, SeenReason::Dismissed);

        let exit = self.session.tuning.exit_transition_timeout();
        if tokio::time::timeout(exit, self.session.presenter.exit_transition(old_id))
            .await
            .is_err()
        {
            debug!(source_id = old_id, "exit transition timed out");
        }

        let (position, placed) = {
            let mut state = self.lock();
            let Some(position) = state.cards.iter().position(|c| c.source_id == old_id) else {
                return Ok(None);
            };
            let placed = replacement.filter(|card| {
                !state.cards.iter().any(|c| c.source_id == card.source_id)
            });
            match &placed {
                Some(card) => state.cards[position] = card.clone(),
                None => {
                    state.cards.remove(position);
                }
            }
            (position, placed)
        };

        if let Some(card) = &placed {
            self.session.mark_seen(&card.source_id, SeenReason::Shown);
        }
        self.session.persist_cursor(self.lock().scan_cursor);
        self.session.presenter.replace_card(position, placed.as_ref());
        debug!(
            old = old_id,
            new = ?placed.as_ref().map(|c| c.source_id.as_str()),
            position,
            "card replaced"
        );
        Ok(placed)
    }

    /// Gather up to `want` new cards, explore endpoint first.
    async fn collect(&self, want: usize, allow_wrap: bool) -> Result<Vec<Card>> {
        if want == 0 {
            return Ok(Vec::new());
        }
        let mut exclude = self.lock().ids();

        let mut cards = self.bulk_cards(want, &exclude).await;
        exclude.extend(cards.iter().map(|c| c.source_id.clone()));

        if cards.len() < want {
            let scanned = self
                .scan_cards(want - cards.len(), allow_wrap, &exclude)
                .await?;
            cards.extend(scanned);
        }
        Ok(cards)
    }

    /// Append cards that are still new to the batch, up to capacity.
    fn append(&self, cards: Vec<Card>) -> usize {
        let mut state = self.lock();
        let mut ids = state.ids();
        let mut added = 0;
        for card in cards {
            if state.cards.len() >= state.capacity {
                break;
            }
            if ids.insert(card.source_id.clone()) {
                self.session.mark_seen(&card.source_id, SeenReason::Shown);
                state.cards.push(card);
                added += 1;
            }
        }
        added
    }

    fn report(&self, error: &ScoutError) {
        warn!(namespace = %self.session.namespace, error = %error, "batch update failed");
        self.session
            .status(Status::Error(format!("Could not load more sources: {error}")));
    }

    fn present_batch(&self) {
        let cards = self.cards();
        self.session.present(View::Batch(cards));
    }

    /// Precomputed cards from the backend; failures count as none.
    ///
    /// Each returned card also seeds the preview cache.
    async fn bulk_cards(&self, count: usize, exclude: &HashSet<String>) -> Vec<Card> {
        let mut exclude_ids: Vec<String> = exclude.iter().cloned().collect();
        exclude_ids.extend(self.session.session_seen_ids());
        exclude_ids.sort();
        exclude_ids.dedup();

        let request = ExploreRequest {
            count,
            entries_per_card: self.session.entries_per_card,
            exclude_ids,
        };
        let explored = match self.session.backend.explore_cards(&request).await {
            Ok(explored) => explored,
            Err(e) => {
                debug!(error = %e, "explore endpoint unavailable, falling back to scan");
                return Vec::new();
            }
        };

        let cache = self.session.finder.cache();
        let mut cards = Vec::new();
        for explored in explored {
            let source = explored.source();
            let preview =
                PreviewResult::success(&explored.source_id, explored.feed_title, explored.entries);
            let card = Card::from_preview(&source, &preview);
            cache.insert(preview);

            let Some(card) = card else { continue };
            if cards.len() < count
                && !self.session.should_skip(&card.source_id, exclude)
                && !cards.iter().any(|c: &Card| c.source_id == card.source_id)
            {
                cards.push(card);
            }
        }
        cards
    }

    /// Scan the catalog from the scan cursor for up to `count` cards.
    ///
    /// With `allow_wrap` the cursor restarts at zero once, after the catalog
    /// is exhausted.
    async fn scan_cards(
        &self,
        count: usize,
        allow_wrap: bool,
        exclude: &HashSet<String>,
    ) -> Result<Vec<Card>> {
        let mut exclude = exclude.clone();
        let mut cards = Vec::new();
        let mut wrapped = false;
        let mut next = self.lock().scan_cursor;

        while cards.len() < count {
            // Only as many candidates as cards still missing, so the cursor never
            // moves past sources nobody looked at.
            let window = count - cards.len();
            let (candidates, next_index, exhausted) = {
                let mut pager = self.session.pager.lock().await;
                let mut index = next;
                let mut candidates = Vec::new();
                while candidates.len() < window {
                    pager.ensure_loaded_up_to(index).await?;
                    let Some(source) = pager.get(index) else {
                        break;
                    };
                    if !self.session.should_skip(&source.id, &exclude) {
                        candidates.push(source.clone());
                    }
                    index += 1;
                }
                (candidates, index, pager.is_exhausted() && index >= pager.len())
            };

            if !candidates.is_empty() {
                let found = self
                    .session
                    .finder
                    .find_valid(candidates, count - cards.len())
                    .await;
                for card in found {
                    if exclude.insert(card.source_id.clone()) {
                        cards.push(card);
                    }
                }
            }
            // Committed only once the window has been screened, so a scan
            // abandoned mid-window leaves those sources for the next one.
            next = next_index;
            self.lock().scan_cursor = next;

            if cards.len() >= count || !exhausted {
                continue;
            }
            if !allow_wrap || wrapped {
                break;
            }
            wrapped = true;
            next = 0;
            info!(namespace = %self.session.namespace, "catalog exhausted, scan wrapped to start");
        }
        Ok(cards)
    }
}

impl std::fmt::Debug for BatchManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock();
        f.debug_struct("BatchManager")
            .field("cards", &state.cards.len())
            .field("capacity", &state.capacity)
            .field("scan_cursor", &state.scan_cursor)
            .field("loading", &state.loading)
            .finish()
    }
}
