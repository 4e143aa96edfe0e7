//! Single-card navigation with scan coalescing and wraparound.

use std::cmp::Ordering;
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::future::join_all;
use tracing::{debug, info, warn};

use crate::discovery::presenter::Status;
use crate::discovery::session::Session;
use crate::discovery::types::{Card, CardView, Direction, NavigationState, View, WarmupPriority};
use crate::store::SeenReason;
use crate::Result;

/// Result of a navigation request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NavOutcome {
    /// A card was shown at this catalog index.
    Shown {
        /// Catalog index of the card.
        index: usize,
        /// Source of the card.
        source_id: String,
    },
    /// No eligible card exists in either direction.
    Empty,
    /// A scan was already running; the request was folded into it.
    Coalesced,
}

#[derive(Debug, Default)]
struct CursorState {
    nav: NavigationState,
    current: Option<Card>,
    page: usize,
}

/// Drives next/prev navigation over the catalog for single-card mode.
///
/// At most one scan runs at a time. Requests that arrive meanwhile collapse
/// into one pending target, processed when the running scan finishes.
pub struct NavigationCursor {
    session: Arc<Session>,
    state: Mutex<CursorState>,
}

/// Clears the scan bookkeeping when a navigation future is dropped mid-scan.
struct ScanGuard<'a> {
    cursor: &'a NavigationCursor,
    armed: bool,
}

impl Drop for ScanGuard<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let mut state = self.cursor.lock();
        state.nav.loading = false;
        state.nav.in_flight_index = None;
        state.nav.pending_target = None;
        debug!(cursor = state.nav.cursor, "navigation cancelled mid-scan");
    }
}

impl NavigationCursor {
    pub(crate) fn new(session: Arc<Session>) -> Self {
        let cursor = session.load_cursor();
        debug!(namespace = %session.namespace, cursor, "navigation cursor restored");
        Self {
            session,
            state: Mutex::new(CursorState {
                nav: NavigationState {
                    cursor,
                    ..NavigationState::default()
                },
                ..CursorState::default()
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, CursorState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Snapshot of the navigation state.
    pub fn state(&self) -> NavigationState {
        self.lock().nav.clone()
    }

    /// Card on screen, if any.
    pub fn current_card(&self) -> Option<Card> {
        self.lock().current.clone()
    }

    /// Entry page of the card on screen.
    pub fn current_page(&self) -> usize {
        self.lock().page
    }

    /// Show the first eligible card at or after the restored cursor.
    pub async fn show_current(&self) -> Result<NavOutcome> {
        self.navigate(0).await
    }

    /// Move to the next eligible card.
    pub async fn next(&self) -> Result<NavOutcome> {
        self.navigate(1).await
    }

    /// Move to the previous eligible card.
    pub async fn prev(&self) -> Result<NavOutcome> {
        self.navigate(-1).await
    }

    /// Move `delta` entry pages within the card on screen.
    ///
    /// Returns whether the visible page changed.
    pub fn page_entries(&self, delta: i64) -> bool {
        let per_page = self.session.entries_per_card;
        let view = {
            let mut state = self.lock();
            let Some(card) = state.current.clone() else {
                return false;
            };
            let last = card.page_count(per_page) as i64 - 1;
            let page = (state.page as i64).saturating_add(delta).clamp(0, last) as usize;
            if page == state.page {
                return false;
            }
            state.page = page;
            CardView::new(card, page, per_page)
        };
        self.session.present(View::Card(view));
        true
    }

    /// Replace the card on screen with an updated copy and re-present it.
    ///
    /// Ignored when a different card is on screen by now.
    pub(crate) fn update_current(&self, card: Card) {
        let view = {
            let mut state = self.lock();
            match &state.current {
                Some(current) if current.source_id == card.source_id => {}
                _ => return,
            }
            let page = state.page;
            state.current = Some(card.clone());
            CardView::new(card, page, self.session.entries_per_card)
        };
        self.session.present(View::Card(view));
    }

    async fn navigate(&self, delta: i64) -> Result<NavOutcome> {
        let (mut target, mut direction) = {
            let mut state = self.lock();
            if state.nav.loading {
                let base = state
                    .nav
                    .pending_target
                    .or(state.nav.in_flight_index)
                    .unwrap_or(state.nav.cursor as i64);
                state.nav.pending_target = Some(base + delta);
                debug!(pending = base + delta, "navigation coalesced into running scan");
                return Ok(NavOutcome::Coalesced);
            }
            let target = state.nav.cursor as i64 + delta;
            state.nav.loading = true;
            state.nav.in_flight_index = Some(target);
            let direction = if delta < 0 {
                Direction::Backward
            } else {
                Direction::Forward
            };
            (target, direction)
        };
        let mut scan = ScanGuard { cursor: self, armed: true };

        loop {
            let outcome = self.scan_and_show(target, direction).await;
            if let Err(e) = &outcome {
                warn!(target, error = %e, "navigation scan failed");
                self.session
                    .status(Status::Error(format!("Could not load more sources: {e}")));
            }

            // Pending requests are relative to the index that was asked for; the
            // scan may have landed further away after skipping ineligible sources.
            let follow_up = {
                let mut state = self.lock();
                let cursor = state.nav.cursor as i64;
                let follow_up = state.nav.pending_target.take().and_then(|pending| {
                    let offset = pending - target;
                    match offset.cmp(&0) {
                        Ordering::Greater => Some((cursor + offset, Direction::Forward)),
                        Ordering::Less => Some((cursor + offset, Direction::Backward)),
                        Ordering::Equal => None,
                    }
                });
                match follow_up {
                    Some((next, _)) => state.nav.in_flight_index = Some(next),
                    None => {
                        state.nav.loading = false;
                        state.nav.in_flight_index = None;
                        scan.armed = false;
                    }
                }
                follow_up
            };

            match follow_up {
                Some((next, next_direction)) => {
                    target = next;
                    direction = next_direction;
                }
                None => return outcome,
            }
        }
    }

    async fn scan_and_show(&self, start: i64, direction: Direction) -> Result<NavOutcome> {
        let debounce = self.session.tuning.scan_debounce();
        if !debounce.is_zero() {
            tokio::time::sleep(debounce).await;
        }

        let Some((index, card)) = self.resolve(start, direction).await? else {
            self.lock().current = None;
            info!(namespace = %self.session.namespace, "no eligible source left");
            self.session.present(View::Empty);
            return Ok(NavOutcome::Empty);
        };

        let source_id = card.source_id.clone();
        let view = CardView::new(card.clone(), 0, self.session.entries_per_card);
        {
            let mut state = self.lock();
            state.nav.cursor = index;
            state.current = Some(card);
            state.page = 0;
        }
        self.session.present(View::Card(view));
        self.session.persist_cursor(index);
        self.session.mark_seen(&source_id, SeenReason::Shown);
        self.session
            .spawn_warmup(vec![source_id.clone()], WarmupPriority::Low);
        self.schedule_prefetch(index, direction);

        debug!(index, source_id = %source_id, "card shown");
        Ok(NavOutcome::Shown { index, source_id })
    }

    /// Walk from `start` in `direction` until a usable card turns up.
    ///
    /// Running off either end wraps around once the catalog is exhausted.
    /// `None` after a full cycle or after the scan-attempt ceiling.
    async fn resolve(&self, start: i64, direction: Direction) -> Result<Option<(usize, Card)>> {
        let displayed = HashSet::new();
        let max_attempts = self.session.tuning.max_scan_attempts;
        let mut index = start;
        let mut visited = 0usize;

        loop {
            if visited >= max_attempts {
                warn!(start, visited, "scan attempt ceiling reached");
                return Ok(None);
            }

            let source = {
                let mut pager = self.session.pager.lock().await;
                if index < 0 {
                    pager.ensure_all_loaded().await?;
                    index = pager.len() as i64 - 1;
                } else {
                    pager.ensure_loaded_up_to(index as usize).await?;
                    if index as usize >= pager.len() {
                        index = 0;
                    }
                }
                if pager.is_empty() || (pager.is_exhausted() && visited >= pager.len()) {
                    return Ok(None);
                }
                pager.get(index as usize).cloned()
            };
            visited += 1;

            if let Some(source) = source {
                if !self.session.should_skip(&source.id, &displayed) {
                    let found = self.session.finder.find_valid(vec![source], 1).await;
                    if let Some(card) = found.into_iter().next() {
                        return Ok(Some((index as usize, card)));
                    }
                }
            }
            index += direction.step();
        }
    }

    /// Warm the preview cache for the next few candidates past `index`.
    ///
    /// Best effort: skipped while a scan holds the catalog.
    fn schedule_prefetch(&self, index: usize, direction: Direction) {
        let count = self.session.tuning.prefetch_count;
        if count == 0 {
            return;
        }
        let session = Arc::clone(&self.session);

        tokio::spawn(async move {
            tokio::task::yield_now().await;

            let candidates = {
                let Ok(pager) = session.pager.try_lock() else {
                    return;
                };
                let len = pager.len() as i64;
                let displayed = HashSet::new();
                let mut picked = Vec::new();
                let mut at = index as i64;
                for _ in 0..len {
                    at += direction.step();
                    if at < 0 || at >= len {
                        if !pager.is_exhausted() {
                            break;
                        }
                        at = at.rem_euclid(len);
                    }
                    if at == index as i64 {
                        break;
                    }
                    let Some(source) = pager.get(at as usize) else {
                        break;
                    };
                    if !session.should_skip(&source.id, &displayed) {
                        picked.push(source.id.clone());
                        if picked.len() >= count {
                            break;
                        }
                    }
                }
                picked
            };

            let cache = session.finder.cache();
            join_all(candidates.iter().map(|id| cache.fetch(id))).await;
            debug!(prefetched = candidates.len(), "preview prefetch finished");
        });
    }
}

impl std::fmt::Debug for NavigationCursor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NavigationCursor")
            .field("state", &self.lock().nav)
            .finish()
    }
}
