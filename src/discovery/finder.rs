//! Bounded-concurrency search for cards with usable previews.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};

use futures::future::join_all;
use tokio::sync::Notify;
use tracing::debug;

use crate::discovery::cache::PreviewCache;
use crate::discovery::types::{Card, Source};

/// Default number of concurrent preview workers.
pub const DEFAULT_CONCURRENCY_LIMIT: usize = 6;

/// Resolves screened candidates into cards.
///
/// Which of several simultaneously valid candidates ends up in the result is
/// whichever preview resolves first, not necessarily the earliest queued.
#[derive(Debug, Clone)]
pub struct ValidCardFinder {
    cache: PreviewCache,
    concurrency_limit: usize,
}

impl ValidCardFinder {
    /// Create a finder resolving previews through `cache`.
    pub fn new(cache: PreviewCache, concurrency_limit: usize) -> Self {
        Self {
            cache,
            concurrency_limit: concurrency_limit.max(1),
        }
    }

    /// The preview cache backing this finder.
    pub fn cache(&self) -> &PreviewCache {
        &self.cache
    }

    /// Find up to `want` cards among `candidates`.
    ///
    /// Candidates must already be screened. Fewer than `want` cards come back
    /// when the queue runs dry first. Once `want` cards are found the call
    /// returns; previews still in flight finish in the background so their
    /// results land in the cache.
    pub async fn find_valid(&self, candidates: Vec<Source>, want: usize) -> Vec<Card> {
        if want == 0 || candidates.is_empty() {
            return Vec::new();
        }

        let queued = candidates.len();
        let workers = self.concurrency_limit.min(queued);
        let queue = Arc::new(Mutex::new(VecDeque::from(candidates)));
        let found = Arc::new(Mutex::new(Vec::with_capacity(want)));
        let reached = Arc::new(Notify::new());

        let mut drained = Box::pin(join_all((0..workers).map(|_| {
            run_worker(
                self.cache.clone(),
                Arc::clone(&queue),
                Arc::clone(&found),
                Arc::clone(&reached),
                want,
            )
        })));

        tokio::select! {
            biased;
            _ = &mut drained => {}
            _ = reached.notified() => {
                tokio::spawn(drained);
            }
        }

        // Cloned rather than taken: background workers still read the count to stop pulling.
        let cards = found.lock().unwrap_or_else(PoisonError::into_inner).clone();
        debug!(queued, workers, want, found = cards.len(), "card search finished");
        cards
    }
}

async fn run_worker(
    cache: PreviewCache,
    queue: Arc<Mutex<VecDeque<Source>>>,
    found: Arc<Mutex<Vec<Card>>>,
    reached: Arc<Notify>,
    want: usize,
) {
    loop {
        if found.lock().unwrap_or_else(PoisonError::into_inner).len() >= want {
            break;
        }
        let next = queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front();
        let Some(source) = next else {
            break;
        };

        let preview = cache.fetch(&source.id).await;
        let Some(card) = Card::from_preview(&source, &preview) else {
            continue;
        };

        let mut found = found.lock().unwrap_or_else(PoisonError::into_inner);
        if found.len() < want {
            found.push(card);
            if found.len() == want {
                reached.notify_one();
            }
        }
    }
}
