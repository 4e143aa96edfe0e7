//! Candidate eligibility screening.

use std::collections::HashSet;

use crate::store::{SeenReason, SeenSetStore};

/// Decides whether a source may be offered.
///
/// Borrowed view over current state; constructing one is free and
/// `should_skip` has no side effects.
#[derive(Debug, Clone, Copy)]
pub struct CandidateFilter<'a> {
    subscribed: &'a HashSet<String>,
    seen: &'a SeenSetStore,
    displayed: &'a HashSet<String>,
    skip_shown_this_session: bool,
}

impl<'a> CandidateFilter<'a> {
    /// Build a filter over the subscription ids, the seen set and the ids
    /// currently displayed or staged by the caller.
    pub fn new(
        subscribed: &'a HashSet<String>,
        seen: &'a SeenSetStore,
        displayed: &'a HashSet<String>,
    ) -> Self {
        Self {
            subscribed,
            seen,
            displayed,
            skip_shown_this_session: true,
        }
    }

    /// Whether ids merely shown this session are skipped.
    ///
    /// Single-card navigation turns this off so earlier cards stay reachable.
    pub fn skip_shown_this_session(mut self, skip: bool) -> Self {
        self.skip_shown_this_session = skip;
        self
    }

    /// Whether `source_id` must not be offered.
    pub fn should_skip(&self, source_id: &str) -> bool {
        if self.subscribed.contains(source_id)
            || self.displayed.contains(source_id)
            || self.seen.contains_persisted(source_id)
        {
            return true;
        }
        match self.seen.session_reason(source_id) {
            Some(SeenReason::Dismissed) => true,
            Some(SeenReason::Shown) => self.skip_shown_this_session,
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{set_json, MemoryStore};

    fn ids(list: &[&str]) -> HashSet<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_skips_subscribed_and_displayed() {
        let subscribed = ids(&["sub"]);
        let displayed = ids(&["shown-now"]);
        let seen = SeenSetStore::new("grid", 10);
        let filter = CandidateFilter::new(&subscribed, &seen, &displayed);

        assert!(filter.should_skip("sub"));
        assert!(filter.should_skip("shown-now"));
        assert!(!filter.should_skip("fresh"));
    }

    #[test]
    fn test_skips_persisted_seen() {
        let store = MemoryStore::new();
        set_json(&store, "grid:seen", &["old"]).unwrap();
        let seen = SeenSetStore::load(&store, "grid", 10);
        let empty = HashSet::new();

        let filter = CandidateFilter::new(&empty, &seen, &empty).skip_shown_this_session(false);
        assert!(filter.should_skip("old"));
    }

    #[test]
    fn test_session_shown_depends_on_mode() {
        let mut seen = SeenSetStore::new("carousel", 10);
        seen.mark("shown", SeenReason::Shown);
        seen.mark("dismissed", SeenReason::Dismissed);
        let empty = HashSet::new();

        let batch = CandidateFilter::new(&empty, &seen, &empty);
        assert!(batch.should_skip("shown"));
        assert!(batch.should_skip("dismissed"));

        let single = batch.skip_shown_this_session(false);
        assert!(!single.should_skip("shown"));
        assert!(single.should_skip("dismissed"));
    }
}
