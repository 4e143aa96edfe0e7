//! Source discovery and preview pipeline.
//!
//! A [`DiscoveryPipeline`] walks the paginated catalog ([`CatalogPager`]),
//! screens candidates ([`CandidateFilter`]), resolves previews through a
//! coalescing cache ([`PreviewCache`], [`ValidCardFinder`]) and hands cards to a
//! [`Presenter`], either one at a time ([`NavigationCursor`]) or as a grid
//! ([`BatchManager`]).

pub mod batch;
pub mod cache;
pub mod cursor;
pub mod filter;
pub mod finder;
pub mod pager;
pub mod pipeline;
pub mod presenter;
mod session;
pub mod staging;
pub mod types;

#[cfg(test)]
pub(crate) mod testing;

pub use batch::BatchManager;
pub use cache::PreviewCache;
pub use cursor::{NavOutcome, NavigationCursor};
pub use filter::CandidateFilter;
pub use finder::{ValidCardFinder, DEFAULT_CONCURRENCY_LIMIT};
pub use pager::CatalogPager;
pub use pipeline::{Collaborators, DiscoveryPipeline, PipelineOptions};
pub use presenter::{NullPresenter, Presenter, Status};
pub use staging::{SubscriptionSnapshot, SubscriptionStaging, SubscriptionStore};
pub use types::{
    Card, CardView, CatalogQuery, Direction, Entry, Intent, Mode, NavigationState, PreviewResult,
    Source, Subscription, View, WarmupPriority,
};
