//! Feedscout - source discovery and preview engine
//!
//! Walks a remote catalog of syndication sources, previews them, and offers
//! the ones the user has not adopted or dismissed yet.

pub mod backend;
pub mod config;
pub mod discovery;
pub mod error;
pub mod logging;
pub mod store;

pub use backend::{CatalogBackend, HttpBackend};
pub use config::Config;
pub use discovery::{
    BatchManager, Card, CardView, CatalogQuery, Collaborators, DiscoveryPipeline, Entry, Intent,
    Mode, NavOutcome, NavigationCursor, Presenter, PipelineOptions, Source, Status, Subscription,
    SubscriptionStore, View,
};
pub use error::{Result, ScoutError};
pub use store::{FileStore, KeyValueStore, MemoryStore};
