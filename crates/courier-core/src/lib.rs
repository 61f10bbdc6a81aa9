//! Local state for the chat views: paged history, reconciliation of pushed
//! batches, optimistic sends and the contact-photo style resource cache.

pub mod error;
pub mod events;
pub mod history;
pub mod optimistic;
pub mod outbox;
pub mod page_store;
pub mod reconcile;
pub mod resource_cache;
pub mod view;

pub use error::CoreError;
pub use events::{FeedCause, FeedChange, FeedEvents};
pub use history::{HistorySource, SendTransport};
pub use outbox::Outbox;
pub use page_store::PageStore;
pub use reconcile::merge;
pub use resource_cache::{CacheLookup, ResourceCache, ResourceCacheConfig, ResourceFetcher};
pub use view::{rebuild, FeedView, PagedFeed, DEFAULT_PAGE_SIZE};
