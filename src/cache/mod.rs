//! Client-side cache core for the catalog API.
//!
//! This module is catalog-agnostic. It provides:
//! - a normalized in-memory store keyed by query hash, with fetch status,
//!   invalidation tags and a staleness deadline per entry
//! - reversible patches for optimistic updates
//! - tag-based invalidation that marks dependent entries stale
//! - change notification for subscribed consumers

mod store;
mod tags;
mod traits;

pub use store::{CacheEvent, CacheStore, EntrySnapshot, EntryStatus, Subscription, UndoToken};
pub use tags::{Tag, TagSet};
pub use traits::{Cacheable, QueryKey};
