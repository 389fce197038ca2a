//! Core traits for the caching system.

use serde::{de::DeserializeOwned, Serialize};

use super::tags::Tag;

/// Trait for entities that can live inside cache entries.
pub trait Cacheable: Clone + Send + Sync + Serialize + DeserializeOwned {
  /// Unique identifier for this entity (e.g. product id, category id).
  fn cache_key(&self) -> String;

  /// The single-entity tag addressing this entity wherever it appears,
  /// so a mutation on one entity reaches every list that contains it.
  fn entity_tag(&self) -> Tag;
}

/// Trait for query descriptors that can be turned into stable cache keys.
pub trait QueryKey {
  /// Stable, fixed-length cache key derived from the descriptor.
  fn cache_hash(&self) -> String;

  /// Human-readable description for logs.
  fn description(&self) -> String;
}
