//! In-memory resource cache store.
//!
//! One entry per executed query, keyed by the query's stable hash. An entry
//! carries the last-known result (serialized through serde_json, like every
//! other payload in this crate), a fetch status, the invalidation tags the
//! result satisfies and a staleness deadline. All mutations go through
//! `put`/`patch`/`invalidate` under a single lock, so no reader ever
//! observes a half-applied change.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::debug;

use super::tags::TagSet;
use crate::error::ApiError;

/// Fetch status of a cache entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryStatus {
  /// Entry exists (e.g. a subscriber registered) but was never written to.
  Uninitialized,
  /// A fetch is in flight. Any previously loaded value stays readable.
  Loading,
  Loaded,
  /// The last fetch failed. Any previously loaded value stays readable.
  Error,
}

/// Typed read of a cache entry.
#[derive(Debug, Clone)]
pub struct EntrySnapshot<T> {
  pub data: Option<T>,
  pub status: EntryStatus,
  pub error: Option<ApiError>,
  /// True once the entry was explicitly invalidated or its TTL elapsed.
  pub stale: bool,
}

impl<T> EntrySnapshot<T> {
  pub fn is_loading(&self) -> bool {
    self.status == EntryStatus::Loading
  }

  pub fn is_loaded(&self) -> bool {
    self.status == EntryStatus::Loaded
  }
}

/// Reversible record of a single `patch` call.
///
/// Holds the entry's payload from before the patch; `CacheStore::undo`
/// restores it. Undo is a plain inverse write, not a diff.
#[derive(Debug)]
pub struct UndoToken {
  key: String,
  prior: Value,
}

/// Notification emitted on every data-affecting store mutation.
#[derive(Debug, Clone)]
pub struct CacheEvent {
  pub key: String,
}

#[derive(Debug)]
struct Entry {
  data: Option<Value>,
  status: EntryStatus,
  error: Option<ApiError>,
  tags: TagSet,
  fetched_at: Option<Instant>,
  ttl: Duration,
  invalidated: bool,
  generation: u64,
  subscribers: usize,
  idle_since: Option<Instant>,
}

impl Entry {
  fn new() -> Self {
    Self {
      data: None,
      status: EntryStatus::Uninitialized,
      error: None,
      tags: TagSet::new(),
      fetched_at: None,
      ttl: Duration::ZERO,
      invalidated: false,
      generation: 0,
      subscribers: 0,
      idle_since: Some(Instant::now()),
    }
  }

  fn is_expired(&self) -> bool {
    match self.fetched_at {
      Some(at) => at.elapsed() > self.ttl,
      None => true,
    }
  }

  fn is_stale(&self) -> bool {
    self.invalidated || self.is_expired()
  }
}

/// The process-wide cache table.
pub struct CacheStore {
  entries: Mutex<HashMap<String, Entry>>,
  events: broadcast::Sender<CacheEvent>,
  /// How long an entry without subscribers is retained before eviction.
  retention: Duration,
}

impl CacheStore {
  pub fn new(retention: Duration) -> Self {
    let (events, _) = broadcast::channel(64);
    Self {
      entries: Mutex::new(HashMap::new()),
      events,
      retention,
    }
  }

  /// Subscribe to change notifications for all keys.
  pub fn changes(&self) -> broadcast::Receiver<CacheEvent> {
    self.events.subscribe()
  }

  fn entries(&self) -> MutexGuard<'_, HashMap<String, Entry>> {
    self.entries.lock().unwrap_or_else(PoisonError::into_inner)
  }

  fn notify(&self, key: &str) {
    // No receivers is fine; events are best-effort wakeups.
    let _ = self.events.send(CacheEvent {
      key: key.to_string(),
    });
  }

  /// Read an entry. Never blocks on the network; a stale entry still
  /// returns its last loaded value.
  pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<EntrySnapshot<T>> {
    let entries = self.entries();
    let entry = entries.get(key)?;
    Some(EntrySnapshot {
      data: entry
        .data
        .clone()
        .and_then(|value| serde_json::from_value(value).ok()),
      status: entry.status,
      error: entry.error.clone(),
      stale: entry.is_stale(),
    })
  }

  /// Store a fetched result with the tags it satisfies, resetting the TTL.
  pub fn put<T: Serialize>(&self, key: &str, value: &T, tags: TagSet, ttl: Duration) {
    let serialized = match serde_json::to_value(value) {
      Ok(serialized) => serialized,
      Err(err) => {
        debug!(%key, %err, "dropping unserializable cache write");
        return;
      }
    };
    {
      let mut entries = self.entries();
      Self::sweep(&mut entries, self.retention);
      let entry = entries.entry(key.to_string()).or_insert_with(Entry::new);
      entry.data = Some(serialized);
      entry.status = EntryStatus::Loaded;
      entry.error = None;
      entry.tags = tags;
      entry.fetched_at = Some(Instant::now());
      entry.ttl = ttl;
      entry.invalidated = false;
    }
    self.notify(key);
  }

  /// Mark a fetch as started, keeping any previous value visible
  /// (stale-while-revalidate). Returns the request generation; only the
  /// matching `complete_load`/`fail_load` may write the outcome back.
  pub fn begin_load(&self, key: &str) -> u64 {
    let generation = {
      let mut entries = self.entries();
      Self::sweep(&mut entries, self.retention);
      let entry = entries.entry(key.to_string()).or_insert_with(Entry::new);
      entry.status = EntryStatus::Loading;
      entry.generation += 1;
      entry.generation
    };
    self.notify(key);
    generation
  }

  /// Write a fetch result back, unless a newer request for the same key
  /// superseded this one (last-write-wins per key).
  pub fn complete_load(
    &self,
    key: &str,
    generation: u64,
    value: Value,
    tags: TagSet,
    ttl: Duration,
  ) -> bool {
    {
      let mut entries = self.entries();
      let Some(entry) = entries.get_mut(key) else {
        return false;
      };
      if entry.generation != generation {
        debug!(%key, "discarding superseded fetch result");
        return false;
      }
      entry.data = Some(value);
      entry.status = EntryStatus::Loaded;
      entry.error = None;
      entry.tags = tags;
      entry.fetched_at = Some(Instant::now());
      entry.ttl = ttl;
      entry.invalidated = false;
    }
    self.notify(key);
    true
  }

  /// Record a fetch failure. The previous loaded value, if any, is kept so
  /// a transient failure does not blank a populated view.
  pub fn fail_load(&self, key: &str, generation: u64, error: ApiError) -> bool {
    {
      let mut entries = self.entries();
      let Some(entry) = entries.get_mut(key) else {
        return false;
      };
      if entry.generation != generation {
        return false;
      }
      entry.status = EntryStatus::Error;
      entry.error = Some(error);
    }
    self.notify(key);
    true
  }

  /// Apply a reversible mutation to an entry's payload.
  ///
  /// Returns `None` when the entry holds no data — an optimistic patch
  /// never materializes a list that was not already cached.
  pub fn patch<T, F>(&self, key: &str, mutator: F) -> Option<UndoToken>
  where
    T: Serialize + DeserializeOwned,
    F: FnOnce(&mut T),
  {
    let token = {
      let mut entries = self.entries();
      let entry = entries.get_mut(key)?;
      let prior = entry.data.clone()?;
      let mut typed: T = serde_json::from_value(prior.clone()).ok()?;
      mutator(&mut typed);
      entry.data = Some(serde_json::to_value(&typed).ok()?);
      UndoToken {
        key: key.to_string(),
        prior,
      }
    };
    self.notify(key);
    Some(token)
  }

  /// Reverse a previous `patch`, restoring the prior payload in place.
  pub fn undo(&self, token: UndoToken) {
    {
      let mut entries = self.entries();
      if let Some(entry) = entries.get_mut(&token.key) {
        entry.data = Some(token.prior);
      }
    }
    self.notify(&token.key);
  }

  /// Mark every entry whose tag set intersects `tags` as stale. Returns
  /// the affected keys that still have subscribers, so the caller can
  /// schedule refetches for them.
  pub fn invalidate(&self, tags: &TagSet) -> Vec<String> {
    let mut subscribed = Vec::new();
    let mut touched = Vec::new();
    {
      let mut entries = self.entries();
      for (key, entry) in entries.iter_mut() {
        if tags.iter().any(|tag| entry.tags.contains(tag)) {
          entry.invalidated = true;
          touched.push(key.clone());
          if entry.subscribers > 0 {
            subscribed.push(key.clone());
          }
        }
      }
    }
    for key in &touched {
      self.notify(key);
    }
    subscribed
  }

  /// Evict entries that have been without subscribers longer than the
  /// retention window. Subscribed entries are never evicted.
  pub fn evict_idle(&self) {
    let mut entries = self.entries();
    Self::sweep(&mut entries, self.retention);
  }

  fn sweep(entries: &mut HashMap<String, Entry>, retention: Duration) {
    entries.retain(|_, entry| {
      entry.subscribers > 0
        || entry
          .idle_since
          .map(|since| since.elapsed() <= retention)
          .unwrap_or(true)
    });
  }

  pub(crate) fn add_subscriber(&self, key: &str) {
    let mut entries = self.entries();
    let entry = entries.entry(key.to_string()).or_insert_with(Entry::new);
    entry.subscribers += 1;
    entry.idle_since = None;
  }

  pub(crate) fn remove_subscriber(&self, key: &str) {
    let mut entries = self.entries();
    if let Some(entry) = entries.get_mut(key) {
      entry.subscribers = entry.subscribers.saturating_sub(1);
      if entry.subscribers == 0 {
        entry.idle_since = Some(Instant::now());
      }
    }
  }

  #[cfg(test)]
  fn contains(&self, key: &str) -> bool {
    self.entries().contains_key(key)
  }
}

/// Active interest in a cache key. While alive, the entry is pinned:
/// eviction skips it and invalidation schedules a refetch for it.
pub struct Subscription {
  store: Arc<CacheStore>,
  key: String,
}

impl Subscription {
  pub fn new(store: Arc<CacheStore>, key: impl Into<String>) -> Self {
    let key = key.into();
    store.add_subscriber(&key);
    Self { store, key }
  }

  pub fn key(&self) -> &str {
    &self.key
  }
}

impl Drop for Subscription {
  fn drop(&mut self) {
    self.store.remove_subscriber(&self.key);
  }
}
