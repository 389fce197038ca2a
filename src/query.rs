//! Query execution: deduplicated fetching over the cache store.
//!
//! `QueryExecutor` decides when a network fetch actually happens:
//! - a fresh `Loaded` entry is returned without touching the network
//! - a stale or missing entry triggers a fetch; concurrent callers for the
//!   same key attach to the in-flight request instead of issuing a
//!   duplicate
//! - while a refresh is in flight, the previous value stays visible
//!   through `snapshot` (stale-while-revalidate)
//! - fetchers are remembered per key, so tag invalidation can refetch
//!   subscribed queries in the background

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures::future::BoxFuture;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::debug;

use crate::cache::{CacheStore, EntrySnapshot, EntryStatus, QueryKey, TagSet};
use crate::error::ApiError;

type FetchOutcome = Result<Value, ApiError>;
type Refetcher = Arc<dyn Fn() -> BoxFuture<'static, Result<(Value, TagSet), ApiError>> + Send + Sync>;

struct RegisteredQuery {
  fetcher: Refetcher,
  ttl: Duration,
}

/// Executes queries against the cache store with request deduplication.
pub struct QueryExecutor {
  store: Arc<CacheStore>,
  inflight: Mutex<HashMap<String, broadcast::Sender<FetchOutcome>>>,
  registry: Mutex<HashMap<String, RegisteredQuery>>,
}

impl QueryExecutor {
  pub fn new(store: Arc<CacheStore>) -> Self {
    Self {
      store,
      inflight: Mutex::new(HashMap::new()),
      registry: Mutex::new(HashMap::new()),
    }
  }

  fn inflight(&self) -> MutexGuard<'_, HashMap<String, broadcast::Sender<FetchOutcome>>> {
    self.inflight.lock().unwrap_or_else(PoisonError::into_inner)
  }

  fn registry(&self) -> MutexGuard<'_, HashMap<String, RegisteredQuery>> {
    self.registry.lock().unwrap_or_else(PoisonError::into_inner)
  }

  /// Current state of a query for reactive reads: last value, loading
  /// flag, error. Never triggers a network call.
  pub fn snapshot<K: QueryKey, T: DeserializeOwned>(&self, key: &K) -> Option<EntrySnapshot<T>> {
    self.store.get(&key.cache_hash())
  }

  /// Run a query with caching and request deduplication.
  ///
  /// `provides` derives the invalidation tags the result satisfies; it is
  /// re-evaluated on every (re)fetch so per-entity tags track the result.
  pub async fn fetch<K, T, F, Fut, P>(
    &self,
    key: &K,
    ttl: Duration,
    fetcher: F,
    provides: P,
  ) -> Result<T, ApiError>
  where
    K: QueryKey,
    T: Serialize + DeserializeOwned + Send + 'static,
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, ApiError>> + Send + 'static,
    P: Fn(&T) -> TagSet + Send + Sync + 'static,
  {
    let hash = key.cache_hash();

    // Fresh cache hit: no network call.
    if let Some(snapshot) = self.store.get::<T>(&hash) {
      if snapshot.status == EntryStatus::Loaded && !snapshot.stale {
        if let Some(data) = snapshot.data {
          debug!(query = %key.description(), "cache hit");
          return Ok(data);
        }
      }
    }

    let fetcher = Arc::new(fetcher);
    let provides = Arc::new(provides);
    let refetcher: Refetcher = Arc::new(move || {
      let fut = fetcher();
      let provides = Arc::clone(&provides);
      Box::pin(async move {
        let result = fut.await?;
        let tags = provides(&result);
        let value = serde_json::to_value(&result)?;
        Ok((value, tags))
      })
    });

    self.registry().insert(
      hash.clone(),
      RegisteredQuery {
        fetcher: Arc::clone(&refetcher),
        ttl,
      },
    );

    let value = self.execute(&hash, ttl, refetcher).await?;
    serde_json::from_value(value).map_err(ApiError::from)
  }

  /// Kick off background refetches for invalidated keys that still have
  /// subscribers. Keys without a remembered fetcher are skipped.
  pub fn refetch_stale(self: Arc<Self>, keys: Vec<String>) {
    for key in keys {
      let registered = {
        let registry = self.registry();
        registry
          .get(&key)
          .map(|query| (Arc::clone(&query.fetcher), query.ttl))
      };
      let Some((fetcher, ttl)) = registered else {
        continue;
      };
      let executor = Arc::clone(&self);
      tokio::spawn(async move {
        if let Err(err) = executor.execute(&key, ttl, fetcher).await {
          debug!(%key, %err, "background refetch failed");
        }
      });
    }
  }

  /// Dispatch a fetch for `hash`, or attach to the one already in flight.
  ///
  /// Exactly one network round-trip is outstanding per key: the first
  /// caller installs a broadcast channel and runs the fetcher; later
  /// callers subscribe to that channel and await its outcome.
  async fn execute(&self, hash: &str, ttl: Duration, fetcher: Refetcher) -> FetchOutcome {
    let pending = {
      let mut inflight = self.inflight();
      if let Some(sender) = inflight.get(hash) {
        Some(sender.subscribe())
      } else {
        let (sender, _) = broadcast::channel(1);
        inflight.insert(hash.to_string(), sender);
        None
      }
    };

    if let Some(mut receiver) = pending {
      debug!(key = %hash, "attaching to in-flight request");
      return match receiver.recv().await {
        Ok(outcome) => outcome,
        Err(_) => Err(ApiError::Network {
          message: "request was cancelled".to_string(),
        }),
      };
    }

    let generation = self.store.begin_load(hash);
    let outcome = match fetcher().await {
      Ok((value, tags)) => {
        // A newer request may have superseded us; its result stays, but
        // this caller still gets the data it asked for.
        self
          .store
          .complete_load(hash, generation, value.clone(), tags, ttl);
        Ok(value)
      }
      Err(err) => {
        self.store.fail_load(hash, generation, err.clone());
        Err(err)
      }
    };

    // The store write above is visible before the key is released, so a
    // caller arriving now either sees the fresh entry or attaches here.
    let sender = self.inflight().remove(hash);
    if let Some(sender) = sender {
      let _ = sender.send(outcome.clone());
    }
    outcome
  }
}

/// Debouncer for rapidly changing inputs (the search box).
///
/// `feed` restarts the settle timer; `poll` yields the value only once it
/// has rested unchanged for the full delay.
#[derive(Debug)]
pub struct Debouncer {
  delay: Duration,
  pending: Option<(String, tokio::time::Instant)>,
}

impl Debouncer {
  pub fn new(delay: Duration) -> Self {
    Self {
      delay,
      pending: None,
    }
  }

  /// Record a new input value, restarting the settle timer.
  pub fn feed(&mut self, value: impl Into<String>) {
    self.pending = Some((value.into(), tokio::time::Instant::now()));
  }

  /// Take the settled value, if the latest input has rested long enough.
  pub fn poll(&mut self) -> Option<String> {
    match &self.pending {
      Some((_, fed_at)) if fed_at.elapsed() >= self.delay => {
        self.pending.take().map(|(value, _)| value)
      }
      _ => None,
    }
  }

  /// Take the pending value immediately (submit-style flows).
  pub fn flush(&mut self) -> Option<String> {
    self.pending.take().map(|(value, _)| value)
  }

  /// True while an input is waiting out the settle timer.
  pub fn is_pending(&self) -> bool {
    self.pending.is_some()
  }
}
