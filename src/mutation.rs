//! Mutation execution: optimistic writes with rollback.
//!
//! A mutation applies its intended effect to affected cache entries
//! synchronously, before the network call is dispatched, so the UI reflects
//! the change immediately. On success the declared tag set is invalidated,
//! which marks dependent queries stale and refetches the subscribed ones.
//! On any failure every optimistic patch is undone in reverse order and no
//! tag is invalidated.

use std::future::Future;
use std::sync::Arc;

use tracing::debug;

use crate::cache::{CacheStore, TagSet, UndoToken};
use crate::error::ApiError;
use crate::query::QueryExecutor;

/// Runs mutations against the cache store and invalidation machinery.
#[derive(Clone)]
pub struct MutationExecutor {
  store: Arc<CacheStore>,
  queries: Arc<QueryExecutor>,
}

impl MutationExecutor {
  pub fn new(store: Arc<CacheStore>, queries: Arc<QueryExecutor>) -> Self {
    Self { store, queries }
  }

  /// Run a write operation with optimistic cache patches.
  ///
  /// - `optimistic` patches affected entries and returns the undo tokens;
  ///   it runs before `op` is polled, so feedback is ordered ahead of any
  ///   server confirmation.
  /// - `confirm` replaces optimistic values with the server's
  ///   authoritative result after success.
  /// - `invalidates` declares the tag set a successful mutation makes
  ///   stale. A failed mutation invalidates nothing.
  pub async fn run<T, Fut, O, C, I>(
    &self,
    optimistic: O,
    op: Fut,
    confirm: C,
    invalidates: I,
  ) -> Result<T, ApiError>
  where
    Fut: Future<Output = Result<T, ApiError>>,
    O: FnOnce(&CacheStore) -> Vec<UndoToken>,
    C: FnOnce(&CacheStore, &T),
    I: FnOnce(&T) -> TagSet,
  {
    let tokens = optimistic(&self.store);

    match op.await {
      Ok(result) => {
        confirm(&self.store, &result);
        let tags = invalidates(&result);
        let subscribed = self.store.invalidate(&tags);
        if !subscribed.is_empty() {
          debug!(count = subscribed.len(), "refetching invalidated queries");
        }
        Arc::clone(&self.queries).refetch_stale(subscribed);
        Ok(result)
      }
      Err(err) => {
        debug!(%err, patches = tokens.len(), "mutation failed, rolling back");
        for token in tokens.into_iter().rev() {
          self.store.undo(token);
        }
        Err(err)
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::Tag;
  use std::time::Duration;

  fn setup() -> (Arc<CacheStore>, MutationExecutor) {
    let store = Arc::new(CacheStore::new(Duration::from_secs(300)));
    let queries = Arc::new(QueryExecutor::new(Arc::clone(&store)));
    let mutations = MutationExecutor::new(Arc::clone(&store), queries);
    (store, mutations)
  }

  fn list_tags() -> TagSet {
    [Tag::new("List", "ALL")].into_iter().collect()
  }

  #[tokio::test]
  async fn test_optimistic_delete_applies_before_network() {
    let (store, mutations) = setup();
    store.put(
      "list",
      &vec!["a".to_string(), "b".to_string()],
      list_tags(),
      Duration::from_secs(60),
    );

    mutations
      .run(
        |store| {
          store
            .patch::<Vec<String>, _>("list", |list| list.retain(|item| item != "a"))
            .into_iter()
            .collect()
        },
        async {
          // The patch is already visible while the network call runs.
          Ok::<_, ApiError>("a".to_string())
        },
        |_, _| {},
        |_| list_tags(),
      )
      .await
      .unwrap();

    assert_eq!(
      store.get::<Vec<String>>("list").unwrap().data,
      Some(vec!["b".to_string()])
    );
  }

  #[tokio::test]
  async fn test_failed_mutation_rolls_back_in_place() {
    let (store, mutations) = setup();
    store.put(
      "list",
      &vec!["a".to_string(), "b".to_string(), "c".to_string()],
      list_tags(),
      Duration::from_secs(60),
    );

    let err = mutations
      .run(
        |store| {
          store
            .patch::<Vec<String>, _>("list", |list| list.retain(|item| item != "b"))
            .into_iter()
            .collect()
        },
        async { Err::<String, _>(ApiError::Server { status: 500 }) },
        |_, _| {},
        |_| list_tags(),
      )
      .await
      .unwrap_err();
    assert_eq!(err, ApiError::Server { status: 500 });

    // The row is back in its original position.
    assert_eq!(
      store.get::<Vec<String>>("list").unwrap().data,
      Some(vec!["a".to_string(), "b".to_string(), "c".to_string()])
    );
  }

  #[tokio::test]
  async fn test_failed_mutation_invalidates_nothing() {
    let (store, mutations) = setup();
    store.put("list", &vec![1], list_tags(), Duration::from_secs(60));

    let _ = mutations
      .run(
        |_| Vec::new(),
        async { Err::<i32, _>(ApiError::NotFound) },
        |_, _| {},
        |_| list_tags(),
      )
      .await;

    assert!(!store.get::<Vec<i32>>("list").unwrap().stale);
  }

  #[tokio::test]
  async fn test_successful_mutation_invalidates_declared_tags() {
    let (store, mutations) = setup();
    store.put("list", &vec![1], list_tags(), Duration::from_secs(60));
    store.put(
      "other",
      &vec![2],
      [Tag::new("List", "untouched")].into_iter().collect(),
      Duration::from_secs(60),
    );

    mutations
      .run(
        |_| Vec::new(),
        async { Ok::<_, ApiError>(1) },
        |_, _| {},
        |_| list_tags(),
      )
      .await
      .unwrap();

    assert!(store.get::<Vec<i32>>("list").unwrap().stale);
    assert!(!store.get::<Vec<i32>>("other").unwrap().stale);
  }

  #[tokio::test]
  async fn test_confirm_replaces_optimistic_value() {
    let (store, mutations) = setup();
    store.put(
      "list",
      &vec!["draft".to_string()],
      list_tags(),
      Duration::from_secs(60),
    );

    mutations
      .run(
        |_| Vec::new(),
        async { Ok::<_, ApiError>("final".to_string()) },
        |store, result: &String| {
          let _ = store.patch::<Vec<String>, _>("list", |list| {
            if let Some(row) = list.first_mut() {
              *row = result.clone();
            }
          });
        },
        |_| TagSet::new(),
      )
      .await
      .unwrap();

    assert_eq!(
      store.get::<Vec<String>>("list").unwrap().data,
      Some(vec!["final".to_string()])
    );
  }
}
