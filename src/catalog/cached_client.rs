//! Cached catalog client.
//!
//! Wraps the plain HTTP client with the sync core: queries run through the
//! deduplicating `QueryExecutor` and declare the tags they provide;
//! mutations run through the `MutationExecutor` with an optimistic patch
//! against the cached first page and invalidate their declared tag set on
//! success.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::de::DeserializeOwned;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::cache::{Cacheable, CacheEvent, CacheStore, EntrySnapshot, QueryKey, Subscription};
use crate::config::CacheConfig;
use crate::error::ApiError;
use crate::mutation::MutationExecutor;
use crate::query::QueryExecutor;

use super::cache::{self, CatalogQuery};
use super::client::CatalogClient;
use super::listing::{ListingQuery, DEFAULT_PAGE_SIZE};
use super::types::{
  Category, CreateProductInput, DeleteResponse, Product, ProductListParams, UpdateProductInput,
};

/// The first page of the unfiltered listing. This is the only list
/// optimistic patches target; lists at other offsets or filters are
/// invalidated and refetched instead.
fn default_list_key() -> String {
  CatalogQuery::Products {
    offset: 0,
    limit: DEFAULT_PAGE_SIZE,
    category_id: None,
  }
  .cache_hash()
}

/// Catalog client with transparent caching and optimistic mutations.
#[derive(Clone)]
pub struct CachedCatalogClient {
  api: CatalogClient,
  store: Arc<CacheStore>,
  queries: Arc<QueryExecutor>,
  mutations: MutationExecutor,
  product_ttl: Duration,
  category_ttl: Duration,
}

impl CachedCatalogClient {
  pub fn new(api: CatalogClient, cache: &CacheConfig) -> Self {
    let store = Arc::new(CacheStore::new(cache.retention()));
    let queries = Arc::new(QueryExecutor::new(Arc::clone(&store)));
    let mutations = MutationExecutor::new(Arc::clone(&store), Arc::clone(&queries));

    Self {
      api,
      store,
      queries,
      mutations,
      product_ttl: cache.product_ttl(),
      category_ttl: cache.category_ttl(),
    }
  }

  /// Change notifications for all cached queries; consumers re-render the
  /// queries they subscribe to.
  pub fn changes(&self) -> broadcast::Receiver<CacheEvent> {
    self.store.changes()
  }

  /// Register interest in a query. While the subscription is alive the
  /// entry is never evicted, and invalidation refetches it.
  pub fn subscribe(&self, query: &CatalogQuery) -> Subscription {
    Subscription::new(Arc::clone(&self.store), query.cache_hash())
  }

  /// Current cached state of a query: value, loading flag, error.
  pub fn snapshot<T: DeserializeOwned>(&self, query: &CatalogQuery) -> Option<EntrySnapshot<T>> {
    self.queries.snapshot(query)
  }

  // ==========================================================================
  // Queries
  // ==========================================================================

  /// One page of products, optionally filtered by category.
  pub async fn products(&self, params: &ProductListParams) -> Result<Vec<Product>, ApiError> {
    let query = CatalogQuery::Products {
      offset: params.offset,
      limit: params.limit,
      category_id: params.category_id.clone(),
    };
    let api = self.api.clone();
    let fetch_params = params.clone();
    let category_id = params.category_id.clone();

    self
      .queries
      .fetch(
        &query,
        self.product_ttl,
        move || {
          let api = api.clone();
          let params = fetch_params.clone();
          async move { api.get_products(&params).await }
        },
        move |products: &Vec<Product>| {
          cache::product_list_tags(category_id.as_deref(), products)
        },
      )
      .await
  }

  /// Global product search by name.
  pub async fn search_products(&self, term: &str) -> Result<Vec<Product>, ApiError> {
    let query = CatalogQuery::ProductSearch {
      term: term.to_string(),
    };
    let api = self.api.clone();
    let fetch_term = term.to_string();
    let tag_term = term.to_string();

    self
      .queries
      .fetch(
        &query,
        self.product_ttl,
        move || {
          let api = api.clone();
          let term = fetch_term.clone();
          async move { api.search_products(&term).await }
        },
        move |products: &Vec<Product>| cache::product_search_tags(&tag_term, products),
      )
      .await
  }

  /// Execute exactly one of the two listing modes.
  pub async fn run_listing(&self, query: &ListingQuery) -> Result<Vec<Product>, ApiError> {
    match query {
      ListingQuery::Browse(params) => self.products(params).await,
      ListingQuery::Search(term) => self.search_products(term).await,
    }
  }

  /// The cache descriptor behind a listing query, e.g. for subscribing.
  pub fn listing_descriptor(query: &ListingQuery) -> CatalogQuery {
    match query {
      ListingQuery::Browse(params) => CatalogQuery::Products {
        offset: params.offset,
        limit: params.limit,
        category_id: params.category_id.clone(),
      },
      ListingQuery::Search(term) => CatalogQuery::ProductSearch { term: term.clone() },
    }
  }

  /// Single product by slug or id.
  pub async fn product(&self, slug_or_id: &str) -> Result<Product, ApiError> {
    let query = CatalogQuery::ProductDetail {
      key: slug_or_id.to_string(),
    };
    let api = self.api.clone();
    let fetch_key = slug_or_id.to_string();
    let tag_key = slug_or_id.to_string();

    self
      .queries
      .fetch(
        &query,
        self.product_ttl,
        move || {
          let api = api.clone();
          let key = fetch_key.clone();
          async move { api.get_product(&key).await }
        },
        move |product: &Product| cache::product_detail_tags(&tag_key, product),
      )
      .await
  }

  /// Categories, optionally one page of them.
  pub async fn categories(
    &self,
    offset: Option<u64>,
    limit: Option<u64>,
  ) -> Result<Vec<Category>, ApiError> {
    let query = CatalogQuery::Categories { offset, limit };
    let api = self.api.clone();

    self
      .queries
      .fetch(
        &query,
        self.category_ttl,
        move || {
          let api = api.clone();
          async move { api.get_categories(offset, limit).await }
        },
        |categories: &Vec<Category>| cache::category_list_tags(categories),
      )
      .await
  }

  /// Category search by name.
  pub async fn search_categories(&self, term: &str) -> Result<Vec<Category>, ApiError> {
    let query = CatalogQuery::CategorySearch {
      term: term.to_string(),
    };
    let api = self.api.clone();
    let fetch_term = term.to_string();
    let tag_term = term.to_string();

    self
      .queries
      .fetch(
        &query,
        self.category_ttl,
        move || {
          let api = api.clone();
          let term = fetch_term.clone();
          async move { api.search_categories(&term).await }
        },
        move |categories: &Vec<Category>| cache::category_search_tags(&tag_term, categories),
      )
      .await
  }

  // ==========================================================================
  // Mutations
  // ==========================================================================

  /// Create a product. The cached first page shows a provisional row
  /// immediately; the server's entity replaces it on success.
  pub async fn create_product(&self, input: CreateProductInput) -> Result<Product, ApiError> {
    let provisional = self.provisional_product(&input);
    let provisional_id = provisional.id.clone();
    let list_key = default_list_key();
    let confirm_key = list_key.clone();

    let api = self.api.clone();
    let op = async move { api.create_product(&input).await };

    self
      .mutations
      .run(
        move |store| {
          store
            .patch::<Vec<Product>, _>(&list_key, |list| list.insert(0, provisional))
            .into_iter()
            .collect()
        },
        op,
        move |store, created: &Product| {
          let _ = store.patch::<Vec<Product>, _>(&confirm_key, |list| {
            if let Some(row) = list.iter_mut().find(|p| p.cache_key() == provisional_id) {
              *row = created.clone();
            }
          });
        },
        cache::create_invalidates,
      )
      .await
  }

  /// Update a product. Patch fields merge into the cached row right away;
  /// the server's entity replaces the row on success.
  pub async fn update_product(
    &self,
    id: &str,
    input: UpdateProductInput,
  ) -> Result<Product, ApiError> {
    let list_key = default_list_key();
    let confirm_key = list_key.clone();
    let row_id = id.to_string();
    let invalidate_id = id.to_string();
    let patch_fields = input.clone();

    let api = self.api.clone();
    let op_id = id.to_string();
    let op = async move { api.update_product(&op_id, &input).await };

    self
      .mutations
      .run(
        move |store| {
          store
            .patch::<Vec<Product>, _>(&list_key, |list| {
              if let Some(row) = list.iter_mut().find(|p| p.cache_key() == row_id) {
                merge_update(row, &patch_fields);
              }
            })
            .into_iter()
            .collect()
        },
        op,
        move |store, updated: &Product| {
          let _ = store.patch::<Vec<Product>, _>(&confirm_key, |list| {
            if let Some(row) = list.iter_mut().find(|p| p.id == updated.id) {
              *row = updated.clone();
            }
          });
        },
        move |updated| cache::update_invalidates(&invalidate_id, updated),
      )
      .await
  }

  /// Delete a product. The cached first page drops the row immediately;
  /// on failure it reappears in its original position.
  pub async fn delete_product(&self, id: &str) -> Result<DeleteResponse, ApiError> {
    let list_key = default_list_key();
    let row_id = id.to_string();
    let invalidate_id = id.to_string();

    let api = self.api.clone();
    let op_id = id.to_string();
    let op = async move { api.delete_product(&op_id).await };

    self
      .mutations
      .run(
        move |store| {
          store
            .patch::<Vec<Product>, _>(&list_key, |list| {
              list.retain(|product| product.cache_key() != row_id)
            })
            .into_iter()
            .collect()
        },
        op,
        |_, _| {},
        move |_deleted| cache::delete_invalidates(&invalidate_id),
      )
      .await
  }

  /// Synthesize the row a create shows before the server responds. The
  /// category is denormalized from the cached category list when present.
  fn provisional_product(&self, input: &CreateProductInput) -> Product {
    let category = self
      .cached_categories()
      .and_then(|categories| {
        categories
          .into_iter()
          .find(|category| category.id == input.category_id)
      })
      .unwrap_or_else(|| Category {
        id: input.category_id.clone(),
        name: String::new(),
        description: None,
        image: String::new(),
        created_at: Utc::now(),
        updated_at: None,
      });

    let now = Utc::now();
    Product {
      id: format!("pending-{}", Uuid::new_v4()),
      name: input.name.clone(),
      price: input.price,
      description: input.description.clone(),
      images: input.images.clone(),
      slug: slugify(&input.name),
      created_at: now,
      updated_at: now,
      category,
    }
  }

  fn cached_categories(&self) -> Option<Vec<Category>> {
    let key = CatalogQuery::Categories {
      offset: None,
      limit: None,
    }
    .cache_hash();
    self
      .store
      .get::<Vec<Category>>(&key)
      .and_then(|snapshot| snapshot.data)
  }
}

/// Merge update fields into a cached row. The embedded category is left to
/// the authoritative server entity; a bare category id cannot be
/// denormalized locally.
fn merge_update(row: &mut Product, input: &UpdateProductInput) {
  if let Some(name) = &input.name {
    row.name = name.clone();
  }
  if let Some(price) = input.price {
    row.price = price;
  }
  if let Some(description) = &input.description {
    row.description = description.clone();
  }
  if let Some(images) = &input.images {
    row.images = images.clone();
  }
}

/// Derive a display slug for a provisional row.
fn slugify(name: &str) -> String {
  let mut slug = String::new();
  for c in name.trim().to_lowercase().chars() {
    if c.is_ascii_alphanumeric() {
      slug.push(c);
    } else if !slug.is_empty() && !slug.ends_with('-') {
      slug.push('-');
    }
  }
  slug.trim_end_matches('-').to_string()
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::TagSet;
  use crate::db::Database;
  use crate::session::Session;
  use chrono::Utc;
  use rust_decimal::Decimal;
  use url::Url;

  fn client() -> CachedCatalogClient {
    let session = Arc::new(Session::load(Database::open_in_memory().unwrap()).unwrap());
    let api =
      CatalogClient::new(Url::parse("https://api.example.com/api/v1").unwrap(), session).unwrap();
    CachedCatalogClient::new(api, &CacheConfig::default())
  }

  fn category(id: &str, name: &str) -> Category {
    Category {
      id: id.to_string(),
      name: name.to_string(),
      description: None,
      image: String::new(),
      created_at: Utc::now(),
      updated_at: None,
    }
  }

  fn product(id: &str) -> Product {
    Product {
      id: id.to_string(),
      name: format!("Product {}", id),
      price: Decimal::new(1250, 2),
      description: String::new(),
      images: Vec::new(),
      slug: format!("product-{}", id),
      created_at: Utc::now(),
      updated_at: Utc::now(),
      category: category("c1", "Shoes"),
    }
  }

  fn seed_default_list(client: &CachedCatalogClient, products: Vec<Product>) {
    client.store.put(
      &default_list_key(),
      &products,
      cache::product_list_tags(None, &products),
      Duration::from_secs(60),
    );
  }

  #[tokio::test]
  async fn test_mutation_is_gated_and_rolled_back_without_session() {
    let client = client();
    seed_default_list(&client, vec![product("p1"), product("p2")]);

    // No session: rejected before any network dispatch...
    let err = client.delete_product("p1").await.unwrap_err();
    assert_eq!(err, ApiError::Auth);

    // ...the optimistic removal is rolled back...
    let cached = client
      .store
      .get::<Vec<Product>>(&default_list_key())
      .unwrap();
    let ids: Vec<String> = cached.data.unwrap().iter().map(|p| p.id.clone()).collect();
    assert_eq!(ids, vec!["p1".to_string(), "p2".to_string()]);

    // ...and nothing was invalidated.
    assert!(!cached.stale);
  }

  #[tokio::test]
  async fn test_query_is_gated_without_session() {
    let client = client();
    let err = client
      .products(&ProductListParams::default())
      .await
      .unwrap_err();
    assert_eq!(err, ApiError::Auth);
  }

  #[test]
  fn test_provisional_row_uses_cached_category() {
    let client = client();
    let categories = vec![category("c1", "Shoes"), category("c2", "Hats")];
    client.store.put(
      &CatalogQuery::Categories {
        offset: None,
        limit: None,
      }
      .cache_hash(),
      &categories,
      TagSet::new(),
      Duration::from_secs(60),
    );

    let input = CreateProductInput {
      name: "Winter Hat".to_string(),
      price: Decimal::new(1999, 2),
      description: "Warm".to_string(),
      category_id: "c2".to_string(),
      images: Vec::new(),
    };
    let provisional = client.provisional_product(&input);

    assert!(provisional.id.starts_with("pending-"));
    assert_eq!(provisional.slug, "winter-hat");
    assert_eq!(provisional.category.name, "Hats");
  }

  #[test]
  fn test_provisional_row_without_cached_category_keeps_id() {
    let client = client();
    let input = CreateProductInput {
      name: "Hat".to_string(),
      price: Decimal::new(1999, 2),
      description: String::new(),
      category_id: "c9".to_string(),
      images: Vec::new(),
    };
    let provisional = client.provisional_product(&input);
    assert_eq!(provisional.category.id, "c9");
    assert!(provisional.category.name.is_empty());
  }

  #[test]
  fn test_merge_update_leaves_category_alone() {
    let mut row = product("p1");
    merge_update(
      &mut row,
      &UpdateProductInput {
        name: Some("Renamed".to_string()),
        price: Some(Decimal::new(500, 2)),
        category_id: Some("c2".to_string()),
        ..Default::default()
      },
    );
    assert_eq!(row.name, "Renamed");
    assert_eq!(row.price, Decimal::new(500, 2));
    // The embedded category is only replaced by the server's entity.
    assert_eq!(row.category.id, "c1");
  }

  #[test]
  fn test_slugify() {
    assert_eq!(slugify("Trail Shoes 2000"), "trail-shoes-2000");
    assert_eq!(slugify("  Héllo,  World!  "), "h-llo-world");
  }
}
