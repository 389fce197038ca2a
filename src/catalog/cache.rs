//! Cache integration for catalog types: cache keys, the tags each query
//! provides and the tags each mutation invalidates.
//!
//! This is the only place that knows which cached queries a mutation
//! affects. Queries and mutations elsewhere just declare their descriptor
//! and pick the matching mapping from here; the store and executors stay
//! generic.

use sha2::{Digest, Sha256};

use crate::cache::{Cacheable, QueryKey, Tag, TagSet};

use super::types::{Category, Product};

// ============================================================================
// Tag vocabulary
// ============================================================================

/// Tag kinds used by catalog queries.
pub mod kind {
  pub const PRODUCT: &str = "Product";
  pub const PRODUCT_LIST: &str = "ProductList";
  pub const PRODUCT_SEARCH: &str = "ProductSearch";
  pub const CATEGORY: &str = "Category";
  pub const CATEGORY_LIST: &str = "CategoryList";
}

/// Discriminator for the unfiltered product list.
pub const ALL: &str = "ALL";
/// Discriminator carried by every paginated product list, whatever the
/// filter or offset.
pub const PARTIAL_LIST: &str = "PARTIAL-LIST";
/// Discriminator carried by every product search result.
pub const SEARCH_RESULTS: &str = "SEARCH-RESULTS";
/// Discriminator for the category list.
pub const CATEGORY_LIST_ALL: &str = "LIST";

// ============================================================================
// Cacheable implementations
// ============================================================================

impl Cacheable for Product {
  fn cache_key(&self) -> String {
    self.id.clone()
  }

  fn entity_tag(&self) -> Tag {
    Tag::new(kind::PRODUCT, &self.id)
  }
}

impl Cacheable for Category {
  fn cache_key(&self) -> String {
    self.id.clone()
  }

  fn entity_tag(&self) -> Tag {
    Tag::new(kind::CATEGORY, &self.id)
  }
}

// ============================================================================
// Query descriptors
// ============================================================================

/// Query descriptors for catalog API calls.
#[derive(Debug, Clone, PartialEq)]
pub enum CatalogQuery {
  /// One page of products, optionally filtered by category
  Products {
    offset: u64,
    limit: u64,
    category_id: Option<String>,
  },
  /// Global product search by name
  ProductSearch { term: String },
  /// Single product by slug or id
  ProductDetail { key: String },
  /// Categories, optionally one page of them
  Categories {
    offset: Option<u64>,
    limit: Option<u64>,
  },
  /// Category search by name
  CategorySearch { term: String },
}

impl QueryKey for CatalogQuery {
  fn cache_hash(&self) -> String {
    let input = match self {
      Self::Products {
        offset,
        limit,
        category_id,
      } => format!(
        "products:{}:{}:{}",
        offset,
        limit,
        category_id.as_deref().unwrap_or("")
      ),
      Self::ProductSearch { term } => format!("product_search:{}", normalize_term(term)),
      Self::ProductDetail { key } => format!("product_detail:{}", key),
      Self::Categories { offset, limit } => format!(
        "categories:{}:{}",
        offset.map(|o| o.to_string()).unwrap_or_default(),
        limit.map(|l| l.to_string()).unwrap_or_default()
      ),
      Self::CategorySearch { term } => format!("category_search:{}", normalize_term(term)),
    };

    // SHA256 hash for stable, fixed-length keys
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    hex::encode(hasher.finalize())
  }

  fn description(&self) -> String {
    match self {
      Self::Products {
        offset,
        limit,
        category_id,
      } => match category_id {
        Some(category_id) => {
          format!("products {}..{} in {}", offset, offset + limit, category_id)
        }
        None => format!("products {}..{}", offset, offset + limit),
      },
      Self::ProductSearch { term } => format!("product search: {}", term),
      Self::ProductDetail { key } => format!("product {}", key),
      Self::Categories { .. } => "categories".to_string(),
      Self::CategorySearch { term } => format!("category search: {}", term),
    }
  }
}

/// Normalize a search term for consistent hashing.
fn normalize_term(term: &str) -> String {
  term.trim().to_lowercase()
}

// ============================================================================
// Provided tags
// ============================================================================

/// Tags satisfied by one page of products. Every row gets its own entity
/// tag so a single-product mutation reaches each list it appears in.
pub fn product_list_tags(category_id: Option<&str>, products: &[Product]) -> TagSet {
  let mut tags: TagSet = products.iter().map(Cacheable::entity_tag).collect();
  tags.insert(Tag::new(kind::PRODUCT_LIST, category_id.unwrap_or(ALL)));
  tags.insert(Tag::new(kind::PRODUCT_LIST, PARTIAL_LIST));
  tags
}

/// Tags satisfied by a product search result.
pub fn product_search_tags(term: &str, products: &[Product]) -> TagSet {
  let mut tags: TagSet = products.iter().map(Cacheable::entity_tag).collect();
  tags.insert(Tag::new(kind::PRODUCT_SEARCH, normalize_term(term)));
  tags.insert(Tag::new(kind::PRODUCT_SEARCH, SEARCH_RESULTS));
  tags
}

/// Tags satisfied by a single-product lookup. Both the canonical id and the
/// key used for the lookup (possibly a slug) address the entry.
pub fn product_detail_tags(lookup_key: &str, product: &Product) -> TagSet {
  [
    Tag::new(kind::PRODUCT, &product.id),
    Tag::new(kind::PRODUCT, lookup_key),
  ]
  .into_iter()
  .collect()
}

/// Tags satisfied by the category list.
pub fn category_list_tags(categories: &[Category]) -> TagSet {
  let mut tags: TagSet = categories.iter().map(Cacheable::entity_tag).collect();
  tags.insert(Tag::new(kind::CATEGORY_LIST, CATEGORY_LIST_ALL));
  tags
}

/// Tags satisfied by a category search result.
pub fn category_search_tags(term: &str, categories: &[Category]) -> TagSet {
  let mut tags: TagSet = categories.iter().map(Cacheable::entity_tag).collect();
  tags.insert(Tag::new(
    kind::CATEGORY_LIST,
    format!("SEARCH-{}", normalize_term(term)),
  ));
  tags
}

// ============================================================================
// Invalidated tags
// ============================================================================

/// Tags a successful create makes stale: every paginated list, the created
/// product's category list and all search results.
pub fn create_invalidates(created: &Product) -> TagSet {
  [
    Tag::new(kind::PRODUCT_LIST, PARTIAL_LIST),
    Tag::new(kind::PRODUCT_LIST, &created.category.id),
    Tag::new(kind::PRODUCT_SEARCH, SEARCH_RESULTS),
  ]
  .into_iter()
  .collect()
}

/// Tags a successful update makes stale. The product is addressed by id
/// and by slug; the category list tag points at the product's (possibly
/// new) category, while PARTIAL-LIST reaches the list it moved out of.
pub fn update_invalidates(id: &str, updated: &Product) -> TagSet {
  [
    Tag::new(kind::PRODUCT, id),
    Tag::new(kind::PRODUCT, &updated.slug),
    Tag::new(kind::PRODUCT_LIST, PARTIAL_LIST),
    Tag::new(kind::PRODUCT_LIST, &updated.category.id),
    Tag::new(kind::PRODUCT_SEARCH, SEARCH_RESULTS),
  ]
  .into_iter()
  .collect()
}

/// Tags a successful delete makes stale.
pub fn delete_invalidates(id: &str) -> TagSet {
  [
    Tag::new(kind::PRODUCT, id),
    Tag::new(kind::PRODUCT_LIST, PARTIAL_LIST),
    Tag::new(kind::PRODUCT_SEARCH, SEARCH_RESULTS),
  ]
  .into_iter()
  .collect()
}

#[cfg(test)]
mod tests {
  use super::*;
  use chrono::Utc;
  use rust_decimal::Decimal;

  fn category(id: &str) -> Category {
    Category {
      id: id.to_string(),
      name: format!("Category {}", id),
      description: None,
      image: String::new(),
      created_at: Utc::now(),
      updated_at: None,
    }
  }

  fn product(id: &str, category_id: &str) -> Product {
    Product {
      id: id.to_string(),
      name: format!("Product {}", id),
      price: Decimal::new(999, 2),
      description: String::new(),
      images: Vec::new(),
      slug: format!("product-{}", id),
      created_at: Utc::now(),
      updated_at: Utc::now(),
      category: category(category_id),
    }
  }

  fn intersects(a: &TagSet, b: &TagSet) -> bool {
    a.iter().any(|tag| b.contains(tag))
  }

  #[test]
  fn test_same_params_same_hash() {
    let a = CatalogQuery::Products {
      offset: 0,
      limit: 12,
      category_id: None,
    };
    let b = CatalogQuery::Products {
      offset: 0,
      limit: 12,
      category_id: None,
    };
    let c = CatalogQuery::Products {
      offset: 12,
      limit: 12,
      category_id: None,
    };
    assert_eq!(a.cache_hash(), b.cache_hash());
    assert_ne!(a.cache_hash(), c.cache_hash());
  }

  #[test]
  fn test_search_hash_normalizes_term() {
    let a = CatalogQuery::ProductSearch {
      term: "  Shoes ".to_string(),
    };
    let b = CatalogQuery::ProductSearch {
      term: "shoes".to_string(),
    };
    assert_eq!(a.cache_hash(), b.cache_hash());
  }

  #[test]
  fn test_list_rows_carry_entity_tags() {
    let tags = product_list_tags(None, &[product("p1", "c1"), product("p2", "c1")]);
    assert!(tags.contains(&Tag::new(kind::PRODUCT, "p1")));
    assert!(tags.contains(&Tag::new(kind::PRODUCT, "p2")));
    assert!(tags.contains(&Tag::new(kind::PRODUCT_LIST, ALL)));
    assert!(tags.contains(&Tag::new(kind::PRODUCT_LIST, PARTIAL_LIST)));
  }

  #[test]
  fn test_filtered_list_uses_category_discriminator() {
    let tags = product_list_tags(Some("c7"), &[product("p1", "c7")]);
    assert!(tags.contains(&Tag::new(kind::PRODUCT_LIST, "c7")));
    assert!(!tags.contains(&Tag::new(kind::PRODUCT_LIST, ALL)));
  }

  #[test]
  fn test_update_fans_out_to_old_and_new_category_lists() {
    // Product p1 moved from c1 to c2: both cached category lists must go
    // stale, and so must every search result.
    let old_list = product_list_tags(Some("c1"), &[product("p1", "c1")]);
    let new_list = product_list_tags(Some("c2"), &[product("p9", "c2")]);
    let search = product_search_tags("p", &[product("p1", "c1")]);

    let moved = product("p1", "c2");
    let invalidated = update_invalidates("p1", &moved);

    assert!(intersects(&invalidated, &old_list));
    assert!(intersects(&invalidated, &new_list));
    assert!(intersects(&invalidated, &search));
  }

  #[test]
  fn test_delete_reaches_lists_and_search() {
    let list = product_list_tags(None, &[product("p1", "c1")]);
    let search = product_search_tags("p", &[product("p1", "c1")]);
    let detail = product_detail_tags("product-p1", &product("p1", "c1"));

    let invalidated = delete_invalidates("p1");
    assert!(intersects(&invalidated, &list));
    assert!(intersects(&invalidated, &search));
    assert!(intersects(&invalidated, &detail));
  }

  #[test]
  fn test_detail_addressable_by_slug_and_id() {
    let tags = product_detail_tags("trail-shoes", &product("p1", "c1"));
    assert!(tags.contains(&Tag::new(kind::PRODUCT, "p1")));
    assert!(tags.contains(&Tag::new(kind::PRODUCT, "trail-shoes")));
  }

  #[test]
  fn test_category_mutations_do_not_touch_category_list() {
    let categories = category_list_tags(&[category("c1")]);
    let invalidated = create_invalidates(&product("p1", "c1"));
    // Product mutations leave category queries alone; Category:<id> and
    // ProductList:<id> are different kinds.
    assert!(!intersects(&invalidated, &categories));
  }
}
