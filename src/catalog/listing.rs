//! Two-mode product listing: debounced search vs. paginated browsing.
//!
//! Exactly one mode is active at a time. A non-empty settled search term
//! suppresses browsing entirely; clearing it resumes browsing at the first
//! page. Consumers render only the result of `query()`, so switching modes
//! never leaves a result from the inactive mode visible.

use std::time::Duration;

use crate::query::Debouncer;

use super::types::ProductListParams;

/// Products shown per page in the listing view.
pub const DEFAULT_PAGE_SIZE: u64 = 12;

/// How long a search term must rest before it is queried.
pub const SEARCH_DEBOUNCE: Duration = Duration::from_millis(500);

/// The query the listing should execute right now.
#[derive(Debug, Clone, PartialEq)]
pub enum ListingQuery {
  Browse(ProductListParams),
  Search(String),
}

/// State machine behind the product listing view.
#[derive(Debug)]
pub struct ProductListing {
  offset: u64,
  limit: u64,
  category_id: Option<String>,
  settled_search: String,
  debouncer: Debouncer,
}

impl Default for ProductListing {
  fn default() -> Self {
    Self::new()
  }
}

impl ProductListing {
  pub fn new() -> Self {
    Self {
      offset: 0,
      limit: DEFAULT_PAGE_SIZE,
      category_id: None,
      settled_search: String::new(),
      debouncer: Debouncer::new(SEARCH_DEBOUNCE),
    }
  }

  pub fn set_limit(&mut self, limit: u64) {
    self.limit = limit.max(1);
  }

  /// Jump straight to an offset (the page-number buttons).
  pub fn set_offset(&mut self, offset: u64) {
    self.offset = offset;
  }

  /// Record a keystroke in the search box. The term only takes effect once
  /// it has rested for the debounce delay.
  pub fn set_search_input(&mut self, input: impl Into<String>) {
    self.debouncer.feed(input);
  }

  /// Settle the debouncer. Returns true when the active query changed.
  pub fn poll_search(&mut self) -> bool {
    match self.debouncer.poll() {
      Some(term) => self.apply_term(term),
      None => false,
    }
  }

  /// Apply the pending search input immediately (submit-style flows).
  pub fn flush_search(&mut self) -> bool {
    match self.debouncer.flush() {
      Some(term) => self.apply_term(term),
      None => false,
    }
  }

  fn apply_term(&mut self, term: String) -> bool {
    if term == self.settled_search {
      return false;
    }
    self.settled_search = term;
    self.offset = 0; // a new term always starts at the first page
    true
  }

  /// Select a category filter; resets to the first page.
  pub fn set_category(&mut self, category_id: Option<String>) {
    if self.category_id != category_id {
      self.category_id = category_id;
      self.offset = 0;
    }
  }

  pub fn next_page(&mut self) {
    if !self.is_searching() {
      self.offset += self.limit;
    }
  }

  pub fn prev_page(&mut self) {
    self.offset = self.offset.saturating_sub(self.limit);
  }

  pub fn is_searching(&self) -> bool {
    !self.settled_search.is_empty()
  }

  /// The single query that should run for the current state.
  pub fn query(&self) -> ListingQuery {
    if self.settled_search.is_empty() {
      ListingQuery::Browse(ProductListParams {
        offset: self.offset,
        limit: self.limit,
        category_id: self.category_id.clone(),
      })
    } else {
      // Search is global and unpaginated: the category filter and offset
      // do not apply in this mode.
      ListingQuery::Search(self.settled_search.clone())
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn browse_offset(listing: &ProductListing) -> u64 {
    match listing.query() {
      ListingQuery::Browse(params) => params.offset,
      ListingQuery::Search(_) => panic!("expected browse mode"),
    }
  }

  #[tokio::test(start_paused = true)]
  async fn test_typing_settles_into_one_search() {
    let mut listing = ProductListing::new();

    listing.set_search_input("a");
    tokio::time::advance(Duration::from_millis(100)).await;
    assert!(!listing.poll_search());
    listing.set_search_input("ab");
    tokio::time::advance(Duration::from_millis(100)).await;
    assert!(!listing.poll_search());
    listing.set_search_input("abc");
    tokio::time::advance(Duration::from_millis(500)).await;

    assert!(listing.poll_search());
    assert_eq!(listing.query(), ListingQuery::Search("abc".to_string()));
  }

  #[tokio::test(start_paused = true)]
  async fn test_search_suppresses_browsing() {
    let mut listing = ProductListing::new();
    listing.next_page();
    listing.next_page();
    assert_eq!(browse_offset(&listing), 2 * DEFAULT_PAGE_SIZE);

    listing.set_search_input("shoes");
    listing.flush_search();
    assert!(listing.is_searching());
    assert_eq!(listing.query(), ListingQuery::Search("shoes".to_string()));

    // Paging is inert while searching.
    listing.next_page();
    assert_eq!(listing.query(), ListingQuery::Search("shoes".to_string()));
  }

  #[tokio::test(start_paused = true)]
  async fn test_clearing_search_restores_first_page() {
    let mut listing = ProductListing::new();
    listing.set_search_input("shoes");
    listing.flush_search();

    listing.set_search_input("");
    listing.flush_search();
    assert!(!listing.is_searching());
    assert_eq!(browse_offset(&listing), 0);
  }

  #[tokio::test(start_paused = true)]
  async fn test_category_change_resets_pagination() {
    let mut listing = ProductListing::new();
    listing.set_offset(24);

    listing.set_category(Some("c1".to_string()));
    assert_eq!(browse_offset(&listing), 0);

    listing.set_offset(12);
    // Re-selecting the same category keeps the page.
    listing.set_category(Some("c1".to_string()));
    assert_eq!(browse_offset(&listing), 12);
  }

  #[tokio::test(start_paused = true)]
  async fn test_unchanged_term_does_not_reset_pagination() {
    let mut listing = ProductListing::new();
    listing.set_search_input("shoes");
    listing.flush_search();

    listing.set_search_input("shoes");
    tokio::time::advance(Duration::from_millis(500)).await;
    assert!(!listing.poll_search());
  }

  #[tokio::test(start_paused = true)]
  async fn test_prev_page_saturates_at_zero() {
    let mut listing = ProductListing::new();
    listing.prev_page();
    assert_eq!(browse_offset(&listing), 0);
  }
}
