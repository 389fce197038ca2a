//! Invalidation tags.
//!
//! Tags are the only coupling between independently cached queries: a query
//! declares which tags its result satisfies, a mutation declares which tags
//! it invalidates, and the store marks every entry whose tag set intersects
//! the invalidated set as stale.

use std::collections::BTreeSet;
use std::fmt;

/// A single invalidation tag: an entity kind plus a discriminator.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Tag {
  pub kind: &'static str,
  pub id: String,
}

impl Tag {
  pub fn new(kind: &'static str, id: impl Into<String>) -> Self {
    Self {
      kind,
      id: id.into(),
    }
  }
}

impl fmt::Display for Tag {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}:{}", self.kind, self.id)
  }
}

pub type TagSet = BTreeSet<Tag>;
