//! Client-side data layer for the ProductHub catalog API.
//!
//! The interesting machinery is the synchronization core: a normalized
//! [`cache::CacheStore`], a deduplicating [`query::QueryExecutor`] with
//! stale-while-revalidate reads, a [`mutation::MutationExecutor`] applying
//! optimistic patches with rollback, and the tag mappings in
//! [`catalog::cache`] that keep every cached view consistent after a
//! mutation. [`catalog::cached_client::CachedCatalogClient`] is the facade
//! a UI talks to; the bundled CLI is one such consumer.

pub mod cache;
pub mod catalog;
pub mod config;
pub mod db;
pub mod error;
pub mod mutation;
pub mod query;
pub mod session;
