//! Local caching module for offline data access.
//!
//! This module provides the `CacheManager` for keeping the last fetched
//! document list on disk, so it can be shown without a network round trip.
//! Data is cached in JSON format and considered stale after 60 minutes.

pub mod manager;

pub use manager::{CacheManager, CachedData};
