//! In-memory expiring caches.
//!
//! This module provides the building blocks shared by the resolver and the
//! attachment pipeline:
//! - `TtlCache<V>`: a reader/writer-locked map with lazy per-entry expiry
//! - `Sweeper`: a cancellable background task that evicts expired entries

mod sweeper;
mod ttl;

pub use sweeper::{sweep_period, Sweeper};
pub use ttl::{CacheEntry, TtlCache};
