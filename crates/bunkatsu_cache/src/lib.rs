//! # bunkatsu_cache
//!
//! Incremental build cache for bunkatsu.
//!
//! Scanning a module's imports is the only per-file work that does not
//! depend on the rest of the graph, so it is what gets cached.
//!
//! ## Cache Strategy
//!
//! 1. **File-level cache**: Reuse the import list of files whose content hash hasn't changed
//! 2. **Config-aware**: Invalidate when the resolve/bundle configuration changes
//!
//! ## Storage
//!
//! Cache is stored using `rkyv` for zero-copy deserialization,
//! providing fast cache reads without parsing overhead.

mod entry;
mod error;
mod manager;

pub use entry::ModuleCacheEntry;
pub use error::CacheError;
pub use manager::BuildCache;
