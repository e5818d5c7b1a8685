//! # bunkatsu_runtime
//!
//! Runtime HTTP cache for the assets and API calls of a bunkatsu build.
//!
//! Requests are matched against the configured routes and answered with
//! the route's strategy (`cache-first`, `network-first` or
//! `stale-while-revalidate`). Each route owns a store bounded by entry count
//! (least recently used evicted first) and entry age (older entries are
//! treated as absent). Chunks listed in the build manifest can be installed
//! ahead of time and are verified against their fingerprints.
//!
//! ## Example
//!
//! ```rust,ignore
//! use bunkatsu_runtime::{HttpFetcher, PrecacheManifest, Request, RuntimeCache};
//!
//! let cache = RuntimeCache::builder(HttpFetcher::new()?)
//!     .routes(&config.runtime_caching)
//!     .origin(url::Url::parse("https://game.example/")?)
//!     .build()?;
//!
//! cache
//!     .install(&PrecacheManifest::from_build_manifest(&manifest, &config.precache)?)
//!     .await?;
//! let handled = cache.handle(&Request::get("https://api.game.example/rooms")?).await?;
//! println!("{} ({})", handled.response.status, handled.status);
//! ```

pub mod clock;
mod engine;
pub mod error;
pub mod fetch;
pub mod precache;
pub mod route;
pub mod store;

pub use clock::{Clock, ManualClock, SystemClock};
pub use engine::{
    CacheStatus, Handled, InstallReport, PRECACHE_NAME, RuntimeCache, RuntimeCacheBuilder,
    RuntimeWarning,
};
pub use error::{FetchError, RuntimeError};
pub use fetch::{Fetch, HttpFetcher, Request, Response};
pub use precache::{PrecacheEntry, PrecacheManifest};
pub use route::{Route, Router};
pub use store::{CacheEntry, RouteStore, Sweep};
