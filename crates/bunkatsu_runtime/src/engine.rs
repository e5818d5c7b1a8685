//! The runtime cache policy engine.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use bunkatsu_core::{RouteConfig, Strategy};
use bunkatsu_manifest::Fingerprint;
use parking_lot::{Mutex, RwLock};
use reqwest::Method;
use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use url::Url;

use crate::clock::{Clock, SystemClock};
use crate::error::{FetchError, RuntimeError};
use crate::fetch::{Fetch, Request, Response};
use crate::precache::PrecacheManifest;
use crate::route::{Route, Router};
use crate::store::{CacheEntry, RouteStore};

/// Cache name reported for precached responses.
pub const PRECACHE_NAME: &str = "precache";

/// How a response was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheStatus {
    /// Fetched from the network for a routed request.
    Miss,
    /// Served from the cache as the authoritative answer.
    FreshHit,
    /// Served from the cache instead of, or ahead of, the network.
    StaleHit,
    /// Not routed; fetched without touching any cache.
    Passthrough,
}

impl CacheStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            CacheStatus::Miss => "miss",
            CacheStatus::FreshHit => "fresh_hit",
            CacheStatus::StaleHit => "stale_hit",
            CacheStatus::Passthrough => "passthrough",
        }
    }

    pub fn is_from_cache(self) -> bool {
        matches!(self, CacheStatus::FreshHit | CacheStatus::StaleHit)
    }
}

impl fmt::Display for CacheStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The result of [`RuntimeCache::handle`].
#[derive(Debug, Clone)]
pub struct Handled {
    pub response: Arc<Response>,
    pub status: CacheStatus,
    /// The store that served or received the response.
    pub cache_name: Option<String>,
}

/// A condition worth an operator's attention that did not fail a request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RuntimeWarning {
    /// An insertion sweep left the store over its bound.
    EvictionIncomplete { cache: String, overflow: usize },
    /// A background refresh failed; the cached entry was kept.
    RevalidationFailed { url: String, reason: String },
}

impl fmt::Display for RuntimeWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuntimeWarning::EvictionIncomplete { cache, overflow } => {
                write!(f, "cache '{cache}' is {overflow} entries over its limit")
            }
            RuntimeWarning::RevalidationFailed { url, reason } => {
                write!(f, "background refresh of {url} failed: {reason}")
            }
        }
    }
}

/// Outcome of [`RuntimeCache::install`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstallReport {
    pub installed: usize,
    /// Previously precached URLs that are no longer listed, sorted.
    pub removed: Vec<String>,
}

struct Inner<F> {
    fetcher: F,
    clock: Arc<dyn Clock>,
    router: Router,
    /// Indexed by route index.
    stores: Vec<RouteStore>,
    precache: RwLock<HashMap<String, Arc<Response>>>,
    origin: Option<Url>,
    in_flight: Mutex<HashSet<String>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    warnings: Mutex<Vec<RuntimeWarning>>,
}

/// Clears a URL's in-flight mark when its refresh task ends, however it ends.
struct InFlight<F> {
    inner: Arc<Inner<F>>,
    key: String,
}

impl<F> Drop for InFlight<F> {
    fn drop(&mut self) {
        self.inner.in_flight.lock().remove(&self.key);
    }
}

impl<F: Fetch> Inner<F> {
    fn store(&self, route: &Route) -> &RouteStore {
        &self.stores[route.index]
    }

    fn cached(&self, route: &Route, request: &Request) -> Option<CacheEntry> {
        self.store(route)
            .lookup(request.cache_key(), self.clock.now())
    }

    async fn fetch_for(&self, route: &Route, request: &Request) -> Result<Response, FetchError> {
        match route.network_timeout {
            Some(limit) => tokio::time::timeout(limit, self.fetcher.fetch(request))
                .await
                .map_err(|_| FetchError::Timeout(limit))?,
            None => self.fetcher.fetch(request).await,
        }
    }

    fn store_response(&self, route: &Route, request: &Request, response: Arc<Response>) {
        if !response.is_cacheable() {
            debug!(
                "[{}] not caching {} (status {})",
                route.cache_name,
                request.url,
                response.status
            );
            return;
        }

        let sweep = self
            .store(route)
            .insert(request.cache_key(), response, self.clock.now());
        if sweep.expired + sweep.evicted > 0 {
            debug!(
                "[{}] swept {} expired, evicted {}",
                route.cache_name, sweep.expired, sweep.evicted
            );
        }
        if sweep.overflow > 0 {
            warn!(
                "[{}] still {} entries over the limit after eviction",
                route.cache_name, sweep.overflow
            );
            self.warnings.lock().push(RuntimeWarning::EvictionIncomplete {
                cache: route.cache_name.clone(),
                overflow: sweep.overflow,
            });
        }
    }
}

/// Routes requests through per-route caching strategies.
///
/// Cloning is cheap; clones share stores, background work and warnings.
pub struct RuntimeCache<F> {
    inner: Arc<Inner<F>>,
}

impl<F> Clone for RuntimeCache<F> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

/// Builder for [`RuntimeCache`].
pub struct RuntimeCacheBuilder<F> {
    fetcher: F,
    routes: Vec<RouteConfig>,
    clock: Arc<dyn Clock>,
    origin: Option<Url>,
}

impl<F: Fetch> RuntimeCacheBuilder<F> {
    /// Sets the routes, in match order.
    pub fn routes(mut self, routes: &[RouteConfig]) -> Self {
        self.routes = routes.to_vec();
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Base URL that relative precache URLs are resolved against.
    pub fn origin(mut self, origin: Url) -> Self {
        self.origin = Some(origin);
        self
    }

    pub fn build(self) -> Result<RuntimeCache<F>, RuntimeError> {
        let router = Router::new(&self.routes)?;
        let stores = router
            .routes()
            .iter()
            .map(|route| RouteStore::new(&route.cache_name, route.max_entries, route.max_age))
            .collect();

        Ok(RuntimeCache {
            inner: Arc::new(Inner {
                fetcher: self.fetcher,
                clock: self.clock,
                router,
                stores,
                precache: RwLock::new(HashMap::new()),
                origin: self.origin,
                in_flight: Mutex::new(HashSet::new()),
                tasks: Mutex::new(Vec::new()),
                warnings: Mutex::new(Vec::new()),
            }),
        })
    }
}

impl<F: Fetch> RuntimeCache<F> {
    pub fn builder(fetcher: F) -> RuntimeCacheBuilder<F> {
        RuntimeCacheBuilder {
            fetcher,
            routes: Vec::new(),
            clock: Arc::new(SystemClock),
            origin: None,
        }
    }

    pub fn routes(&self) -> &[Route] {
        self.inner.router.routes()
    }

    /// Returns the store with the given cache name.
    pub fn store(&self, cache_name: &str) -> Option<&RouteStore> {
        self.inner
            .stores
            .iter()
            .find(|store| store.name() == cache_name)
    }

    /// Precached URLs, sorted.
    pub fn precached_urls(&self) -> Vec<String> {
        let mut urls: Vec<String> = self.inner.precache.read().keys().cloned().collect();
        urls.sort();
        urls
    }

    /// Warnings recorded so far.
    pub fn warnings(&self) -> Vec<RuntimeWarning> {
        self.inner.warnings.lock().clone()
    }

    /// Answers a request.
    ///
    /// Precached URLs are served first. Requests that are not GET or match
    /// no route go straight to the network.
    pub async fn handle(&self, request: &Request) -> Result<Handled, RuntimeError> {
        let inner = &self.inner;

        let precached = if request.method == Method::GET {
            inner.precache.read().get(request.cache_key()).cloned()
        } else {
            None
        };
        if let Some(response) = precached {
            debug!("[{}] {}", PRECACHE_NAME, request.url);
            return Ok(Handled {
                response,
                status: CacheStatus::FreshHit,
                cache_name: Some(PRECACHE_NAME.to_string()),
            });
        }

        let Some(route) = inner.router.route_for(request) else {
            let response = inner
                .fetcher
                .fetch(request)
                .await
                .map_err(|source| fetch_error(request, source))?;
            return Ok(Handled {
                response: Arc::new(response),
                status: CacheStatus::Passthrough,
                cache_name: None,
            });
        };

        let handled = match route.strategy {
            Strategy::CacheFirst => self.cache_first(route, request).await?,
            Strategy::NetworkFirst => self.network_first(route, request).await?,
            Strategy::StaleWhileRevalidate => self.stale_while_revalidate(route, request).await?,
        };
        debug!(
            "[{}] {} {} -> {}",
            route.cache_name, route.strategy, request.url, handled.status
        );
        Ok(handled)
    }

    async fn cache_first(&self, route: &Route, request: &Request) -> Result<Handled, RuntimeError> {
        if let Some(entry) = self.inner.cached(route, request) {
            return Ok(hit(route, entry, CacheStatus::FreshHit));
        }
        self.from_network(route, request).await
    }

    async fn network_first(
        &self,
        route: &Route,
        request: &Request,
    ) -> Result<Handled, RuntimeError> {
        match self.inner.fetch_for(route, request).await {
            Ok(response) => {
                let response = Arc::new(response);
                self.inner
                    .store_response(route, request, Arc::clone(&response));
                Ok(miss(route, response))
            }
            Err(error) => match self.inner.cached(route, request) {
                Some(entry) => {
                    warn!("[{}] {}; serving cached {}", route.cache_name, error, request.url);
                    Ok(hit(route, entry, CacheStatus::StaleHit))
                }
                None => Err(fetch_error(request, error)),
            },
        }
    }

    async fn stale_while_revalidate(
        &self,
        route: &Route,
        request: &Request,
    ) -> Result<Handled, RuntimeError> {
        match self.inner.cached(route, request) {
            Some(entry) => {
                self.revalidate(route, request);
                Ok(hit(route, entry, CacheStatus::StaleHit))
            }
            None => self.network_first(route, request).await,
        }
    }

    async fn from_network(&self, route: &Route, request: &Request) -> Result<Handled, RuntimeError> {
        let response = self
            .inner
            .fetch_for(route, request)
            .await
            .map_err(|source| fetch_error(request, source))?;
        let response = Arc::new(response);
        self.inner
            .store_response(route, request, Arc::clone(&response));
        Ok(miss(route, response))
    }

    /// Refreshes an entry in the background. At most one refresh per URL is
    /// in flight at a time.
    fn revalidate(&self, route: &Route, request: &Request) {
        let key = request.cache_key().to_string();
        if !self.inner.in_flight.lock().insert(key.clone()) {
            debug!("[{}] refresh of {} already in flight", route.cache_name, key);
            return;
        }

        let inner = Arc::clone(&self.inner);
        let guard = InFlight {
            inner: Arc::clone(&self.inner),
            key: key.clone(),
        };
        let index = route.index;
        let request = request.clone();
        let task = tokio::spawn(async move {
            let _guard = guard;
            let route = &inner.router.routes()[index];
            match inner.fetch_for(route, &request).await {
                Ok(response) => inner.store_response(route, &request, Arc::new(response)),
                Err(error) => {
                    warn!("[{}] background refresh of {} failed: {}", route.cache_name, key, error);
                    inner.warnings.lock().push(RuntimeWarning::RevalidationFailed {
                        url: key.clone(),
                        reason: error.to_string(),
                    });
                }
            }
        });

        let mut tasks = self.inner.tasks.lock();
        tasks.retain(|task| !task.is_finished());
        tasks.push(task);
    }

    /// Waits for every background refresh started so far, including ones
    /// started while waiting.
    pub async fn settle(&self) {
        loop {
            let tasks = std::mem::take(&mut *self.inner.tasks.lock());
            if tasks.is_empty() {
                break;
            }
            for task in tasks {
                if let Err(error) = task.await {
                    warn!("Background refresh task failed: {}", error);
                }
            }
        }
    }

    /// Fetches and verifies every listed asset, then replaces the precache
    /// in one step. On any failure the previous precache stays in place.
    pub async fn install(&self, manifest: &PrecacheManifest) -> Result<InstallReport, RuntimeError> {
        let mut fetched = HashMap::with_capacity(manifest.len());

        for entry in manifest.iter() {
            let request = Request::new(Method::GET, self.resolve_url(&entry.url)?);
            let url = request.url.to_string();
            let response = self
                .inner
                .fetcher
                .fetch(&request)
                .await
                .map_err(|source| fetch_error(&request, source))?;

            if !response.is_cacheable() {
                return Err(RuntimeError::PrecacheStatus {
                    url,
                    status: response.status.as_u16(),
                });
            }
            let revision = Fingerprint::parse(&entry.revision).map_err(|source| {
                RuntimeError::Integrity {
                    url: url.clone(),
                    source,
                }
            })?;
            if let Err(source) = revision.verify(&response.body) {
                return Err(RuntimeError::Integrity { url, source });
            }

            fetched.insert(url, Arc::new(response));
        }

        let installed = fetched.len();
        let removed = {
            let mut precache = self.inner.precache.write();
            let mut removed: Vec<String> = precache
                .keys()
                .filter(|url| !fetched.contains_key(*url))
                .cloned()
                .collect();
            removed.sort();
            *precache = fetched;
            removed
        };

        info!("Precached {} assets, dropped {}", installed, removed.len());
        Ok(InstallReport { installed, removed })
    }

    fn resolve_url(&self, url: &str) -> Result<Url, RuntimeError> {
        match Url::parse(url) {
            Ok(parsed) => Ok(parsed),
            Err(url::ParseError::RelativeUrlWithoutBase) => match &self.inner.origin {
                Some(origin) => origin
                    .join(url)
                    .map_err(|e| RuntimeError::invalid_url(url, e)),
                None => Err(RuntimeError::invalid_url(
                    url,
                    "relative URL without a configured origin",
                )),
            },
            Err(e) => Err(RuntimeError::invalid_url(url, e)),
        }
    }
}

fn hit(route: &Route, entry: CacheEntry, status: CacheStatus) -> Handled {
    Handled {
        response: entry.response,
        status,
        cache_name: Some(route.cache_name.clone()),
    }
}

fn miss(route: &Route, response: Arc<Response>) -> Handled {
    Handled {
        response,
        status: CacheStatus::Miss,
        cache_name: Some(route.cache_name.clone()),
    }
}

fn fetch_error(request: &Request, source: FetchError) -> RuntimeError {
    RuntimeError::Fetch {
        url: request.url.to_string(),
        source,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::precache::PrecacheEntry;
    use pretty_assertions::assert_eq;
    use reqwest::StatusCode;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Duration;

    #[derive(Default)]
    struct MockFetcher {
        responses: Mutex<HashMap<String, (StatusCode, Vec<u8>)>>,
        offline: AtomicBool,
        crash: AtomicBool,
        delay: Mutex<Option<Duration>>,
        calls: AtomicUsize,
    }

    impl MockFetcher {
        fn serve(&self, url: &str, body: &str) {
            self.serve_status(url, StatusCode::OK, body);
        }

        fn serve_status(&self, url: &str, status: StatusCode, body: &str) {
            self.responses
                .lock()
                .insert(url.to_string(), (status, body.as_bytes().to_vec()));
        }

        fn set_offline(&self, offline: bool) {
            self.offline.store(offline, Ordering::SeqCst);
        }

        fn set_crash(&self, crash: bool) {
            self.crash.store(crash, Ordering::SeqCst);
        }

        fn set_delay(&self, delay: Option<Duration>) {
            *self.delay.lock() = delay;
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl Fetch for MockFetcher {
        async fn fetch(&self, request: &Request) -> Result<Response, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let delay = *self.delay.lock();
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            if self.crash.load(Ordering::SeqCst) {
                panic!("fetcher crashed on {}", request.url);
            }
            if self.offline.load(Ordering::SeqCst) {
                return Err(FetchError::Unavailable("offline".to_string()));
            }
            let found = self.responses.lock().get(request.cache_key()).cloned();
            Ok(match found {
                Some((status, body)) => Response::new(status, body),
                None => Response::new(StatusCode::NOT_FOUND, Vec::new()),
            })
        }
    }

    struct Fixture {
        fetcher: Arc<MockFetcher>,
        clock: Arc<ManualClock>,
        cache: RuntimeCache<Arc<MockFetcher>>,
    }

    fn fixture(routes: &[RouteConfig]) -> Fixture {
        let fetcher = Arc::new(MockFetcher::default());
        let clock = Arc::new(ManualClock::new(Duration::from_secs(1_000)));
        let cache = RuntimeCache::builder(Arc::clone(&fetcher))
            .routes(routes)
            .clock(clock.clone())
            .origin(Url::parse("https://game.example/").unwrap())
            .build()
            .unwrap();
        Fixture {
            fetcher,
            clock,
            cache,
        }
    }

    fn images(max_entries: usize) -> RouteConfig {
        RouteConfig::new(r"\.png$", Strategy::CacheFirst, max_entries, 60).cache_name("images")
    }

    fn api() -> RouteConfig {
        RouteConfig::new(r"^https://api\.", Strategy::NetworkFirst, 50, 300).cache_name("api")
    }

    fn lobby() -> RouteConfig {
        RouteConfig::new(r"/lobby$", Strategy::StaleWhileRevalidate, 10, 3_600)
            .cache_name("lobby")
    }

    fn get(url: &str) -> Request {
        Request::get(url).unwrap()
    }

    fn body(handled: &Handled) -> &str {
        std::str::from_utf8(&handled.response.body).unwrap()
    }

    #[tokio::test]
    async fn test_cache_first_keeps_two_most_recent() {
        let f = fixture(&[images(2)]);
        for name in ["a", "b", "c"] {
            f.fetcher
                .serve(&format!("https://cdn.test/{name}.png"), name);
        }

        for name in ["a", "b", "c"] {
            let handled = f
                .cache
                .handle(&get(&format!("https://cdn.test/{name}.png")))
                .await
                .unwrap();
            assert_eq!(handled.status, CacheStatus::Miss);
            f.clock.advance(Duration::from_secs(1));
        }

        assert_eq!(
            f.cache.store("images").unwrap().urls(),
            vec![
                "https://cdn.test/b.png".to_string(),
                "https://cdn.test/c.png".to_string()
            ]
        );
        let again = f.cache.handle(&get("https://cdn.test/a.png")).await.unwrap();
        assert_eq!(again.status, CacheStatus::Miss);
        assert_eq!(f.fetcher.calls(), 4);
    }

    #[tokio::test]
    async fn test_cache_first_hit_skips_network() {
        let f = fixture(&[images(10)]);
        f.fetcher.serve("https://cdn.test/hero.png", "hero");

        f.cache.handle(&get("https://cdn.test/hero.png")).await.unwrap();
        let handled = f.cache.handle(&get("https://cdn.test/hero.png")).await.unwrap();

        assert_eq!(handled.status, CacheStatus::FreshHit);
        assert_eq!(handled.cache_name.as_deref(), Some("images"));
        assert_eq!(body(&handled), "hero");
        assert_eq!(f.fetcher.calls(), 1);
    }

    #[tokio::test]
    async fn test_cache_first_refetches_expired_entry() {
        let f = fixture(&[images(10)]);
        f.fetcher.serve("https://cdn.test/hero.png", "hero");

        f.cache.handle(&get("https://cdn.test/hero.png")).await.unwrap();
        f.clock.advance(Duration::from_secs(61));
        let handled = f.cache.handle(&get("https://cdn.test/hero.png")).await.unwrap();

        assert_eq!(handled.status, CacheStatus::Miss);
        assert_eq!(f.fetcher.calls(), 2);
    }

    #[tokio::test]
    async fn test_network_first_falls_back_to_stale_entry() {
        let f = fixture(&[api()]);
        f.fetcher.serve("https://api.game.example/rooms", "[1,2]");

        let first = f.cache.handle(&get("https://api.game.example/rooms")).await.unwrap();
        assert_eq!(first.status, CacheStatus::Miss);

        f.fetcher.set_offline(true);
        let second = f.cache.handle(&get("https://api.game.example/rooms")).await.unwrap();
        assert_eq!(second.status, CacheStatus::StaleHit);
        assert_eq!(body(&second), "[1,2]");
    }

    #[tokio::test]
    async fn test_network_first_without_entry_is_an_error() {
        let f = fixture(&[api()]);
        f.fetcher.set_offline(true);

        let result = f.cache.handle(&get("https://api.game.example/rooms")).await;
        assert!(matches!(result, Err(RuntimeError::Fetch { .. })));
    }

    #[tokio::test]
    async fn test_network_first_never_serves_expired_entry() {
        let f = fixture(&[api()]);
        f.fetcher.serve("https://api.game.example/rooms", "[1,2]");
        f.cache.handle(&get("https://api.game.example/rooms")).await.unwrap();

        f.clock.advance(Duration::from_secs(301));
        f.fetcher.set_offline(true);
        let result = f.cache.handle(&get("https://api.game.example/rooms")).await;
        assert!(matches!(result, Err(RuntimeError::Fetch { .. })));
    }

    #[tokio::test]
    async fn test_network_first_timeout_falls_back() {
        let f = fixture(&[api().network_timeout(0.05)]);
        f.fetcher.serve("https://api.game.example/rooms", "[1,2]");
        f.cache.handle(&get("https://api.game.example/rooms")).await.unwrap();

        f.fetcher.serve("https://api.game.example/rooms", "[3]");
        f.fetcher.set_delay(Some(Duration::from_secs(5)));
        let started = std::time::Instant::now();
        let handled = f.cache.handle(&get("https://api.game.example/rooms")).await.unwrap();

        assert_eq!(handled.status, CacheStatus::StaleHit);
        assert_eq!(body(&handled), "[1,2]");
        assert!(started.elapsed() < Duration::from_secs(4));
    }

    #[tokio::test]
    async fn test_aborted_network_first_request_stores_nothing() {
        let f = fixture(&[api()]);
        f.fetcher.serve("https://api.game.example/rooms", "[1,2]");
        f.fetcher.set_delay(Some(Duration::from_millis(200)));

        let request = get("https://api.game.example/rooms");
        let aborted =
            tokio::time::timeout(Duration::from_millis(20), f.cache.handle(&request)).await;
        assert!(aborted.is_err());

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert!(f.cache.store("api").unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_stale_while_revalidate_serves_immediately_then_refreshes() {
        let f = fixture(&[lobby()]);
        f.fetcher.serve("https://game.example/lobby", "v1");

        let first = f.cache.handle(&get("https://game.example/lobby")).await.unwrap();
        assert_eq!(first.status, CacheStatus::Miss);

        f.fetcher.serve("https://game.example/lobby", "v2");
        f.fetcher.set_delay(Some(Duration::from_millis(300)));
        let second = tokio::time::timeout(
            Duration::from_millis(150),
            f.cache.handle(&get("https://game.example/lobby")),
        )
        .await
        .expect("served without waiting for the network")
        .unwrap();
        assert_eq!(second.status, CacheStatus::StaleHit);
        assert_eq!(body(&second), "v1");

        f.cache.settle().await;
        f.fetcher.set_delay(None);
        let third = f.cache.handle(&get("https://game.example/lobby")).await.unwrap();
        assert_eq!(third.status, CacheStatus::StaleHit);
        assert_eq!(body(&third), "v2");
    }

    #[tokio::test]
    async fn test_concurrent_refreshes_are_coalesced() {
        let f = fixture(&[lobby()]);
        f.fetcher.serve("https://game.example/lobby", "v1");
        f.cache.handle(&get("https://game.example/lobby")).await.unwrap();

        f.fetcher.set_delay(Some(Duration::from_millis(100)));
        for _ in 0..3 {
            f.cache.handle(&get("https://game.example/lobby")).await.unwrap();
        }
        f.cache.settle().await;

        assert_eq!(f.fetcher.calls(), 2);
    }

    #[tokio::test]
    async fn test_failed_refresh_is_recorded() {
        let f = fixture(&[lobby()]);
        f.fetcher.serve("https://game.example/lobby", "v1");
        f.cache.handle(&get("https://game.example/lobby")).await.unwrap();

        f.fetcher.set_offline(true);
        let handled = f.cache.handle(&get("https://game.example/lobby")).await.unwrap();
        f.cache.settle().await;

        assert_eq!(body(&handled), "v1");
        assert!(matches!(
            f.cache.warnings().as_slice(),
            [RuntimeWarning::RevalidationFailed { url, .. }] if url == "https://game.example/lobby"
        ));
        assert_eq!(f.cache.store("lobby").unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_crashed_refresh_does_not_block_later_refreshes() {
        let f = fixture(&[lobby()]);
        f.fetcher.serve("https://game.example/lobby", "v1");
        f.cache.handle(&get("https://game.example/lobby")).await.unwrap();

        f.fetcher.set_crash(true);
        f.cache.handle(&get("https://game.example/lobby")).await.unwrap();
        f.cache.settle().await;

        f.fetcher.set_crash(false);
        f.fetcher.serve("https://game.example/lobby", "v2");
        let stale = f.cache.handle(&get("https://game.example/lobby")).await.unwrap();
        assert_eq!(body(&stale), "v1");
        f.cache.settle().await;

        let refreshed = f.cache.handle(&get("https://game.example/lobby")).await.unwrap();
        assert_eq!(body(&refreshed), "v2");
        f.cache.settle().await;
        assert_eq!(f.fetcher.calls(), 4);
    }

    #[tokio::test]
    async fn test_error_responses_are_returned_but_not_stored() {
        let f = fixture(&[images(10)]);
        f.fetcher
            .serve_status("https://cdn.test/missing.png", StatusCode::NOT_FOUND, "");

        let handled = f.cache.handle(&get("https://cdn.test/missing.png")).await.unwrap();
        assert_eq!(handled.response.status, StatusCode::NOT_FOUND);
        assert!(f.cache.store("images").unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unrouted_requests_pass_through() {
        let f = fixture(&[images(10)]);
        f.fetcher.serve("https://cdn.test/main.js", "js");
        f.fetcher.serve("https://cdn.test/hero.png", "png");

        let unmatched = f.cache.handle(&get("https://cdn.test/main.js")).await.unwrap();
        assert_eq!(unmatched.status, CacheStatus::Passthrough);

        let mut post = get("https://cdn.test/hero.png");
        post.method = Method::POST;
        let posted = f.cache.handle(&post).await.unwrap();
        assert_eq!(posted.status, CacheStatus::Passthrough);
        assert!(f.cache.store("images").unwrap().is_empty());
    }

    fn precache_list(entries: &[(&str, &str)]) -> PrecacheManifest {
        PrecacheManifest {
            entries: entries
                .iter()
                .map(|(url, body)| PrecacheEntry {
                    url: url.to_string(),
                    revision: Fingerprint::of(body.as_bytes()).to_string(),
                })
                .collect(),
        }
    }

    #[tokio::test]
    async fn test_install_serves_precached_assets_first() {
        let f = fixture(&[images(10)]);
        f.fetcher.serve("https://game.example/main.js", "main");
        f.fetcher.serve("https://game.example/logo.png", "logo");

        let report = f
            .cache
            .install(&precache_list(&[("/main.js", "main"), ("/logo.png", "logo")]))
            .await
            .unwrap();
        assert_eq!(report.installed, 2);
        assert_eq!(
            f.cache.precached_urls(),
            vec![
                "https://game.example/logo.png".to_string(),
                "https://game.example/main.js".to_string()
            ]
        );

        let calls = f.fetcher.calls();
        let handled = f.cache.handle(&get("https://game.example/logo.png")).await.unwrap();
        assert_eq!(handled.status, CacheStatus::FreshHit);
        assert_eq!(handled.cache_name.as_deref(), Some(PRECACHE_NAME));
        assert_eq!(f.fetcher.calls(), calls);
        assert!(f.cache.store("images").unwrap().is_empty());

        let report = f
            .cache
            .install(&precache_list(&[("/main.js", "main")]))
            .await
            .unwrap();
        assert_eq!(report.removed, vec!["https://game.example/logo.png".to_string()]);
    }

    #[tokio::test]
    async fn test_install_rejects_tampered_asset() {
        let f = fixture(&[]);
        f.fetcher.serve("https://game.example/main.js", "main");
        f.cache
            .install(&precache_list(&[("/main.js", "main")]))
            .await
            .unwrap();

        f.fetcher.serve("https://game.example/main.js", "tampered");
        let result = f
            .cache
            .install(&precache_list(&[("/main.js", "main")]))
            .await;

        assert!(matches!(result, Err(RuntimeError::Integrity { .. })));
        let handled = f.cache.handle(&get("https://game.example/main.js")).await.unwrap();
        assert_eq!(body(&handled), "main");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_inserts_respect_the_bound() {
        let f = fixture(&[images(4)]);
        for i in 0..32 {
            f.fetcher
                .serve(&format!("https://cdn.test/{i}.png"), "tile");
        }

        let tasks: Vec<_> = (0..32)
            .map(|i| {
                let cache = f.cache.clone();
                tokio::spawn(async move {
                    let request = get(&format!("https://cdn.test/{i}.png"));
                    cache.handle(&request).await.map(|h| h.status)
                })
            })
            .collect();
        for task in tasks {
            assert_eq!(task.await.unwrap().unwrap(), CacheStatus::Miss);
        }

        assert_eq!(f.cache.store("images").unwrap().len(), 4);
        assert!(f.cache.warnings().is_empty());
    }

    #[test]
    fn test_status_and_warning_serialization() {
        assert_eq!(
            serde_json::to_value(CacheStatus::StaleHit).unwrap(),
            serde_json::json!("stale_hit")
        );
        let warning = RuntimeWarning::EvictionIncomplete {
            cache: "images".to_string(),
            overflow: 1,
        };
        assert_eq!(
            serde_json::to_value(&warning).unwrap(),
            serde_json::json!({ "kind": "eviction_incomplete", "cache": "images", "overflow": 1 })
        );
    }
}
