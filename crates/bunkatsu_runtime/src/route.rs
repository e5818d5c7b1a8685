//! Compiled runtime cache routes.

use std::collections::HashSet;
use std::time::Duration;

use bunkatsu_core::{RouteConfig, Strategy};
use regex::Regex;
use reqwest::Method;

use crate::error::RuntimeError;
use crate::fetch::Request;

/// A route ready for matching.
#[derive(Debug, Clone)]
pub struct Route {
    pub index: usize,
    pub cache_name: String,
    pub strategy: Strategy,
    pub max_entries: usize,
    pub max_age: Duration,
    pub network_timeout: Option<Duration>,
    pattern: Regex,
}

impl Route {
    /// Compiles the route at `index` in declaration order.
    pub fn compile(index: usize, config: &RouteConfig) -> Result<Self, RuntimeError> {
        let cache_name = config
            .cache_name
            .clone()
            .unwrap_or_else(|| format!("runtime-{index}"));

        let pattern = Regex::new(&config.url_pattern).map_err(|source| {
            RuntimeError::InvalidPattern {
                route: cache_name.clone(),
                source,
            }
        })?;

        if config.max_entries == 0 {
            return Err(RuntimeError::InvalidRoute {
                route: cache_name,
                reason: "max_entries must be at least 1".to_string(),
            });
        }
        if config.max_age_seconds == 0 {
            return Err(RuntimeError::InvalidRoute {
                route: cache_name,
                reason: "max_age_seconds must be at least 1".to_string(),
            });
        }

        let network_timeout = match config.network_timeout_seconds {
            None => None,
            Some(seconds) => match Duration::try_from_secs_f64(seconds) {
                Ok(timeout) if !timeout.is_zero() => Some(timeout),
                _ => {
                    return Err(RuntimeError::InvalidRoute {
                        route: cache_name,
                        reason: format!("network_timeout_seconds {seconds} is not a positive duration"),
                    });
                }
            },
        };

        Ok(Self {
            index,
            cache_name,
            strategy: config.handler,
            max_entries: config.max_entries,
            max_age: Duration::from_secs(config.max_age_seconds),
            network_timeout,
            pattern,
        })
    }

    pub fn matches(&self, url: &str) -> bool {
        self.pattern.is_match(url)
    }

    pub fn pattern(&self) -> &str {
        self.pattern.as_str()
    }
}

/// Routes in match order. The first matching route wins.
#[derive(Debug, Clone, Default)]
pub struct Router {
    routes: Vec<Route>,
}

impl Router {
    pub fn new(configs: &[RouteConfig]) -> Result<Self, RuntimeError> {
        let mut names = HashSet::new();
        let mut routes = Vec::with_capacity(configs.len());

        for (index, config) in configs.iter().enumerate() {
            let route = Route::compile(index, config)?;
            if !names.insert(route.cache_name.clone()) {
                return Err(RuntimeError::DuplicateCacheName(route.cache_name));
            }
            routes.push(route);
        }

        Ok(Self { routes })
    }

    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    /// Finds the route for a request. Only GET requests are routed.
    pub fn route_for(&self, request: &Request) -> Option<&Route> {
        if request.method != Method::GET {
            return None;
        }
        let url = request.url.as_str();
        self.routes.iter().find(|route| route.matches(url))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn router() -> Router {
        Router::new(&[
            RouteConfig::new(r"^https://api\.", Strategy::NetworkFirst, 50, 300)
                .cache_name("api-cache")
                .network_timeout(3.0),
            RouteConfig::new(
                r"\.(?:png|jpg|jpeg|svg|gif|webp)$",
                Strategy::CacheFirst,
                100,
                2_592_000,
            ),
        ])
        .unwrap()
    }

    #[rstest]
    #[case("https://api.example.com/rooms", Some("api-cache"))]
    #[case("https://cdn.example.com/sprites/hero.png", Some("runtime-1"))]
    #[case("https://api.example.com/avatar.png", Some("api-cache"))]
    #[case("https://cdn.example.com/main.js", None)]
    fn test_route_for(#[case] url: &str, #[case] expected: Option<&str>) {
        let router = router();
        let request = Request::get(url).unwrap();
        assert_eq!(
            router.route_for(&request).map(|r| r.cache_name.as_str()),
            expected
        );
    }

    #[test]
    fn test_non_get_is_not_routed() {
        let router = router();
        let mut request = Request::get("https://api.example.com/rooms").unwrap();
        request.method = Method::POST;
        assert!(router.route_for(&request).is_none());
    }

    #[test]
    fn test_compiled_parameters() {
        let router = router();
        let api = &router.routes()[0];
        assert_eq!(api.strategy, Strategy::NetworkFirst);
        assert_eq!(api.max_age, Duration::from_secs(300));
        assert_eq!(api.network_timeout, Some(Duration::from_secs(3)));
        assert_eq!(router.routes()[1].network_timeout, None);
    }

    #[test]
    fn test_duplicate_cache_name() {
        let result = Router::new(&[
            RouteConfig::new("a", Strategy::CacheFirst, 1, 1).cache_name("shared"),
            RouteConfig::new("b", Strategy::CacheFirst, 1, 1).cache_name("shared"),
        ]);
        assert!(matches!(result, Err(RuntimeError::DuplicateCacheName(name)) if name == "shared"));
    }

    #[rstest]
    #[case(RouteConfig::new("(", Strategy::CacheFirst, 1, 1))]
    #[case(RouteConfig::new("a", Strategy::CacheFirst, 0, 1))]
    #[case(RouteConfig::new("a", Strategy::CacheFirst, 1, 0))]
    #[case(RouteConfig::new("a", Strategy::NetworkFirst, 1, 1).network_timeout(-1.0))]
    #[case(RouteConfig::new("a", Strategy::NetworkFirst, 1, 1).network_timeout(0.0))]
    fn test_invalid_routes(#[case] config: RouteConfig) {
        assert!(Router::new(&[config]).is_err());
    }
}
