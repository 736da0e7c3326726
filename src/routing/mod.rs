pub(crate) mod builder;
pub use builder::RouteIndexBuilder;

use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::matcher::Matcher;
use crate::request::RequestContext;

/// Share of traffic, out of 100, a route or default version receives.
pub const TOTAL_WEIGHT: u8 = 100;

/// A single predicate of a match route.
#[derive(Debug, Clone)]
pub enum RouteRule {
    /// Any value of the named header matches.
    Header { key: String, matcher: Matcher },
    /// Any value of the named query parameter matches.
    Parameter { key: String, matcher: Matcher },
    Path { matcher: Matcher },
}

impl RouteRule {
    pub fn matches(&self, request: &RequestContext) -> bool {
        match self {
            RouteRule::Header { key, matcher } => {
                request.headers.get_all(key).iter().any(|v| matcher.matches(v))
            }
            RouteRule::Parameter { key, matcher } => {
                request.params.get_all(key).iter().any(|v| matcher.matches(v))
            }
            RouteRule::Path { matcher } => matcher.matches(&request.path),
        }
    }
}

/// Sends `weight` percent of matching traffic to `version`.
#[derive(Debug, Clone)]
pub struct MatchRoute {
    pub version: String,
    pub weight: u8,
    pub rules: Vec<RouteRule>,
}

impl MatchRoute {
    pub fn new(version: impl Into<String>, weight: u8, rules: Vec<RouteRule>) -> Self {
        Self {
            version: version.into(),
            weight,
            rules,
        }
    }

    pub fn matches(&self, request: &RequestContext) -> bool {
        self.rules.iter().all(|rule| rule.matches(request))
    }
}

/// Version weights chosen for one request. Weights sum to 100.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteSelection {
    weights: BTreeMap<String, u8>,
}

impl RouteSelection {
    fn new(default_version: &str, route: Option<&MatchRoute>) -> Self {
        let mut weights = BTreeMap::new();
        let mut remaining = TOTAL_WEIGHT;
        if let Some(route) = route {
            let weight = route.weight.min(TOTAL_WEIGHT);
            if weight > 0 {
                weights.insert(route.version.clone(), weight);
            }
            remaining -= weight;
        }
        if remaining > 0 {
            *weights.entry(default_version.to_string()).or_insert(0) += remaining;
        }
        Self { weights }
    }

    pub fn weight(&self, version: &str) -> u8 {
        self.weights.get(version).copied().unwrap_or(0)
    }

    pub fn weights(&self) -> impl Iterator<Item = (&str, u8)> {
        self.weights.iter().map(|(version, weight)| (version.as_str(), *weight))
    }

    /// Picks a version for a roll in `0..100`, walking versions in name order.
    pub fn pick(&self, roll: u8) -> Option<&str> {
        let mut upper = 0u8;
        for (version, weight) in self.weights() {
            upper += weight;
            if roll < upper {
                return Some(version);
            }
        }
        None
    }
}

#[derive(Debug, Clone, Default)]
pub(crate) struct ServiceRoutes {
    pub(crate) default_version: String,
    pub(crate) routes: Vec<MatchRoute>,
    /// Lowercased header name to the routes that test it.
    pub(crate) by_header: HashMap<String, Vec<usize>>,
    pub(crate) by_param: HashMap<String, Vec<usize>>,
    /// Routes without any keyed rule.
    pub(crate) by_path: Vec<usize>,
}

impl ServiceRoutes {
    pub(crate) fn new(default_version: impl Into<String>, routes: Vec<MatchRoute>) -> Self {
        let mut service = ServiceRoutes {
            default_version: default_version.into(),
            ..Default::default()
        };
        for (index, route) in routes.iter().enumerate() {
            let mut keyed = false;
            for rule in &route.rules {
                let (slot, key) = match rule {
                    RouteRule::Header { key, .. } => {
                        (&mut service.by_header, key.to_ascii_lowercase())
                    }
                    RouteRule::Parameter { key, .. } => (&mut service.by_param, key.clone()),
                    RouteRule::Path { .. } => continue,
                };
                keyed = true;
                let entry = slot.entry(key).or_default();
                if entry.last() != Some(&index) {
                    entry.push(index);
                }
            }
            if !keyed {
                service.by_path.push(index);
            }
        }
        service.routes = routes;
        service
    }

    /// Candidates reached through header names come first, then those
    /// reached through parameter names, then path-only routes. Within each
    /// group routes are tried in declared order.
    fn first_match(&self, request: &RequestContext) -> Option<&MatchRoute> {
        let by_header: BTreeSet<usize> = request
            .headers
            .names()
            .filter_map(|name| self.by_header.get(name))
            .flatten()
            .copied()
            .collect();
        let by_param: BTreeSet<usize> = request
            .params
            .names()
            .filter_map(|name| self.by_param.get(name))
            .flatten()
            .copied()
            .collect();

        by_header
            .into_iter()
            .chain(by_param)
            .chain(self.by_path.iter().copied())
            .map(|i| &self.routes[i])
            .find(|route| route.matches(request))
    }
}

/// Per target service index of weighted match routes.
///
/// Like a `PolicySet`, an index is immutable once built and is replaced as
/// a whole.
#[derive(Debug, Clone, Default)]
pub struct RouteIndex {
    services: HashMap<String, ServiceRoutes>,
}

impl RouteIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_service(
        mut self,
        service: impl Into<String>,
        default_version: impl Into<String>,
        routes: Vec<MatchRoute>,
    ) -> Self {
        self.services
            .insert(service.into(), ServiceRoutes::new(default_version, routes));
        self
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }

    pub fn contains(&self, service: &str) -> bool {
        self.services.contains_key(service)
    }

    pub fn default_version(&self, service: &str) -> Option<&str> {
        self.services
            .get(service)
            .map(|routes| routes.default_version.as_str())
    }

    /// Chooses version weights for a request to `service`.
    ///
    /// Routes keyed by the request's header names are tried first, then
    /// those keyed by its query parameter names, then the path-only routes,
    /// each group in declared order. The first route whose
    /// rules all match gets its weight and the default version gets the
    /// remainder. `None` when the service is unknown.
    pub fn select(&self, service: &str, request: &RequestContext) -> Option<RouteSelection> {
        let routes = self.services.get(service)?;
        let route = routes.first_match(request);
        if let Some(route) = route {
            tracing::debug!(
                service,
                version = %route.version,
                weight = route.weight,
                "route matched"
            );
        }
        Some(RouteSelection::new(&routes.default_version, route))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(key: &str, value: &str) -> RouteRule {
        RouteRule::Header {
            key: key.into(),
            matcher: Matcher::exact(value),
        }
    }

    fn param(key: &str, value: &str) -> RouteRule {
        RouteRule::Parameter {
            key: key.into(),
            matcher: Matcher::exact(value),
        }
    }

    fn path(prefix: &str) -> RouteRule {
        RouteRule::Path {
            matcher: Matcher::prefix(prefix),
        }
    }

    fn index() -> RouteIndex {
        RouteIndex::new().with_service(
            "orders",
            "v1",
            vec![
                MatchRoute::new("v2", 100, vec![header("X-Canary", "true")]),
                MatchRoute::new("v3", 30, vec![header("x-region", "eu"), param("beta", "1")]),
                MatchRoute::new("v4", 50, vec![param("tenant", "acme")]),
                MatchRoute::new("v5", 20, vec![path("/orders/bulk")]),
            ],
        )
    }

    #[test]
    fn unknown_service() {
        let request = RequestContext::builder().build();
        assert_eq!(None, index().select("payments", &request));
    }

    #[test]
    fn no_match_routes_everything_to_default() {
        let request = RequestContext::builder().path("/orders/1").build();
        let selection = index().select("orders", &request).expect("known service");

        assert_eq!(100, selection.weight("v1"));
        assert_eq!(vec![("v1", 100u8)], selection.weights().collect::<Vec<_>>());
    }

    #[test]
    fn header_route_with_full_weight() {
        let request = RequestContext::builder().header("x-canary", "true").build();
        let selection = index().select("orders", &request).expect("known service");

        assert_eq!(100, selection.weight("v2"));
        assert_eq!(0, selection.weight("v1"));
    }

    #[test]
    fn all_rules_of_a_route_must_match() {
        let index = index();

        let partial = RequestContext::builder().header("x-region", "eu").build();
        let selection = index.select("orders", &partial).expect("known service");
        assert_eq!(100, selection.weight("v1"));

        let full = RequestContext::builder()
            .header("x-region", "eu")
            .param("beta", "1")
            .build();
        let selection = index.select("orders", &full).expect("known service");
        assert_eq!(30, selection.weight("v3"));
        assert_eq!(70, selection.weight("v1"));
    }

    #[test]
    fn headers_are_scanned_before_params_and_paths() {
        let request = RequestContext::builder()
            .header("x-canary", "true")
            .param("tenant", "acme")
            .path("/orders/bulk")
            .build();
        let selection = index().select("orders", &request).expect("known service");
        assert_eq!(100, selection.weight("v2"));

        let request = RequestContext::builder()
            .param("tenant", "acme")
            .path("/orders/bulk")
            .build();
        let selection = index().select("orders", &request).expect("known service");
        assert_eq!(50, selection.weight("v4"));
    }

    #[test]
    fn header_routes_are_tried_in_declared_order() {
        let index = RouteIndex::new().with_service(
            "orders",
            "v1",
            vec![
                MatchRoute::new("v2", 100, vec![header("x-zone", "a")]),
                MatchRoute::new("v3", 100, vec![header("x-app", "b")]),
            ],
        );
        let request = RequestContext::builder()
            .header("x-app", "b")
            .header("x-zone", "a")
            .build();
        let selection = index.select("orders", &request).expect("known service");

        assert_eq!(100, selection.weight("v2"));
        assert_eq!(0, selection.weight("v3"));
    }

    #[test]
    fn path_routes_are_last() {
        let request = RequestContext::builder().path("/orders/bulk/7").build();
        let selection = index().select("orders", &request).expect("known service");

        assert_eq!(20, selection.weight("v5"));
        assert_eq!(80, selection.weight("v1"));
    }

    #[test]
    fn zero_weight_route_leaves_default_at_full() {
        let index = RouteIndex::new().with_service(
            "orders",
            "v1",
            vec![MatchRoute::new("v2", 0, vec![header("x-canary", "true")])],
        );
        let request = RequestContext::builder().header("x-canary", "true").build();
        let selection = index.select("orders", &request).expect("known service");

        assert_eq!(vec![("v1", 100u8)], selection.weights().collect::<Vec<_>>());
    }

    #[test]
    fn route_to_default_version_merges_weights() {
        let index = RouteIndex::new().with_service(
            "orders",
            "v1",
            vec![MatchRoute::new("v1", 40, vec![header("x-canary", "true")])],
        );
        let request = RequestContext::builder().header("x-canary", "true").build();
        let selection = index.select("orders", &request).expect("known service");

        assert_eq!(vec![("v1", 100u8)], selection.weights().collect::<Vec<_>>());
    }

    #[test]
    fn pick_walks_cumulative_weights() {
        let request = RequestContext::builder().path("/orders/bulk").build();
        let selection = index().select("orders", &request).expect("known service");

        // v1: 0..80, v5: 80..100
        assert_eq!(Some("v1"), selection.pick(0));
        assert_eq!(Some("v1"), selection.pick(79));
        assert_eq!(Some("v5"), selection.pick(80));
        assert_eq!(Some("v5"), selection.pick(99));
        assert_eq!(None, selection.pick(100));
    }

    #[test]
    fn index_layout() {
        let index = index();
        let orders = &index.services["orders"];

        assert_eq!(vec![0usize], orders.by_header["x-canary"]);
        assert_eq!(vec![1usize], orders.by_header["x-region"]);
        assert_eq!(vec![1usize], orders.by_param["beta"]);
        assert_eq!(vec![2usize], orders.by_param["tenant"]);
        assert_eq!(vec![3usize], orders.by_path);
        assert_eq!(Some("v1"), index.default_version("orders"));
        assert_eq!(1, index.len());
    }
}
