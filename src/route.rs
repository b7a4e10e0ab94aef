//! Route table and matcher.
//!
//! Routes are kept per method in registration order, plus a hash index of
//! their full patterns. Lookup first tries the index with the raw request path
//! (the common case for literal routes), then scans the method's patterns for
//! a structural match:
//!
//! - both sides are split on `/` and must have the same number of segments;
//! - a literal segment matches byte for byte;
//! - a `:name` segment matches any non-empty segment and binds it to `name`.
//!
//! When several parameterized patterns match, the most literal one wins:
//! segments are compared left to right and the first position where one
//! pattern has a literal and the other a parameter decides. Patterns equally
//! specific at every position resolve to the one registered first.

use std::cmp::Ordering;
use std::collections::HashMap;

use crate::error::RouteError;
use crate::handler::{Handler, Middleware};
use crate::method::Method;

/// Path parameters bound by a match, keyed by parameter name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Params(HashMap<String, String>);

impl Params {
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    pub fn len(&self) -> usize { self.0.len() }
    pub fn is_empty(&self) -> bool { self.0.is_empty() }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub(crate) fn insert(&mut self, name: &str, value: &str) {
        self.0.insert(name.to_owned(), value.to_owned());
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Param(String),
}

/// A parsed route pattern such as `/users/:id/posts`.
#[derive(Debug, Clone)]
pub(crate) struct Pattern {
    raw: String,
    segments: Vec<Segment>,
}

impl Pattern {
    pub(crate) fn parse(raw: &str) -> Result<Self, RouteError> {
        let invalid = |reason| RouteError::InvalidPath { path: raw.to_owned(), reason };

        if raw.is_empty() {
            return Err(invalid("path is empty"));
        }
        if !raw.starts_with('/') {
            return Err(invalid("path must start with `/`"));
        }

        let mut segments = Vec::new();
        for part in raw.split('/') {
            let segment = match part.strip_prefix(':') {
                Some("") => return Err(invalid("parameter segment has no name")),
                Some(name) if segments.contains(&Segment::Param(name.to_owned())) => {
                    return Err(invalid("parameter name used twice"));
                }
                Some(name) => Segment::Param(name.to_owned()),
                None => Segment::Literal(part.to_owned()),
            };
            segments.push(segment);
        }

        Ok(Self { raw: raw.to_owned(), segments })
    }

    pub(crate) fn as_str(&self) -> &str {
        &self.raw
    }

    /// Structural match. Returns the bound parameters on success.
    fn captures(&self, path: &str) -> Option<Params> {
        let mut parts = path.split('/');
        let mut params = Params::default();

        for segment in &self.segments {
            let part = parts.next()?;
            match segment {
                Segment::Literal(lit) if lit == part => {}
                Segment::Literal(_) => return None,
                Segment::Param(_) if part.is_empty() => return None,
                Segment::Param(name) => params.insert(name, part),
            }
        }

        // Request path has more segments than the pattern.
        if parts.next().is_some() {
            return None;
        }
        Some(params)
    }

    fn matches(&self, path: &str) -> bool {
        self.raw == path || self.captures(path).is_some()
    }

    /// Orders two same-length patterns by literal prefix: `Greater` means
    /// `self` is more specific.
    fn specificity(&self, other: &Self) -> Ordering {
        self.segments
            .iter()
            .zip(&other.segments)
            .map(|(a, b)| match (a, b) {
                (Segment::Literal(_), Segment::Param(_)) => Ordering::Greater,
                (Segment::Param(_), Segment::Literal(_)) => Ordering::Less,
                _ => Ordering::Equal,
            })
            .find(|o| o.is_ne())
            .unwrap_or(Ordering::Equal)
    }
}

/// Index into the router's middleware scopes. Scope 0 is the global list.
pub(crate) type ScopeId = usize;

pub(crate) const ROOT_SCOPE: ScopeId = 0;

/// A registered endpoint with its route-specific middleware.
pub(crate) struct Route {
    pub(crate) pattern: Pattern,
    pub(crate) endpoint: Handler,
    pub(crate) middlewares: Vec<Middleware>,
    pub(crate) scope: ScopeId,
}

/// Result of a successful lookup.
pub(crate) struct Matched<'r> {
    pub(crate) route: &'r Route,
    pub(crate) params: Params,
}

#[derive(Default)]
struct MethodRoutes {
    by_pattern: HashMap<String, usize>,
    routes: Vec<Route>,
}

/// Per-method route storage.
#[derive(Default)]
pub(crate) struct RouteTable {
    methods: HashMap<Method, MethodRoutes>,
}

impl RouteTable {
    /// Adds `route` under `method`. A duplicate `(method, pattern)` is
    /// rejected before anything is touched.
    pub(crate) fn insert(&mut self, method: Method, route: Route) -> Result<(), RouteError> {
        let entry = self.methods.entry(method).or_default();
        let key = route.pattern.as_str();
        if entry.by_pattern.contains_key(key) {
            return Err(RouteError::DuplicateRoute { method, path: key.to_owned() });
        }
        entry.by_pattern.insert(key.to_owned(), entry.routes.len());
        entry.routes.push(route);
        Ok(())
    }

    pub(crate) fn find(&self, method: Method, path: &str) -> Option<Matched<'_>> {
        let entry = self.methods.get(&method)?;

        if let Some(&idx) = entry.by_pattern.get(path) {
            return Some(Matched { route: &entry.routes[idx], params: Params::default() });
        }

        let mut best: Option<Matched<'_>> = None;
        for route in &entry.routes {
            let Some(params) = route.pattern.captures(path) else { continue };
            let better = best
                .as_ref()
                .is_none_or(|b| route.pattern.specificity(&b.route.pattern).is_gt());
            if better {
                best = Some(Matched { route, params });
            }
        }
        best
    }

    /// True when `path` matches a pattern registered under any method.
    pub(crate) fn has_path(&self, path: &str) -> bool {
        self.path_scope(path).is_some()
    }

    /// Middleware scope of the most specific route matching `path` under any
    /// method. Equally specific candidates resolve to the lowest scope id.
    pub(crate) fn path_scope(&self, path: &str) -> Option<ScopeId> {
        let mut best: Option<&Route> = None;
        for route in self.methods.values().flat_map(|m| &m.routes) {
            if !route.pattern.matches(path) {
                continue;
            }
            let better = best.is_none_or(|b| match route.pattern.specificity(&b.pattern) {
                Ordering::Greater => true,
                Ordering::Equal => route.scope < b.scope,
                Ordering::Less => false,
            });
            if better {
                best = Some(route);
            }
        }
        best.map(|r| r.scope)
    }

    pub(crate) fn len(&self) -> usize {
        self.methods.values().map(|m| m.routes.len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::handler_fn;

    fn route(pattern: &str) -> Route {
        Route {
            pattern: Pattern::parse(pattern).unwrap(),
            endpoint: handler_fn(|_c| Box::pin(async { Ok(()) })),
            middlewares: Vec::new(),
            scope: ROOT_SCOPE,
        }
    }

    fn table(routes: &[(Method, &str)]) -> RouteTable {
        let mut t = RouteTable::default();
        for (m, p) in routes {
            t.insert(*m, route(p)).unwrap();
        }
        t
    }

    fn matched(t: &RouteTable, m: Method, path: &str) -> Option<(String, Params)> {
        t.find(m, path).map(|hit| (hit.route.pattern.as_str().to_owned(), hit.params))
    }

    #[test]
    fn rejects_empty_and_relative_paths() {
        assert!(matches!(Pattern::parse(""), Err(RouteError::InvalidPath { .. })));
        assert!(matches!(Pattern::parse("users"), Err(RouteError::InvalidPath { .. })));
        assert!(matches!(Pattern::parse("/a/:"), Err(RouteError::InvalidPath { .. })));
        assert!(matches!(Pattern::parse("/a/:id/:id"), Err(RouteError::InvalidPath { .. })));
        assert!(Pattern::parse("/").is_ok());
    }

    #[test]
    fn literal_routes_match_with_no_params() {
        let t = table(&[(Method::Get, "/"), (Method::Get, "/health"), (Method::Post, "/a/b/c")]);
        for (m, p) in [(Method::Get, "/"), (Method::Get, "/health"), (Method::Post, "/a/b/c")] {
            let (pattern, params) = matched(&t, m, p).unwrap();
            assert_eq!(pattern, p);
            assert!(params.is_empty());
        }
    }

    #[test]
    fn param_binds_any_non_empty_segment() {
        let t = table(&[(Method::Get, "/users/:id")]);
        for v in ["42", "abc", "with-dash", "%20"] {
            let (_, params) = matched(&t, Method::Get, &format!("/users/{v}")).unwrap();
            assert_eq!(params.get("id"), Some(v));
        }
        assert!(matched(&t, Method::Get, "/users/").is_none());
    }

    #[test]
    fn segment_count_must_match_exactly() {
        let t = table(&[(Method::Get, "/users/:id")]);
        assert!(matched(&t, Method::Get, "/users").is_none());
        assert!(matched(&t, Method::Get, "/users/42/posts").is_none());
        assert!(matched(&t, Method::Get, "/users/42/").is_none());
    }

    #[test]
    fn binds_several_params() {
        let t = table(&[(Method::Get, "/orgs/:org/repos/:repo")]);
        let (_, params) = matched(&t, Method::Get, "/orgs/rust/repos/cargo").unwrap();
        assert_eq!(params.get("org"), Some("rust"));
        assert_eq!(params.get("repo"), Some("cargo"));
        assert_eq!(params.len(), 2);
    }

    #[test]
    fn method_is_part_of_the_lookup() {
        let t = table(&[(Method::Get, "/users/:id")]);
        assert!(matched(&t, Method::Post, "/users/42").is_none());
        assert!(t.has_path("/users/42"));
        assert!(!t.has_path("/items/42"));
    }

    #[test]
    fn path_scope_follows_the_most_specific_route() {
        let mut t = RouteTable::default();
        let mut scoped = |method, pattern: &str, scope| {
            let mut r = route(pattern);
            r.scope = scope;
            t.insert(method, r).unwrap();
        };
        scoped(Method::Get, "/api/:id", 1);
        scoped(Method::Post, "/api/echo", 2);
        scoped(Method::Put, "/:any/echo", 3);

        assert_eq!(t.path_scope("/api/echo"), Some(2));
        assert_eq!(t.path_scope("/api/7"), Some(1));
        assert_eq!(t.path_scope("/docs/echo"), Some(3));
        assert_eq!(t.path_scope("/nowhere"), None);
    }

    #[test]
    fn duplicate_is_rejected_and_first_route_survives() {
        let mut t = table(&[(Method::Get, "/test")]);
        let err = t.insert(Method::Get, route("/test")).unwrap_err();
        assert_eq!(
            err,
            RouteError::DuplicateRoute { method: Method::Get, path: "/test".to_owned() }
        );
        assert_eq!(t.len(), 1);
        assert!(matched(&t, Method::Get, "/test").is_some());
        // Same pattern under another method is a different route.
        t.insert(Method::Post, route("/test")).unwrap();
        assert_eq!(t.len(), 2);
    }

    #[test]
    fn more_literal_pattern_wins_regardless_of_registration_order() {
        let forward = table(&[(Method::Get, "/users/:id/:tab"), (Method::Get, "/users/:id/posts")]);
        let reverse = table(&[(Method::Get, "/users/:id/posts"), (Method::Get, "/users/:id/:tab")]);
        for t in [&forward, &reverse] {
            let (pattern, _) = matched(t, Method::Get, "/users/7/posts").unwrap();
            assert_eq!(pattern, "/users/:id/posts");
            let (pattern, params) = matched(t, Method::Get, "/users/7/likes").unwrap();
            assert_eq!(pattern, "/users/:id/:tab");
            assert_eq!(params.get("tab"), Some("likes"));
        }
    }

    #[test]
    fn literal_prefix_decides_before_later_segments() {
        let t = table(&[(Method::Get, "/:a/b/:c"), (Method::Get, "/x/:b/c")]);
        let (pattern, _) = matched(&t, Method::Get, "/x/b/c").unwrap();
        assert_eq!(pattern, "/x/:b/c");
    }

    #[test]
    fn equally_specific_patterns_resolve_to_first_registered() {
        let t = table(&[(Method::Get, "/files/:name"), (Method::Get, "/files/:id")]);
        let (pattern, params) = matched(&t, Method::Get, "/files/readme").unwrap();
        assert_eq!(pattern, "/files/:name");
        assert_eq!(params.get("name"), Some("readme"));
    }
}
