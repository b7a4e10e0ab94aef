//! Cross-origin resource sharing.
//!
//! Every response gets `Vary: Origin` and the configured `Access-Control-*`
//! headers. The request origin is echoed back in `Access-Control-Allow-Origin`
//! when it matches one of the allowed origins, which may contain `*` (any run
//! of characters) and `?` (one character) wildcards.
//!
//! `OPTIONS` requests are answered here as preflights and never reach the
//! endpoint.

use std::sync::Arc;
use std::time::Duration;

use http::StatusCode;
use regex::Regex;
use tracing::warn;

use crate::handler::{Handler, Middleware, handler_fn, middleware_fn};
use crate::method::Method;

#[derive(Clone, Debug)]
pub struct CorsConfig {
    /// Origins allowed to make requests. `"*"` allows any origin.
    pub allow_origins: Vec<String>,
    pub allow_methods: Vec<Method>,
    pub allow_headers: Vec<String>,
    pub allow_credentials: bool,
    pub expose_headers: Vec<String>,
    /// How long a preflight result may be cached. Zero omits the header.
    pub max_age: Duration,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allow_origins: vec!["*".to_owned()],
            allow_methods: vec![
                Method::Get,
                Method::Head,
                Method::Put,
                Method::Patch,
                Method::Post,
                Method::Delete,
            ],
            allow_headers: vec!["content-type".to_owned(), "authorization".to_owned()],
            allow_credentials: false,
            expose_headers: Vec::new(),
            max_age: Duration::from_secs(600),
        }
    }
}

pub fn cors() -> Middleware {
    cors_with_config(CorsConfig::default())
}

/// Empty lists in `config` fall back to the defaults.
pub fn cors_with_config(config: CorsConfig) -> Middleware {
    let policy = Arc::new(Policy::new(config));

    middleware_fn(move |next: Handler| {
        let policy = Arc::clone(&policy);
        handler_fn(move |c| {
            let next = Arc::clone(&next);
            let policy = Arc::clone(&policy);
            Box::pin(async move {
                c.set_header("vary", "origin");

                if let Some(origin) = c.header("origin").map(str::to_owned) {
                    if policy.allows_origin(&origin) {
                        c.set_header("access-control-allow-origin", &origin);
                    }
                }
                c.set_header("access-control-allow-methods", &policy.methods);
                c.set_header("access-control-allow-headers", &policy.headers);
                if let Some(expose) = &policy.expose {
                    c.set_header("access-control-expose-headers", expose);
                }
                if let Some(max_age) = &policy.max_age {
                    c.set_header("access-control-max-age", max_age);
                }
                if policy.credentials {
                    c.set_header("access-control-allow-credentials", "true");
                }

                if c.method() != Method::Options {
                    return next(c).await;
                }

                if let Some(requested) = c.header("access-control-request-method") {
                    if !requested.is_empty() && !policy.allows_method(requested) {
                        return c.text(StatusCode::FORBIDDEN, "CORS: method not allowed");
                    }
                }
                if let Some(requested) = c.header("access-control-request-headers") {
                    let denied = requested
                        .split(',')
                        .map(str::trim)
                        .any(|h| !h.is_empty() && !policy.allows_header(h));
                    if denied {
                        return c.text(StatusCode::FORBIDDEN, "CORS: header not allowed");
                    }
                }
                c.no_content()
            })
        })
    })
}

/// `CorsConfig` with the header values joined and wildcards compiled once.
struct Policy {
    any_origin: bool,
    exact: Vec<String>,
    patterns: Vec<Regex>,
    allow_methods: Vec<Method>,
    allow_headers: Vec<String>,
    methods: String,
    headers: String,
    expose: Option<String>,
    max_age: Option<String>,
    credentials: bool,
}

impl Policy {
    fn new(mut config: CorsConfig) -> Self {
        let defaults = CorsConfig::default();
        if config.allow_origins.is_empty() {
            config.allow_origins = defaults.allow_origins;
        }
        if config.allow_methods.is_empty() {
            config.allow_methods = defaults.allow_methods;
        }
        if config.allow_headers.is_empty() {
            config.allow_headers = defaults.allow_headers;
        }

        let any_origin = config.allow_origins.iter().any(|o| o == "*");
        let mut exact = Vec::new();
        let mut patterns = Vec::new();
        for origin in config.allow_origins.iter().filter(|o| *o != "*") {
            if !origin.contains(['*', '?']) {
                exact.push(origin.clone());
                continue;
            }
            let pattern = regex::escape(origin).replace(r"\*", ".*").replace(r"\?", ".");
            match Regex::new(&format!("^{pattern}$")) {
                Ok(re) => patterns.push(re),
                Err(err) => warn!(origin = %origin, %err, "skipping invalid CORS origin pattern"),
            }
        }

        let methods = config
            .allow_methods
            .iter()
            .map(|m| m.as_str())
            .collect::<Vec<_>>()
            .join(", ");
        let headers = config.allow_headers.join(", ");
        let expose = (!config.expose_headers.is_empty()).then(|| config.expose_headers.join(", "));
        let max_age = (!config.max_age.is_zero()).then(|| config.max_age.as_secs().to_string());

        Self {
            any_origin,
            exact,
            patterns,
            allow_methods: config.allow_methods,
            allow_headers: config.allow_headers,
            methods,
            headers,
            expose,
            max_age,
            credentials: config.allow_credentials,
        }
    }

    fn allows_origin(&self, origin: &str) -> bool {
        self.any_origin
            || self.exact.iter().any(|o| o == origin)
            || self.patterns.iter().any(|re| re.is_match(origin))
    }

    fn allows_method(&self, method: &str) -> bool {
        self.allow_methods.iter().any(|m| m.as_str().eq_ignore_ascii_case(method))
    }

    fn allows_header(&self, header: &str) -> bool {
        self.allow_headers.iter().any(|h| h.eq_ignore_ascii_case(header))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::Request;
    use crate::router::Router;

    fn router(config: CorsConfig) -> Router {
        let mut router = Router::new();
        router.use_middleware(cors_with_config(config));
        router
            .get("/test", |c| Box::pin(async move { c.text(StatusCode::OK, "ok") }))
            .unwrap();
        router
    }

    fn preflight(origin: &str) -> Request {
        Request::new(Method::Options, "/test").with_header("origin", origin)
    }

    #[tokio::test]
    async fn wildcard_echoes_the_origin() {
        let router = router(CorsConfig::default());
        let req = Request::new(Method::Get, "/test").with_header("origin", "https://a.example");
        let res = router.handle(req).await;

        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(res.header("access-control-allow-origin"), Some("https://a.example"));
        assert_eq!(res.header("vary"), Some("origin"));
        assert_eq!(
            res.header("access-control-allow-methods"),
            Some("GET, HEAD, PUT, PATCH, POST, DELETE"),
        );
        assert_eq!(res.header("access-control-max-age"), Some("600"));
        assert_eq!(res.header("access-control-allow-credentials"), None);
    }

    #[tokio::test]
    async fn wildcard_patterns_match_subdomains_only() {
        let router = router(CorsConfig {
            allow_origins: vec!["https://*.example.com".to_owned()],
            ..CorsConfig::default()
        });

        let ok = Request::new(Method::Get, "/test").with_header("origin", "https://api.example.com");
        let res = router.handle(ok).await;
        assert_eq!(res.header("access-control-allow-origin"), Some("https://api.example.com"));

        let other = Request::new(Method::Get, "/test").with_header("origin", "https://example.org");
        let res = router.handle(other).await;
        assert_eq!(res.header("access-control-allow-origin"), None);
        assert_eq!(res.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn preflight_is_answered_with_204() {
        let router = router(CorsConfig::default());
        let req = preflight("https://a.example")
            .with_header("access-control-request-method", "post")
            .with_header("access-control-request-headers", "Content-Type, Authorization");
        let res = router.handle(req).await;
        assert_eq!(res.status(), StatusCode::NO_CONTENT);
        assert!(res.body().is_empty());
    }

    #[tokio::test]
    async fn preflight_rejects_unlisted_method_and_header() {
        let router = router(CorsConfig::default());

        let res = router
            .handle(preflight("https://a.example").with_header("access-control-request-method", "TRACE"))
            .await;
        assert_eq!(res.status(), StatusCode::FORBIDDEN);
        assert_eq!(res.text(), "CORS: method not allowed");

        let res = router
            .handle(preflight("https://a.example").with_header("access-control-request-headers", "x-secret"))
            .await;
        assert_eq!(res.status(), StatusCode::FORBIDDEN);
        assert_eq!(res.text(), "CORS: header not allowed");
    }

    #[tokio::test]
    async fn credentials_and_expose_headers() {
        let router = router(CorsConfig {
            allow_credentials: true,
            expose_headers: vec!["x-total".to_owned(), "x-page".to_owned()],
            max_age: Duration::ZERO,
            ..CorsConfig::default()
        });
        let res = router.handle(Request::new(Method::Get, "/test")).await;
        assert_eq!(res.header("access-control-allow-credentials"), Some("true"));
        assert_eq!(res.header("access-control-expose-headers"), Some("x-total, x-page"));
        assert_eq!(res.header("access-control-max-age"), None);
    }
}
