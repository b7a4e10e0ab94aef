//! Request router: registration, groups, fallbacks and dispatch.
//!
//! Build the router once at startup with `&mut` access, then share it
//! immutably (the server wraps it in an `Arc`). Registration therefore always
//! completes before the first request is served.
//!
//! # Middleware scopes
//!
//! Every route belongs to a scope: the root scope holds the global middleware
//! registered with [`Router::use_middleware`]; each [`Group`] gets its own
//! scope, initialised with a copy of its parent's list at creation time plus
//! the group's own middleware. A request runs
//!
//! ```text
//! scope middleware (global or group snapshot + group) → route middleware → endpoint
//! ```
//!
//! Middleware added to the root after a group was created does not reach that
//! group's routes.
//!
//! The not-found fallback runs inside the global middleware. The
//! method-not-allowed fallback runs inside the scope of the most specific
//! route serving the path under another method.

use tracing::{debug, warn};

use crate::context::Context;
use crate::error::{HandlerResult, RouteError};
use crate::handler::{BoxFuture, Handler, Middleware, compose, handler_fn};
use crate::method::Method;
use crate::request::Request;
use crate::response::Response;
use crate::route::{Pattern, ROOT_SCOPE, Route, RouteTable, ScopeId};

/// The application router.
pub struct Router {
    table: RouteTable,
    scopes: Vec<Vec<Middleware>>,
    not_found: Handler,
    method_not_allowed: Handler,
}

impl Router {
    pub fn new() -> Self {
        Self {
            table: RouteTable::default(),
            scopes: vec![Vec::new()],
            not_found: handler_fn(default_not_found),
            method_not_allowed: handler_fn(default_method_not_allowed),
        }
    }

    /// Appends a global middleware. Earlier registrations run first.
    pub fn use_middleware(&mut self, middleware: Middleware) {
        self.scopes[ROOT_SCOPE].push(middleware);
    }

    /// Appends several global middlewares, in order.
    pub fn use_all(&mut self, middlewares: impl IntoIterator<Item = Middleware>) {
        self.scopes[ROOT_SCOPE].extend(middlewares);
    }

    /// Opens a group whose routes are registered under `prefix` and wrapped in
    /// a snapshot of the current global middleware followed by `middlewares`.
    pub fn group(
        &mut self,
        prefix: &str,
        middlewares: impl IntoIterator<Item = Middleware>,
    ) -> Group<'_> {
        let scope = self.open_scope(ROOT_SCOPE, middlewares);
        Group { router: self, prefix: prefix.to_owned(), scope }
    }

    /// Replaces the handler used when no route matches the path.
    pub fn set_not_found_handler(&mut self, handler: Handler) {
        self.not_found = handler;
    }

    /// Replaces the handler used when the path exists under other methods only.
    pub fn set_method_not_allowed_handler(&mut self, handler: Handler) {
        self.method_not_allowed = handler;
    }

    /// Registers `handler` for `method` + `pattern` with route-specific
    /// middleware, which runs innermost.
    ///
    /// Patterns are `/`-separated; `:name` segments bind path parameters:
    ///
    /// ```rust
    /// # use switchyard::{handler_fn, Method, Router};
    /// # let mut router = Router::new();
    /// # let show = handler_fn(|c| Box::pin(async move { c.no_content() }));
    /// router.route(Method::Get, "/users/:id", show, []).unwrap();
    /// ```
    pub fn route(
        &mut self,
        method: Method,
        pattern: &str,
        handler: Handler,
        middlewares: impl IntoIterator<Item = Middleware>,
    ) -> Result<(), RouteError> {
        self.register(ROOT_SCOPE, "", method, pattern, handler, middlewares.into_iter().collect())
    }

    pub fn get<H>(&mut self, pattern: &str, handler: H) -> Result<(), RouteError>
    where
        H: for<'a> Fn(&'a mut Context) -> BoxFuture<'a, HandlerResult> + Send + Sync + 'static,
    {
        self.route(Method::Get, pattern, handler_fn(handler), [])
    }

    pub fn post<H>(&mut self, pattern: &str, handler: H) -> Result<(), RouteError>
    where
        H: for<'a> Fn(&'a mut Context) -> BoxFuture<'a, HandlerResult> + Send + Sync + 'static,
    {
        self.route(Method::Post, pattern, handler_fn(handler), [])
    }

    pub fn put<H>(&mut self, pattern: &str, handler: H) -> Result<(), RouteError>
    where
        H: for<'a> Fn(&'a mut Context) -> BoxFuture<'a, HandlerResult> + Send + Sync + 'static,
    {
        self.route(Method::Put, pattern, handler_fn(handler), [])
    }

    pub fn delete<H>(&mut self, pattern: &str, handler: H) -> Result<(), RouteError>
    where
        H: for<'a> Fn(&'a mut Context) -> BoxFuture<'a, HandlerResult> + Send + Sync + 'static,
    {
        self.route(Method::Delete, pattern, handler_fn(handler), [])
    }

    /// True when `path` is registered under any method.
    pub fn has_path(&self, path: &str) -> bool {
        self.table.has_path(path)
    }

    /// Answers one request.
    ///
    /// Handler errors become `500` with the error message as body, unless a
    /// response was already written, in which case the error is only logged.
    pub async fn handle(&self, request: Request) -> Response {
        let method = request.method();
        let path = request.path().to_owned();
        let mut ctx = Context::new(request);

        let chain = match self.table.find(method, &path) {
            Some(hit) => {
                debug!(%method, %path, route = hit.route.pattern.as_str(), "route matched");
                ctx.set_params(hit.params);
                let layers: Vec<Middleware> = self.scopes[hit.route.scope]
                    .iter()
                    .chain(&hit.route.middlewares)
                    .cloned()
                    .collect();
                compose(hit.route.endpoint.clone(), &layers)
            }
            // A path served under other methods answers 405 inside that
            // route's scope, so group middleware such as CORS still runs.
            None => match self.table.path_scope(&path) {
                Some(scope) => {
                    debug!(%method, %path, "method not allowed");
                    compose(self.method_not_allowed.clone(), &self.scopes[scope])
                }
                None => {
                    debug!(%method, %path, "no route");
                    compose(self.not_found.clone(), &self.scopes[ROOT_SCOPE])
                }
            },
        };

        if let Err(err) = chain(&mut ctx).await {
            if ctx.is_written() {
                warn!(%method, %path, error = %err, "handler failed after writing its response");
            } else {
                warn!(%method, %path, error = %err, "handler failed");
                ctx.fail(&err);
            }
        }

        ctx.into_response()
    }

    fn open_scope(
        &mut self,
        parent: ScopeId,
        middlewares: impl IntoIterator<Item = Middleware>,
    ) -> ScopeId {
        let mut chain = self.scopes[parent].clone();
        chain.extend(middlewares);
        self.scopes.push(chain);
        self.scopes.len() - 1
    }

    fn register(
        &mut self,
        scope: ScopeId,
        prefix: &str,
        method: Method,
        pattern: &str,
        endpoint: Handler,
        middlewares: Vec<Middleware>,
    ) -> Result<(), RouteError> {
        Pattern::parse(pattern)?;
        let pattern = Pattern::parse(&format!("{prefix}{pattern}"))?;
        debug!(%method, route = pattern.as_str(), "registering route");
        self.table.insert(method, Route { pattern, endpoint, middlewares, scope })?;
        debug!(routes = self.table.len(), "route table updated");
        Ok(())
    }
}

impl Default for Router {
    fn default() -> Self { Self::new() }
}

/// A prefixed view of a [`Router`] with its own middleware scope.
///
/// Routes registered through a group land in the parent router's table and
/// share its not-found / method-not-allowed handlers.
pub struct Group<'r> {
    router: &'r mut Router,
    prefix: String,
    scope: ScopeId,
}

impl Group<'_> {
    /// Appends middleware to this group. Applies to every route of the group.
    pub fn use_middleware(&mut self, middleware: Middleware) {
        self.router.scopes[self.scope].push(middleware);
    }

    /// Opens a nested group: prefixes concatenate, and the new scope starts as
    /// a snapshot of this group's middleware.
    pub fn group(
        &mut self,
        prefix: &str,
        middlewares: impl IntoIterator<Item = Middleware>,
    ) -> Group<'_> {
        let scope = self.router.open_scope(self.scope, middlewares);
        Group { prefix: format!("{}{prefix}", self.prefix), router: &mut *self.router, scope }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn route(
        &mut self,
        method: Method,
        pattern: &str,
        handler: Handler,
        middlewares: impl IntoIterator<Item = Middleware>,
    ) -> Result<(), RouteError> {
        self.router.register(
            self.scope,
            &self.prefix,
            method,
            pattern,
            handler,
            middlewares.into_iter().collect(),
        )
    }

    pub fn get<H>(&mut self, pattern: &str, handler: H) -> Result<(), RouteError>
    where
        H: for<'a> Fn(&'a mut Context) -> BoxFuture<'a, HandlerResult> + Send + Sync + 'static,
    {
        self.route(Method::Get, pattern, handler_fn(handler), [])
    }

    pub fn post<H>(&mut self, pattern: &str, handler: H) -> Result<(), RouteError>
    where
        H: for<'a> Fn(&'a mut Context) -> BoxFuture<'a, HandlerResult> + Send + Sync + 'static,
    {
        self.route(Method::Post, pattern, handler_fn(handler), [])
    }

    pub fn put<H>(&mut self, pattern: &str, handler: H) -> Result<(), RouteError>
    where
        H: for<'a> Fn(&'a mut Context) -> BoxFuture<'a, HandlerResult> + Send + Sync + 'static,
    {
        self.route(Method::Put, pattern, handler_fn(handler), [])
    }

    pub fn delete<H>(&mut self, pattern: &str, handler: H) -> Result<(), RouteError>
    where
        H: for<'a> Fn(&'a mut Context) -> BoxFuture<'a, HandlerResult> + Send + Sync + 'static,
    {
        self.route(Method::Delete, pattern, handler_fn(handler), [])
    }
}

fn default_not_found(c: &mut Context) -> BoxFuture<'_, HandlerResult> {
    Box::pin(async move { c.text(http::StatusCode::NOT_FOUND, "Not Found") })
}

fn default_method_not_allowed(c: &mut Context) -> BoxFuture<'_, HandlerResult> {
    Box::pin(async move { c.text(http::StatusCode::METHOD_NOT_ALLOWED, "Method Not Allowed") })
}
