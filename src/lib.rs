//! # switchyard
//!
//! A small HTTP request-dispatch library: a route table with `:name`
//! parameters, middleware scoped globally, per group or per route, and one
//! mutable [`Context`] per request.
//!
//! ## What it does
//!
//! - **Routing**: exact paths are a hash lookup, parameterised paths a scan
//!   of the method's patterns. Overlapping patterns resolve deterministically:
//!   the longest literal prefix wins, then registration order.
//! - **Middleware**: `global → group → route`, first registered outermost.
//!   Groups snapshot their parent's chain when created.
//! - **Single write**: the first status/body write to a [`Context`] wins.
//!   Later writes are ignored and logged.
//! - **Built-ins** in [`middleware`]: access log, panic recovery, request ids,
//!   CORS, timeouts and a fixed-window rate limiter.
//! - **Transport**: hyper (HTTP/1.1 and HTTP/2) with SIGTERM / Ctrl-C
//!   graceful shutdown.
//!
//! What it does not do: radix-tree routing, wildcard or regex path segments,
//! TLS, persistence.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use switchyard::{BoxFuture, Context, HandlerResult, Router, Server, middleware};
//! use switchyard::http::StatusCode;
//!
//! fn show_user(c: &mut Context) -> BoxFuture<'_, HandlerResult> {
//!     Box::pin(async move {
//!         let id = c.param("id").to_owned();
//!         c.json(StatusCode::OK, &serde_json::json!({ "id": id }))
//!     })
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut router = Router::new();
//!     router.use_middleware(middleware::recover());
//!     router.use_middleware(middleware::logger());
//!
//!     router.get("/users/:id", show_user)?;
//!
//!     let mut api = router.group("/api", [middleware::cors()]);
//!     api.post("/echo", |c| Box::pin(async move {
//!         let body = String::from_utf8_lossy(c.request().body()).into_owned();
//!         c.text(StatusCode::OK, body)
//!     }))?;
//!
//!     Server::bind("0.0.0.0:3000")?.serve(router).await?;
//!     Ok(())
//! }
//! ```

mod config;
mod context;
mod error;
mod handler;
mod method;
mod request;
mod response;
mod route;
mod router;
mod server;

pub mod middleware;
pub mod validate;

pub use http;

pub use config::{Config, ServerConfig};
pub use context::Context;
pub use error::{BindError, BoxError, ConfigError, Error, HandlerResult, RouteError};
pub use handler::{BoxFuture, Handler, Middleware, compose, handler_fn, middleware_fn};
pub use method::{Method, UnknownMethod};
pub use request::Request;
pub use response::Response;
pub use route::Params;
pub use router::{Group, Router};
pub use server::Server;
