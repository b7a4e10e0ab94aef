//! Built-in middleware.
//!
//! Each middleware comes as a pair of constructors: `name()` with defaults and
//! `name_with_config(..)` taking a config struct whose pluggable parts are
//! `Arc`'d closures. Register them globally, on a group, or on a single route:
//!
//! ```rust
//! use std::time::Duration;
//! use switchyard::Router;
//! use switchyard::middleware::{self, RateLimitConfig};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let mut router = Router::new();
//! router.use_middleware(middleware::recover());
//! router.use_middleware(middleware::request_id());
//! router.use_middleware(middleware::logger());
//!
//! let api = router.group("/api", [middleware::rate_limit_with_config(RateLimitConfig {
//!     limit: 10,
//!     window: Duration::from_secs(1),
//!     ..RateLimitConfig::default()
//! })]);
//! # let _ = api;
//! # }
//! ```
//!
//! Install `recover` first so it is outermost and sees panics from everything
//! else.

mod cors;
mod logger;
mod rate_limit;
mod recover;
mod request_id;
mod timeout;

use std::sync::Arc;

use crate::context::Context;
use crate::error::ConfigError;
use crate::handler::Middleware;

pub use cors::{CorsConfig, cors, cors_with_config};
pub use logger::{LoggerConfig, logger, logger_with_config};
pub use rate_limit::{
    Decision, KeyExtractor, RateLimitConfig, RateLimiter, rate_limit, rate_limit_with_config,
};
pub use recover::{PanicHandler, RecoverConfig, recover, recover_with_config};
pub use request_id::{RequestIdConfig, request_id, request_id_with_config};
pub use timeout::{TimeoutConfig, TimeoutHandler, timeout, timeout_with_config};

/// Predicate deciding whether a middleware steps aside for a request.
pub type Skipper = Arc<dyn Fn(&Context) -> bool + Send + Sync + 'static>;

/// A [`Skipper`] that never skips.
pub fn never_skip() -> Skipper {
    Arc::new(|_| false)
}

/// Names accepted by [`from_names`].
pub const NAMES: &[&str] = &["logger", "recover", "request_id", "cors", "timeout", "rate_limit"];

/// Builds the default-configured middleware for each name in [`NAMES`], in
/// order.
pub fn from_names<S: AsRef<str>>(names: &[S]) -> Result<Vec<Middleware>, ConfigError> {
    names
        .iter()
        .map(|name| match name.as_ref() {
            "logger" => Ok(logger()),
            "recover" => Ok(recover()),
            "request_id" => Ok(request_id()),
            "cors" => Ok(cors()),
            "timeout" => Ok(timeout()),
            "rate_limit" => Ok(rate_limit()),
            other => Err(ConfigError::UnknownMiddleware(other.to_owned())),
        })
        .collect()
}
