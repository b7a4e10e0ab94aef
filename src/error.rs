//! Error types.
//!
//! Application-level outcomes (404, 422, 429 ...) are responses written through
//! the [`Context`](crate::Context), not errors. The types here cover the places
//! where something genuinely went wrong: a bad route registration, a bad
//! configuration file, an unreadable request body, or the listener itself.

use thiserror::Error;

use crate::method::Method;

/// Opaque error returned by handlers and middleware.
///
/// Anything implementing `std::error::Error + Send + Sync` converts into it with
/// `?`, so handlers can propagate serde, I/O or their own errors unchanged.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// What every handler returns. `Ok(())` means "I wrote (or chose not to write)
/// my response"; `Err` means an unexpected internal failure and becomes a 500.
pub type HandlerResult = Result<(), BoxError>;

/// Rejected route registration. Returned at setup time, never seen by clients.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RouteError {
    #[error("invalid path `{path}`: {reason}")]
    InvalidPath { path: String, reason: &'static str },

    #[error("route {method} {path} already exists")]
    DuplicateRoute { method: Method, path: String },
}

/// Failure to decode a request body into a typed value.
#[derive(Debug, Error)]
pub enum BindError {
    #[error("request body is empty")]
    EmptyBody,

    #[error("invalid JSON body: {0}")]
    Json(#[from] serde_json::Error),
}

/// Failure to load or interpret a [`Config`](crate::Config).
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read configuration file: {0}")]
    Read(#[from] std::io::Error),

    #[error("failed to parse TOML configuration: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),

    #[error("unknown middleware `{0}`")]
    UnknownMiddleware(String),
}

/// Infrastructure failures surfaced by [`Server`](crate::Server).
#[derive(Debug, Error)]
pub enum Error {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid listen address `{0}`")]
    Address(String),

    #[error(transparent)]
    Config(#[from] ConfigError),
}
