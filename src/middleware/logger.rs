//! Access log: one `tracing` event per request.

use std::sync::Arc;

use http::StatusCode;
use tokio::time::Instant;
use tracing::info;

use crate::handler::{Handler, Middleware, handler_fn, middleware_fn};
use crate::middleware::{Skipper, never_skip};

#[derive(Clone)]
pub struct LoggerConfig {
    pub skip: Skipper,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self { skip: never_skip() }
    }
}

pub fn logger() -> Middleware {
    logger_with_config(LoggerConfig::default())
}

/// Logs request id, method, path, final status and latency after the inner
/// chain returns. A request nothing wrote to is logged as 200, one that
/// failed before writing as 500, matching what the router will send.
pub fn logger_with_config(config: LoggerConfig) -> Middleware {
    let skip = config.skip;
    middleware_fn(move |next: Handler| {
        let skip = Arc::clone(&skip);
        handler_fn(move |c| {
            let next = Arc::clone(&next);
            let skip = Arc::clone(&skip);
            Box::pin(async move {
                if skip(c) {
                    return next(c).await;
                }

                let start = Instant::now();
                let result = next(&mut *c).await;

                let status = match (c.status(), &result) {
                    (Some(status), _) => status,
                    (None, Err(_)) => StatusCode::INTERNAL_SERVER_ERROR,
                    (None, Ok(())) => StatusCode::OK,
                };
                info!(
                    request_id = c.request_id().unwrap_or("unknown"),
                    method = %c.method(),
                    path = c.path(),
                    status = status.as_u16(),
                    elapsed = ?start.elapsed(),
                    "request",
                );
                result
            })
        })
    })
}
