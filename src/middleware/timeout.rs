//! Per-request time limit.
//!
//! The inner chain is raced against a deadline. When the deadline passes
//! first the inner future is dropped, which cancels the handler at its next
//! `.await`, and the timeout response is written unless the handler already
//! committed one. The deadline is also recorded on the [`Context`] so
//! handlers can size their own downstream calls.
//!
//! [`Context`]: crate::Context

use std::sync::Arc;
use std::time::Duration;

use http::StatusCode;
use tokio::time::Instant;
use tracing::warn;

use crate::context::Context;
use crate::error::HandlerResult;
use crate::handler::{Handler, Middleware, handler_fn, middleware_fn};
use crate::middleware::{Skipper, never_skip};

pub type TimeoutHandler = Arc<dyn Fn(&mut Context) -> HandlerResult + Send + Sync + 'static>;

#[derive(Clone)]
pub struct TimeoutConfig {
    /// Zero disables the limit.
    pub timeout: Duration,
    pub skip: Skipper,
    pub on_timeout: TimeoutHandler,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            skip: never_skip(),
            on_timeout: Arc::new(|c| c.text(StatusCode::REQUEST_TIMEOUT, "Request Timeout")),
        }
    }
}

pub fn timeout() -> Middleware {
    timeout_with_config(TimeoutConfig::default())
}

pub fn timeout_with_config(config: TimeoutConfig) -> Middleware {
    middleware_fn(move |next: Handler| {
        let config = config.clone();
        handler_fn(move |c| {
            let next = Arc::clone(&next);
            let config = config.clone();
            Box::pin(async move {
                if config.timeout.is_zero() || (config.skip)(c) {
                    return next(c).await;
                }

                let limit = Instant::now() + config.timeout;
                c.set_deadline(limit);
                let deadline = c.deadline().unwrap_or(limit);

                match tokio::time::timeout_at(deadline, next(&mut *c)).await {
                    Ok(result) => result,
                    Err(_) => {
                        warn!(
                            request_id = c.request_id().unwrap_or("unknown"),
                            method = %c.method(),
                            path = c.path(),
                            timeout = ?config.timeout,
                            "request timed out",
                        );
                        if c.is_written() {
                            return Ok(());
                        }
                        (config.on_timeout)(c)
                    }
                }
            })
        })
    })
}
