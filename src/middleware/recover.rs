//! Turns panics in the inner chain into a 500 response.
//!
//! The router itself does not catch panics. Install this middleware first so
//! it wraps everything else.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use http::StatusCode;
use tracing::error;

use crate::context::Context;
use crate::error::HandlerResult;
use crate::handler::{Handler, Middleware, handler_fn, middleware_fn};
use crate::middleware::{Skipper, never_skip};

/// Writes the response for a recovered panic. Receives the panic message.
pub type PanicHandler = Arc<dyn Fn(&mut Context, &str) -> HandlerResult + Send + Sync + 'static>;

#[derive(Clone)]
pub struct RecoverConfig {
    pub skip: Skipper,
    /// Only called when nothing was written before the panic.
    pub on_panic: PanicHandler,
}

impl Default for RecoverConfig {
    fn default() -> Self {
        Self {
            skip: never_skip(),
            on_panic: Arc::new(|c, _msg| c.text(StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error")),
        }
    }
}

pub fn recover() -> Middleware {
    recover_with_config(RecoverConfig::default())
}

pub fn recover_with_config(config: RecoverConfig) -> Middleware {
    middleware_fn(move |next: Handler| {
        let config = config.clone();
        handler_fn(move |c| {
            let next = Arc::clone(&next);
            let config = config.clone();
            Box::pin(async move {
                if (config.skip)(c) {
                    return next(c).await;
                }

                match AssertUnwindSafe(next(&mut *c)).catch_unwind().await {
                    Ok(result) => result,
                    Err(payload) => {
                        let msg = panic_message(payload.as_ref());
                        error!(
                            request_id = c.request_id().unwrap_or("unknown"),
                            panic = msg,
                            "panic recovered",
                        );
                        if c.is_written() {
                            return Ok(());
                        }
                        (config.on_panic)(c, msg)
                    }
                }
            })
        })
    })
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        return s;
    }
    payload.downcast_ref::<String>().map_or("unknown panic", String::as_str)
}
