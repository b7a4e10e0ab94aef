//! Request id propagation.
//!
//! Reuses the id the client (or an upstream proxy) sent in the target header,
//! or generates one. The id is stored on the [`Context`] for later middleware
//! and handlers, and echoed back in the response header.

use std::sync::Arc;

use uuid::Uuid;

use crate::context::Context;
use crate::handler::{Handler, Middleware, handler_fn, middleware_fn};
use crate::middleware::{Skipper, never_skip};

pub const X_REQUEST_ID: &str = "x-request-id";

#[derive(Clone)]
pub struct RequestIdConfig {
    pub generator: Arc<dyn Fn() -> String + Send + Sync + 'static>,
    /// Header read from the request and written on the response.
    pub header: String,
    pub skip: Skipper,
    /// Called with every id once it is assigned.
    pub on_assign: Option<Arc<dyn Fn(&Context, &str) + Send + Sync + 'static>>,
}

impl Default for RequestIdConfig {
    fn default() -> Self {
        Self {
            generator: Arc::new(|| Uuid::new_v4().simple().to_string()),
            header: X_REQUEST_ID.to_owned(),
            skip: never_skip(),
            on_assign: None,
        }
    }
}

pub fn request_id() -> Middleware {
    request_id_with_config(RequestIdConfig::default())
}

pub fn request_id_with_config(mut config: RequestIdConfig) -> Middleware {
    if config.header.is_empty() {
        config.header = X_REQUEST_ID.to_owned();
    }
    let config = Arc::new(config);

    middleware_fn(move |next: Handler| {
        let config = Arc::clone(&config);
        handler_fn(move |c| {
            let next = Arc::clone(&next);
            let config = Arc::clone(&config);
            Box::pin(async move {
                if (config.skip)(c) {
                    return next(c).await;
                }

                let id = match c.header(&config.header) {
                    Some(id) if !id.is_empty() => id.to_owned(),
                    _ => (config.generator)(),
                };
                c.set_header(&config.header, &id);
                if let Some(on_assign) = &config.on_assign {
                    on_assign(c, &id);
                }
                c.set_request_id(id);
                next(c).await
            })
        })
    })
}
