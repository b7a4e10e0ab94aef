//! Handler and middleware types, and the composition pipeline.
//!
//! # How async handlers are stored
//!
//! The router holds handlers of *different* concrete types in one table, so
//! every handler is type-erased behind a trait object:
//!
//! ```text
//! fn show(c: &mut Context) -> BoxFuture<'_, HandlerResult>  ← user writes this
//!        ↓ router.get("/users/:id", show)
//! handler_fn(show)                                         ← Arc::new + unsize
//!        ↓  stored as Handler = Arc<dyn Fn(&mut Context) -> BoxFuture>
//! handler(&mut ctx).await  at request time                 ← one vtable call
//! ```
//!
//! The future borrows the context mutably for exactly as long as it runs, so
//! the handler can read the request and write the response without any lock.
//!
//! # Middleware
//!
//! A [`Middleware`] takes the next [`Handler`] and returns a new one that
//! wraps it. [`compose`] folds a list of them around a terminal endpoint so
//! that the first element ends up outermost:
//!
//! ```text
//! compose(endpoint, [a, b, c])  ==  a(b(c(endpoint)))
//!
//! request  → a → b → c → endpoint
//! response ← a ← b ← c ←
//! ```

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::context::Context;
use crate::error::HandlerResult;

/// A heap-allocated, type-erased future borrowing from `'a`.
///
/// `Send` lets tokio move the request future across worker threads.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// A type-erased request handler shared across concurrent requests.
///
/// `Arc` gives cheap, thread-safe shared ownership: composing a chain per
/// request clones pointers, never handler state.
pub type Handler =
    Arc<dyn for<'a> Fn(&'a mut Context) -> BoxFuture<'a, HandlerResult> + Send + Sync + 'static>;

/// A transform from the next handler to a wrapping handler.
pub type Middleware = Arc<dyn Fn(Handler) -> Handler + Send + Sync + 'static>;

/// Erases a handler function or closure into a [`Handler`].
///
/// Closures must box their future; the borrow of the context flows into it:
///
/// ```rust
/// use http::StatusCode;
/// use switchyard::handler_fn;
///
/// let ping = handler_fn(|c| Box::pin(async move { c.text(StatusCode::OK, "pong") }));
/// # let _ = ping;
/// ```
pub fn handler_fn<F>(f: F) -> Handler
where
    F: for<'a> Fn(&'a mut Context) -> BoxFuture<'a, HandlerResult> + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Erases a `Handler -> Handler` function into a [`Middleware`].
///
/// ```rust
/// use std::sync::Arc;
/// use switchyard::{handler_fn, middleware_fn, Handler};
///
/// let server_header = middleware_fn(|next: Handler| {
///     handler_fn(move |c| {
///         let next = Arc::clone(&next);
///         Box::pin(async move {
///             c.set_header("server", "switchyard");
///             next(c).await
///         })
///     })
/// });
/// # let _ = server_header;
/// ```
pub fn middleware_fn<F>(f: F) -> Middleware
where
    F: Fn(Handler) -> Handler + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Wraps `terminal` in `layers`, right to left, so `layers[0]` is outermost.
pub fn compose(terminal: Handler, layers: &[Middleware]) -> Handler {
    layers.iter().rev().fold(terminal, |next, layer| layer(next))
}
