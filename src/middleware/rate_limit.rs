//! Fixed-window rate limiting keyed by client.
//!
//! Each key owns a bucket `{count, window_reset_at}`. The first request of a
//! window opens a bucket with `count = 1`; later requests increment it until
//! `limit`, after which requests are denied until the window has passed and
//! the bucket is replaced.
//!
//! All bucket access goes through one `parking_lot::Mutex`: the
//! check-and-update is a single critical section and is never held across an
//! `.await`. A background task sweeps expired buckets once per window so the
//! map only holds recently active clients. The sweep stops on
//! [`RateLimiter::shutdown`] or when the last handle to the limiter is dropped.

use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;

use http::StatusCode;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::context::Context;
use crate::handler::{BoxFuture, Handler, Middleware, handler_fn, middleware_fn};
use crate::error::HandlerResult;
use crate::middleware::{Skipper, never_skip};

const DEFAULT_LIMIT: u32 = 100;
const DEFAULT_WINDOW: Duration = Duration::from_secs(60);

/// Maps a request to the key its quota is counted under.
pub type KeyExtractor = Arc<dyn Fn(&Context) -> String + Send + Sync + 'static>;

#[derive(Clone)]
pub struct RateLimitConfig {
    /// Requests allowed per key and window. `0` means the default (100).
    pub limit: u32,
    /// Window length. Zero means the default (one minute).
    pub window: Duration,
    /// Defaults to the client IP.
    pub key: KeyExtractor,
    pub skip: Skipper,
    /// Runs instead of the wrapped handler when a request is denied.
    /// Defaults to `429` with a JSON error body.
    pub on_limit: Handler,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            limit: DEFAULT_LIMIT,
            window: DEFAULT_WINDOW,
            key: Arc::new(client_ip),
            skip: never_skip(),
            on_limit: handler_fn(too_many_requests),
        }
    }
}

fn client_ip(c: &Context) -> String {
    c.remote_addr()
        .map(|addr| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_owned())
}

fn too_many_requests(c: &mut Context) -> BoxFuture<'_, HandlerResult> {
    Box::pin(async move {
        c.json(
            StatusCode::TOO_MANY_REQUESTS,
            &serde_json::json!({ "error": "Rate limit exceeded" }),
        )
    })
}

/// Outcome of [`RateLimiter::check`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allowed { remaining: u32 },
    Denied { retry_after: Duration },
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed { .. })
    }
}

#[derive(Debug)]
struct Bucket {
    count: u32,
    window_reset_at: Instant,
}

type Buckets = Mutex<HashMap<String, Bucket>>;

/// Shared limiter state. Hand it to routes through [`RateLimiter::layer`].
pub struct RateLimiter {
    limit: u32,
    window: Duration,
    key: KeyExtractor,
    skip: Skipper,
    on_limit: Handler,
    buckets: Arc<Buckets>,
    shutdown: CancellationToken,
    sweeper: Option<JoinHandle<()>>,
}

impl RateLimiter {
    /// Creates a limiter and starts its sweep on the current Tokio runtime.
    ///
    /// Outside a runtime no sweep is started; expired buckets are then only
    /// replaced when their key comes back.
    pub fn new(config: RateLimitConfig) -> Arc<Self> {
        let limit = if config.limit == 0 { DEFAULT_LIMIT } else { config.limit };
        let window = if config.window.is_zero() { DEFAULT_WINDOW } else { config.window };

        let buckets = Arc::new(Mutex::new(HashMap::new()));
        let shutdown = CancellationToken::new();
        let sweeper = spawn_sweep(Arc::downgrade(&buckets), window, shutdown.clone());

        Arc::new(Self {
            limit,
            window,
            key: config.key,
            skip: config.skip,
            on_limit: config.on_limit,
            buckets,
            shutdown,
            sweeper,
        })
    }

    /// Counts one request against `key` and says whether it may proceed.
    pub fn check(&self, key: &str) -> Decision {
        let now = Instant::now();
        let mut buckets = self.buckets.lock();

        if let Some(bucket) = buckets.get_mut(key).filter(|b| now <= b.window_reset_at) {
            if bucket.count < self.limit {
                bucket.count += 1;
                return Decision::Allowed { remaining: self.limit - bucket.count };
            }
            return Decision::Denied { retry_after: bucket.window_reset_at - now };
        }

        buckets.insert(
            key.to_owned(),
            Bucket { count: 1, window_reset_at: now + self.window },
        );
        Decision::Allowed { remaining: self.limit - 1 }
    }

    /// Number of keys currently holding a bucket.
    pub fn tracked_keys(&self) -> usize {
        self.buckets.lock().len()
    }

    /// Stops the background sweep. Limiting itself keeps working.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    /// Whether the background sweep task is still running.
    pub fn is_sweeping(&self) -> bool {
        self.sweeper.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Wraps handlers so every request is counted against this limiter.
    pub fn layer(self: &Arc<Self>) -> Middleware {
        let limiter = Arc::clone(self);
        middleware_fn(move |next: Handler| {
            let limiter = Arc::clone(&limiter);
            handler_fn(move |c| {
                let next = Arc::clone(&next);
                let limiter = Arc::clone(&limiter);
                Box::pin(async move {
                    if (limiter.skip)(c) {
                        return next(c).await;
                    }

                    let key = (limiter.key)(c);
                    match limiter.check(&key) {
                        Decision::Allowed { .. } => next(c).await,
                        Decision::Denied { retry_after } => {
                            debug!(%key, ?retry_after, "rate limit exceeded");
                            let secs = retry_after.as_secs() + u64::from(retry_after.subsec_nanos() > 0);
                            c.set_header("retry-after", &secs.to_string());
                            (limiter.on_limit)(c).await
                        }
                    }
                })
            })
        })
    }
}

impl Drop for RateLimiter {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

/// Rate limiting with the defaults: 100 requests per minute per client IP.
pub fn rate_limit() -> Middleware {
    rate_limit_with_config(RateLimitConfig::default())
}

/// Rate limiting with a private limiter owned by the returned middleware.
///
/// Use [`RateLimiter::new`] + [`RateLimiter::layer`] instead when the caller
/// needs to stop the sweep explicitly or share one quota across scopes.
pub fn rate_limit_with_config(config: RateLimitConfig) -> Middleware {
    RateLimiter::new(config).layer()
}

fn spawn_sweep(
    buckets: Weak<Buckets>,
    window: Duration,
    shutdown: CancellationToken,
) -> Option<JoinHandle<()>> {
    let Ok(runtime) = tokio::runtime::Handle::try_current() else {
        warn!("no Tokio runtime, rate limiter starts without its sweep task");
        return None;
    };

    Some(runtime.spawn(async move {
        let mut ticker = tokio::time::interval_at(Instant::now() + window, window);
        loop {
            tokio::select! {
                biased;

                () = shutdown.cancelled() => break,

                _ = ticker.tick() => {
                    let Some(buckets) = buckets.upgrade() else { break };
                    let removed = sweep(&buckets, Instant::now());
                    if removed > 0 {
                        debug!(removed, "swept expired rate limit buckets");
                    }
                }
            }
        }
        debug!("rate limiter sweep stopped");
    }))
}

fn sweep(buckets: &Buckets, now: Instant) -> usize {
    let mut map = buckets.lock();
    let before = map.len();
    map.retain(|_, b| now <= b.window_reset_at);
    before - map.len()
}
