//! HTTP server and graceful shutdown.
//!
//! # Graceful shutdown
//!
//! On **SIGTERM** or **Ctrl-C** the server:
//! 1. Immediately stops `listener.accept()`, so no new connections are made.
//! 2. Lets every in-flight connection task run to completion.
//! 3. Returns from [`Server::serve`], which lets `main` exit cleanly.
//!
//! Orchestrators send SIGTERM and wait a grace period before SIGKILL. Keep
//! that period longer than the write timeout.
//!
//! # Timeouts
//!
//! - **read timeout**: how long an HTTP/1 client may take to send request
//!   headers before the connection is closed.
//! - **write timeout**: how long the router may take to produce a response.
//!   Past it the client gets `503 Service Unavailable`.
//!
//! Zero disables either one.

use std::convert::Infallible;
use std::future::Future;
use std::net::{SocketAddr, ToSocketAddrs};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use http::StatusCode;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::service::service_fn;
use hyper_util::rt::{TokioExecutor, TokioIo, TokioTimer};
use hyper_util::server::conn::auto::Builder as ConnBuilder;
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};

use crate::config::ServerConfig;
use crate::error::Error;
use crate::method::Method;
use crate::request::Request;
use crate::response::Response;
use crate::router::Router;

/// The HTTP server.
pub struct Server {
    addr: SocketAddr,
    read_timeout: Duration,
    write_timeout: Duration,
}

impl Server {
    /// Resolves `addr` (`host:port`, host names allowed) to the address
    /// [`serve`](Server::serve) will listen on. Both timeouts default to 15 s.
    ///
    /// ```rust,no_run
    /// use switchyard::Server;
    /// let server = Server::bind("0.0.0.0:3000").unwrap();
    /// ```
    pub fn bind(addr: &str) -> Result<Self, Error> {
        let resolved = addr
            .to_socket_addrs()
            .map_err(|_| Error::Address(addr.to_owned()))?
            .next()
            .ok_or_else(|| Error::Address(addr.to_owned()))?;
        let defaults = ServerConfig::default();
        Ok(Self {
            addr: resolved,
            read_timeout: defaults.read_timeout(),
            write_timeout: defaults.write_timeout(),
        })
    }

    /// Address and timeouts from the `[server]` table of a
    /// [`Config`](crate::Config).
    pub fn from_config(config: &ServerConfig) -> Result<Self, Error> {
        Ok(Self::bind(&config.address())?
            .read_timeout(config.read_timeout())
            .write_timeout(config.write_timeout()))
    }

    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    pub fn write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = timeout;
        self
    }

    pub fn addr(&self) -> SocketAddr { self.addr }

    /// Starts accepting connections and dispatching them through `router`.
    ///
    /// Returns only after a full graceful shutdown (SIGTERM or Ctrl-C,
    /// followed by all in-flight requests completing).
    pub async fn serve(self, router: Router) -> Result<(), Error> {
        self.serve_with_shutdown(router, shutdown_signal()).await
    }

    /// Like [`serve`](Server::serve), but stops accepting when `signal`
    /// resolves instead of waiting for a process signal.
    pub async fn serve_with_shutdown<F>(self, router: Router, signal: F) -> Result<(), Error>
    where
        F: Future<Output = ()>,
    {
        let listener = TcpListener::bind(self.addr).await?;
        let router = Arc::new(router);

        let mut builder = ConnBuilder::new(TokioExecutor::new());
        if !self.read_timeout.is_zero() {
            builder
                .http1()
                .timer(TokioTimer::new())
                .header_read_timeout(self.read_timeout);
        }
        let write_timeout = self.write_timeout;

        info!(
            addr = %self.addr,
            read_timeout = ?self.read_timeout,
            write_timeout = ?write_timeout,
            "switchyard listening",
        );

        // Tracks every connection task so shutdown can wait for them.
        let mut tasks = tokio::task::JoinSet::new();

        tokio::pin!(signal);

        loop {
            tokio::select! {
                // Shutdown is checked first so a signal stops accepting even
                // while connections are queued.
                biased;

                () = &mut signal => {
                    info!(in_flight = tasks.len(), "shutdown signal received, draining connections");
                    break;
                }

                res = listener.accept() => {
                    let (stream, remote_addr) = match res {
                        Ok(v) => v,
                        Err(e) => {
                            error!("accept error: {e}");
                            continue;
                        }
                    };

                    let router = Arc::clone(&router);
                    let builder = builder.clone();
                    let io = TokioIo::new(stream);

                    tasks.spawn(async move {
                        // Called once per request on the connection.
                        let svc = service_fn(move |req| {
                            let router = Arc::clone(&router);
                            async move { dispatch(router, req, remote_addr, write_timeout).await }
                        });

                        if let Err(e) = builder.serve_connection(io, svc).await {
                            error!(peer = %remote_addr, "connection error: {e}");
                        }
                    });
                }

                // Reap finished tasks so the set does not grow without bound.
                Some(_) = tasks.join_next(), if !tasks.is_empty() => {}
            }
        }

        while tasks.join_next().await.is_some() {}

        info!("switchyard stopped");
        Ok(())
    }
}

// ── Request dispatch ──────────────────────────────────────────────────────────

/// Converts one hyper request, runs it through the router and converts the
/// answer back. Every failure becomes a response, so hyper never sees an error.
async fn dispatch(
    router: Arc<Router>,
    req: hyper::Request<Incoming>,
    remote_addr: SocketAddr,
    write_timeout: Duration,
) -> Result<http::Response<Full<Bytes>>, Infallible> {
    let method = match Method::try_from(req.method()) {
        Ok(method) => method,
        Err(err) => {
            debug!(peer = %remote_addr, %err, "rejecting request");
            return Ok(Response::plain(StatusCode::METHOD_NOT_ALLOWED, "Method Not Allowed").into_http());
        }
    };

    let (parts, body) = req.into_parts();
    let body = match body.collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(err) => {
            warn!(peer = %remote_addr, %err, "failed to read request body");
            return Ok(Response::plain(StatusCode::BAD_REQUEST, "Bad Request").into_http());
        }
    };

    let request = Request::from_parts(method, &parts.uri, parts.headers, body, remote_addr);

    let response = if write_timeout.is_zero() {
        router.handle(request).await
    } else {
        match tokio::time::timeout(write_timeout, router.handle(request)).await {
            Ok(response) => response,
            Err(_) => {
                warn!(%method, path = parts.uri.path(), timeout = ?write_timeout, "response not produced in time");
                Response::plain(StatusCode::SERVICE_UNAVAILABLE, "Service Unavailable")
            }
        }
    };

    Ok(response.into_http())
}

// ── Shutdown signal ───────────────────────────────────────────────────────────

/// Resolves on the first SIGTERM or SIGINT (Ctrl-C). On Windows only Ctrl-C
/// is available. A handler that cannot be installed is logged and never fires.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("failed to listen for Ctrl-C: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let sigterm = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let sigterm = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c   => {}
        () = sigterm  => {}
    }
}
