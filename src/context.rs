//! Per-request context.
//!
//! A [`Context`] is created fresh for every request, handed by `&mut` down the
//! middleware chain to the endpoint, and turned into the [`Response`] once the
//! chain returns. It is never shared between requests, so it needs no locking.
//!
//! # Single write
//!
//! The first call to a body writer ([`text`](Context::text),
//! [`json`](Context::json), [`set_status`](Context::set_status),
//! [`no_content`](Context::no_content)) commits the status line and body and
//! flips [`is_written`](Context::is_written). Later writes are ignored and
//! logged. Middleware uses the flag to decide whether it still owes the client
//! a fallback response.

use std::net::SocketAddr;
use std::str::FromStr;

use bytes::Bytes;
use http::StatusCode;
use http::header::{CONTENT_TYPE, HeaderName, HeaderValue};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::error::{BindError, BoxError, HandlerResult};
use crate::method::Method;
use crate::request::Request;
use crate::response::Response;
use crate::route::Params;
use crate::validate::{Validate, ValidationError};

const JSON: &str = "application/json";
const TEXT: &str = "text/plain; charset=utf-8";

/// Request/response state for one in-flight request.
pub struct Context {
    request: Request,
    params: Params,
    response: Response,
    status: Option<StatusCode>,
    written: bool,
    request_id: Option<String>,
    deadline: Option<Instant>,
}

impl Context {
    pub fn new(request: Request) -> Self {
        Self {
            request,
            params: Params::default(),
            response: Response::new(StatusCode::OK),
            status: None,
            written: false,
            request_id: None,
            deadline: None,
        }
    }

    pub(crate) fn set_params(&mut self, params: Params) {
        self.params = params;
    }

    // ── Request side ─────────────────────────────────────────────────────────

    pub fn request(&self) -> &Request { &self.request }
    pub fn method(&self) -> Method { self.request.method() }
    pub fn path(&self) -> &str { self.request.path() }
    pub fn remote_addr(&self) -> Option<SocketAddr> { self.request.remote_addr() }

    /// Request header lookup, case-insensitive.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.request.header(name)
    }

    /// Path parameter bound by the matched route, or `""` when absent.
    ///
    /// For a route `/users/:id`, `c.param("id")` on `/users/42` returns `"42"`.
    pub fn param(&self, name: &str) -> &str {
        self.params.get(name).unwrap_or("")
    }

    /// Path parameter parsed as `T`; `None` when absent or unparsable.
    pub fn param_as<T: FromStr>(&self, name: &str) -> Option<T> {
        self.params.get(name)?.parse().ok()
    }

    pub fn params(&self) -> &Params { &self.params }

    /// First value of a query-string parameter, percent-decoded, or `""`.
    pub fn query(&self, name: &str) -> String {
        self.request
            .query_string()
            .and_then(|q| {
                url::form_urlencoded::parse(q.as_bytes())
                    .find(|(k, _)| k == name)
                    .map(|(_, v)| v.into_owned())
            })
            .unwrap_or_default()
    }

    /// Query-string parameter parsed as `T`; `None` when absent or unparsable.
    pub fn query_as<T: FromStr>(&self, name: &str) -> Option<T> {
        let raw = self.query(name);
        if raw.is_empty() {
            return None;
        }
        raw.parse().ok()
    }

    /// Decodes the JSON request body.
    pub fn bind<T: DeserializeOwned>(&self) -> Result<T, BindError> {
        let body = self.request.body();
        if body.is_empty() {
            return Err(BindError::EmptyBody);
        }
        Ok(serde_json::from_slice(body)?)
    }

    /// Decodes the JSON request body and runs its validation rules.
    ///
    /// On rule failures this writes `400` with the list of field errors and
    /// returns `Ok(None)`; the handler should simply return.
    pub fn bind_valid<T>(&mut self) -> Result<Option<T>, BindError>
    where
        T: DeserializeOwned + Validate,
    {
        let value: T = self.bind()?;
        let errors = value.validate();
        if errors.is_empty() {
            return Ok(Some(value));
        }

        #[derive(Serialize)]
        struct Rejection<'a> {
            error: &'static str,
            errors: &'a [ValidationError],
        }

        let body = serde_json::to_vec(&Rejection { error: "Validation failed", errors: &errors })?;
        self.commit(StatusCode::BAD_REQUEST, Some(JSON), Bytes::from(body));
        Ok(None)
    }

    // ── Per-request values set by middleware ─────────────────────────────────

    /// Request id assigned by the `request_id` middleware, if installed.
    pub fn request_id(&self) -> Option<&str> { self.request_id.as_deref() }

    pub fn set_request_id(&mut self, id: impl Into<String>) {
        self.request_id = Some(id.into());
    }

    /// Point in time after which the request should be abandoned.
    pub fn deadline(&self) -> Option<Instant> { self.deadline }

    /// Records a deadline. An earlier existing deadline is kept.
    pub fn set_deadline(&mut self, deadline: Instant) {
        self.deadline = Some(match self.deadline {
            Some(current) if current < deadline => current,
            _ => deadline,
        });
    }

    // ── Response side ────────────────────────────────────────────────────────

    /// Whether a status line and body have already been committed.
    pub fn is_written(&self) -> bool { self.written }

    /// Committed status, or `None` while nothing has been written.
    pub fn status(&self) -> Option<StatusCode> { self.status }

    /// Sets a response header. Ignored once the response is written.
    pub fn set_header(&mut self, name: &str, value: &str) {
        if self.written {
            debug!(header = name, "response already written, header ignored");
            return;
        }
        match (HeaderName::from_bytes(name.as_bytes()), HeaderValue::from_str(value)) {
            (Ok(n), Ok(v)) => {
                self.response.headers.insert(n, v);
            }
            _ => warn!(header = name, "invalid response header ignored"),
        }
    }

    /// Commits `status` with an empty body. This ends the response: a body
    /// writer called afterwards is ignored like any other second write. Use
    /// [`text`](Context::text) or [`json`](Context::json) to send a status
    /// with a body.
    pub fn set_status(&mut self, status: StatusCode) {
        self.commit(status, None, Bytes::new());
    }

    /// Commits `204 No Content`.
    pub fn no_content(&mut self) -> HandlerResult {
        self.set_status(StatusCode::NO_CONTENT);
        Ok(())
    }

    /// Commits a `text/plain` body.
    pub fn text(&mut self, status: StatusCode, body: impl Into<String>) -> HandlerResult {
        self.commit(status, Some(TEXT), Bytes::from(body.into()));
        Ok(())
    }

    /// Serialises `value` and commits it as an `application/json` body.
    pub fn json<T: Serialize + ?Sized>(&mut self, status: StatusCode, value: &T) -> HandlerResult {
        if self.refuse_write(status) {
            return Ok(());
        }
        let body = serde_json::to_vec(value)?;
        self.commit(status, Some(JSON), Bytes::from(body));
        Ok(())
    }

    /// Writes the generic failure response for an error that escaped the chain.
    pub(crate) fn fail(&mut self, err: &BoxError) {
        self.commit(StatusCode::INTERNAL_SERVER_ERROR, Some(TEXT), Bytes::from(err.to_string()));
    }

    fn refuse_write(&self, status: StatusCode) -> bool {
        if self.written {
            warn!(
                method = %self.request.method(),
                path = self.request.path(),
                committed = ?self.status,
                ignored = %status,
                "response already written, ignoring second write",
            );
        }
        self.written
    }

    fn commit(&mut self, status: StatusCode, content_type: Option<&'static str>, body: Bytes) {
        if self.refuse_write(status) {
            return;
        }
        self.written = true;
        self.status = Some(status);
        self.response.status = status;
        if let Some(ct) = content_type {
            self.response.headers.insert(CONTENT_TYPE, HeaderValue::from_static(ct));
        }
        self.response.body = body;
    }

    pub(crate) fn into_response(self) -> Response {
        self.response
    }
}
