//! End-to-end dispatch through the public API, without a socket.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::Deserialize;
use switchyard::http::StatusCode;
use switchyard::middleware::{self, RateLimitConfig};
use switchyard::validate::{Rule, Rules, Validate, ValidationError};
use switchyard::{
    Handler, Method, Middleware, Request, RouteError, Router, handler_fn, middleware_fn,
};

type Log = Arc<Mutex<Vec<String>>>;

fn tracer(log: &Log, name: &'static str) -> Middleware {
    let log = Arc::clone(log);
    middleware_fn(move |next: Handler| {
        let log = Arc::clone(&log);
        handler_fn(move |c| {
            let next = Arc::clone(&next);
            let log = Arc::clone(&log);
            Box::pin(async move {
                log.lock().push(format!("{name}>"));
                let result = next(c).await;
                log.lock().push(format!("<{name}"));
                result
            })
        })
    })
}

fn get(path: &str) -> Request {
    Request::new(Method::Get, path)
}

#[tokio::test]
async fn params_not_found_and_method_not_allowed() {
    let mut router = Router::new();
    router
        .get("/users/:id", |c| {
            Box::pin(async move {
                let id = c.param("id").to_owned();
                c.text(StatusCode::OK, id)
            })
        })
        .unwrap();

    let res = router.handle(get("/users/42")).await;
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.text(), "42");

    let res = router.handle(get("/items/42")).await;
    assert_eq!(res.status(), StatusCode::NOT_FOUND);

    let res = router.handle(Request::new(Method::Post, "/users/42")).await;
    assert_eq!(res.status(), StatusCode::METHOD_NOT_ALLOWED);
}

#[tokio::test]
async fn global_group_route_order_and_unwind() {
    let log: Log = Arc::default();
    let mut router = Router::new();
    router.use_middleware(tracer(&log, "A"));

    let endpoint = {
        let log = Arc::clone(&log);
        handler_fn(move |c| {
            let log = Arc::clone(&log);
            Box::pin(async move {
                log.lock().push("endpoint".to_owned());
                c.no_content()
            })
        })
    };
    let mut group = router.group("/g", [tracer(&log, "B")]);
    group.route(Method::Get, "/x", endpoint, [tracer(&log, "C")]).unwrap();

    let res = router.handle(get("/g/x")).await;
    assert_eq!(res.status(), StatusCode::NO_CONTENT);
    assert_eq!(*log.lock(), ["A>", "B>", "C>", "endpoint", "<C", "<B", "<A"]);
}

#[tokio::test]
async fn group_snapshots_global_middleware_at_creation() {
    let log: Log = Arc::default();
    let mut router = Router::new();
    router.use_middleware(tracer(&log, "early"));

    let mut group = router.group("/g", []);
    group.get("/x", |c| Box::pin(async move { c.no_content() })).unwrap();

    router.use_middleware(tracer(&log, "late"));
    router.get("/root", |c| Box::pin(async move { c.no_content() })).unwrap();

    router.handle(get("/g/x")).await;
    assert_eq!(*log.lock(), ["early>", "<early"]);

    log.lock().clear();
    router.handle(get("/root")).await;
    assert_eq!(*log.lock(), ["early>", "late>", "<late", "<early"]);
}

#[tokio::test]
async fn nested_groups_concatenate_prefixes_and_middleware() {
    let log: Log = Arc::default();
    let mut router = Router::new();
    let mut api = router.group("/api", [tracer(&log, "api")]);
    let mut v1 = api.group("/v1", [tracer(&log, "v1")]);
    assert_eq!(v1.prefix(), "/api/v1");
    v1.get("/items/:id", |c| {
        Box::pin(async move {
            let id = c.param("id").to_owned();
            c.text(StatusCode::OK, id)
        })
    })
    .unwrap();

    let res = router.handle(get("/api/v1/items/7")).await;
    assert_eq!(res.text(), "7");
    assert_eq!(*log.lock(), ["api>", "v1>", "<v1", "<api"]);
}

#[tokio::test]
async fn duplicate_and_invalid_registrations_are_rejected() {
    let mut router = Router::new();
    router.get("/a/:id", |c| Box::pin(async move { c.text(StatusCode::OK, "first") })).unwrap();

    let err = router
        .get("/a/:id", |c| Box::pin(async move { c.text(StatusCode::OK, "second") }))
        .unwrap_err();
    assert!(matches!(err, RouteError::DuplicateRoute { method: Method::Get, .. }));

    let err = router.get("no-slash", |c| Box::pin(async move { c.no_content() })).unwrap_err();
    assert!(matches!(err, RouteError::InvalidPath { .. }));

    // The first registration is still served.
    let res = router.handle(get("/a/1")).await;
    assert_eq!(res.text(), "first");
}

#[tokio::test]
async fn overlapping_patterns_prefer_the_longest_literal_prefix() {
    let mut router = Router::new();
    router.get("/files/:name", |c| Box::pin(async move { c.text(StatusCode::OK, "param") })).unwrap();
    router.get("/files/latest", |c| Box::pin(async move { c.text(StatusCode::OK, "exact") })).unwrap();
    router
        .get("/:kind/readme", |c| Box::pin(async move { c.text(StatusCode::OK, "kind") }))
        .unwrap();

    assert_eq!(router.handle(get("/files/latest")).await.text(), "exact");
    assert_eq!(router.handle(get("/files/other")).await.text(), "param");
    assert_eq!(router.handle(get("/files/readme")).await.text(), "param");
    assert_eq!(router.handle(get("/docs/readme")).await.text(), "kind");
}

#[tokio::test]
async fn fallbacks_run_inside_global_middleware() {
    let log: Log = Arc::default();
    let mut router = Router::new();
    router.use_middleware(tracer(&log, "global"));
    router.set_not_found_handler(handler_fn(|c| {
        Box::pin(async move { c.json(StatusCode::NOT_FOUND, &serde_json::json!({ "error": "nope" })) })
    }));

    let res = router.handle(get("/missing")).await;
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
    assert_eq!(res.text(), r#"{"error":"nope"}"#);
    assert_eq!(*log.lock(), ["global>", "<global"]);
}

#[tokio::test]
async fn handler_error_becomes_500_unless_already_written() {
    let mut router = Router::new();
    router.get("/boom", |_c| Box::pin(async { Err("database unavailable".into()) })).unwrap();
    router
        .get("/late", |c| {
            Box::pin(async move {
                c.text(StatusCode::OK, "sent")?;
                Err("after the fact".into())
            })
        })
        .unwrap();

    let res = router.handle(get("/boom")).await;
    assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(res.text(), "database unavailable");

    let res = router.handle(get("/late")).await;
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.text(), "sent");
}

#[tokio::test]
async fn first_write_wins_across_middleware() {
    let overwrite = middleware_fn(|next: Handler| {
        handler_fn(move |c| {
            let next = Arc::clone(&next);
            Box::pin(async move {
                next(&mut *c).await?;
                c.text(StatusCode::IM_A_TEAPOT, "middleware")
            })
        })
    });
    let mut router = Router::new();
    router.use_middleware(overwrite);
    router.get("/x", |c| Box::pin(async move { c.text(StatusCode::OK, "handler") })).unwrap();

    let res = router.handle(get("/x")).await;
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.text(), "handler");
}

#[derive(Debug, Deserialize)]
struct Signup {
    #[serde(default)]
    name: String,
}

impl Validate for Signup {
    fn validate(&self) -> Vec<ValidationError> {
        Rules::new().field("name", &self.name, &[Rule::Required, Rule::MinLength(3)]).finish()
    }
}

#[tokio::test]
async fn bind_valid_through_the_router() {
    let mut router = Router::new();
    router
        .post("/signup", |c| {
            Box::pin(async move {
                let Some(signup) = c.bind_valid::<Signup>()? else {
                    return Ok(());
                };
                c.text(StatusCode::CREATED, signup.name)
            })
        })
        .unwrap();

    let ok = Request::new(Method::Post, "/signup").with_body(r#"{"name":"alice"}"#);
    let res = router.handle(ok).await;
    assert_eq!(res.status(), StatusCode::CREATED);
    assert_eq!(res.text(), "alice");

    let short = Request::new(Method::Post, "/signup").with_body(r#"{"name":"al"}"#);
    let res = router.handle(short).await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body: serde_json::Value = serde_json::from_slice(res.body()).unwrap();
    assert_eq!(body["error"], "Validation failed");
    assert_eq!(body["errors"][0]["field"], "name");
    assert_eq!(body["errors"][0]["message"], "Field is too short");

    let garbage = Request::new(Method::Post, "/signup").with_body("not json");
    let res = router.handle(garbage).await;
    assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test(start_paused = true)]
async fn rate_limited_group_leaves_other_routes_alone() {
    let mut router = Router::new();
    router.use_middleware(middleware::request_id());
    let mut api = router.group(
        "/api",
        [middleware::rate_limit_with_config(RateLimitConfig {
            limit: 2,
            window: Duration::from_secs(60),
            ..RateLimitConfig::default()
        })],
    );
    api.get("/ping", |c| Box::pin(async move { c.text(StatusCode::OK, "pong") })).unwrap();
    router.get("/ping", |c| Box::pin(async move { c.text(StatusCode::OK, "pong") })).unwrap();

    let addr = "10.0.0.1:5000".parse().unwrap();
    let call = |path: &str| get(path).with_remote_addr(addr);

    assert_eq!(router.handle(call("/api/ping")).await.status(), StatusCode::OK);
    assert_eq!(router.handle(call("/api/ping")).await.status(), StatusCode::OK);
    let limited = router.handle(call("/api/ping")).await;
    assert_eq!(limited.status(), StatusCode::TOO_MANY_REQUESTS);
    assert!(limited.header("x-request-id").is_some());

    for _ in 0..5 {
        assert_eq!(router.handle(call("/ping")).await.status(), StatusCode::OK);
    }

    tokio::time::advance(Duration::from_secs(61)).await;
    assert_eq!(router.handle(call("/api/ping")).await.status(), StatusCode::OK);
}
