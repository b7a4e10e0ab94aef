//! Minimal switchyard service: a small user API behind the built-in middleware.
//!
//! Run with:
//!   cargo run --example basic
//!   SWITCHYARD_CONFIG=switchyard.toml cargo run --example basic
//!
//! Try:
//!   curl -i http://localhost:8080/users/42
//!   curl -i -X POST http://localhost:8080/api/v1/users \
//!        -H 'content-type: application/json' \
//!        -d '{"name":"alice","email":"alice@example.com"}'
//!   curl -i -X POST http://localhost:8080/api/v1/users -d '{"name":"a"}'
//!   curl -i -X DELETE http://localhost:8080/api/v1/users/42
//!   curl -i http://localhost:8080/search?q=rust%20lang

use std::time::Duration;

use serde::{Deserialize, Serialize};
use switchyard::http::StatusCode;
use switchyard::middleware::{self, RateLimitConfig};
use switchyard::validate::{Rule, Rules, Validate, ValidationError};
use switchyard::{BoxFuture, Config, Context, HandlerResult, Router, Server, handler_fn};

#[derive(Deserialize)]
struct NewUser {
    #[serde(default)]
    name: String,
    #[serde(default)]
    email: String,
}

impl Validate for NewUser {
    fn validate(&self) -> Vec<ValidationError> {
        Rules::new()
            .field("name", &self.name, &[Rule::Required, Rule::MinLength(2)])
            .field("email", &self.email, &[Rule::Required, Rule::MaxLength(254)])
            .finish()
    }
}

#[derive(Serialize)]
struct User {
    id: u64,
    name: String,
    email: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let config = match std::env::var("SWITCHYARD_CONFIG") {
        Ok(path) => Config::load(path)?,
        Err(_) => Config {
            middleware: vec!["recover".into(), "request_id".into(), "logger".into()],
            ..Config::default()
        },
    };

    let mut router = Router::new();
    router.use_all(config.middlewares()?);
    router.set_not_found_handler(handler_fn(|c| {
        Box::pin(async move {
            let path = c.path().to_owned();
            c.json(StatusCode::NOT_FOUND, &serde_json::json!({ "error": "not found", "path": path }))
        })
    }));

    router.get("/users/:id", get_user)?;
    router.get("/search", search)?;

    let mut api = router.group(
        "/api",
        [middleware::cors(), middleware::rate_limit_with_config(RateLimitConfig {
            limit: 20,
            window: Duration::from_secs(10),
            ..RateLimitConfig::default()
        })],
    );
    let mut v1 = api.group("/v1", [middleware::timeout()]);
    v1.post("/users", create_user)?;
    v1.delete("/users/:id", |c| Box::pin(async move { c.no_content() }))?;

    Server::from_config(&config.server)?.serve(router).await?;
    Ok(())
}

// GET /users/:id
fn get_user(c: &mut Context) -> BoxFuture<'_, HandlerResult> {
    Box::pin(async move {
        let Some(id) = c.param_as::<u64>("id") else {
            return c.text(StatusCode::BAD_REQUEST, "id must be a number");
        };
        let user = User { id, name: "alice".into(), email: "alice@example.com".into() };
        c.json(StatusCode::OK, &user)
    })
}

// POST /api/v1/users
fn create_user(c: &mut Context) -> BoxFuture<'_, HandlerResult> {
    Box::pin(async move {
        // `bind_valid` already answered 400 when it returns `None`.
        let Some(input) = c.bind_valid::<NewUser>()? else {
            return Ok(());
        };
        c.set_header("location", "/users/99");
        c.json(StatusCode::CREATED, &User { id: 99, name: input.name, email: input.email })
    })
}

// GET /search?q=...
fn search(c: &mut Context) -> BoxFuture<'_, HandlerResult> {
    Box::pin(async move {
        let q = c.query("q");
        let limit = c.query_as::<usize>("limit").unwrap_or(10);
        c.json(StatusCode::OK, &serde_json::json!({ "q": q, "limit": limit }))
    })
}
