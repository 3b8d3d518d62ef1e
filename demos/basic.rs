//! Minimal switchyard example: JSON endpoints, auth middleware, error stages.
//!
//! Run with:
//!   RUST_LOG=debug cargo run --example basic
//!
//! Try:
//!   curl http://localhost:3000/users/42
//!   curl -I http://localhost:3000/users/42
//!   curl -X OPTIONS -i http://localhost:3000/anything
//!   curl -X POST http://localhost:3000/users \
//!        -H 'x-api-key: demo' -H 'content-type: application/json' \
//!        -d '{"name":"alice"}'
//!   curl -X POST http://localhost:3000/users -H 'accept: application/json'

use std::time::Instant;

use serde_json::json;
use switchyard::{
    Body, Error, Flow, Middleware, Request, Response, Router, Server, ServerConfig, StatusCode,
};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let config = ServerConfig::from_env().expect("invalid SWITCHYARD_* configuration");

    let app = Router::new()
        .middleware(Middleware::regular(start_timer))
        .middleware(Middleware::error(render_error))
        .get("/users/:id", [Middleware::regular(get_user)])
        .post("/users", [
            Middleware::regular(require_key),
            Middleware::regular(create_user),
            Middleware::error(render_error),
        ])
        .delete("/users/:id", [Middleware::regular(require_key), Middleware::regular(delete_user)]);

    Server::from_config(config)
        .serve(app)
        .await
        .expect("server error");
}

// Global: stamp the request start so handlers can report timing.
async fn start_timer(req: &mut Request, _res: &mut Response) -> Flow {
    req.extensions_mut().insert(Instant::now());
    Flow::Next
}

async fn require_key(req: &mut Request, _res: &mut Response) -> Result<Flow, Error> {
    match req.header("x-api-key") {
        Some("demo") => Ok(Flow::Next),
        _ => Err(Error::new(StatusCode::UNAUTHORIZED, "missing or wrong x-api-key")),
    }
}

// GET /users/:id
async fn get_user(req: &mut Request, res: &mut Response) -> Result<(), Error> {
    let id = req.param("id").unwrap_or("unknown");
    let elapsed = req.extensions().get::<Instant>().map(|t| t.elapsed().as_micros());
    res.json(&json!({ "id": id, "name": "alice", "elapsed_us": elapsed }))
}

// POST /users
async fn create_user(req: &mut Request, res: &mut Response) -> Result<(), Error> {
    let Body::Value(input) = req.body() else {
        return Err(Error::new(StatusCode::BAD_REQUEST, "expected a JSON body"));
    };
    let name = input.get("name").and_then(|n| n.as_str()).unwrap_or("new_user");

    res.status(StatusCode::CREATED).set_header("location", "/users/99");
    res.json(&json!({ "id": "99", "name": name }))
}

// DELETE /users/:id → 204 No Content
async fn delete_user(_req: &mut Request, res: &mut Response) {
    res.status(StatusCode::NO_CONTENT).end("");
}

async fn render_error(err: Error, _req: &mut Request, res: &mut Response) {
    let status = err.status().unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    res.error(status, &err.to_string(), None);
}
