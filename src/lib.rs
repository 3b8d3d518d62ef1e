//! # switchyard
//!
//! A small HTTP framework built around one thing: getting each request
//! through an ordered list of stages and into the right route, predictably.
//!
//! ## The pipeline
//!
//! ```text
//! hyper ─▶ body parser ─▶ global middleware ─▶ route table ─▶ route handlers
//!                               │                   │              │
//!                               └──── unrecovered errors ──────────┴─▶ error sink
//! ```
//!
//! - **Stages** are either regular or error-handling ([`Middleware`]), and
//!   say how they finished by returning a [`Flow`] or an [`Error`].
//! - **Routes** are tried in registration order; the first match wins.
//!   Patterns support `:name` parameters and `*` wildcards.
//! - **HEAD** runs the matching GET route without sending its body.
//! - **OPTIONS** is answered with a CORS preflight, always.
//! - **Deadlines** bound every request (30 s unless configured).
//!
//! What the framework leaves to the proxy in front of it: TLS, rate
//! limiting, body-size limits.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use switchyard::{Error, Flow, Middleware, Request, Response, Router, Server, StatusCode};
//!
//! #[tokio::main]
//! async fn main() {
//!     let app = Router::new()
//!         .middleware(Middleware::regular(require_key))
//!         .get("/users/:id", [Middleware::regular(get_user)])
//!         .post("/users", [Middleware::regular(create_user)]);
//!
//!     Server::bind("0.0.0.0:3000").serve(app).await.unwrap();
//! }
//!
//! async fn require_key(req: &mut Request, _res: &mut Response) -> Result<Flow, Error> {
//!     match req.header("x-api-key") {
//!         Some(_) => Ok(Flow::Next),
//!         None => Err(Error::new(StatusCode::UNAUTHORIZED, "missing api key")),
//!     }
//! }
//!
//! async fn get_user(req: &mut Request, res: &mut Response) -> Result<(), Error> {
//!     let id = req.param("id").unwrap_or("unknown");
//!     res.json(&serde_json::json!({ "id": id }))
//! }
//!
//! async fn create_user(_req: &mut Request, res: &mut Response) {
//!     res.status(StatusCode::CREATED)
//!         .set_header("location", "/users/99")
//!         .text("created");
//! }
//! ```

mod body;
mod config;
mod cors;
mod error;
mod handler;
mod method;
mod pipeline;
mod request;
mod response;
mod router;
mod server;

pub mod middleware;

pub use body::{Body, BodyParser, BodyType, DefaultParser, ParsedBody};
pub use config::{Environment, ServerConfig, Settings};
pub use cors::CorsOptions;
pub use error::Error;
pub use handler::{BoxFuture, ErrorHandler, ErrorHandlerFn, Flow, Handler, HandlerFn, IntoOutcome, Outcome};
pub use http::StatusCode;
pub use method::Method;
pub use middleware::Middleware;
pub use pipeline::{handle, report};
pub use request::Request;
pub use response::{ContentType, Response};
pub use router::{Query, QueryValue, Router};
pub use server::Server;
