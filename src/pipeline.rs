//! Per-request dispatch, independent of the transport.
//!
//! ```text
//! global chain ──exhausted──▶ router.resolve ──▶ route chain
//!      │                          │                  │
//!      │ failed                   │ miss → 404       │ error
//!      ▼                          ▼                  ▼
//!   report ◀──────────────────────────────────────────┘
//! ```
//!
//! The whole run sits under the configured deadline. Whatever error nobody
//! recovered ends up in [`report`], which never touches a response that has
//! already been finalized.

use std::future::Future;
use std::time::Duration;

use http::StatusCode;
use serde::Serialize;
use tokio::time::Instant;
use tracing::{debug, error, warn};

use crate::config::{Environment, Settings};
use crate::error::Error;
use crate::middleware::{Exit, run_global};
use crate::request::Request;
use crate::response::Response;
use crate::router::Router;

/// Runs `req` through `router` and leaves the result in `res`.
///
/// The request's body must already be parsed; the deadline starts now.
/// Public so the pipeline can be driven without a socket.
///
/// ```rust
/// use switchyard::{Method, Middleware, Request, Response, Router, Settings, handle};
///
/// async fn hello(_req: &mut Request, res: &mut Response) {
///     res.text("hello");
/// }
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let router = Router::new().get("/", [Middleware::regular(hello)]);
/// let mut req = Request::new(Method::Get, "/");
/// let mut res = Response::new();
///
/// handle(&router, &Settings::default(), &mut req, &mut res).await;
/// assert_eq!(res.body(), b"hello");
/// # }
/// ```
pub async fn handle(router: &Router, settings: &Settings, req: &mut Request, res: &mut Response) {
    handle_until(router, settings, Deadline::start(settings), req, res).await;
}

/// [`handle`] against a deadline that may already be running, e.g. since
/// the transport started reading the body.
pub(crate) async fn handle_until(
    router: &Router,
    settings: &Settings,
    deadline: Option<Deadline>,
    req: &mut Request,
    res: &mut Response,
) {
    if let Err(err) = bounded(deadline, dispatch(router, req, res)).await {
        report(&err, req, res, settings.environment);
    } else if !res.is_finalized() {
        warn!(method = %req.method(), path = req.path(), "chain finished without ending the response");
    }
}

/// The point in time a request must be answered by.
#[derive(Clone, Copy, Debug)]
pub(crate) struct Deadline {
    at: Instant,
    limit: Duration,
}

impl Deadline {
    /// Starts the clock now, unless the deadline is disabled.
    pub(crate) fn start(settings: &Settings) -> Option<Self> {
        settings.request_timeout.map(|limit| Self { at: Instant::now() + limit, limit })
    }
}

/// Runs `work`, failing with [`Error::Timeout`] once `deadline` passes.
pub(crate) async fn bounded<T>(
    deadline: Option<Deadline>,
    work: impl Future<Output = Result<T, Error>>,
) -> Result<T, Error> {
    match deadline {
        Some(Deadline { at, limit }) => tokio::time::timeout_at(at, work)
            .await
            .unwrap_or_else(|_| Err(Error::Timeout(limit))),
        None => work.await,
    }
}

async fn dispatch(router: &Router, req: &mut Request, res: &mut Response) -> Result<(), Error> {
    match run_global(router.global(), req, res).await {
        Exit::Stopped => return Ok(()),
        Exit::Failed(err) => return Err(err),
        Exit::Exhausted => {}
    }

    match router.resolve(req.method(), req.url()) {
        Some(resolved) => {
            debug!(method = %resolved.method(), route = resolved.pattern().unwrap_or("<preflight>"), "route matched");
            resolved.handle(req, res).await
        }
        None => {
            res.status(StatusCode::NOT_FOUND).text("Not Found");
            Ok(())
        }
    }
}

/// The top-level error sink.
///
/// Answers with the error's suggested status (500 otherwise). The body is
/// JSON when the client accepts `application/json`, plain text otherwise.
///
/// In production the message is withheld and the canonical reason phrase
/// of the status is sent instead: `Not Found` for a 404, not a blanket
/// `Internal Server Error` for every failure.
pub fn report(err: &Error, req: &Request, res: &mut Response, environment: Environment) {
    let status = err.status().unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

    if res.is_finalized() {
        error!(method = %req.method(), path = req.path(), error = %err, "error after response was finalized");
        return;
    }
    if status.is_server_error() {
        error!(method = %req.method(), path = req.path(), status = status.as_u16(), error = %err, "unhandled error");
    } else {
        warn!(method = %req.method(), path = req.path(), status = status.as_u16(), error = %err, "unhandled error");
    }

    let message = match environment {
        Environment::Development => err.to_string(),
        Environment::Production => status.canonical_reason().unwrap_or("Error").to_owned(),
    };

    #[derive(Serialize)]
    struct Payload<'a> {
        error: bool,
        status: u16,
        message: &'a str,
    }

    res.status(status);
    let wants_json = req.header("accept").is_some_and(|accept| accept.contains("application/json"));
    if wants_json {
        let payload = Payload { error: true, status: status.as_u16(), message: &message };
        if res.json(&payload).is_ok() {
            return;
        }
    }
    res.text(message);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::Flow;
    use crate::method::Method;
    use crate::middleware::Middleware;
    use serde_json::json;

    async fn ok(_req: &mut Request, res: &mut Response) {
        res.text("ok");
    }

    async fn fail(_req: &mut Request, _res: &mut Response) -> Result<Flow, Error> {
        Err(Error::new(StatusCode::UNPROCESSABLE_ENTITY, "name is required"))
    }

    async fn crash(_req: &mut Request, _res: &mut Response) -> Flow {
        panic!("database handle poisoned")
    }

    async fn hang(_req: &mut Request, _res: &mut Response) {
        std::future::pending::<()>().await;
    }

    async fn end_then_fail(_req: &mut Request, res: &mut Response) -> Result<(), Error> {
        res.text("done");
        Err(Error::new(StatusCode::BAD_GATEWAY, "late failure"))
    }

    async fn run(router: &Router, settings: Settings, req: Request) -> Response {
        let mut req = req;
        let mut res = Response::new();
        handle(router, &settings, &mut req, &mut res).await;
        res
    }

    fn get(url: &str) -> Request {
        Request::new(Method::Get, url)
    }

    #[tokio::test]
    async fn unmatched_is_404() {
        let router = Router::new().get("/user/:id", [Middleware::regular(ok)]);

        let res = run(&router, Settings::default(), get("/user/42")).await;
        assert_eq!(res.status_code(), StatusCode::OK);

        let res = run(&router, Settings::default(), get("/user/42/extra")).await;
        assert_eq!(res.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(res.body(), b"Not Found");
    }

    #[tokio::test]
    async fn global_failure_is_reported_as_text() {
        let router = Router::new()
            .middleware(Middleware::regular(fail))
            .get("/", [Middleware::regular(ok)]);

        let res = run(&router, Settings::default(), get("/")).await;
        assert_eq!(res.status_code(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(res.body(), b"name is required");
    }

    #[tokio::test]
    async fn route_failure_is_reported_as_json_when_accepted() {
        let router = Router::new().get("/", [Middleware::regular(fail)]);
        let req = get("/").with_header("Accept", "application/json, text/plain");

        let res = run(&router, Settings::default(), req).await;
        let body: serde_json::Value = serde_json::from_slice(res.body()).unwrap();
        assert_eq!(body, json!({ "error": true, "status": 422, "message": "name is required" }));
    }

    #[tokio::test]
    async fn production_hides_detail() {
        let router = Router::new().get("/", [Middleware::regular(crash)]);
        let settings = Settings { environment: Environment::Production, ..Settings::default() };

        let res = run(&router, settings, get("/")).await;
        assert_eq!(res.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(res.body(), b"Internal Server Error");
    }

    #[tokio::test]
    async fn finalized_responses_are_left_alone() {
        let router = Router::new().get("/", [Middleware::regular(end_then_fail)]);

        let res = run(&router, Settings::default(), get("/")).await;
        assert_eq!(res.status_code(), StatusCode::OK);
        assert_eq!(res.body(), b"done");
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_turns_a_hang_into_503() {
        let router = Router::new().get("/", [Middleware::regular(hang)]);
        let settings = Settings { request_timeout: Some(Duration::from_millis(50)), ..Settings::default() };

        let res = run(&router, settings, get("/")).await;
        assert_eq!(res.status_code(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(res.body(), b"request exceeded its deadline of 50ms");
    }

    #[tokio::test(start_paused = true)]
    async fn time_spent_before_dispatch_counts_against_the_deadline() {
        async fn slow(_req: &mut Request, res: &mut Response) {
            tokio::time::sleep(Duration::from_millis(20)).await;
            res.text("late");
        }
        let router = Router::new().get("/", [Middleware::regular(slow)]);
        let settings = Settings { request_timeout: Some(Duration::from_millis(50)), ..Settings::default() };

        let deadline = Deadline::start(&settings);
        let read = bounded(deadline, async {
            tokio::time::sleep(Duration::from_millis(40)).await;
            Ok(())
        });
        read.await.unwrap();

        let mut req = get("/");
        let mut res = Response::new();
        handle_until(&router, &settings, deadline, &mut req, &mut res).await;
        assert_eq!(res.status_code(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(res.body(), b"request exceeded its deadline of 50ms");
    }

    #[tokio::test(start_paused = true)]
    async fn bounded_without_deadline_waits() {
        let out = bounded(None, async {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok::<_, Error>(7)
        });
        assert_eq!(out.await.unwrap(), 7);
    }

    #[tokio::test]
    async fn unfinalized_route_chain_is_sent_as_is() {
        async fn silent(_req: &mut Request, res: &mut Response) {
            res.set_header("x-partial", "1");
        }
        let router = Router::new().get("/", [Middleware::regular(silent)]);

        let res = run(&router, Settings::default(), get("/")).await;
        assert!(!res.is_finalized());
        assert_eq!(res.header("x-partial"), Some("1"));
    }
}
