//! Ordered route table.
//!
//! Routes are kept in registration order and tried one by one; the first
//! route whose method and pattern both match wins. Registering the same
//! pattern twice is allowed and the second registration is simply never
//! reached.
//!
//! Two methods never reach the table proper:
//!
//! - `OPTIONS` always resolves to a preflight responder: CORS headers,
//!   `204 No Content`, empty body.
//! - `HEAD` runs the first matching `GET` route with the response in
//!   headers-only mode, so headers match the `GET` exactly and no body is
//!   sent.

mod pattern;
mod query;

pub use query::{Query, QueryValue};

use std::collections::HashMap;

use http::StatusCode;
use tracing::debug;

use crate::cors::CorsOptions;
use crate::error::Error;
use crate::method::Method;
use crate::middleware::{Middleware, run_route};
use crate::request::Request;
use crate::response::Response;

use pattern::Pattern;

#[derive(Debug)]
struct Route {
    method: Method,
    path: String,
    pattern: Pattern,
    handlers: Vec<Middleware>,
}

/// The application router: global middleware, routes and CORS settings.
///
/// Build it once at startup and pass it to
/// [`Server::serve`](crate::Server::serve). Every builder method takes and
/// returns `self`, so the configuration is immutable once serving starts.
///
/// ```rust
/// use switchyard::{Middleware, Request, Response, Router};
///
/// async fn get_user(req: &mut Request, res: &mut Response) {
///     let id = req.param("id").unwrap_or("unknown");
///     res.text(format!("user {id}"));
/// }
///
/// let app = Router::new()
///     .get("/users/:id", [Middleware::regular(get_user)])
///     .add_route("post", "/users", [Middleware::regular(get_user)]);
/// ```
#[derive(Debug, Default)]
pub struct Router {
    middleware: Vec<Middleware>,
    routes: Vec<Route>,
    cors: CorsOptions,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a stage to the global chain, which runs before route
    /// resolution on every request.
    pub fn middleware(mut self, stage: Middleware) -> Self {
        self.middleware.push(stage);
        self
    }

    /// Replaces the CORS configuration.
    pub fn cors(mut self, options: CorsOptions) -> Self {
        self.cors = options;
        self
    }

    /// Registers a route by method name, in any casing.
    ///
    /// # Panics
    ///
    /// Panics if `method` is not a known HTTP method or `path` does not
    /// compile. Both are startup configuration mistakes.
    pub fn add_route(
        self,
        method: &str,
        path: &str,
        handlers: impl IntoIterator<Item = Middleware>,
    ) -> Self {
        let method = Method::from_name(method)
            .unwrap_or_else(|| panic!("invalid method `{method}` for route `{path}`"));
        self.on(method, path, handlers)
    }

    /// Registers a route for a method + path pair.
    ///
    /// Patterns use `:name` for a path parameter and `*` for a wildcard:
    /// `/users/:id`, `/static/*`.
    pub fn on(mut self, method: Method, path: &str, handlers: impl IntoIterator<Item = Middleware>) -> Self {
        let pattern = Pattern::compile(path)
            .unwrap_or_else(|e| panic!("invalid route `{path}`: {e}"));
        debug!(method = %method, path, params = ?pattern.param_names(), "route registered");
        self.routes.push(Route {
            method,
            path: path.to_owned(),
            pattern,
            handlers: handlers.into_iter().collect(),
        });
        self
    }

    pub fn get(self, path: &str, handlers: impl IntoIterator<Item = Middleware>) -> Self {
        self.on(Method::Get, path, handlers)
    }

    pub fn post(self, path: &str, handlers: impl IntoIterator<Item = Middleware>) -> Self {
        self.on(Method::Post, path, handlers)
    }

    pub fn put(self, path: &str, handlers: impl IntoIterator<Item = Middleware>) -> Self {
        self.on(Method::Put, path, handlers)
    }

    pub fn patch(self, path: &str, handlers: impl IntoIterator<Item = Middleware>) -> Self {
        self.on(Method::Patch, path, handlers)
    }

    pub fn delete(self, path: &str, handlers: impl IntoIterator<Item = Middleware>) -> Self {
        self.on(Method::Delete, path, handlers)
    }

    /// An explicit HEAD route. Without one, HEAD falls back to the GET route.
    pub fn head(self, path: &str, handlers: impl IntoIterator<Item = Middleware>) -> Self {
        self.on(Method::Head, path, handlers)
    }

    pub(crate) fn global(&self) -> &[Middleware] {
        &self.middleware
    }

    /// Finds what should serve `method` + `url`. `None` means 404.
    pub(crate) fn resolve(&self, method: Method, url: &str) -> Option<Resolved<'_>> {
        let (path, query) = match url.split_once('?') {
            Some((path, query)) => (path, query::parse(query)),
            None => (url, Query::new()),
        };

        if method == Method::Options {
            return Some(Resolved { kind: Kind::Preflight, method, cors: &self.cors, params: HashMap::new(), query });
        }

        let head = method == Method::Head;
        let (route, params) = self.routes.iter()
            .filter(|route| route.method == method || (head && route.method == Method::Get))
            .find_map(|route| Some((route, route.pattern.captures(path)?)))?;

        Some(Resolved {
            kind: Kind::Route { handlers: &route.handlers, path: &route.path, headers_only: head },
            method,
            cors: &self.cors,
            params: params.into_iter().collect(),
            query,
        })
    }
}

enum Kind<'r> {
    Preflight,
    Route { handlers: &'r [Middleware], path: &'r str, headers_only: bool },
}

/// A resolved request, ready to run.
pub(crate) struct Resolved<'r> {
    kind: Kind<'r>,
    method: Method,
    cors: &'r CorsOptions,
    params: HashMap<String, String>,
    query: Query,
}

impl Resolved<'_> {
    /// The registered pattern that matched, or `None` for a preflight.
    pub(crate) fn pattern(&self) -> Option<&str> {
        match self.kind {
            Kind::Preflight => None,
            Kind::Route { path, .. } => Some(path),
        }
    }

    pub(crate) fn method(&self) -> Method {
        self.method
    }

    /// Populates `req`, applies CORS and runs the route's handler chain.
    pub(crate) async fn handle(self, req: &mut Request, res: &mut Response) -> Result<(), Error> {
        req.params = self.params;
        req.query = self.query;
        self.cors.apply(res);

        match self.kind {
            Kind::Preflight => {
                res.status(StatusCode::NO_CONTENT).end("");
                Ok(())
            }
            Kind::Route { handlers, headers_only, .. } => {
                if headers_only {
                    res.set_headers_only();
                }
                run_route(handlers, req, res).await
            }
        }
    }
}
