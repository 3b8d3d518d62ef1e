//! Incoming HTTP request view.

use std::collections::HashMap;

use http::Extensions;

use crate::body::{Body, BodyType, ParsedBody};
use crate::method::Method;
use crate::router::{Query, QueryValue};

/// An incoming HTTP request as the pipeline sees it.
///
/// The transport fills in method, url, headers and the parsed body. Route
/// resolution adds [`params`](Request::param) and [`query`](Request::query)
/// just before the route's own handlers run.
pub struct Request {
    pub(crate) method: Method,
    pub(crate) url: String,
    pub(crate) headers: Vec<(String, String)>,
    pub(crate) body: Body,
    pub(crate) body_type: Option<BodyType>,
    pub(crate) params: HashMap<String, String>,
    pub(crate) query: Query,
    pub(crate) extensions: Extensions,
}

impl Request {
    /// A request with no headers and no body. `url` is path plus optional
    /// query string, e.g. `/search?q=a%20b`.
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: Vec::new(),
            body: Body::Empty,
            body_type: None,
            params: HashMap::new(),
            query: Query::new(),
            extensions: Extensions::new(),
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_body(mut self, parsed: ParsedBody) -> Self {
        self.set_body(parsed);
        self
    }

    pub(crate) fn set_body(&mut self, parsed: ParsedBody) {
        self.body = parsed.body;
        self.body_type = parsed.body_type;
    }

    pub fn method(&self) -> Method { self.method }
    pub fn url(&self) -> &str { &self.url }
    pub fn headers(&self) -> &[(String, String)] { &self.headers }
    pub fn body(&self) -> &Body { &self.body }
    pub fn body_type(&self) -> Option<BodyType> { self.body_type }

    /// The url without its query string.
    pub fn path(&self) -> &str {
        self.url.split_once('?').map_or(&self.url, |(path, _)| path)
    }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Returns a named path parameter.
    ///
    /// For a route `/users/:id`, `req.param("id")` on `/users/42` returns `Some("42")`.
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }

    pub fn params(&self) -> &HashMap<String, String> { &self.params }

    /// Returns a query-string entry. `?flag` yields [`QueryValue::Flag`].
    pub fn query(&self, key: &str) -> Option<&QueryValue> {
        self.query.get(key)
    }

    pub fn query_map(&self) -> &Query { &self.query }

    /// Per-request state shared between stages (user ids, timers, ...).
    pub fn extensions(&self) -> &Extensions { &self.extensions }
    pub fn extensions_mut(&mut self) -> &mut Extensions { &mut self.extensions }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_strips_query() {
        assert_eq!(Request::new(Method::Get, "/search?q=1").path(), "/search");
        assert_eq!(Request::new(Method::Get, "/plain").path(), "/plain");
    }

    #[test]
    fn header_lookup_ignores_case() {
        let req = Request::new(Method::Get, "/").with_header("Accept", "application/json");
        assert_eq!(req.header("accept"), Some("application/json"));
        assert_eq!(req.header("content-type"), None);
    }
}
