//! Static CORS configuration.
//!
//! The same headers go on every matched route and on every `OPTIONS`
//! preflight. There is no per-request origin checking: if you need to
//! reflect or validate `Origin`, do it in a middleware.

use crate::method::Method;
use crate::response::Response;

/// CORS headers applied by the router.
///
/// Start from [`CorsOptions::default`] and override what differs:
///
/// ```rust
/// use switchyard::{CorsOptions, Method};
///
/// let cors = CorsOptions::default()
///     .origin("https://app.example.com")
///     .methods([Method::Get, Method::Post])
///     .credentials(true);
/// ```
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CorsOptions {
    pub origin: Option<String>,
    pub methods: Vec<Method>,
    pub allowed_headers: Vec<String>,
    pub exposed_headers: Vec<String>,
    pub credentials: bool,
    /// Preflight cache lifetime in seconds. `0` omits the header.
    pub max_age: u64,
}

impl Default for CorsOptions {
    fn default() -> Self {
        Self {
            origin: Some("*".to_owned()),
            methods: vec![
                Method::Get,
                Method::Head,
                Method::Put,
                Method::Patch,
                Method::Post,
                Method::Delete,
            ],
            allowed_headers: vec!["Content-Type".to_owned(), "Authorization".to_owned()],
            exposed_headers: Vec::new(),
            credentials: false,
            max_age: 86_400,
        }
    }
}

impl CorsOptions {
    /// No CORS headers at all.
    pub fn disabled() -> Self {
        Self {
            origin: None,
            methods: Vec::new(),
            allowed_headers: Vec::new(),
            exposed_headers: Vec::new(),
            credentials: false,
            max_age: 0,
        }
    }

    pub fn origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = Some(origin.into());
        self
    }

    pub fn methods(mut self, methods: impl IntoIterator<Item = Method>) -> Self {
        self.methods = methods.into_iter().collect();
        self
    }

    pub fn allowed_headers<S: Into<String>>(mut self, headers: impl IntoIterator<Item = S>) -> Self {
        self.allowed_headers = headers.into_iter().map(Into::into).collect();
        self
    }

    pub fn exposed_headers<S: Into<String>>(mut self, headers: impl IntoIterator<Item = S>) -> Self {
        self.exposed_headers = headers.into_iter().map(Into::into).collect();
        self
    }

    pub fn credentials(mut self, credentials: bool) -> Self {
        self.credentials = credentials;
        self
    }

    pub fn max_age(mut self, seconds: u64) -> Self {
        self.max_age = seconds;
        self
    }

    /// Writes the configured headers onto `res`.
    pub fn apply(&self, res: &mut Response) {
        if let Some(origin) = &self.origin {
            res.set_header("Access-Control-Allow-Origin", origin.as_str());
        }
        if self.credentials {
            res.set_header("Access-Control-Allow-Credentials", "true");
        }
        if !self.exposed_headers.is_empty() {
            res.set_header("Access-Control-Expose-Headers", self.exposed_headers.join(","));
        }
        if !self.methods.is_empty() {
            let methods: Vec<&str> = self.methods.iter().map(|m| m.as_str()).collect();
            res.set_header("Access-Control-Allow-Methods", methods.join(","));
        }
        if !self.allowed_headers.is_empty() {
            res.set_header("Access-Control-Allow-Headers", self.allowed_headers.join(","));
        }
        if self.max_age > 0 {
            res.set_header("Access-Control-Max-Age", self.max_age.to_string());
        }
    }
}
