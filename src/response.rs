//! Outgoing HTTP response view.
//!
//! Stages write into a [`Response`] in place. [`Response::end`] is the single
//! terminal primitive: every convenience helper (`send`, `json`, `error`,
//! ...) funnels through it, and it is the only place that knows whether the
//! body should actually be kept. Once a response has ended it is
//! *finalized*: status, headers and body are frozen and further writes are
//! dropped.

use bytes::Bytes;
use http::header::{HeaderName, HeaderValue};
use http::StatusCode;
use http_body_util::Full;
use serde::Serialize;
use tracing::{debug, warn};

use crate::error::Error;

// ── ContentType ───────────────────────────────────────────────────────────────

/// Common content-type values for use with [`Response::bytes`].
#[derive(Clone, Copy, Debug)]
pub enum ContentType {
    Csv,          // text/csv
    Html,         // text/html; charset=utf-8
    Json,         // application/json
    OctetStream,  // application/octet-stream  (binary / file download)
    Text,         // text/plain; charset=utf-8
    Xml,          // application/xml
    Yaml,         // application/x-yaml
}

impl ContentType {
    fn as_str(self) -> &'static str {
        match self {
            Self::Csv         => "text/csv",
            Self::Html        => "text/html; charset=utf-8",
            Self::Json        => "application/json",
            Self::OctetStream => "application/octet-stream",
            Self::Text        => "text/plain; charset=utf-8",
            Self::Xml         => "application/xml",
            Self::Yaml        => "application/x-yaml",
        }
    }
}

// ── WriteMode ─────────────────────────────────────────────────────────────────

/// How [`Response::end`] treats body bytes.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub(crate) enum WriteMode {
    #[default]
    Full,
    /// HEAD: everything goes through except the body, whose length is
    /// remembered so `content-length` still matches the GET response.
    HeadersOnly { withheld: Option<usize> },
}

// ── Response ─────────────────────────────────────────────────────────────────

/// An outgoing HTTP response.
///
/// ```rust
/// use switchyard::{Response, StatusCode};
///
/// let mut res = Response::new();
/// res.status(StatusCode::CREATED)
///     .set_header("location", "/users/42")
///     .text("created");
///
/// assert!(res.is_finalized());
/// assert_eq!(res.status_code(), StatusCode::CREATED);
/// ```
#[derive(Debug, Default)]
pub struct Response {
    pub(crate) status: StatusCode,
    pub(crate) headers: Vec<(String, String)>,
    pub(crate) body: Bytes,
    finalized: bool,
    pub(crate) mode: WriteMode,
}

impl Response {
    /// A fresh, unfinalized `200 OK` with no headers.
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn set_headers_only(&mut self) {
        if !self.finalized {
            self.mode = WriteMode::HeadersOnly { withheld: None };
        }
    }

    pub fn status_code(&self) -> StatusCode { self.status }
    pub fn headers(&self) -> &[(String, String)] { &self.headers }
    pub fn body(&self) -> &[u8] { &self.body }

    /// `true` once the response has ended. Nothing can change it afterwards.
    pub fn is_finalized(&self) -> bool { self.finalized }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Sets the status code. Chainable.
    pub fn status(&mut self, code: StatusCode) -> &mut Self {
        if self.guard("status") {
            self.status = code;
        }
        self
    }

    /// Sets a header, replacing every existing value under the same
    /// case-insensitive name. Chainable.
    pub fn set_header(&mut self, name: &str, value: impl Into<String>) -> &mut Self {
        if !self.guard(name) {
            return self;
        }
        let value = value.into();
        match self.headers.iter().position(|(k, _)| k.eq_ignore_ascii_case(name)) {
            Some(first) => {
                self.headers[first].1 = value;
                let mut index = 0;
                self.headers.retain(|(k, _)| {
                    let keep = index <= first || !k.eq_ignore_ascii_case(name);
                    index += 1;
                    keep
                });
            }
            None => self.headers.push((name.to_owned(), value)),
        }
        self
    }

    /// Adds a header value, keeping any already set under that name, for
    /// headers such as `set-cookie` that may repeat. Chainable.
    pub fn append_header(&mut self, name: &str, value: impl Into<String>) -> &mut Self {
        if self.guard(name) {
            self.headers.push((name.to_owned(), value.into()));
        }
        self
    }

    /// Ends the response. The terminal write primitive.
    ///
    /// In headers-only mode the bytes are dropped and only their length is
    /// kept. Calling `end` on a finalized response does nothing.
    pub fn end(&mut self, body: impl Into<Bytes>) {
        if !self.guard("body") {
            return;
        }
        let body = body.into();
        match &mut self.mode {
            WriteMode::Full => self.body = body,
            WriteMode::HeadersOnly { withheld } => *withheld = Some(body.len()),
        }
        self.finalized = true;
    }

    // ── Enhancement helpers ──────────────────────────────────────────────────

    /// Ends with `body` as-is.
    pub fn send(&mut self, body: impl Into<Bytes>) {
        self.end(body);
    }

    /// Ends with a `text/plain; charset=utf-8` body.
    pub fn text(&mut self, body: impl Into<String>) {
        self.bytes(ContentType::Text, body.into());
    }

    /// Serialises `value` with `serde_json` and ends with `application/json`.
    pub fn json<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<(), Error> {
        let bytes = serde_json::to_vec(value)?;
        self.bytes(ContentType::Json, bytes);
        Ok(())
    }

    /// Ends with a typed body. Use this for XML, CSV, YAML, binary, etc.
    pub fn bytes(&mut self, content_type: ContentType, body: impl Into<Bytes>) {
        self.set_header("content-type", content_type.as_str());
        self.end(body);
    }

    /// Ends with `{"error":true,"code":..,"message":..,"details":..}`.
    pub fn error(&mut self, code: StatusCode, message: &str, details: Option<serde_json::Value>) {
        #[derive(Serialize)]
        struct Payload<'a> {
            error: bool,
            code: u16,
            message: &'a str,
            #[serde(skip_serializing_if = "Option::is_none")]
            details: Option<serde_json::Value>,
        }

        self.status(code);
        let payload = Payload { error: true, code: code.as_u16(), message, details };
        if let Err(e) = self.json(&payload) {
            warn!("error payload did not serialise: {e}");
            self.text(message.to_owned());
        }
    }

    /// Ends with a redirect to `location`.
    pub fn redirect(&mut self, code: StatusCode, location: &str) {
        self.status(code).set_header("location", location);
        self.end(Bytes::new());
    }

    /// Converts into the hyper response the transport sends.
    ///
    /// Headers that are not valid HTTP are skipped with a warning rather than
    /// failing the whole response.
    pub(crate) fn into_http(self) -> http::Response<Full<Bytes>> {
        let mut out = http::Response::new(Full::new(self.body));
        *out.status_mut() = self.status;

        let headers = out.headers_mut();
        for (name, value) in &self.headers {
            match (HeaderName::try_from(name.as_str()), HeaderValue::try_from(value.as_str())) {
                (Ok(n), Ok(v)) => {
                    headers.append(n, v);
                }
                _ => warn!(header = %name, "dropping invalid response header"),
            }
        }
        if let WriteMode::HeadersOnly { withheld: Some(len) } = self.mode {
            headers.insert(http::header::CONTENT_LENGTH, HeaderValue::from(len));
        }
        out
    }

    /// `true` if the write may proceed.
    fn guard(&self, what: &str) -> bool {
        if self.finalized {
            debug!(write = what, "ignoring write to a finalized response");
        }
        !self.finalized
    }
}
