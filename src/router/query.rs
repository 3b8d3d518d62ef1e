//! Query-string parsing.

use std::borrow::Cow;
use std::collections::HashMap;

/// Parsed query string, keyed by decoded name.
pub type Query = HashMap<String, QueryValue>;

/// One query-string entry.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum QueryValue {
    /// `?q=test` → `Text("test")`.
    Text(String),
    /// `?flag` (or `?flag=`) → `Flag`.
    Flag,
}

impl QueryValue {
    /// The text value, or `None` for a bare flag.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            Self::Flag => None,
        }
    }

    pub fn is_flag(&self) -> bool {
        matches!(self, Self::Flag)
    }
}

/// Parses `a=1&b&c=x%20y`.
///
/// Pairs split on the first `=`; keys and values are percent-decoded, and
/// text that does not decode to UTF-8 is kept as written. Pairs with an
/// empty key are dropped. A repeated key keeps its last value.
pub fn parse(query: &str) -> Query {
    let mut out = Query::new();
    for pair in query.split('&') {
        let (key, value) = match pair.split_once('=') {
            Some((k, v)) => (k, Some(v)),
            None => (pair, None),
        };
        if key.is_empty() {
            continue;
        }
        let value = match value {
            Some(v) if !v.is_empty() => QueryValue::Text(decode(v)),
            _ => QueryValue::Flag,
        };
        out.insert(decode(key), value);
    }
    out
}

fn decode(raw: &str) -> String {
    urlencoding::decode(raw).map_or_else(|_| raw.to_owned(), Cow::into_owned)
}
