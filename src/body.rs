//! Request body parsing.
//!
//! The pipeline reads the whole body off the connection and hands it to a
//! [`BodyParser`] once, before any middleware runs. The result lands on the
//! [`Request`](crate::Request) as a [`Body`] plus the [`BodyType`] it was
//! classified as. A body that does not decode as its declared type fails
//! the request with 400 before any stage sees it.

use std::fmt;

use bytes::Bytes;

use crate::error::Error;

/// What kind of payload the request declared.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum BodyType {
    Binary,
    Csv,
    FormData,
    Json,
    Xml,
    Yaml,
}

impl BodyType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Binary   => "binary",
            Self::Csv      => "csv",
            Self::FormData => "formdata",
            Self::Json     => "json",
            Self::Xml      => "xml",
            Self::Yaml     => "yaml",
        }
    }
}

impl fmt::Display for BodyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A parsed request body.
#[derive(Clone, Debug, Default, PartialEq)]
pub enum Body {
    /// No `content-type` was sent.
    #[default]
    Empty,
    /// JSON, CSV, XML and YAML payloads, decoded into one value model.
    /// [`Request::body_type`](crate::Request::body_type) says which.
    Value(serde_json::Value),
    /// Form data and anything unrecognised.
    Bytes(Bytes),
}

/// The output of a [`BodyParser`].
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ParsedBody {
    pub body: Body,
    pub body_type: Option<BodyType>,
}

/// Turns raw request bytes into a [`ParsedBody`].
///
/// Replace the default with [`Server::parser`](crate::Server::parser) to
/// support other formats.
pub trait BodyParser: Send + Sync + 'static {
    fn parse(&self, content_type: Option<&str>, raw: Bytes) -> Result<ParsedBody, Error>;
}

/// Classifies by `content-type` and decodes the structured formats.
///
/// | Content type | Result |
/// |---|---|
/// | `application/json` | the JSON value |
/// | `text/csv`, `application/csv` | array of objects keyed by the header row |
/// | `application/xml`, `text/xml` | `{root: ..}`; attributes under `$`, text under `_`, children as arrays |
/// | `application/x-yaml`, `text/yaml` | the YAML document as a value |
/// | `multipart/form-data` | raw bytes |
/// | anything else | raw bytes, [`BodyType::Binary`] |
///
/// Empty or malformed structured bodies fail with [`Error::Parse`] (400).
#[derive(Clone, Copy, Debug, Default)]
pub struct DefaultParser;

impl BodyParser for DefaultParser {
    fn parse(&self, content_type: Option<&str>, raw: Bytes) -> Result<ParsedBody, Error> {
        let Some(content_type) = content_type.and_then(media_type) else {
            return Ok(ParsedBody::default());
        };

        let (body, body_type) = match content_type.as_str() {
            ct if ct.starts_with("multipart/form-data") => (Body::Bytes(raw), BodyType::FormData),
            "application/json"                          => (decode(&raw, BodyType::Json)?, BodyType::Json),
            "text/csv" | "application/csv"              => (decode(&raw, BodyType::Csv)?, BodyType::Csv),
            "application/xml" | "text/xml"              => (decode(&raw, BodyType::Xml)?, BodyType::Xml),
            "application/x-yaml" | "text/yaml"          => (decode(&raw, BodyType::Yaml)?, BodyType::Yaml),
            _                                           => (Body::Bytes(raw), BodyType::Binary),
        };

        Ok(ParsedBody { body, body_type: Some(body_type) })
    }
}

/// `"Application/JSON; charset=utf-8"` → `"application/json"`.
pub(crate) fn media_type(header: &str) -> Option<String> {
    let essence = header.split(';').next()?.trim();
    if essence.is_empty() {
        return None;
    }
    Some(essence.to_ascii_lowercase())
}

fn decode(raw: &[u8], body_type: BodyType) -> Result<Body, Error> {
    let invalid = |message: String| Error::Parse { body_type, message };

    let text = std::str::from_utf8(raw).map_err(|e| invalid(e.to_string()))?;
    if text.trim().is_empty() {
        return Err(invalid("empty body".into()));
    }

    let value: Result<serde_json::Value, String> = match body_type {
        BodyType::Json => serde_json::from_str(text).map_err(|e| e.to_string()),
        BodyType::Csv => csv_records(text).map_err(|e| e.to_string()),
        BodyType::Yaml => serde_yaml::from_str(text).map_err(|e| e.to_string()),
        BodyType::Xml => xml::document(text),
        BodyType::Binary | BodyType::FormData => return Ok(Body::Bytes(Bytes::copy_from_slice(raw))),
    };
    value.map(Body::Value).map_err(invalid)
}

/// One object per row, keyed by the header row. Blank lines are skipped
/// and every row must have as many fields as the header.
fn csv_records(text: &str) -> Result<serde_json::Value, csv::Error> {
    let mut reader = csv::ReaderBuilder::new().has_headers(true).from_reader(text.as_bytes());
    let headers = reader.headers()?.clone();

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        let row: serde_json::Map<String, serde_json::Value> = headers.iter()
            .zip(record.iter())
            .map(|(key, value)| (key.to_owned(), serde_json::Value::String(value.to_owned())))
            .collect();
        rows.push(serde_json::Value::Object(row));
    }
    Ok(serde_json::Value::Array(rows))
}

mod xml {
    use quick_xml::events::{BytesStart, Event};
    use quick_xml::Reader;
    use serde_json::{Map, Value};

    struct Element {
        name: String,
        attributes: Map<String, Value>,
        children: Map<String, Value>,
        text: String,
    }

    impl Element {
        fn open(start: &BytesStart<'_>) -> Result<Self, String> {
            let mut attributes = Map::new();
            for attr in start.attributes() {
                let attr = attr.map_err(|e| e.to_string())?;
                let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
                let value = attr.unescape_value().map_err(|e| e.to_string())?;
                attributes.insert(key, Value::String(value.into_owned()));
            }
            Ok(Self {
                name: String::from_utf8_lossy(start.name().as_ref()).into_owned(),
                attributes,
                children: Map::new(),
                text: String::new(),
            })
        }

        /// A bare string for text-only elements, an object otherwise.
        fn into_value(self) -> (String, Value) {
            if self.attributes.is_empty() && self.children.is_empty() {
                return (self.name, Value::String(self.text));
            }
            let mut object = Map::new();
            if !self.attributes.is_empty() {
                object.insert("$".to_owned(), Value::Object(self.attributes));
            }
            if !self.text.is_empty() {
                object.insert("_".to_owned(), Value::String(self.text));
            }
            object.extend(self.children);
            (self.name, Value::Object(object))
        }
    }

    /// Decodes a whole document. DOCTYPE declarations are skipped and
    /// entities other than the XML built-ins are rejected.
    pub(super) fn document(text: &str) -> Result<Value, String> {
        let mut reader = Reader::from_str(text);
        reader.config_mut().trim_text(true);

        let mut open: Vec<Element> = Vec::new();
        let mut root: Option<Value> = None;

        loop {
            match reader.read_event().map_err(|e| e.to_string())? {
                Event::Start(start) => {
                    if open.is_empty() && root.is_some() {
                        return Err("more than one root element".into());
                    }
                    open.push(Element::open(&start)?);
                }
                Event::Empty(start) => {
                    if open.is_empty() && root.is_some() {
                        return Err("more than one root element".into());
                    }
                    close(Element::open(&start)?, &mut open, &mut root);
                }
                Event::End(_) => {
                    let element = open.pop().ok_or("closing tag without an opening tag")?;
                    close(element, &mut open, &mut root);
                }
                Event::Text(t) => {
                    let t = t.unescape().map_err(|e| e.to_string())?;
                    match open.last_mut() {
                        Some(element) => element.text.push_str(&t),
                        None if t.trim().is_empty() => {}
                        None => return Err("text outside the root element".into()),
                    }
                }
                Event::CData(data) => {
                    let data = String::from_utf8_lossy(&data).into_owned();
                    match open.last_mut() {
                        Some(element) => element.text.push_str(&data),
                        None => return Err("CDATA outside the root element".into()),
                    }
                }
                Event::Eof => break,
                _ => {}
            }
        }

        if let Some(element) = open.last() {
            return Err(format!("unclosed element `{}`", element.name));
        }
        root.ok_or_else(|| "no root element".to_owned())
    }

    fn close(element: Element, open: &mut [Element], root: &mut Option<Value>) {
        let (name, value) = element.into_value();
        match open.last_mut() {
            Some(parent) => {
                if let Value::Array(siblings) = parent.children.entry(name).or_insert_with(|| Value::Array(Vec::new())) {
                    siblings.push(value);
                }
            }
            None => {
                let mut document = Map::new();
                document.insert(name, value);
                *root = Some(Value::Object(document));
            }
        }
    }
}
