//! Unified error type.

use std::any::Any;
use std::time::Duration;

use http::StatusCode;

use crate::body::BodyType;

/// The error type flowing through the dispatch pipeline.
///
/// Stages return it to signal failure, error stages receive it, and the
/// top-level sink renders whatever nobody recovered. Variants that map to a
/// client-facing outcome carry a suggested status via [`Error::status`].
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Binding, accepting, or another socket-level failure.
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    /// An environment variable or setting could not be used.
    #[error("config: {0}")]
    Config(String),

    /// Reading the request body off the connection failed.
    #[error("transport: {0}")]
    Hyper(#[from] hyper::Error),

    /// An application error with an explicit status.
    #[error("{message}")]
    Status { status: StatusCode, message: String },

    /// The request body did not match its declared content type.
    #[error("invalid {body_type} body: {message}")]
    Parse { body_type: BodyType, message: String },

    #[error("json: {0}")]
    Json(#[from] serde_json::Error),

    /// The request outlived its deadline.
    #[error("request exceeded its deadline of {0:?}")]
    Timeout(Duration),

    /// A stage panicked while handling the request.
    #[error("handler panicked: {0}")]
    Panic(String),

    #[error(transparent)]
    Other(Box<dyn std::error::Error + Send + Sync + 'static>),
}

impl Error {
    /// An error that should be reported with `status`.
    ///
    /// ```rust
    /// use switchyard::{Error, StatusCode};
    ///
    /// let err = Error::new(StatusCode::FORBIDDEN, "not your account");
    /// assert_eq!(err.status(), Some(StatusCode::FORBIDDEN));
    /// ```
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self::Status { status, message: message.into() }
    }

    /// Wraps any other error; reported as `500`.
    pub fn other(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Other(Box::new(err))
    }

    /// The status the top-level sink should answer with, if the error
    /// suggests one. `None` means `500 Internal Server Error`.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Self::Status { status, .. } => Some(*status),
            Self::Parse { .. } => Some(StatusCode::BAD_REQUEST),
            Self::Timeout(_) => Some(StatusCode::SERVICE_UNAVAILABLE),
            _ => None,
        }
    }

    pub(crate) fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_owned()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "non-string panic payload".to_owned()
        };
        Self::Panic(message)
    }
}
