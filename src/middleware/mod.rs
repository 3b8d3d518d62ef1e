//! Middleware stages and the two chain executors.
//!
//! A chain is an ordered list of [`Middleware`]. Each entry is explicitly
//! either a regular stage or an error stage; regular stages run on the
//! success path, error stages only while an error propagates.
//!
//! The same stage contract (see [`crate::handler`]) drives two executors
//! that differ on purpose:
//!
//! | | global chain | route chain |
//! |---|---|---|
//! | stage returns [`Flow::Done`](crate::Flow::Done) without ending the response | moves on | stops |
//! | error search starts at | the current position | the start of the list |
//! | no error stage found | handed to the top-level sink | re-raised to the caller |
//!
//! Both stop as soon as the response is finalized.

mod chain;

pub(crate) use chain::{Exit, run_global, run_route};

use crate::handler::{
    BoxedErrorHandler, BoxedHandler, ErrorHandler, ErrorHandlerFn, FnErrorHandler, FnHandler,
    Handler, HandlerFn,
};

/// One stage of a chain.
///
/// ```rust
/// use switchyard::{Error, Flow, Middleware, Request, Response, StatusCode};
///
/// async fn require_token(req: &mut Request, _res: &mut Response) -> Result<Flow, Error> {
///     match req.header("authorization") {
///         Some(_) => Ok(Flow::Next),
///         None => Err(Error::new(StatusCode::UNAUTHORIZED, "missing token")),
///     }
/// }
///
/// async fn unauthorized(err: Error, _req: &mut Request, res: &mut Response) {
///     res.error(err.status().unwrap_or(StatusCode::INTERNAL_SERVER_ERROR), &err.to_string(), None);
/// }
///
/// let chain = [Middleware::regular(require_token), Middleware::error(unauthorized)];
/// assert!(chain[1].is_error_handler());
/// ```
pub enum Middleware {
    Regular(BoxedHandler),
    Error(BoxedErrorHandler),
}

impl Middleware {
    /// A regular stage from an `async fn(&mut Request, &mut Response)`.
    pub fn regular<F>(f: F) -> Self
    where
        F: for<'a> HandlerFn<'a>,
    {
        Self::Regular(Box::new(FnHandler(f)))
    }

    /// An error stage from an `async fn(Error, &mut Request, &mut Response)`.
    pub fn error<F>(f: F) -> Self
    where
        F: for<'a> ErrorHandlerFn<'a>,
    {
        Self::Error(Box::new(FnErrorHandler(f)))
    }

    /// A regular stage from a type implementing [`Handler`].
    pub fn handler(handler: impl Handler) -> Self {
        Self::Regular(Box::new(handler))
    }

    /// An error stage from a type implementing [`ErrorHandler`].
    pub fn error_handler(handler: impl ErrorHandler) -> Self {
        Self::Error(Box::new(handler))
    }

    pub fn is_error_handler(&self) -> bool {
        matches!(self, Self::Error(_))
    }
}

impl std::fmt::Debug for Middleware {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Regular(_) => f.write_str("Middleware::Regular"),
            Self::Error(_) => f.write_str("Middleware::Error"),
        }
    }
}
