//! Stage traits and type erasure.
//!
//! # What a stage returns
//!
//! Every stage, regular or error-handling, reports how it finished by
//! returning an [`Outcome`]:
//!
//! | Return | Meaning |
//! |---|---|
//! | `Ok(Flow::Next)` | hand control to the next stage |
//! | `Ok(Flow::Done)` | finished without handing on |
//! | `Err(err)` | something failed; the executor looks for an error stage |
//!
//! Because the signal is a return value, a stage cannot hand on twice.
//!
//! # How async functions are stored
//!
//! Chains hold stages of different concrete types, so each one is boxed
//! behind [`Handler`] or [`ErrorHandler`]. A plain `async fn` gets there via
//! the [`HandlerFn`] / [`ErrorHandlerFn`] blanket impls:
//!
//! ```text
//! async fn auth(req: &mut Request, res: &mut Response) -> Flow { … }
//!        ↓ Middleware::regular(auth)
//! Box::new(FnHandler(auth))                 ← implements Handler
//!        ↓ at request time
//! handler.call(req, res)                    ← one vtable dispatch
//!        ↓
//! Box::pin(async { auth(req, res).await.into_outcome() })
//! ```
//!
//! Types that carry state implement [`Handler`] directly.

use std::future::Future;
use std::pin::Pin;

use crate::error::Error;
use crate::request::Request;
use crate::response::Response;

/// A heap-allocated, type-erased future borrowing the request for `'a`.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// How a stage finished.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Flow {
    /// Continue with the next stage.
    Next,
    /// Return without handing on. Whether the chain keeps going depends on
    /// which executor runs it; see [`crate::middleware`].
    Done,
}

/// A stage's completion signal.
pub type Outcome = Result<Flow, Error>;

// ── IntoOutcome ───────────────────────────────────────────────────────────────

/// Conversion of a stage's return value into an [`Outcome`].
///
/// `()` means [`Flow::Done`], so handlers that only write a response need
/// not name a flow at all.
pub trait IntoOutcome {
    fn into_outcome(self) -> Outcome;
}

impl IntoOutcome for Flow {
    fn into_outcome(self) -> Outcome { Ok(self) }
}

impl IntoOutcome for () {
    fn into_outcome(self) -> Outcome { Ok(Flow::Done) }
}

impl IntoOutcome for Result<Flow, Error> {
    fn into_outcome(self) -> Outcome { self }
}

impl IntoOutcome for Result<(), Error> {
    fn into_outcome(self) -> Outcome { self.map(|()| Flow::Done) }
}

// ── Object-safe stage traits ──────────────────────────────────────────────────

/// A regular stage: `(req, res) -> Outcome`.
///
/// ```rust
/// use switchyard::{BoxFuture, Flow, Handler, Outcome, Request, Response};
///
/// struct Tag(&'static str);
///
/// impl Handler for Tag {
///     fn call<'a>(&'a self, _req: &'a mut Request, res: &'a mut Response) -> BoxFuture<'a, Outcome> {
///         Box::pin(async move {
///             res.set_header("x-tag", self.0);
///             Ok(Flow::Next)
///         })
///     }
/// }
/// ```
pub trait Handler: Send + Sync + 'static {
    fn call<'a>(&'a self, req: &'a mut Request, res: &'a mut Response) -> BoxFuture<'a, Outcome>;
}

/// An error-handling stage: `(err, req, res) -> Outcome`.
///
/// Runs only while an error is propagating. `Ok(_)` means the error is
/// recovered and the chain ends; `Err(_)` passes an error further along.
pub trait ErrorHandler: Send + Sync + 'static {
    fn call<'a>(
        &'a self,
        err: Error,
        req: &'a mut Request,
        res: &'a mut Response,
    ) -> BoxFuture<'a, Outcome>;
}

pub(crate) type BoxedHandler = Box<dyn Handler>;
pub(crate) type BoxedErrorHandler = Box<dyn ErrorHandler>;

// ── Function adapters ─────────────────────────────────────────────────────────

/// Implemented for every `async fn(&mut Request, &mut Response) -> R` where
/// `R: IntoOutcome`. You never implement this yourself.
///
/// The lifetime parameter lets the returned future borrow the request and
/// response, which a plain `Fn(..) -> Fut` bound cannot express.
pub trait HandlerFn<'a>: Send + Sync + 'static {
    type Output: IntoOutcome;
    type Future: Future<Output = Self::Output> + Send + 'a;

    fn invoke(&self, req: &'a mut Request, res: &'a mut Response) -> Self::Future;
}

impl<'a, F, Fut> HandlerFn<'a> for F
where
    F: Fn(&'a mut Request, &'a mut Response) -> Fut + Send + Sync + 'static,
    Fut: Future + Send + 'a,
    Fut::Output: IntoOutcome,
{
    type Output = Fut::Output;
    type Future = Fut;

    fn invoke(&self, req: &'a mut Request, res: &'a mut Response) -> Fut {
        self(req, res)
    }
}

/// Implemented for every `async fn(Error, &mut Request, &mut Response) -> R`
/// where `R: IntoOutcome`.
pub trait ErrorHandlerFn<'a>: Send + Sync + 'static {
    type Output: IntoOutcome;
    type Future: Future<Output = Self::Output> + Send + 'a;

    fn invoke(&self, err: Error, req: &'a mut Request, res: &'a mut Response) -> Self::Future;
}

impl<'a, F, Fut> ErrorHandlerFn<'a> for F
where
    F: Fn(Error, &'a mut Request, &'a mut Response) -> Fut + Send + Sync + 'static,
    Fut: Future + Send + 'a,
    Fut::Output: IntoOutcome,
{
    type Output = Fut::Output;
    type Future = Fut;

    fn invoke(&self, err: Error, req: &'a mut Request, res: &'a mut Response) -> Fut {
        self(err, req, res)
    }
}

/// Newtype bridging a typed function to the [`Handler`] trait object.
pub(crate) struct FnHandler<F>(pub(crate) F);

impl<F> Handler for FnHandler<F>
where
    F: for<'a> HandlerFn<'a>,
{
    fn call<'a>(&'a self, req: &'a mut Request, res: &'a mut Response) -> BoxFuture<'a, Outcome> {
        let fut = self.0.invoke(req, res);
        Box::pin(async move { fut.await.into_outcome() })
    }
}

/// Newtype bridging a typed function to the [`ErrorHandler`] trait object.
pub(crate) struct FnErrorHandler<F>(pub(crate) F);

impl<F> ErrorHandler for FnErrorHandler<F>
where
    F: for<'a> ErrorHandlerFn<'a>,
{
    fn call<'a>(
        &'a self,
        err: Error,
        req: &'a mut Request,
        res: &'a mut Response,
    ) -> BoxFuture<'a, Outcome> {
        let fut = self.0.invoke(err, req, res);
        Box::pin(async move { fut.await.into_outcome() })
    }
}
