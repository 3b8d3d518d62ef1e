//! Chain executors.

use std::panic::AssertUnwindSafe;

use futures::FutureExt;
use tracing::debug;

use crate::error::Error;
use crate::handler::{ErrorHandler, Flow, Handler, Outcome};
use crate::middleware::Middleware;
use crate::request::Request;
use crate::response::Response;

/// How a global chain run ended.
#[derive(Debug)]
pub(crate) enum Exit {
    /// Every stage handed on; the caller continues with route resolution.
    Exhausted,
    /// The response was finalized, or an error stage recovered.
    Stopped,
    /// An error no stage recovered.
    Failed(Error),
}

/// Runs the global chain.
///
/// A regular stage that returns [`Flow::Done`] without finalizing the
/// response is treated as if it had returned [`Flow::Next`]. The route
/// chain does not do this; see [`run_route`].
pub(crate) async fn run_global(chain: &[Middleware], req: &mut Request, res: &mut Response) -> Exit {
    let mut cursor = 0;
    while let Some(stage) = chain.get(cursor) {
        cursor += 1;
        let Middleware::Regular(handler) = stage else {
            continue;
        };

        match invoke(handler.as_ref(), req, res).await {
            Ok(_) if res.is_finalized() => return Exit::Stopped,
            Ok(Flow::Next) => {}
            Ok(Flow::Done) => debug!(stage = cursor - 1, "stage returned without handing on, advancing"),
            Err(err) => return recover_from(chain, cursor, err, req, res).await,
        }
    }
    Exit::Exhausted
}

/// Error path of the global chain: error stages at or after `cursor`, in
/// order, until one recovers.
async fn recover_from(
    chain: &[Middleware],
    mut cursor: usize,
    mut err: Error,
    req: &mut Request,
    res: &mut Response,
) -> Exit {
    loop {
        let Some((position, handler)) = first_error_stage(chain, cursor) else {
            return Exit::Failed(err);
        };
        cursor = position + 1;

        debug!(stage = position, error = %err, "running error stage");
        match invoke_error(handler, err, req, res).await {
            Ok(_) => return Exit::Stopped,
            Err(next) => err = next,
        }
    }
}

/// Runs a matched route's handler list.
///
/// Stops when a stage returns [`Flow::Done`], when the response is
/// finalized, or at the end of the list. An error goes to the first error
/// stage anywhere in the list; without one it is returned to the caller.
pub(crate) async fn run_route(
    handlers: &[Middleware],
    req: &mut Request,
    res: &mut Response,
) -> Result<(), Error> {
    for (position, stage) in handlers.iter().enumerate() {
        let Middleware::Regular(handler) = stage else {
            continue;
        };

        match invoke(handler.as_ref(), req, res).await {
            Ok(_) if res.is_finalized() => return Ok(()),
            Ok(Flow::Next) => {}
            Ok(Flow::Done) => {
                debug!(stage = position, "route stage returned without handing on, chain stops");
                return Ok(());
            }
            Err(err) => {
                return match first_error_stage(handlers, 0) {
                    Some((_, handler)) => invoke_error(handler, err, req, res).await.map(drop),
                    None => Err(err),
                };
            }
        }
    }
    Ok(())
}

fn first_error_stage(chain: &[Middleware], from: usize) -> Option<(usize, &dyn ErrorHandler)> {
    chain.iter().enumerate().skip(from).find_map(|(i, stage)| match stage {
        Middleware::Error(handler) => Some((i, handler.as_ref())),
        Middleware::Regular(_) => None,
    })
}

/// Runs a regular stage, turning a panic into an error.
async fn invoke(handler: &dyn Handler, req: &mut Request, res: &mut Response) -> Outcome {
    AssertUnwindSafe(async move { handler.call(req, res).await })
        .catch_unwind()
        .await
        .unwrap_or_else(|payload| Err(Error::from_panic(payload)))
}

async fn invoke_error(
    handler: &dyn ErrorHandler,
    err: Error,
    req: &mut Request,
    res: &mut Response,
) -> Outcome {
    AssertUnwindSafe(async move { handler.call(err, req, res).await })
        .catch_unwind()
        .await
        .unwrap_or_else(|payload| Err(Error::from_panic(payload)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::BoxFuture;
    use crate::method::Method;
    use http::StatusCode;

    type Trace = Vec<&'static str>;

    fn record(req: &mut Request, name: &'static str) {
        match req.extensions_mut().get_mut::<Trace>() {
            Some(trace) => trace.push(name),
            None => {
                req.extensions_mut().insert(vec![name]);
            }
        }
    }

    fn trace(req: &Request) -> Trace {
        req.extensions().get::<Trace>().cloned().unwrap_or_default()
    }

    #[derive(Clone, Copy)]
    enum Act {
        Next,
        Done,
        End,
        EndThenNext,
        Fail,
        Panic,
    }

    struct Step(&'static str, Act);

    impl Handler for Step {
        fn call<'a>(&'a self, req: &'a mut Request, res: &'a mut Response) -> BoxFuture<'a, Outcome> {
            Box::pin(async move {
                record(req, self.0);
                match self.1 {
                    Act::Next => Ok(Flow::Next),
                    Act::Done => Ok(Flow::Done),
                    Act::End => {
                        res.text(self.0);
                        Ok(Flow::Done)
                    }
                    Act::EndThenNext => {
                        res.text(self.0);
                        Ok(Flow::Next)
                    }
                    Act::Fail => Err(Error::new(StatusCode::BAD_REQUEST, self.0)),
                    Act::Panic => panic!("{} exploded", self.0),
                }
            })
        }
    }

    /// Recovers by writing the error message, or rethrows when `rethrow`.
    struct Catch(&'static str, bool);

    impl ErrorHandler for Catch {
        fn call<'a>(
            &'a self,
            err: Error,
            req: &'a mut Request,
            res: &'a mut Response,
        ) -> BoxFuture<'a, Outcome> {
            Box::pin(async move {
                record(req, self.0);
                if self.1 {
                    return Err(Error::new(StatusCode::CONFLICT, format!("{} after {err}", self.0)));
                }
                res.status(err.status().unwrap_or(StatusCode::INTERNAL_SERVER_ERROR))
                    .text(err.to_string());
                Ok(Flow::Done)
            })
        }
    }

    fn step(name: &'static str, act: Act) -> Middleware {
        Middleware::handler(Step(name, act))
    }

    fn catch(name: &'static str) -> Middleware {
        Middleware::error_handler(Catch(name, false))
    }

    fn rethrow(name: &'static str) -> Middleware {
        Middleware::error_handler(Catch(name, true))
    }

    fn fresh() -> (Request, Response) {
        (Request::new(Method::Get, "/"), Response::new())
    }

    // ── global chain ─────────────────────────────────────────────────────────

    #[tokio::test]
    async fn global_runs_every_stage_once_in_order() {
        let chain = [step("a", Act::Next), step("b", Act::Next), step("c", Act::Next), step("end", Act::End)];
        let (mut req, mut res) = fresh();

        let exit = run_global(&chain, &mut req, &mut res).await;

        assert!(matches!(exit, Exit::Stopped));
        assert_eq!(trace(&req), ["a", "b", "c", "end"]);
        assert_eq!(res.body(), b"end");
    }

    #[tokio::test]
    async fn global_exhausts_into_the_final_handler() {
        let chain = [step("a", Act::Next), step("b", Act::Next)];
        let (mut req, mut res) = fresh();

        assert!(matches!(run_global(&chain, &mut req, &mut res).await, Exit::Exhausted));
        assert!(!res.is_finalized());
    }

    #[tokio::test]
    async fn global_empty_chain_is_exhausted() {
        let (mut req, mut res) = fresh();
        assert!(matches!(run_global(&[], &mut req, &mut res).await, Exit::Exhausted));
    }

    #[tokio::test]
    async fn global_advances_past_done_without_finalizing() {
        let chain = [step("forgetful", Act::Done), step("next", Act::Next)];
        let (mut req, mut res) = fresh();

        assert!(matches!(run_global(&chain, &mut req, &mut res).await, Exit::Exhausted));
        assert_eq!(trace(&req), ["forgetful", "next"]);
    }

    #[tokio::test]
    async fn global_never_advances_after_finalizing() {
        let chain = [step("ends", Act::EndThenNext), step("unreachable", Act::Next)];
        let (mut req, mut res) = fresh();

        assert!(matches!(run_global(&chain, &mut req, &mut res).await, Exit::Stopped));
        assert_eq!(trace(&req), ["ends"]);
    }

    #[tokio::test]
    async fn global_skips_error_stages_on_success() {
        let chain = [step("a", Act::Next), catch("skipped"), step("b", Act::Next)];
        let (mut req, mut res) = fresh();

        assert!(matches!(run_global(&chain, &mut req, &mut res).await, Exit::Exhausted));
        assert_eq!(trace(&req), ["a", "b"]);
    }

    #[tokio::test]
    async fn global_error_reaches_first_error_stage_after_it() {
        let chain = [
            catch("before"),
            step("a", Act::Next),
            step("boom", Act::Fail),
            step("skipped", Act::Next),
            catch("after"),
            catch("later"),
        ];
        let (mut req, mut res) = fresh();

        assert!(matches!(run_global(&chain, &mut req, &mut res).await, Exit::Stopped));
        assert_eq!(trace(&req), ["a", "boom", "after"]);
        assert_eq!(res.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(res.body(), b"boom");
    }

    #[tokio::test]
    async fn global_error_stages_chain_when_they_fail() {
        let chain = [step("boom", Act::Fail), rethrow("first"), step("skipped", Act::Next), catch("second")];
        let (mut req, mut res) = fresh();

        assert!(matches!(run_global(&chain, &mut req, &mut res).await, Exit::Stopped));
        assert_eq!(trace(&req), ["boom", "first", "second"]);
        assert_eq!(res.status_code(), StatusCode::CONFLICT);
        assert_eq!(res.body(), b"first after boom");
    }

    #[tokio::test]
    async fn global_unrecovered_error_reaches_the_final_handler() {
        let chain = [catch("too early"), step("boom", Act::Fail), step("skipped", Act::Next)];
        let (mut req, mut res) = fresh();

        let Exit::Failed(err) = run_global(&chain, &mut req, &mut res).await else {
            panic!("expected the error to escape");
        };
        assert_eq!(err.to_string(), "boom");
        assert_eq!(trace(&req), ["boom"]);
    }

    #[tokio::test]
    async fn global_last_error_stage_failing_escapes() {
        let chain = [step("boom", Act::Fail), rethrow("only")];
        let (mut req, mut res) = fresh();

        let Exit::Failed(err) = run_global(&chain, &mut req, &mut res).await else {
            panic!("expected the error to escape");
        };
        assert_eq!(err.status(), Some(StatusCode::CONFLICT));
    }

    #[tokio::test]
    async fn global_panics_are_errors() {
        let chain = [step("bad", Act::Panic), catch("catcher")];
        let (mut req, mut res) = fresh();

        assert!(matches!(run_global(&chain, &mut req, &mut res).await, Exit::Stopped));
        assert_eq!(res.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(res.body(), b"handler panicked: bad exploded");
    }

    async fn slow_stamp(req: &mut Request, _res: &mut Response) -> Flow {
        tokio::task::yield_now().await;
        record(req, "slow");
        Flow::Next
    }

    async fn slow_reply(req: &mut Request, res: &mut Response) {
        tokio::task::yield_now().await;
        record(req, "reply");
        res.text("async");
    }

    #[tokio::test]
    async fn global_async_functions_suspend_and_resume() {
        let chain = [Middleware::regular(slow_stamp), Middleware::regular(slow_reply), step("no", Act::Next)];
        let (mut req, mut res) = fresh();

        assert!(matches!(run_global(&chain, &mut req, &mut res).await, Exit::Stopped));
        assert_eq!(trace(&req), ["slow", "reply"]);
        assert_eq!(res.body(), b"async");
    }

    // ── route chain ──────────────────────────────────────────────────────────

    #[tokio::test]
    async fn route_done_without_finalizing_halts_silently() {
        let handlers = [step("quiet", Act::Done), step("never", Act::End)];
        let (mut req, mut res) = fresh();

        run_route(&handlers, &mut req, &mut res).await.unwrap();

        assert_eq!(trace(&req), ["quiet"]);
        assert!(!res.is_finalized());
    }

    #[tokio::test]
    async fn route_runs_through_next() {
        let handlers = [step("auth", Act::Next), catch("idle"), step("reply", Act::End)];
        let (mut req, mut res) = fresh();

        run_route(&handlers, &mut req, &mut res).await.unwrap();
        assert_eq!(trace(&req), ["auth", "reply"]);
        assert_eq!(res.body(), b"reply");
    }

    #[tokio::test]
    async fn route_error_searches_the_whole_list() {
        let handlers = [catch("first"), step("boom", Act::Fail), catch("second")];
        let (mut req, mut res) = fresh();

        run_route(&handlers, &mut req, &mut res).await.unwrap();
        assert_eq!(trace(&req), ["boom", "first"]);
        assert_eq!(res.status_code(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn route_error_without_error_stage_is_reraised() {
        let handlers = [step("boom", Act::Fail), step("never", Act::End)];
        let (mut req, mut res) = fresh();

        let err = run_route(&handlers, &mut req, &mut res).await.unwrap_err();
        assert_eq!(err.to_string(), "boom");
        assert_eq!(trace(&req), ["boom"]);
    }

    #[tokio::test]
    async fn route_failing_error_stage_is_reraised() {
        let handlers = [step("boom", Act::Fail), rethrow("first"), catch("never")];
        let (mut req, mut res) = fresh();

        let err = run_route(&handlers, &mut req, &mut res).await.unwrap_err();
        assert_eq!(err.to_string(), "first after boom");
        assert_eq!(trace(&req), ["boom", "first"]);
    }
}
