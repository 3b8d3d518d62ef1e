//! The hyper transport in front of the pipeline.
//!
//! One task per connection, each feeding requests into
//! [`handle`](crate::handle). On a shutdown signal the accept loop stops
//! at once, then every connection task is awaited before
//! [`Server::serve`] returns. A connection that is mid-request when the
//! signal arrives still gets its answer, bounded by
//! [`Settings::request_timeout`].

use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use http::StatusCode;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::service::service_fn;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as ConnBuilder;
use tokio::net::TcpListener;
use tracing::{debug, error, info};

use crate::body::{BodyParser, DefaultParser, ParsedBody};
use crate::config::{ServerConfig, Settings};
use crate::error::Error;
use crate::method::Method;
use crate::pipeline::{Deadline, bounded, handle_until, report};
use crate::request::Request;
use crate::response::Response;
use crate::router::Router;

/// Binds an address and runs a [`Router`] on it.
pub struct Server {
    addr: SocketAddr,
    settings: Settings,
    parser: Arc<dyn BodyParser>,
}

/// Everything a connection task needs, shared behind one `Arc`.
struct Shared {
    router: Router,
    settings: Settings,
    parser: Arc<dyn BodyParser>,
}

impl Server {
    /// A server for `addr` with default [`Settings`] and the
    /// [`DefaultParser`].
    ///
    /// # Panics
    ///
    /// Panics on a malformed address.
    ///
    /// # Example
    ///
    /// ```rust,no_run
    /// use switchyard::Server;
    /// let server = Server::bind("127.0.0.1:8080");
    /// ```
    pub fn bind(addr: &str) -> Self {
        let addr: SocketAddr = addr.parse().expect("invalid socket address");
        Self::from_config(ServerConfig { addr, ..ServerConfig::default() })
    }

    /// A server using an already-loaded configuration, e.g. from
    /// [`ServerConfig::from_env`].
    pub fn from_config(config: ServerConfig) -> Self {
        Self { addr: config.addr, settings: config.settings, parser: Arc::new(DefaultParser) }
    }

    pub fn settings(mut self, settings: Settings) -> Self {
        self.settings = settings;
        self
    }

    /// Replaces the [`DefaultParser`].
    pub fn parser(mut self, parser: impl BodyParser) -> Self {
        self.parser = Arc::new(parser);
        self
    }

    /// Binds the configured address and serves `router` until SIGTERM or
    /// Ctrl-C, then drains open connections.
    pub async fn serve(self, router: Router) -> Result<(), Error> {
        self.serve_with_shutdown(router, shutdown_signal()).await
    }

    /// Like [`serve`](Server::serve), but shuts down when `signal` resolves.
    pub async fn serve_with_shutdown(
        self,
        router: Router,
        signal: impl Future<Output = ()>,
    ) -> Result<(), Error> {
        let listener = TcpListener::bind(self.addr).await?;
        self.serve_listener(listener, router, signal).await
    }

    /// Serves on a listener the caller already bound. The configured address
    /// is ignored.
    pub async fn serve_listener(
        self,
        listener: TcpListener,
        router: Router,
        signal: impl Future<Output = ()>,
    ) -> Result<(), Error> {
        let shared = Arc::new(Shared { router, settings: self.settings, parser: self.parser });

        let addr = listener.local_addr()?;
        info!(addr = %addr, "switchyard listening");

        // Every spawned connection task, so shutdown can wait for them.
        let mut tasks = tokio::task::JoinSet::new();

        tokio::pin!(signal);

        loop {
            tokio::select! {
                // Check shutdown first so a SIGTERM stops accepting at once,
                // even if more connections are queued.
                biased;

                () = &mut signal => {
                    info!(open_connections = tasks.len(), "stopping, waiting for open connections");
                    break;
                }

                res = listener.accept() => {
                    let (stream, remote_addr) = match res {
                        Ok(v) => v,
                        Err(e) => {
                            error!(error = %e, "failed to accept connection");
                            continue;
                        }
                    };

                    let shared = Arc::clone(&shared);
                    let io = TokioIo::new(stream);

                    tasks.spawn(async move {
                        // Called once per request on the connection.
                        let svc = service_fn(move |req| {
                            let shared = Arc::clone(&shared);
                            async move { dispatch(shared, req).await }
                        });

                        if let Err(e) = ConnBuilder::new(TokioExecutor::new())
                            .serve_connection(io, svc)
                            .await
                        {
                            debug!(peer = %remote_addr, error = %e, "connection closed with error");
                        }
                    });
                }

                // Reap finished tasks so the set does not grow without bound.
                Some(_) = tasks.join_next(), if !tasks.is_empty() => {}
            }
        }

        while tasks.join_next().await.is_some() {}

        info!("switchyard stopped");
        Ok(())
    }
}

// ── Request dispatch ──────────────────────────────────────────────────────────

/// Turns one hyper request into one hyper response.
///
/// Every failure is rendered into the response, so hyper never sees an error.
async fn dispatch(
    shared: Arc<Shared>,
    req: hyper::Request<Incoming>,
) -> Result<http::Response<Full<Bytes>>, Infallible> {
    let started = Instant::now();
    let mut response = Response::new();

    let Ok(method) = Method::try_from(req.method()) else {
        debug!(method = %req.method(), "rejecting unknown method");
        response.status(StatusCode::METHOD_NOT_ALLOWED).text("Method Not Allowed");
        return Ok(response.into_http());
    };

    let (parts, body) = req.into_parts();
    let url = parts.uri.path_and_query().map_or_else(|| parts.uri.path(), |pq| pq.as_str());
    let mut request = Request::new(method, url);
    request.headers = parts.headers.iter()
        .filter_map(|(name, value)| match value.to_str() {
            Ok(value) => Some((name.as_str().to_owned(), value.to_owned())),
            Err(_) => {
                debug!(header = %name, "dropping request header that is not visible ASCII");
                None
            }
        })
        .collect();

    // The deadline covers reading the body too.
    let deadline = Deadline::start(&shared.settings);
    let parsed = bounded(deadline, read_body(shared.parser.as_ref(), request.header("content-type"), body)).await;
    match parsed {
        Ok(parsed) => {
            request.set_body(parsed);
            handle_until(&shared.router, &shared.settings, deadline, &mut request, &mut response).await;
        }
        Err(err) => report(&err, &request, &mut response, shared.settings.environment),
    }

    debug!(
        method = %method,
        path = request.path(),
        status = response.status_code().as_u16(),
        elapsed_us = started.elapsed().as_micros() as u64,
        "request complete"
    );
    Ok(response.into_http())
}

async fn read_body(
    parser: &dyn BodyParser,
    content_type: Option<&str>,
    body: Incoming,
) -> Result<ParsedBody, Error> {
    let raw = body.collect().await?.to_bytes();
    parser.parse(content_type, raw)
}

// ── Shutdown signal ───────────────────────────────────────────────────────────

/// SIGTERM or SIGINT on Unix, Ctrl-C elsewhere. A handler that cannot be
/// installed is logged and never fires.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("failed to listen for Ctrl-C: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let sigterm = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    // No SIGTERM off Unix.
    #[cfg(not(unix))]
    let sigterm = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c   => {}
        () = sigterm  => {}
    }
}
