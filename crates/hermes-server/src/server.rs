//! The HTTP/1.1 transport.
//!
//! Each accepted connection goes through:
//!
//! 1. PROXY header, if configured ([`crate::proxy`])
//! 2. hyper's HTTP/1.1 codec, with keep-alive per configuration
//! 3. per request: in-flight limit (503), declared body size (413 and
//!    close), client resolution ([`crate::forwarded`]), then the pipeline
//! 4. idle watchdog: closed gracefully once no request has been active for
//!    the idle timeout
//!
//! # Example
//!
//! ```rust,no_run
//! use hermes_pipeline::PipelineBuilder;
//! use hermes_server::{Server, ServerConfig};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let pipeline = PipelineBuilder::new().build()?;
//! let config = ServerConfig::builder().http_addr("0.0.0.0:8080").build();
//!
//! Server::new(config, pipeline).run().await?;
//! # Ok(())
//! # }
//! ```

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use hermes_core::{BoxBody, PipelineError, Request, RequestId, Response, ResponseBody};
use hermes_pipeline::{Pipeline, REQUEST_ID_HEADER};
use hermes_telemetry::metrics;
use http::header::{HeaderMap, HeaderValue, CONTENT_LENGTH, CONTENT_TYPE};
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use parking_lot::Mutex;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::time::Instant;

use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};
use crate::forwarded;
use crate::proxy::{self, ProxyError, ProxyHeader, Rewind};
use crate::shutdown::{ConnectionTracker, ShutdownSignal};

/// Response type handed to hyper.
pub type HttpResponse = http::Response<BoxBody>;

const PROBLEM_JSON: &str = "application/problem+json";

/// The Hermes HTTP server. Cheap to clone.
#[derive(Clone)]
pub struct Server {
    inner: Arc<Shared>,
}

struct Shared {
    config: ServerConfig,
    pipeline: Pipeline,
    in_flight: Option<Arc<Semaphore>>,
    connections: Option<Arc<Semaphore>>,
}

impl std::fmt::Debug for Server {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Server")
            .field("config", &self.inner.config)
            .field("routes", &self.inner.pipeline.route_count())
            .finish_non_exhaustive()
    }
}

impl Server {
    /// Creates a server that runs `pipeline` for every request.
    #[must_use]
    pub fn new(config: ServerConfig, pipeline: Pipeline) -> Self {
        let in_flight = config.max_in_flight().map(|n| Arc::new(Semaphore::new(n)));
        let connections = config
            .max_connections()
            .map(|n| Arc::new(Semaphore::new(n)));
        Self {
            inner: Arc::new(Shared {
                config,
                pipeline,
                in_flight,
                connections,
            }),
        }
    }

    /// The server configuration.
    #[must_use]
    pub fn config(&self) -> &ServerConfig {
        &self.inner.config
    }

    /// The pipeline requests run through.
    #[must_use]
    pub fn pipeline(&self) -> &Pipeline {
        &self.inner.pipeline
    }

    /// Runs until SIGTERM or SIGINT.
    pub async fn run(self) -> ServerResult<()> {
        let shutdown = ShutdownSignal::with_os_signals();
        self.run_with_shutdown(shutdown).await
    }

    /// Binds the configured address and runs until `shutdown` triggers.
    pub async fn run_with_shutdown(self, shutdown: ShutdownSignal) -> ServerResult<()> {
        let http_addr = self.inner.config.http_addr();
        let addr = self
            .inner
            .config
            .socket_addr()
            .map_err(|e| ServerError::InvalidAddress {
                addr: http_addr.to_string(),
                reason: e.to_string(),
            })?;

        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| ServerError::Bind { addr, source })?;

        self.serve(listener, shutdown).await
    }

    /// Accepts connections from `listener` until `shutdown` triggers, then
    /// waits up to the shutdown timeout for open connections to finish.
    pub async fn serve(self, listener: TcpListener, shutdown: ShutdownSignal) -> ServerResult<()> {
        let local = listener.local_addr()?;
        tracing::info!(
            addr = %local,
            proxy_protocol = ?self.inner.config.proxy_protocol(),
            "server listening"
        );

        let tracker = ConnectionTracker::new();

        loop {
            let permit = match &self.inner.connections {
                Some(limit) => tokio::select! {
                    permit = Arc::clone(limit).acquire_owned() => permit.ok(),
                    () = shutdown.recv() => break,
                },
                None => None,
            };

            tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        if let Err(e) = stream.set_nodelay(true) {
                            tracing::debug!(peer = %peer, error = %e, "failed to set TCP_NODELAY");
                        }
                        let server = self.clone();
                        let token = tracker.acquire();
                        let shutdown = shutdown.clone();

                        tokio::spawn(async move {
                            let _permit = permit;
                            if let Err(e) = server.serve_connection(stream, peer, shutdown).await {
                                log_connection_error(peer, &e);
                            }
                            drop(token);
                        });
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "failed to accept connection");
                        tokio::time::sleep(Duration::from_millis(50)).await;
                    }
                },
                () = shutdown.recv() => break,
            }
        }

        let timeout = self.inner.config.shutdown_timeout();
        tracing::info!(
            connections = tracker.active_connections(),
            timeout = ?timeout,
            "shutdown requested, draining connections"
        );
        if tracker.drain(timeout).await {
            tracing::info!("all connections closed");
        } else {
            tracing::warn!(
                connections = tracker.active_connections(),
                "shutdown timeout reached with connections still open"
            );
        }

        tracing::info!("server stopped");
        Ok(())
    }

    /// Serves one connection until the peer closes it, it idles out, or
    /// `shutdown` triggers.
    ///
    /// `peer` is the socket peer; the PROXY header, when present, names
    /// the client.
    pub async fn serve_connection<IO>(
        &self,
        mut io: IO,
        peer: SocketAddr,
        shutdown: ShutdownSignal,
    ) -> ServerResult<()>
    where
        IO: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let config = &self.inner.config;
        let header_timeout = config.proxy_header_timeout();
        let (header, leftover) = tokio::time::timeout(
            header_timeout,
            proxy::read_header(&mut io, config.proxy_protocol()),
        )
        .await
        .map_err(|_| ProxyError::Timeout(header_timeout))??;

        if let Some(header) = &header {
            tracing::debug!(
                peer = %peer,
                client = ?header.source,
                version = ?header.version,
                "proxy header accepted"
            );
        }

        let activity = Arc::new(Activity::new());
        let service = {
            let server = self.clone();
            let activity = Arc::clone(&activity);
            service_fn(move |request: http::Request<Incoming>| {
                let server = server.clone();
                let activity = Arc::clone(&activity);
                let header = header.clone();
                async move {
                    Ok::<_, Infallible>(
                        server
                            .respond(request, peer, header.as_ref(), &activity)
                            .await,
                    )
                }
            })
        };

        let mut builder = http1::Builder::new();
        builder.keep_alive(config.keep_alive());
        let conn = builder.serve_connection(TokioIo::new(Rewind::new(io, leftover)), service);
        tokio::pin!(conn);

        let idle = activity.idle(config.idle_timeout());
        tokio::pin!(idle);
        let stop = shutdown.recv();
        tokio::pin!(stop);
        let mut closing = false;

        loop {
            tokio::select! {
                result = conn.as_mut() => return result.map_err(ServerError::from),
                () = &mut idle, if !closing => {
                    tracing::debug!(peer = %peer, "closing idle connection");
                    closing = true;
                    conn.as_mut().graceful_shutdown();
                }
                () = &mut stop, if !closing => {
                    tracing::debug!(peer = %peer, "closing connection for shutdown");
                    closing = true;
                    conn.as_mut().graceful_shutdown();
                }
            }
        }
    }

    async fn respond(
        &self,
        request: http::Request<Incoming>,
        peer: SocketAddr,
        proxied: Option<&ProxyHeader>,
        activity: &Arc<Activity>,
    ) -> HttpResponse {
        let _busy = activity.begin();
        let config = &self.inner.config;

        let _permit = match self.admit() {
            Ok(permit) => permit,
            Err(error) => {
                metrics::record_rejected("in_flight");
                tracing::warn!(path = %request.uri().path(), "rejected: too many requests in flight");
                return problem(&error, request.uri().path(), request.headers());
            }
        };

        let limit = config.max_content_length();
        if declared_length(request.headers()).is_some_and(|len| len > limit as u64) {
            metrics::record_rejected("payload_too_large");
            tracing::debug!(path = %request.uri().path(), limit, "rejected: declared body too large");
            return problem(&PipelineError::PayloadTooLarge { limit }, request.uri().path(), request.headers());
        }

        let connection =
            forwarded::resolve(peer, proxied, request.headers(), config.trusted_proxies());
        let request = Request::from_http(request, limit).with_connection(connection);

        let mut outcome = self.inner.pipeline.execute(request).await;
        outcome.mark_sent();
        tracing::trace!(
            status = outcome.status().as_u16(),
            stages = ?outcome.stages,
            failure = ?outcome.failure,
            "response handed to transport"
        );
        outcome.response
    }

    fn admit(&self) -> Result<Option<OwnedSemaphorePermit>, PipelineError> {
        let Some(limit) = &self.inner.in_flight else {
            return Ok(None);
        };
        Arc::clone(limit)
            .try_acquire_owned()
            .map(Some)
            .map_err(|_| PipelineError::ServiceUnavailable {
                reason: "too many requests in flight".to_string(),
            })
    }
}

fn declared_length(headers: &HeaderMap) -> Option<u64> {
    headers.get(CONTENT_LENGTH)?.to_str().ok()?.trim().parse().ok()
}

// Transport-level rejections never reach a codec, so they are always JSON.
fn problem(error: &PipelineError, path: &str, request_headers: &HeaderMap) -> HttpResponse {
    let request_id = request_headers
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(RequestId::parse)
        .unwrap_or_default();

    let (status, mut headers, body) = Response::from_error(error, Some(path)).into_parts();
    let bytes = match body {
        ResponseBody::Structured(mut value) => {
            if let Some(fields) = value.as_object_mut() {
                fields.insert("requestId".to_string(), request_id.to_string().into());
            }
            serde_json::to_vec(&value).unwrap_or_default()
        }
        _ => Vec::new(),
    };
    headers.insert(CONTENT_TYPE, HeaderValue::from_static(PROBLEM_JSON));
    if let Ok(value) = HeaderValue::from_str(&request_id.to_string()) {
        headers.insert(REQUEST_ID_HEADER, value);
    }

    let body: BoxBody = Full::new(Bytes::from(bytes))
        .map_err(|never| match never {})
        .boxed_unsync();
    let mut response = http::Response::new(body);
    *response.status_mut() = status;
    *response.headers_mut() = headers;
    response
}

fn log_connection_error(peer: SocketAddr, error: &ServerError) {
    match error {
        ServerError::Connection(e) if e.is_incomplete_message() || e.is_canceled() => {
            tracing::debug!(peer = %peer, error = %e, "peer went away mid-exchange");
        }
        ServerError::Connection(e) => {
            tracing::warn!(peer = %peer, error = %e, kind = "transport_write_failed", "connection failed");
        }
        ServerError::Proxy(e) => {
            tracing::warn!(peer = %peer, error = %e, "rejected connection: bad PROXY header");
        }
        other => tracing::warn!(peer = %peer, error = %other, "connection failed"),
    }
}

/// Request activity on one connection, for the idle watchdog.
struct Activity {
    active: AtomicUsize,
    last: Mutex<Instant>,
}

impl Activity {
    fn new() -> Self {
        Self {
            active: AtomicUsize::new(0),
            last: Mutex::new(Instant::now()),
        }
    }

    fn begin(self: &Arc<Self>) -> Busy {
        self.active.fetch_add(1, Ordering::SeqCst);
        *self.last.lock() = Instant::now();
        Busy(Arc::clone(self))
    }

    /// Completes once no request has been active for `timeout`.
    async fn idle(&self, timeout: Duration) {
        loop {
            let deadline = *self.last.lock() + timeout;
            if Instant::now() < deadline {
                tokio::time::sleep_until(deadline).await;
                continue;
            }
            if self.active.load(Ordering::SeqCst) == 0 {
                return;
            }
            tokio::time::sleep(timeout).await;
        }
    }
}

struct Busy(Arc<Activity>);

impl Drop for Busy {
    fn drop(&mut self) {
        *self.0.last.lock() = Instant::now();
        self.0.active.fetch_sub(1, Ordering::SeqCst);
    }
}
