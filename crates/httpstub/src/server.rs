//! The stub server and its background accept loop.
//!
//! # Lifecycle
//!
//! [`HttpStub::start`] binds a random loopback port and spawns one background
//! task. That task accepts connections one at a time and serves a single
//! HTTP/1.1 exchange on each. For every exchange it:
//!
//! 1. reads the full request body,
//! 2. runs the responder against a `200 OK` response,
//! 3. appends the request and the response to the capture store,
//! 4. fires the completion signal if the threshold has been reached,
//! 5. sends the response.
//!
//! [`HttpStub::shutdown`] cancels the loop, waits for it to exit, and closes
//! the listener. Captured exchanges stay readable afterwards.

use std::convert::Infallible;
use std::fmt;
use std::net::{Ipv4Addr, SocketAddr};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use bytes::Bytes;
use http::{Request, Response, StatusCode};
use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::capture::{CaptureStore, CapturedRequest, CapturedResponse};
use crate::completion::{Completion, CompletionSignal};
use crate::config::StubConfig;
use crate::context::{Responder, StubContext};
use crate::error::{Result, StubError};
use crate::port::candidate_ports;
use crate::response::StubResponse;

/// State shared between the owner and the background task.
struct Shared {
    responder: Box<dyn Responder>,
    exchanges: CaptureStore,
    signal: CompletionSignal,
    complete_request_count: usize,
    max_body_size: Option<usize>,
    cancel: CancellationToken,
}

/// An ephemeral HTTP server that records every exchange.
///
/// # Example
///
/// ```no_run
/// use std::time::Duration;
/// use httpstub::{HttpStub, StubContext};
///
/// # async fn run() -> httpstub::Result<()> {
/// let stub = HttpStub::start(|ctx: &mut StubContext<'_>| ctx.response.write("ok"), 1).await?;
///
/// // Point the code under test at `stub.uri()` and let it make one request...
///
/// stub.completion().wait_timeout(Duration::from_secs(5)).await?;
/// assert_eq!(stub.requests().len(), 1);
/// stub.shutdown().await;
/// # Ok(())
/// # }
/// ```
pub struct HttpStub {
    uri: String,
    local_addr: SocketAddr,
    shared: Arc<Shared>,
    completion: Completion,
    cancel: CancellationToken,
    worker: Mutex<Option<JoinHandle<()>>>,
    shut_down: AtomicBool,
}

impl HttpStub {
    /// Start a stub with the default configuration.
    ///
    /// The completion signal fires once `complete_request_count` exchanges
    /// have been captured.
    pub async fn start<R: Responder>(responder: R, complete_request_count: usize) -> Result<Self> {
        Self::start_with_config(StubConfig::default(), responder, complete_request_count).await
    }

    /// Start a stub with a custom configuration.
    pub async fn start_with_config<R: Responder>(
        config: StubConfig,
        responder: R,
        complete_request_count: usize,
    ) -> Result<Self> {
        if complete_request_count == 0 {
            return Err(StubError::InvalidRequestCount);
        }
        config.validate()?;

        let listener = bind_listener(
            candidate_ports(config.port_range.clone()),
            config.max_bind_attempts,
        )
        .await?;
        let local_addr = listener.local_addr()?;
        let uri = format!("http://{}:{}/", config.host, local_addr.port());

        let (signal, completion) = CompletionSignal::new();
        let cancel = CancellationToken::new();
        let shared = Arc::new(Shared {
            responder: Box::new(responder),
            exchanges: CaptureStore::default(),
            signal,
            complete_request_count,
            max_body_size: config.max_body_size,
            cancel: cancel.clone(),
        });

        let worker = tokio::spawn(accept_loop(listener, Arc::clone(&shared)));
        tracing::info!(port = local_addr.port(), uri = %uri, "HTTP stub listening");

        Ok(Self {
            uri,
            local_addr,
            shared,
            completion,
            cancel,
            worker: Mutex::new(Some(worker)),
            shut_down: AtomicBool::new(false),
        })
    }

    /// The base URI, `http://<host>:<port>/`.
    #[must_use]
    pub fn uri(&self) -> &str {
        &self.uri
    }

    /// Join `path` onto the base URI.
    #[must_use]
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.uri, path.trim_start_matches('/'))
    }

    /// The bound socket address.
    #[must_use]
    pub const fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// The bound port.
    #[must_use]
    pub const fn port(&self) -> u16 {
        self.local_addr.port()
    }

    /// A handle that resolves once the completion threshold is reached.
    #[must_use]
    pub fn completion(&self) -> Completion {
        self.completion.clone()
    }

    /// Snapshot of the captured requests, in arrival order.
    #[must_use]
    pub fn requests(&self) -> Vec<CapturedRequest> {
        self.shared.exchanges.requests()
    }

    /// Snapshot of the captured responses, index-aligned with [`requests`](Self::requests).
    #[must_use]
    pub fn responses(&self) -> Vec<CapturedResponse> {
        self.shared.exchanges.responses()
    }

    /// The request and response of exchange `index`, if captured.
    #[must_use]
    pub fn exchange(&self, index: usize) -> Option<(CapturedRequest, CapturedResponse)> {
        self.shared.exchanges.exchange(index)
    }

    /// Number of captured exchanges that fires the completion signal.
    #[must_use]
    pub fn complete_request_count(&self) -> usize {
        self.shared.complete_request_count
    }

    /// Number of captured exchanges.
    #[must_use]
    pub fn exchange_count(&self) -> usize {
        self.shared.exchanges.len()
    }

    /// Check whether [`shutdown`](Self::shutdown) has been called.
    #[must_use]
    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::Acquire)
    }

    /// Stop accepting requests and close the listener.
    ///
    /// Only the first call has any effect. Returns once the background task
    /// has exited, even if it was waiting on a half-sent request.
    pub async fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::AcqRel) {
            return;
        }

        self.cancel.cancel();
        let worker = self
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(worker) = worker {
            if let Err(e) = worker.await {
                tracing::warn!(error = %e, "HTTP stub task ended abnormally");
            }
        }

        tracing::info!(
            port = self.port(),
            exchanges = self.exchange_count(),
            "HTTP stub shut down"
        );
    }
}

impl Drop for HttpStub {
    fn drop(&mut self) {
        self.cancel.cancel();
        let worker = self
            .worker
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(worker) = worker {
            worker.abort();
        }
    }
}

impl fmt::Debug for HttpStub {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpStub")
            .field("uri", &self.uri)
            .field("exchanges", &self.exchange_count())
            .field("complete_request_count", &self.shared.complete_request_count)
            .field("complete", &self.completion.is_complete())
            .field("shut_down", &self.is_shut_down())
            .finish_non_exhaustive()
    }
}

/// Bind the first free port from `ports`, trying at most `max_attempts` of them.
async fn bind_listener(
    ports: impl Iterator<Item = u16>,
    max_attempts: usize,
) -> Result<TcpListener> {
    let mut last_failure = None;

    for (attempt, port) in ports.take(max_attempts).enumerate() {
        match TcpListener::bind((Ipv4Addr::LOCALHOST, port)).await {
            Ok(listener) => return Ok(listener),
            Err(e) => {
                tracing::warn!(port, attempt = attempt + 1, error = %e, "Failed to bind HTTP stub port");
                last_failure = Some((port, e));
            }
        }
    }

    match last_failure {
        Some((last_port, source)) => Err(StubError::BindExhausted {
            attempts: max_attempts,
            last_port,
            source,
        }),
        None => Err(StubError::invalid_config("no candidate ports to bind")),
    }
}

/// Accept connections until cancelled, serving one exchange per connection.
async fn accept_loop(listener: TcpListener, shared: Arc<Shared>) {
    while !shared.cancel.is_cancelled() {
        let stream = tokio::select! {
            biased;
            () = shared.cancel.cancelled() => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    tracing::trace!(peer = %peer, "Accepted HTTP stub connection");
                    stream
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to accept HTTP stub connection");
                    continue;
                }
            },
        };

        let service = {
            let shared = Arc::clone(&shared);
            service_fn(move |request| handle_request(Arc::clone(&shared), request))
        };
        let connection = http1::Builder::new()
            .keep_alive(false)
            .serve_connection(TokioIo::new(stream), service);

        tokio::select! {
            biased;
            () = shared.cancel.cancelled() => break,
            served = connection => {
                if let Err(e) = served {
                    tracing::debug!(error = %e, "HTTP stub connection ended with error");
                }
            }
        }
    }

    tracing::debug!("HTTP stub accept loop stopped");
}

/// Run the responder for one request and capture the exchange.
async fn handle_request(
    shared: Arc<Shared>,
    request: Request<Incoming>,
) -> std::result::Result<Response<Full<Bytes>>, Infallible> {
    let (parts, body) = request.into_parts();
    let body = match read_body(body, shared.max_body_size).await {
        Ok(body) => body,
        Err(status) => return Ok(StubResponse::with_status(status).finish().to_http()),
    };

    let request = CapturedRequest::from_parts(parts, body);
    let response = respond(shared.responder.as_ref(), &request);
    let wire = response.to_http();

    if shared.cancel.is_cancelled() {
        tracing::debug!(path = request.path(), "HTTP stub shutting down, exchange not captured");
        return Ok(wire);
    }

    let method = request.method().clone();
    let path = request.path().to_string();
    let status = response.status();
    let count = shared.exchanges.push(request, response);
    tracing::debug!(%method, %path, %status, index = count - 1, "HTTP stub captured exchange");

    if count >= shared.complete_request_count && shared.signal.complete() {
        tracing::info!(count, "HTTP stub completion reached");
    }

    Ok(wire)
}

/// Collect the whole request body, enforcing the optional size limit.
///
/// On failure, returns the status to answer with.
async fn read_body(body: Incoming, limit: Option<usize>) -> std::result::Result<Bytes, StatusCode> {
    let Some(limit) = limit else {
        return match body.collect().await {
            Ok(collected) => Ok(collected.to_bytes()),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to read HTTP stub request body");
                Err(StatusCode::BAD_REQUEST)
            }
        };
    };

    match Limited::new(body, limit).collect().await {
        Ok(collected) => Ok(collected.to_bytes()),
        Err(e) => {
            let status = if e.downcast_ref::<LengthLimitError>().is_some() {
                StatusCode::PAYLOAD_TOO_LARGE
            } else {
                StatusCode::BAD_REQUEST
            };
            tracing::warn!(error = %e, limit, status = %status, "Failed to read HTTP stub request body");
            Err(status)
        }
    }
}

/// Invoke the responder, turning a panic into a `500` response.
fn respond(responder: &dyn Responder, request: &CapturedRequest) -> CapturedResponse {
    let mut response = StubResponse::new();
    let outcome = catch_unwind(AssertUnwindSafe(|| {
        let mut context = StubContext::new(request, &mut response);
        responder.respond(&mut context);
    }));

    match outcome {
        Ok(()) => response.finish(),
        Err(panic) => {
            let message = panic
                .downcast_ref::<&str>()
                .copied()
                .or_else(|| panic.downcast_ref::<String>().map(String::as_str))
                .unwrap_or("non-string panic payload");
            tracing::error!(path = request.path(), panic = message, "HTTP stub responder panicked");
            StubResponse::with_status(StatusCode::INTERNAL_SERVER_ERROR).finish()
        }
    }
}
