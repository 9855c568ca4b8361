//! Per-request context and the responder seam.
//!
//! The context borrows the captured request and the in-flight response, so a
//! responder cannot hold on to either past its call.

use crate::capture::CapturedRequest;
use crate::response::StubResponse;

/// Context passed to a [`Responder`] for one exchange.
#[derive(Debug)]
pub struct StubContext<'a> {
    /// The request being answered.
    pub request: &'a CapturedRequest,
    /// The response to shape. Starts as `200 OK` with an empty body.
    pub response: &'a mut StubResponse,
}

impl<'a> StubContext<'a> {
    /// Create a context over a request and its response.
    #[must_use]
    pub fn new(request: &'a CapturedRequest, response: &'a mut StubResponse) -> Self {
        Self { request, response }
    }
}

/// Shapes the response for each request the stub receives.
///
/// Implemented for any `Fn(&mut StubContext<'_>)` closure. Annotate the
/// closure argument so the compiler picks the higher-ranked signature:
///
/// ```
/// use httpstub::{Responder, StubContext};
///
/// fn assert_responder<R: Responder>(_: R) {}
///
/// assert_responder(|ctx: &mut StubContext<'_>| ctx.response.write("ok"));
/// ```
///
/// Responders run one at a time on the stub's background task. A panic is
/// caught, logged, and turned into a `500` response.
pub trait Responder: Send + Sync + 'static {
    /// Shape the response for `context.request`.
    fn respond(&self, context: &mut StubContext<'_>);
}

impl<F> Responder for F
where
    F: Fn(&mut StubContext<'_>) + Send + Sync + 'static,
{
    fn respond(&self, context: &mut StubContext<'_>) {
        self(context);
    }
}

/// A responder that leaves the default `200 OK` with an empty body.
#[derive(Debug, Clone, Copy, Default)]
pub struct EmptyOk;

impl Responder for EmptyOk {
    fn respond(&self, _context: &mut StubContext<'_>) {}
}

/// A responder that answers every request with the same status and body.
#[derive(Debug, Clone)]
pub struct Fixed {
    status: http::StatusCode,
    body: String,
}

impl Fixed {
    /// Answer with `status` and `body`.
    #[must_use]
    pub fn new(status: http::StatusCode, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    /// Answer `200 OK` with `body`.
    #[must_use]
    pub fn ok(body: impl Into<String>) -> Self {
        Self::new(http::StatusCode::OK, body)
    }
}

impl Responder for Fixed {
    fn respond(&self, context: &mut StubContext<'_>) {
        context.response.set_status(self.status);
        context.response.write(&self.body);
    }
}
