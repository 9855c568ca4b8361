//! Captured request/response records and their shared store.
//!
//! The background loop is the only writer. Both halves of an exchange are
//! appended under a single lock, so readers never observe a request without
//! its response.

use std::borrow::Cow;
use std::sync::{Mutex, MutexGuard, PoisonError};

use bytes::Bytes;
use http::header::AsHeaderName;
use http::request::Parts;
use http::{HeaderMap, Method, Response, StatusCode, Uri, Version};
use http_body_util::Full;

/// An immutable snapshot of a request received by the stub.
#[derive(Debug, Clone)]
pub struct CapturedRequest {
    method: Method,
    uri: Uri,
    version: Version,
    headers: HeaderMap,
    body: Bytes,
}

impl CapturedRequest {
    pub(crate) fn from_parts(parts: Parts, body: Bytes) -> Self {
        Self {
            method: parts.method,
            uri: parts.uri,
            version: parts.version,
            headers: parts.headers,
            body,
        }
    }

    /// The request method.
    #[must_use]
    pub const fn method(&self) -> &Method {
        &self.method
    }

    /// The request target as sent by the client.
    #[must_use]
    pub const fn uri(&self) -> &Uri {
        &self.uri
    }

    /// The path component of the request target.
    #[must_use]
    pub fn path(&self) -> &str {
        self.uri.path()
    }

    /// The query string, without the leading `?`.
    #[must_use]
    pub fn query(&self) -> Option<&str> {
        self.uri.query()
    }

    /// The HTTP version of the request.
    #[must_use]
    pub const fn version(&self) -> Version {
        self.version
    }

    /// All request headers.
    #[must_use]
    pub const fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// A single header value, if present and valid visible ASCII.
    #[must_use]
    pub fn header<K: AsHeaderName>(&self, name: K) -> Option<&str> {
        self.headers.get(name).and_then(|value| value.to_str().ok())
    }

    /// The full request body.
    #[must_use]
    pub const fn body(&self) -> &Bytes {
        &self.body
    }

    /// The request body as text, replacing invalid UTF-8.
    #[must_use]
    pub fn body_text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }
}

/// A response as shaped by the responder and sent to the client.
#[derive(Debug, Clone)]
pub struct CapturedResponse {
    status: StatusCode,
    headers: HeaderMap,
    body: Bytes,
}

impl CapturedResponse {
    pub(crate) const fn new(status: StatusCode, headers: HeaderMap, body: Bytes) -> Self {
        Self {
            status,
            headers,
            body,
        }
    }

    /// The response status.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        self.status
    }

    /// All response headers set by the responder.
    #[must_use]
    pub const fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// A single header value, if present and valid visible ASCII.
    #[must_use]
    pub fn header<K: AsHeaderName>(&self, name: K) -> Option<&str> {
        self.headers.get(name).and_then(|value| value.to_str().ok())
    }

    /// The response body.
    #[must_use]
    pub const fn body(&self) -> &Bytes {
        &self.body
    }

    /// The response body as text, replacing invalid UTF-8.
    #[must_use]
    pub fn body_text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }

    /// Build the hyper response sent on the wire.
    pub(crate) fn to_http(&self) -> Response<Full<Bytes>> {
        let mut response = Response::new(Full::new(self.body.clone()));
        *response.status_mut() = self.status;
        *response.headers_mut() = self.headers.clone();
        response
    }
}

#[derive(Debug, Default)]
struct Exchanges {
    requests: Vec<CapturedRequest>,
    responses: Vec<CapturedResponse>,
}

/// Append-only store of captured exchanges.
#[derive(Debug, Default)]
pub(crate) struct CaptureStore {
    inner: Mutex<Exchanges>,
}

impl CaptureStore {
    // Appends never leave the vectors half-updated, so a poisoned lock
    // still guards consistent data.
    fn lock(&self) -> MutexGuard<'_, Exchanges> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append one exchange and return the new exchange count.
    pub(crate) fn push(&self, request: CapturedRequest, response: CapturedResponse) -> usize {
        let mut exchanges = self.lock();
        exchanges.requests.push(request);
        exchanges.responses.push(response);
        exchanges.responses.len()
    }

    pub(crate) fn requests(&self) -> Vec<CapturedRequest> {
        self.lock().requests.clone()
    }

    pub(crate) fn responses(&self) -> Vec<CapturedResponse> {
        self.lock().responses.clone()
    }

    pub(crate) fn exchange(&self, index: usize) -> Option<(CapturedRequest, CapturedResponse)> {
        let exchanges = self.lock();
        let request = exchanges.requests.get(index)?;
        let response = exchanges.responses.get(index)?;
        Some((request.clone(), response.clone()))
    }

    pub(crate) fn len(&self) -> usize {
        self.lock().responses.len()
    }
}
