//! The in-flight response a responder shapes.
//!
//! A [`StubResponse`] starts as `200 OK` with no headers and an empty body.
//! Responders change the status, add headers, and write body text. Once the
//! responder returns, the stub freezes the response into a
//! [`CapturedResponse`] and sends it.

use std::io;

use bytes::{BufMut, BytesMut};
use http::header::{CONTENT_TYPE, HeaderValue, IntoHeaderName};
use http::{HeaderMap, StatusCode};
use serde::Serialize;

use crate::capture::CapturedResponse;
use crate::error::Result;

/// A response under construction.
#[derive(Debug)]
pub struct StubResponse {
    status: StatusCode,
    headers: HeaderMap,
    body: BytesMut,
}

impl StubResponse {
    /// Create a `200 OK` response with an empty body.
    #[must_use]
    pub fn new() -> Self {
        Self::with_status(StatusCode::OK)
    }

    /// Create an empty response with the given status.
    #[must_use]
    pub fn with_status(status: StatusCode) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: BytesMut::new(),
        }
    }

    /// The current status.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        self.status
    }

    /// Replace the status.
    pub fn set_status(&mut self, status: StatusCode) {
        self.status = status;
    }

    /// The headers set so far.
    #[must_use]
    pub const fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Mutable access to the headers.
    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    /// Set a header, replacing any previous values for the same name.
    pub fn set_header<K: IntoHeaderName>(&mut self, name: K, value: HeaderValue) {
        self.headers.insert(name, value);
    }

    /// Add a header value without removing existing ones.
    pub fn append_header<K: IntoHeaderName>(&mut self, name: K, value: HeaderValue) {
        self.headers.append(name, value);
    }

    /// The body written so far.
    #[must_use]
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Open a scoped writer over the body.
    ///
    /// Bytes written through the writer land in the body when it is flushed
    /// or dropped, whichever comes first.
    pub fn body_writer(&mut self) -> BodyWriter<'_> {
        BodyWriter {
            response: self,
            buffer: Vec::new(),
        }
    }

    /// Append `output` to the body.
    pub fn write(&mut self, output: impl AsRef<str>) {
        let mut writer = self.body_writer();
        writer.push_str(output.as_ref());
    }

    /// Serialize `value` as the JSON body and set `Content-Type` accordingly.
    pub fn write_json<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<()> {
        let encoded = serde_json::to_vec(value)?;
        self.set_header(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        self.body.put_slice(&encoded);
        Ok(())
    }

    /// Freeze the response into its captured form.
    pub(crate) fn finish(self) -> CapturedResponse {
        CapturedResponse::new(self.status, self.headers, self.body.freeze())
    }
}

impl Default for StubResponse {
    fn default() -> Self {
        Self::new()
    }
}

/// Scoped writer over a [`StubResponse`] body.
///
/// Writes are buffered and moved into the response on [`flush`](io::Write::flush)
/// or drop, so the body is complete even if the writing code bails out early.
#[derive(Debug)]
pub struct BodyWriter<'a> {
    response: &'a mut StubResponse,
    buffer: Vec<u8>,
}

impl BodyWriter<'_> {
    /// Append text to the pending buffer.
    pub fn push_str(&mut self, text: &str) {
        self.buffer.extend_from_slice(text.as_bytes());
    }

    fn drain(&mut self) {
        if !self.buffer.is_empty() {
            self.response.body.put_slice(&self.buffer);
            self.buffer.clear();
        }
    }
}

impl io::Write for BodyWriter<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buffer.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.drain();
        Ok(())
    }
}

impl Drop for BodyWriter<'_> {
    fn drop(&mut self) {
        self.drain();
    }
}
