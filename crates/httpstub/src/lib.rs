//! Ephemeral HTTP stub server for integration tests.
//!
//! This crate stands in for a remote HTTP endpoint. A stub binds a random
//! loopback port, answers every request with a caller-supplied responder, and
//! records each request/response pair so a test can assert on them. It also
//! signals when a target number of requests has been served.
//!
//! # Overview
//!
//! - [`HttpStub`] owns the listener and one background task that serves
//!   connections strictly one at a time.
//! - [`Responder`] shapes each response through a [`StubContext`]. Closures
//!   of type `Fn(&mut StubContext<'_>)` implement it.
//! - [`Completion`] resolves once the configured number of exchanges has been
//!   captured.
//! - [`CapturedRequest`] and [`CapturedResponse`] are the recorded exchanges,
//!   index-aligned and in arrival order.
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use httpstub::{HttpStub, StubContext};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let stub = HttpStub::start(
//!         |ctx: &mut StubContext<'_>| ctx.response.write("ok"),
//!         1,
//!     )
//!     .await?;
//!
//!     let body = reqwest::get(stub.uri()).await?.text().await?;
//!     assert_eq!(body, "ok");
//!
//!     stub.completion().wait_timeout(Duration::from_secs(5)).await?;
//!     assert_eq!(stub.requests()[0].method(), "GET");
//!
//!     stub.shutdown().await;
//!     Ok(())
//! }
//! ```
//!
//! # What the stub does not do
//!
//! There is no TLS, no routing and no connection reuse. Every connection
//! carries exactly one exchange.

#![deny(missing_docs)]

pub mod async_helpers;
pub mod capture;
pub mod completion;
pub mod config;
pub mod context;
pub mod error;
mod port;
pub mod response;
pub mod server;

// Re-export commonly used types
pub use capture::{CapturedRequest, CapturedResponse};
pub use completion::Completion;
pub use config::StubConfig;
pub use context::{EmptyOk, Fixed, Responder, StubContext};
pub use error::{Result, StubError};
pub use response::{BodyWriter, StubResponse};
pub use server::HttpStub;

// Re-export the HTTP types that appear in the public API
pub use http::{HeaderMap, Method, StatusCode, Version, header};

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::async_helpers::{
        assert_completes, assert_not_complete, wait_for_exchanges, within,
    };
    pub use crate::capture::{CapturedRequest, CapturedResponse};
    pub use crate::completion::Completion;
    pub use crate::config::StubConfig;
    pub use crate::context::{Responder, StubContext};
    pub use crate::error::{Result, StubError};
    pub use crate::response::StubResponse;
    pub use crate::server::HttpStub;
    pub use http::StatusCode;
}
