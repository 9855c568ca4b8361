//! Async testing utilities.
//!
//! Assertions that race stub activity against a deadline. They panic with a
//! message naming what was awaited and how far the stub got, so a stalled
//! test explains itself.

use std::future::IntoFuture;
use std::time::Duration;

use crate::server::HttpStub;

/// Default timeout for async operations in tests.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Interval between polls in [`wait_for_exchanges`].
pub const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Await `future`, panicking if it takes longer than `timeout`.
///
/// `what` names the operation in the panic message.
///
/// # Example
///
/// ```rust,ignore
/// within(Duration::from_secs(2), "stub shutdown", stub.shutdown()).await;
/// ```
pub async fn within<F: IntoFuture>(timeout: Duration, what: &str, future: F) -> F::Output {
    match tokio::time::timeout(timeout, future).await {
        Ok(output) => output,
        Err(_) => panic!("{what} did not finish within {timeout:?}"),
    }
}

/// Assert that `future` is still pending after `window`.
pub async fn assert_pending<F: IntoFuture>(window: Duration, what: &str, future: F) {
    let outcome = tokio::time::timeout(window, future).await;
    assert!(
        outcome.is_err(),
        "{what} finished within {window:?}, expected it to stay pending"
    );
}

/// Wait for the stub's completion signal.
///
/// # Panics
///
/// Panics if the signal does not fire within `timeout`, reporting how many
/// exchanges were captured against the threshold.
pub async fn assert_completes(stub: &HttpStub, timeout: Duration) {
    let outcome = stub.completion().wait_timeout(timeout).await;
    assert!(
        outcome.is_ok(),
        "stub at {} did not complete within {timeout:?}: captured {} of {} exchanges",
        stub.uri(),
        stub.exchange_count(),
        stub.complete_request_count()
    );
}

/// Assert that the stub's completion signal stays unfired for `window`.
pub async fn assert_not_complete(stub: &HttpStub, window: Duration) {
    let outcome = tokio::time::timeout(window, stub.completion().wait()).await;
    assert!(
        outcome.is_err(),
        "stub at {} completed early: captured {} exchanges, threshold {}",
        stub.uri(),
        stub.exchange_count(),
        stub.complete_request_count()
    );
}

/// Wait until `stub` has captured at least `count` exchanges.
///
/// Returns the number captured when the wait ended.
///
/// # Panics
///
/// Panics if fewer than `count` exchanges are captured within `timeout`.
pub async fn wait_for_exchanges(stub: &HttpStub, count: usize, timeout: Duration) -> usize {
    let start = tokio::time::Instant::now();
    loop {
        let captured = stub.exchange_count();
        if captured >= count {
            return captured;
        }
        assert!(
            start.elapsed() <= timeout,
            "Expected {count} exchanges within {timeout:?}, captured {captured}"
        );
        tokio::time::sleep(POLL_INTERVAL).await;
    }
}
