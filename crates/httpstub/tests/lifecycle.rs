//! Lifecycle tests: binding, completion, and teardown.

use std::net::{Ipv4Addr, TcpListener as StdTcpListener};
use std::time::Duration;

use httpstub::async_helpers::{assert_not_complete, within};
use httpstub::{EmptyOk, Fixed, HttpStub, StubConfig, StubContext, StubError};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;

fn occupied_port() -> (StdTcpListener, u16) {
    let listener = StdTcpListener::bind((Ipv4Addr::LOCALHOST, 0)).expect("bind ephemeral port");
    let port = listener.local_addr().expect("local addr").port();
    (listener, port)
}

fn free_port() -> u16 {
    occupied_port().1
}

/// A held port whose successor is currently free.
fn occupied_port_before_free_one() -> (StdTcpListener, u16) {
    for _ in 0..32 {
        let (held, port) = occupied_port();
        let Some(next) = port.checked_add(1) else {
            continue;
        };
        if StdTcpListener::bind((Ipv4Addr::LOCALHOST, next)).is_ok() {
            return (held, port);
        }
    }
    panic!("no busy/free port pair found on loopback");
}

// =============================================================================
// Construction Tests
// =============================================================================

#[tokio::test]
async fn test_uri_uses_localhost_and_ephemeral_port() {
    let stub = HttpStub::start(EmptyOk, 1).await.unwrap();

    assert!((49152..=65534).contains(&stub.port()));
    assert_eq!(stub.uri(), format!("http://localhost:{}/", stub.port()));
    assert_eq!(stub.url("/_search"), format!("http://localhost:{}/_search", stub.port()));
    assert!(stub.local_addr().ip().is_loopback());

    stub.shutdown().await;
}

#[tokio::test]
async fn test_zero_request_count_is_rejected() {
    let err = HttpStub::start(EmptyOk, 0).await.unwrap_err();
    assert!(matches!(err, StubError::InvalidRequestCount));
}

#[tokio::test]
#[allow(clippy::reversed_empty_ranges)]
async fn test_invalid_config_is_rejected() {
    let config = StubConfig::new().with_port_range(60001..=60000);
    let err = HttpStub::start_with_config(config, EmptyOk, 1)
        .await
        .unwrap_err();
    assert!(matches!(err, StubError::InvalidConfig { .. }));
}

#[tokio::test]
async fn test_binds_configured_port() {
    let port = free_port();
    let config = StubConfig::new().with_port_range(port..=port);

    let stub = HttpStub::start_with_config(config, EmptyOk, 1).await.unwrap();
    assert_eq!(stub.port(), port);

    stub.shutdown().await;
}

#[tokio::test]
async fn test_bind_exhausted_when_every_port_is_taken() {
    let (_held, port) = occupied_port();
    let config = StubConfig::new().with_port_range(port..=port);

    let err = HttpStub::start_with_config(config, EmptyOk, 1)
        .await
        .unwrap_err();
    match err {
        StubError::BindExhausted {
            attempts,
            last_port,
            ..
        } => {
            assert_eq!(attempts, 5);
            assert_eq!(last_port, port);
        }
        other => panic!("expected BindExhausted, got {other:?}"),
    }
}

#[tokio::test]
async fn test_start_retries_past_occupied_port() {
    let (_held, busy) = occupied_port_before_free_one();
    let free = busy + 1;
    // Each attempt picks the busy port with probability 1/2; 64 attempts make
    // exhausting them all negligible.
    let config = StubConfig::new()
        .with_port_range(busy..=free)
        .with_max_bind_attempts(64);

    let stub = HttpStub::start_with_config(config, Fixed::ok("bound"), 1)
        .await
        .unwrap();
    assert_eq!(stub.port(), free);
    assert_eq!(stub.uri(), format!("http://localhost:{free}/"));

    let body = reqwest::get(stub.uri()).await.unwrap().text().await.unwrap();
    assert_eq!(body, "bound");

    stub.shutdown().await;
}

#[tokio::test]
async fn test_custom_host_appears_in_uri() {
    let config = StubConfig::new().with_host("127.0.0.1");
    let stub = HttpStub::start_with_config(config, Fixed::ok("ip"), 1)
        .await
        .unwrap();

    assert!(stub.uri().starts_with("http://127.0.0.1:"));
    let body = reqwest::get(stub.uri()).await.unwrap().text().await.unwrap();
    assert_eq!(body, "ip");

    stub.shutdown().await;
}

// =============================================================================
// Completion Tests
// =============================================================================

#[tokio::test]
async fn test_completion_waits_for_threshold() {
    let stub = HttpStub::start(Fixed::ok("hit"), 3).await.unwrap();
    let completion = stub.completion();

    for _ in 0..2 {
        assert_eq!(reqwest::get(stub.uri()).await.unwrap().status(), 200);
    }
    assert!(!completion.is_complete());
    assert_not_complete(&stub, Duration::from_millis(50)).await;

    assert_eq!(reqwest::get(stub.uri()).await.unwrap().status(), 200);
    completion
        .wait_timeout(Duration::from_secs(2))
        .await
        .unwrap();
    assert!(stub.requests().len() >= 3);
    assert!(stub.responses().len() >= 3);

    stub.shutdown().await;
}

#[tokio::test]
async fn test_waiter_registered_before_requests_wakes() {
    let stub = HttpStub::start(EmptyOk, 2).await.unwrap();
    let waiter = {
        let completion = stub.completion();
        tokio::spawn(async move { completion.wait().await })
    };

    for _ in 0..2 {
        reqwest::get(stub.uri()).await.unwrap();
    }

    within(Duration::from_secs(2), "early completion waiter", waiter)
        .await
        .unwrap();
    assert_eq!(stub.exchange_count(), 2);

    stub.shutdown().await;
}

#[tokio::test]
async fn test_extra_requests_do_not_disturb_completion() {
    let stub = HttpStub::start(EmptyOk, 1).await.unwrap();

    for _ in 0..4 {
        assert_eq!(reqwest::get(stub.uri()).await.unwrap().status(), 200);
    }

    stub.completion()
        .wait_timeout(Duration::from_secs(1))
        .await
        .unwrap();
    assert_eq!(stub.exchange_count(), 4);
    assert_eq!(stub.requests().len(), stub.responses().len());

    stub.shutdown().await;
}

#[tokio::test]
async fn test_completion_never_fires_after_early_shutdown() {
    let stub = HttpStub::start(EmptyOk, 2).await.unwrap();
    reqwest::get(stub.uri()).await.unwrap();

    stub.shutdown().await;

    let err = stub
        .completion()
        .wait_timeout(Duration::from_millis(100))
        .await
        .unwrap_err();
    assert!(matches!(err, StubError::Timeout { .. }));
    assert!(!stub.completion().is_complete());
}

// =============================================================================
// Teardown Tests
// =============================================================================

#[tokio::test]
async fn test_double_shutdown_is_safe() {
    let stub = HttpStub::start(Fixed::ok("ok"), 1).await.unwrap();
    reqwest::get(stub.uri()).await.unwrap();

    stub.shutdown().await;
    let requests_after_first = stub.requests().len();
    stub.shutdown().await;

    assert!(stub.is_shut_down());
    assert_eq!(stub.requests().len(), requests_after_first);
    assert_eq!(stub.responses().len(), requests_after_first);
    assert_eq!(stub.responses()[0].body_text(), "ok");
}

#[tokio::test]
async fn test_shutdown_while_idle_returns_promptly() {
    let stub = HttpStub::start(EmptyOk, 1).await.unwrap();
    within(Duration::from_secs(2), "idle shutdown", stub.shutdown()).await;
}

#[tokio::test]
async fn test_shutdown_with_half_sent_request_does_not_hang() {
    let stub = HttpStub::start(EmptyOk, 1).await.unwrap();

    let mut stream = TcpStream::connect(stub.local_addr()).await.unwrap();
    stream
        .write_all(b"GET / HTTP/1.1\r\nHost: localhost\r\n")
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    within(Duration::from_secs(2), "shutdown mid-request", stub.shutdown()).await;
    assert_eq!(stub.exchange_count(), 0);
    assert!(!stub.completion().is_complete());
}

#[tokio::test]
async fn test_requests_after_shutdown_are_refused() {
    let stub = HttpStub::start(EmptyOk, 1).await.unwrap();
    let uri = stub.uri().to_string();

    stub.shutdown().await;

    assert!(reqwest::get(&uri).await.is_err());
    assert_eq!(stub.exchange_count(), 0);
}

#[tokio::test]
async fn test_drop_releases_port() {
    let port = {
        let stub = HttpStub::start(EmptyOk, 1).await.unwrap();
        stub.port()
    };
    // Give the aborted task a moment to drop its listener.
    tokio::time::sleep(Duration::from_millis(50)).await;

    let config = StubConfig::new().with_port_range(port..=port);
    let stub = HttpStub::start_with_config(config, EmptyOk, 1).await.unwrap();
    assert_eq!(stub.port(), port);
    stub.shutdown().await;
}

#[tokio::test]
async fn test_debug_output_mentions_uri() {
    let stub = HttpStub::start(|_: &mut StubContext<'_>| {}, 1).await.unwrap();
    let debug = format!("{stub:?}");
    assert!(debug.contains(stub.uri()));
    assert!(debug.contains("shut_down: false"));
    assert!(debug.contains("complete_request_count: 1"));
    assert_eq!(stub.complete_request_count(), 1);
    stub.shutdown().await;
}
