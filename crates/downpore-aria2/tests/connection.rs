//! Failure modes of `Aria2Client::connect` that need no running daemon.

#![allow(unused_crate_dependencies)]
#![allow(missing_docs)]

use std::time::Duration;

use downpore_aria2::{Aria2Client, Aria2Config};
use downpore_types::DaemonError;

fn init_test_tracing() {
    static ONCE: std::sync::Once = std::sync::Once::new();
    ONCE.call_once(|| {
        let subscriber = tracing_subscriber::fmt()
            .with_test_writer()
            .with_env_filter("debug")
            .finish();
        let _ = tracing::subscriber::set_global_default(subscriber);
    });
}

/// A port that was free a moment ago.
fn unused_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

/// Connecting to a port where no daemon listens fails with a connection error.
#[tokio::test(flavor = "current_thread")]
async fn connect_refused() {
    init_test_tracing();

    let config = Aria2Config::new("127.0.0.1", unused_port());
    let result = Aria2Client::connect(&config).await;

    match result {
        Err(DaemonError::Connection(msg)) => {
            assert!(
                msg.contains("Connection refused") || msg.contains("error sending request"),
                "Expected connection refused error, got: {msg}"
            );
        }
        Err(other) => panic!("Expected Connection error, got: {other:?}"),
        Ok(_) => panic!("Expected connection to fail"),
    }
}

/// A host that cannot form a URL is rejected before any request is made.
#[tokio::test(flavor = "current_thread")]
async fn connect_invalid_host() {
    init_test_tracing();

    let config = Aria2Config::new("not a host", 6800);
    let result = Aria2Client::connect(&config).await;

    match result {
        Err(DaemonError::Config(msg)) => {
            assert!(
                msg.contains("Invalid RPC URL"),
                "Expected invalid URL error, got: {msg}"
            );
        }
        Err(other) => panic!("Expected Config error for invalid host, got: {other:?}"),
        Ok(_) => panic!("Expected invalid host to be rejected"),
    }
}

/// A daemon that never answers trips the per-request timeout.
#[test_log::test(tokio::test(flavor = "current_thread"))]
async fn connect_unresponsive_daemon_times_out() {
    // Accepts the connection, never answers.
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();

    let config = Aria2Config::new("127.0.0.1", port).with_request_timeout(Duration::from_millis(300));
    let result = Aria2Client::connect(&config).await;

    assert!(
        matches!(result, Err(DaemonError::Connection(_))),
        "Expected Connection error"
    );
    drop(listener);
}
