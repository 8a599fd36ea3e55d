//! Common test utilities shared across integration tests.
#![allow(dead_code)]

use std::net::SocketAddr;
use std::time::Duration;

use mygrpcadapter::{AuthorizationServer, LifecycleState};

/// Initialize test tracing (call once at the beginning of tests).
///
/// Only adapter logs are shown, filtering out HTTP/2 and tower noise.
/// Subsequent calls are safe and will be ignored.
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::new("mygrpcadapter=debug");

    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_env_filter(filter)
        .try_init();
}

/// Loopback address of a server bound on all interfaces.
pub fn loopback(server: &AuthorizationServer) -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], server.local_addr().port()))
}

/// Endpoint URL for tonic clients.
pub fn endpoint(server: &AuthorizationServer) -> String {
    format!("http://{}", loopback(server))
}

/// Waits until a concurrently spawned `run` has entered the serve loop.
pub async fn wait_until_serving(server: &AuthorizationServer) {
    for _ in 0..200 {
        if server.state().await == LifecycleState::Serving {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("server never reached the serving state");
}
