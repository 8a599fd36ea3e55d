//! Listener and serve-loop lifecycle of the authorization adapter.
//!
//! An [`AuthorizationServer`] is created with its listener already open
//! (Unstarted), serves while [`AuthorizationServer::run`] is awaited
//! (Serving) and ends in Stopped once [`AuthorizationServer::stop`] has
//! drained in-flight calls and released the port.

use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::sync::{oneshot, Mutex};
use tonic::server::NamedService;
use tonic::transport::server::{Router, TcpIncoming};
use tonic::transport::Server;
use tonic_health::server::HealthReporter;
use tonic_health::ServingStatus;
use tracing::{debug, info, warn};

use crate::handler::{AuthorizationHandler, PlaceholderHandler};
use crate::proto::handle_authorization_service_server::HandleAuthorizationServiceServer;
use crate::service::AuthorizationService;
use crate::{Error, Result};

/// Externally visible lifecycle state of a server.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LifecycleState {
    /// Listener open, serve loop not entered yet.
    Unstarted,
    /// Serve loop running.
    Serving,
    /// Terminal; the listener has been released.
    Stopped,
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LifecycleState::Unstarted => write!(f, "unstarted"),
            LifecycleState::Serving => write!(f, "serving"),
            LifecycleState::Stopped => write!(f, "stopped"),
        }
    }
}

enum Lifecycle {
    Unstarted {
        incoming: TcpIncoming,
        router: Router,
    },
    Serving {
        shutdown: oneshot::Sender<()>,
        drained: oneshot::Receiver<()>,
    },
    Stopped,
}

impl Lifecycle {
    fn state(&self) -> LifecycleState {
        match self {
            Lifecycle::Unstarted { .. } => LifecycleState::Unstarted,
            Lifecycle::Serving { .. } => LifecycleState::Serving,
            Lifecycle::Stopped => LifecycleState::Stopped,
        }
    }
}

/// The embedding process' view of a running adapter.
#[tonic::async_trait]
pub trait AdapterServer: Send + Sync {
    /// Listening address of the server.
    fn addr(&self) -> String;

    /// Serves until the server stops, then reports the outcome on `done`.
    async fn run(&self, done: oneshot::Sender<Result<()>>);

    /// Gracefully shuts the server down.
    async fn close(&self) -> Result<()>;
}

/// gRPC server answering `HandleAuthorization` on a bound TCP listener.
///
/// Cloning yields another handle to the same server, so `run` and `stop`
/// can be driven from different tasks.
#[derive(Clone)]
pub struct AuthorizationServer {
    local_addr: SocketAddr,
    service_name: &'static str,
    health: HealthReporter,
    lifecycle: Arc<Mutex<Lifecycle>>,
}

impl AuthorizationServer {
    /// Binds `addr` and registers the placeholder authorization handler.
    ///
    /// `addr` is a port (`""` and `"0"` pick a free one) bound on all
    /// interfaces, or a full `host:port`.
    pub async fn bind(addr: &str) -> Result<Self> {
        Self::bind_with_handler(addr, PlaceholderHandler).await
    }

    /// Binds `addr` and registers `handler` for `HandleAuthorization`.
    pub async fn bind_with_handler<H: AuthorizationHandler>(
        addr: &str,
        handler: H,
    ) -> Result<Self> {
        let (addr, listener) = bind_listener(addr).await?;
        let local_addr = listener.local_addr().map_err(|source| Error::Bind {
            addr: addr.clone(),
            source,
        })?;
        // Accept errors such as EMFILE are retried after a pause instead of
        // ending the serve loop.
        let incoming = TcpIncoming::from_listener(listener, true, None).map_err(|e| {
            Error::Bind {
                addr: addr.clone(),
                source: std::io::Error::new(std::io::ErrorKind::Other, e),
            }
        })?;

        info!(addr = %local_addr, "listening");

        let (mut health, health_service) = tonic_health::server::health_reporter();
        let service_name =
            <HandleAuthorizationServiceServer<AuthorizationService<H>> as NamedService>::NAME;
        health
            .set_service_status(service_name, ServingStatus::Serving)
            .await;

        let router = Server::builder()
            .add_service(health_service)
            .add_service(HandleAuthorizationServiceServer::new(
                AuthorizationService::new(handler),
            ));

        Ok(Self {
            local_addr,
            service_name,
            health,
            lifecycle: Arc::new(Mutex::new(Lifecycle::Unstarted { incoming, router })),
        })
    }

    /// Listening address as `host:port`, with the OS-assigned port when an
    /// ephemeral port was requested.
    pub fn addr(&self) -> String {
        self.local_addr.to_string()
    }

    /// Listening socket address.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Current lifecycle state.
    pub async fn state(&self) -> LifecycleState {
        self.lifecycle.lock().await.state()
    }

    /// Runs the serve loop until the server is stopped.
    ///
    /// Exactly one value is sent on `done`, after the loop has terminated:
    /// `Ok(())` for a graceful stop, the transport error otherwise, or
    /// [`Error::InvalidState`] when the server is not Unstarted.
    pub async fn run(&self, done: oneshot::Sender<Result<()>>) {
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let (drained_tx, drained_rx) = oneshot::channel::<()>();

        let (incoming, router) = {
            let mut lifecycle = self.lifecycle.lock().await;
            match std::mem::replace(&mut *lifecycle, Lifecycle::Stopped) {
                Lifecycle::Unstarted { incoming, router } => {
                    *lifecycle = Lifecycle::Serving {
                        shutdown: shutdown_tx,
                        drained: drained_rx,
                    };
                    (incoming, router)
                }
                other => {
                    let state = other.state();
                    *lifecycle = other;
                    drop(lifecycle);
                    warn!(%state, "run called on a server that is not unstarted");
                    let _ = done.send(Err(Error::InvalidState(state)));
                    return;
                }
            }
        };

        debug!(addr = %self.local_addr, "serving");

        let result = router
            .serve_with_incoming_shutdown(incoming, async move {
                let _ = shutdown_rx.await;
            })
            .await
            .map_err(Error::from);

        self.finish(result, drained_tx, done).await;
    }

    /// Records the end of the serve loop. The incoming stream, and with it
    /// the listener, is already gone.
    async fn finish(
        &self,
        result: Result<()>,
        drained: oneshot::Sender<()>,
        done: oneshot::Sender<Result<()>>,
    ) {
        if let Err(e) = &result {
            warn!(error = %e, "serve loop terminated");
            let mut lifecycle = self.lifecycle.lock().await;
            // A concurrent stop has already moved the state on.
            if matches!(*lifecycle, Lifecycle::Serving { .. }) {
                *lifecycle = Lifecycle::Stopped;
                drop(lifecycle);
                self.mark_not_serving().await;
            }
        }

        let _ = drained.send(());
        let _ = done.send(result);
    }

    /// Gracefully stops the server.
    ///
    /// Stops accepting calls, waits for in-flight calls to finish and
    /// releases the listener. Stopping a server that never ran or has
    /// already stopped succeeds.
    pub async fn stop(&self) -> Result<()> {
        let previous = {
            let mut lifecycle = self.lifecycle.lock().await;
            std::mem::replace(&mut *lifecycle, Lifecycle::Stopped)
        };

        match previous {
            Lifecycle::Stopped => Ok(()),
            Lifecycle::Unstarted { incoming, router } => {
                self.mark_not_serving().await;
                drop(router);
                drop(incoming);
                info!(addr = %self.local_addr, "stopped before serving");
                Ok(())
            }
            Lifecycle::Serving { shutdown, drained } => {
                self.mark_not_serving().await;
                // The serve loop may already be gone on a transport error.
                let _ = shutdown.send(());
                drained.await.map_err(|_| {
                    Error::Stop(format!(
                        "serve loop on {} ended without draining",
                        self.local_addr
                    ))
                })?;
                info!(addr = %self.local_addr, "stopped");
                Ok(())
            }
        }
    }

    async fn mark_not_serving(&self) {
        let mut health = self.health.clone();
        health
            .set_service_status(self.service_name, ServingStatus::NotServing)
            .await;
    }
}

#[tonic::async_trait]
impl AdapterServer for AuthorizationServer {
    fn addr(&self) -> String {
        AuthorizationServer::addr(self)
    }

    async fn run(&self, done: oneshot::Sender<Result<()>>) {
        AuthorizationServer::run(self, done).await;
    }

    async fn close(&self) -> Result<()> {
        self.stop().await
    }
}

/// Candidate listen addresses for a port specifier, in bind order.
///
/// A bare port tries the dual-stack `[::]` wildcard first and falls back to
/// `0.0.0.0` on hosts without IPv6.
fn listen_addrs(addr: &str) -> Vec<String> {
    if addr.contains(':') {
        return vec![addr.to_string()];
    }
    let port = if addr.is_empty() { "0" } else { addr };
    vec![format!("[::]:{port}"), format!("0.0.0.0:{port}")]
}

async fn bind_listener(addr: &str) -> Result<(String, TcpListener)> {
    let mut last_err = None;
    for candidate in listen_addrs(addr) {
        match TcpListener::bind(&candidate).await {
            Ok(listener) => return Ok((candidate, listener)),
            Err(source) => {
                debug!(addr = %candidate, error = %source, "bind failed");
                last_err = Some(Error::Bind {
                    addr: candidate,
                    source,
                });
            }
        }
    }
    Err(last_err.unwrap_or_else(|| Error::Bind {
        addr: addr.to_string(),
        source: std::io::Error::new(std::io::ErrorKind::InvalidInput, "no listen address"),
    }))
}
