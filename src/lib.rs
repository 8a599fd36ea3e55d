//! gRPC authorization adapter for a mixer-style policy mesh.
//!
//! The adapter answers the mesh's `HandleAuthorization` procedure on a
//! TCP listener and exposes the lifecycle an embedding process needs:
//!
//! - [`AuthorizationServer::bind`] opens the listener and registers the service
//! - [`AuthorizationServer::addr`] reports the bound address
//! - [`AuthorizationServer::run`] serves and reports the outcome on a completion channel
//! - [`AuthorizationServer::stop`] shuts down gracefully
//!
//! The authorization decision itself is a placeholder ([`PlaceholderHandler`]);
//! real decisions plug in through [`AuthorizationHandler`].
//!
//! # Examples
//!
//! ```rust,no_run
//! use mygrpcadapter::AuthorizationServer;
//! use tokio::sync::oneshot;
//!
//! # async fn demo() -> mygrpcadapter::Result<()> {
//! let server = AuthorizationServer::bind("0").await?;
//! println!("adapter on {}", server.addr());
//!
//! let (done_tx, done_rx) = oneshot::channel();
//! let serving = server.clone();
//! tokio::spawn(async move { serving.run(done_tx).await });
//!
//! server.stop().await?;
//! if let Ok(outcome) = done_rx.await {
//!     outcome?;
//! }
//! # Ok(())
//! # }
//! ```

/// Adapter configuration.
pub mod config;
/// Error types.
pub mod error;
/// Authorization decision seam.
pub mod handler;
/// Listener and serve-loop lifecycle.
pub mod server;
/// gRPC service implementation.
pub mod service;

/// Generated service contract.
pub mod proto {
    tonic::include_proto!("authorization");
}

pub use config::AdapterConfig;
pub use error::Error;
pub use handler::{AuthorizationHandler, HandlerError, PlaceholderHandler};
pub use server::{AdapterServer, AuthorizationServer, LifecycleState};
pub use service::AuthorizationService;

/// Result type for adapter operations.
pub type Result<T> = std::result::Result<T, Error>;
