//! Error types for the authorization adapter

use crate::server::LifecycleState;

/// Main error types for the library.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The TCP listener could not be opened.
    #[error("unable to listen on socket {addr}: {source}")]
    Bind {
        /// Address the adapter tried to bind.
        addr: String,
        /// Underlying OS error.
        #[source]
        source: std::io::Error,
    },

    /// The serve loop terminated with a transport failure.
    #[error("serve loop failed: {0}")]
    Serve(#[from] tonic::transport::Error),

    /// Releasing the listener during shutdown failed.
    #[error("failed to stop server: {0}")]
    Stop(String),

    /// The operation is not valid in the server's current lifecycle state.
    #[error("server cannot run while {0}")]
    InvalidState(LifecycleState),

    /// Configuration values were rejected.
    #[error("invalid configuration: {0}")]
    Config(String),
}
