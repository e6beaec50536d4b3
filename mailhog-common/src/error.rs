//! Error types shared by the session and listener layers.

use std::io;

use thiserror::Error;

/// Errors that end an SMTP session.
///
/// Protocol-level problems never show up here; the state machine answers
/// those with a reply and carries on. Only transport failures and
/// server-initiated endings terminate a session.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Protocol error occurred during session.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Connection error occurred.
    #[error("Connection error: {0}")]
    Connection(#[from] io::Error),

    /// Shutdown signal received.
    #[error("Shutdown requested")]
    Shutdown,

    /// Session timed out.
    #[error("Session timed out after {0} seconds")]
    Timeout(u64),
}

impl SessionError {
    /// Returns `true` if the error indicates a graceful shutdown.
    #[must_use]
    pub const fn is_shutdown(&self) -> bool {
        matches!(self, Self::Shutdown)
    }

    /// Returns `true` if the client caused the session to end: it stalled
    /// past a timeout or broke the TLS handshake.
    #[must_use]
    pub const fn is_client_error(&self) -> bool {
        matches!(self, Self::Protocol(_) | Self::Timeout(_))
    }
}

/// Errors raised while accepting connections.
#[derive(Debug, Error)]
pub enum ListenerError {
    /// Failed to bind a listener to the specified address.
    #[error("Failed to bind listener to {address}: {source}")]
    BindFailed {
        address: String,
        #[source]
        source: io::Error,
    },

    /// Failed to accept a connection.
    #[error("Failed to accept connection: {0}")]
    AcceptFailed(#[source] io::Error),

    /// A configured TLS file does not exist.
    #[error("Unable to find TLS {kind} {path}")]
    MissingTlsFile { kind: &'static str, path: String },

    /// The TLS files exist but no acceptor could be built from them.
    #[error("Unable to load TLS configuration: {0}")]
    Tls(String),
}
