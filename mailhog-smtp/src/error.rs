//! Error types for the mailhog-smtp crate.

use std::io;

use mailhog_storage::StorageError;
use thiserror::Error;

/// A MAIL or RCPT argument without a usable `<path>`.
///
/// The message text goes to the client verbatim in a 550 reply.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum SyntaxError {
    #[error("Invalid syntax in MAIL command")]
    Mail,

    #[error("Invalid syntax in RCPT command")]
    Rcpt,
}

/// A malformed AUTH payload.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum AuthError {
    #[error("Badly formed parameter")]
    BadlyFormed,
}

/// Failure reported by a [`crate::MessageHandler`].
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Errors setting up or performing a TLS upgrade.
#[derive(Debug, Error)]
pub enum TlsError {
    #[error("Unable to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("Malformed PEM data: {0}")]
    Pem(#[source] io::Error),

    #[error("No private key found")]
    MissingKey,

    #[error("TLS configuration error: {0}")]
    Config(#[from] tokio_rustls::rustls::Error),

    #[error("TLS handshake failed: {0}")]
    Handshake(#[source] io::Error),

    #[error("Connection is already using TLS")]
    AlreadyUpgraded,
}

#[cfg(test)]
mod tests {
    use mailhog_common::MessageId;

    use super::*;

    #[test]
    fn messages_match_wire_text() {
        assert_eq!(SyntaxError::Mail.to_string(), "Invalid syntax in MAIL command");
        assert_eq!(SyntaxError::Rcpt.to_string(), "Invalid syntax in RCPT command");
        assert_eq!(AuthError::BadlyFormed.to_string(), "Badly formed parameter");
    }

    #[test]
    fn storage_errors_pass_through() {
        let err = HandlerError::from(StorageError::NotFound(MessageId::from("x@y")));
        assert_eq!(err.to_string(), "Message not found: x@y");
    }
}
