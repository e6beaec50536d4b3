use std::{
    fs, io,
    path::{Path, PathBuf},
    sync::Arc,
};

use mailhog_common::internal;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio_rustls::{
    TlsAcceptor,
    rustls::{
        ServerConfig,
        pki_types::{CertificateDer, PrivateKeyDer},
    },
    server::TlsStream,
};

use crate::error::TlsError;

/// PEM files used for STARTTLS.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TlsContext {
    pub certificate: PathBuf,
    pub key: PathBuf,
}

impl TlsContext {
    /// Reads both PEM files and builds the acceptor sessions share.
    ///
    /// # Errors
    /// If either file cannot be read or [`ServerTls::from_pem`] fails.
    pub fn load(&self) -> Result<ServerTls, TlsError> {
        let read = |path: &Path| {
            fs::read(path).map_err(|source| TlsError::Read {
                path: path.display().to_string(),
                source,
            })
        };

        let certificate = read(self.certificate.as_path())?;
        let key = read(self.key.as_path())?;

        let tls = ServerTls::from_pem(&certificate, &key)?;
        internal!("Loaded TLS certificate from {}", self.certificate.display());
        Ok(tls)
    }
}

/// A ready-to-use TLS acceptor. Cloning shares the same server config.
#[derive(Clone)]
pub struct ServerTls {
    acceptor: Arc<TlsAcceptor>,
}

impl core::fmt::Debug for ServerTls {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ServerTls").finish_non_exhaustive()
    }
}

impl ServerTls {
    /// Builds an acceptor from a PEM certificate chain and private key.
    ///
    /// # Errors
    /// If the PEM data is malformed, holds no key, or rustls rejects the
    /// pair.
    pub fn from_pem(certificate: &[u8], key: &[u8]) -> Result<Self, TlsError> {
        let certs = rustls_pemfile::certs(&mut &*certificate)
            .collect::<io::Result<Vec<CertificateDer<'static>>>>()
            .map_err(TlsError::Pem)?;
        let key: PrivateKeyDer<'static> = rustls_pemfile::private_key(&mut &*key)
            .map_err(TlsError::Pem)?
            .ok_or(TlsError::MissingKey)?;

        internal!(level = DEBUG, "Building TLS acceptor for {} certificate(s)", certs.len());

        let config = ServerConfig::builder()
            .with_no_client_auth()
            .with_single_cert(certs, key)?;

        Ok(Self {
            acceptor: Arc::new(TlsAcceptor::from(Arc::new(config))),
        })
    }
}

pub enum Connection<Stream: AsyncRead + AsyncWrite + Unpin + Send> {
    Plain { stream: Stream },
    Tls { stream: Box<TlsStream<Stream>> },
}

impl<Stream: AsyncRead + AsyncWrite + Unpin + Send> Connection<Stream> {
    pub const fn plain(stream: Stream) -> Self {
        Self::Plain { stream }
    }

    pub const fn is_tls(&self) -> bool {
        matches!(self, Self::Tls { .. })
    }

    /// Writes and flushes `bytes`.
    pub async fn send(&mut self, bytes: &[u8]) -> io::Result<()> {
        match self {
            Self::Plain { stream } => {
                stream.write_all(bytes).await?;
                stream.flush().await
            }
            Self::Tls { stream } => {
                stream.write_all(bytes).await?;
                stream.flush().await
            }
        }
    }

    /// Reads whatever is available into `buf`. `Ok(0)` means the peer
    /// closed the connection.
    pub async fn receive(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Self::Plain { stream } => stream.read(buf).await,
            Self::Tls { stream } => stream.read(buf).await,
        }
    }

    /// Runs the server side of a TLS handshake over the plain stream.
    ///
    /// # Errors
    /// If the connection is already encrypted or the handshake fails.
    pub async fn upgrade(self, tls: &ServerTls) -> Result<Self, TlsError> {
        internal!("Upgrading connection ...");

        match self {
            Self::Plain { stream } => {
                let stream = tls.acceptor.accept(stream).await.map_err(TlsError::Handshake)?;

                let (_, session) = stream.get_ref();
                internal!(
                    level = DEBUG,
                    "Negotiated {:?} using {:?}",
                    session.protocol_version(),
                    session.negotiated_cipher_suite().map(|suite| suite.suite())
                );

                Ok(Self::Tls {
                    stream: Box::new(stream),
                })
            }
            Self::Tls { .. } => Err(TlsError::AlreadyUpgraded),
        }
    }
}
