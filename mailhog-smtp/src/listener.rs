use std::net::SocketAddr;

use futures_util::future::join_all;
use mailhog_common::{Signal, error::ListenerError, internal};
use tokio::{
    net::TcpListener,
    sync::broadcast::{self, error::RecvError},
    task::JoinHandle,
};

use crate::{
    connection::TlsContext,
    session::{Session, SessionConfig},
};

/// Accepts TCP connections and runs a [`Session`] for each.
#[derive(Debug)]
pub struct Listener {
    address: SocketAddr,
    config: SessionConfig,
    tls: Option<TlsContext>,
}

impl Listener {
    #[must_use]
    pub const fn new(address: SocketAddr, config: SessionConfig) -> Self {
        Self {
            address,
            config,
            tls: None,
        }
    }

    /// Offers STARTTLS with the certificate and key in `context`, loaded
    /// once when serving starts.
    #[must_use]
    pub fn with_tls(mut self, context: TlsContext) -> Self {
        self.tls = Some(context);
        self
    }

    #[must_use]
    pub const fn address(&self) -> SocketAddr {
        self.address
    }

    /// Ensures configured TLS files exist before any client can ask for
    /// STARTTLS.
    fn check_tls(&self) -> Result<(), ListenerError> {
        let Some(tls) = self.tls.as_ref() else {
            return Ok(());
        };

        for (kind, path) in [("certificate", &tls.certificate), ("key", &tls.key)] {
            if !path.try_exists().unwrap_or(false) {
                return Err(ListenerError::MissingTlsFile {
                    kind,
                    path: path.display().to_string(),
                });
            }
        }

        Ok(())
    }

    /// Binds the configured address.
    ///
    /// # Errors
    /// If a TLS file is missing or the address cannot be bound.
    pub async fn bind(&self) -> Result<TcpListener, ListenerError> {
        self.check_tls()?;

        TcpListener::bind(self.address)
            .await
            .map_err(|source| ListenerError::BindFailed {
                address: self.address.to_string(),
                source,
            })
    }

    /// Binds and serves until a [`Signal::Shutdown`] arrives.
    ///
    /// # Errors
    /// See [`Listener::bind`] and [`Listener::serve_on`].
    pub async fn serve(&self, shutdown: broadcast::Receiver<Signal>) -> Result<(), ListenerError> {
        let listener = self.bind().await?;
        self.serve_on(listener, shutdown).await
    }

    /// The session config with the TLS acceptor loaded, if one is configured.
    fn session_config(&self) -> Result<SessionConfig, ListenerError> {
        let Some(context) = self.tls.as_ref() else {
            return Ok(self.config.clone());
        };

        let tls = context
            .load()
            .map_err(|err| ListenerError::Tls(err.to_string()))?;

        let mut config = self.config.clone();
        config.tls = Some(tls);
        Ok(config)
    }

    /// Serves on an already bound socket. On shutdown, waits for every open
    /// session to finish before returning.
    ///
    /// # Errors
    /// If the TLS acceptor cannot be built or accepting a connection fails.
    pub async fn serve_on(
        &self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<Signal>,
    ) -> Result<(), ListenerError> {
        let config = self.session_config()?;
        let local = listener.local_addr().unwrap_or(self.address);
        internal!(level = INFO, "Serving SMTP on {}", local);

        let mut sessions: Vec<JoinHandle<()>> = Vec::new();

        loop {
            tokio::select! {
                signal = shutdown.recv() => match signal {
                    Ok(Signal::Shutdown) | Err(RecvError::Closed | RecvError::Lagged(_)) => {
                        internal!(
                            level = INFO,
                            "SMTP listener {} received shutdown signal, finishing {} session(s) ...",
                            local,
                            sessions.len()
                        );
                        join_all(sessions).await;
                        break;
                    }
                    Ok(Signal::Finalised) => {}
                },

                connection = listener.accept() => {
                    let (stream, peer) = connection.map_err(ListenerError::AcceptFailed)?;
                    internal!(level = DEBUG, "Connection received on {} from {}", local, peer);

                    if let Some(monkey) = config.monkey.as_ref()
                        && !monkey.accept(peer)
                    {
                        drop(stream);
                        continue;
                    }

                    sessions.retain(|session| !session.is_finished());

                    let session = Session::create(stream, peer, config.clone());
                    let signal = shutdown.resubscribe();
                    sessions.push(tokio::spawn(async move {
                        match session.run(signal).await {
                            Ok(()) => {}
                            Err(err) if err.is_shutdown() => {
                                internal!(level = DEBUG, "Session with {} ended: {}", peer, err);
                            }
                            Err(err) if err.is_client_error() => {
                                internal!(
                                    level = WARN,
                                    "Session with {} ended by client: {}",
                                    peer,
                                    err
                                );
                            }
                            Err(err) => {
                                internal!(level = ERROR, "Session with {} failed: {}", peer, err);
                            }
                        }
                    }));
                }
            }
        }

        Ok(())
    }
}
