use std::{net::SocketAddr, sync::Arc, time::Instant};

use mailhog_common::{
    Message, Signal, config::ServerTimeouts, error::SessionError, incoming, internal,
    logging::escape, outgoing,
};
use mailhog_storage::Storage;
use tokio::{
    io::{AsyncRead, AsyncWrite},
    sync::broadcast::{self, error::RecvError},
};

use crate::{
    AfterSend, Protocol, ProtocolConfig, Reply, State, Status,
    connection::{Connection, ServerTls},
    monkey::ChaosMonkey,
    protocol::{DEFAULT_HOSTNAME, DEFAULT_IDENT},
    throttle::LinkSpeed,
};

mod hooks;

use hooks::{OfferStartTls, SessionPolicy, StoreMessage};

const READ_CHUNK: usize = 1024;

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub hostname: String,
    pub ident: String,
    pub protocol: ProtocolConfig,
    pub auth_mechanisms: Vec<String>,
    pub tls: Option<ServerTls>,
    pub timeouts: ServerTimeouts,
    pub storage: Option<Arc<dyn Storage>>,
    pub monkey: Option<Arc<dyn ChaosMonkey>>,
    pub broadcast: Option<broadcast::Sender<Message>>,
}

impl SessionConfig {
    #[must_use]
    pub fn builder() -> SessionConfigBuilder {
        SessionConfigBuilder::default()
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// Builder for `SessionConfig`
#[derive(Debug)]
pub struct SessionConfigBuilder {
    hostname: String,
    ident: String,
    protocol: ProtocolConfig,
    auth_mechanisms: Vec<String>,
    tls: Option<ServerTls>,
    timeouts: ServerTimeouts,
    storage: Option<Arc<dyn Storage>>,
    monkey: Option<Arc<dyn ChaosMonkey>>,
    broadcast: Option<broadcast::Sender<Message>>,
}

impl Default for SessionConfigBuilder {
    fn default() -> Self {
        Self {
            hostname: DEFAULT_HOSTNAME.to_string(),
            ident: DEFAULT_IDENT.to_string(),
            protocol: ProtocolConfig::default(),
            auth_mechanisms: vec!["PLAIN".to_string()],
            tls: None,
            timeouts: ServerTimeouts::default(),
            storage: None,
            monkey: None,
            broadcast: None,
        }
    }
}

impl SessionConfigBuilder {
    /// Hostname used in the greeting and in generated message IDs
    #[must_use]
    pub fn with_hostname(mut self, hostname: impl Into<String>) -> Self {
        self.hostname = hostname.into();
        self
    }

    #[must_use]
    pub fn with_ident(mut self, ident: impl Into<String>) -> Self {
        self.ident = ident.into();
        self
    }

    #[must_use]
    pub fn with_protocol(mut self, protocol: ProtocolConfig) -> Self {
        self.protocol = protocol;
        self
    }

    /// Mechanisms advertised after EHLO
    #[must_use]
    pub fn with_auth_mechanisms(mut self, mechanisms: Vec<String>) -> Self {
        self.auth_mechanisms = mechanisms;
        self
    }

    /// Enables STARTTLS, handshaking with `tls`
    #[must_use]
    pub fn with_tls(mut self, tls: ServerTls) -> Self {
        self.tls = Some(tls);
        self
    }

    #[must_use]
    pub const fn with_timeouts(mut self, timeouts: ServerTimeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    /// Where completed messages go. Without one every message is refused
    /// with a 452.
    #[must_use]
    pub fn with_storage(mut self, storage: Arc<dyn Storage>) -> Self {
        self.storage = Some(storage);
        self
    }

    #[must_use]
    pub fn with_monkey(mut self, monkey: Arc<dyn ChaosMonkey>) -> Self {
        self.monkey = Some(monkey);
        self
    }

    /// Publishes every stored message on `sender`
    #[must_use]
    pub fn with_broadcast(mut self, sender: broadcast::Sender<Message>) -> Self {
        self.broadcast = Some(sender);
        self
    }

    #[must_use]
    pub fn build(self) -> SessionConfig {
        SessionConfig {
            hostname: self.hostname,
            ident: self.ident,
            protocol: self.protocol,
            auth_mechanisms: self.auth_mechanisms,
            tls: self.tls,
            timeouts: self.timeouts,
            storage: self.storage,
            monkey: self.monkey,
            broadcast: self.broadcast,
        }
    }
}

/// What the session should do after a batch of lines has been processed.
#[derive(Debug, PartialEq, Eq)]
enum Flow {
    Continue,
    Close,
    StartTls,
}

/// Drives a [`Protocol`] over a byte stream.
pub struct Session<Stream: AsyncRead + AsyncWrite + Unpin + Send> {
    peer: SocketAddr,
    connection: Connection<Stream>,
    protocol: Protocol,
    /// Bytes received after the last complete line
    buffer: Vec<u8>,
    tls: Option<ServerTls>,
    monkey: Option<Arc<dyn ChaosMonkey>>,
    throttle: Option<LinkSpeed>,
    timeouts: ServerTimeouts,
    start_time: Instant,
}

impl<Stream: AsyncRead + AsyncWrite + Unpin + Send> Session<Stream> {
    pub fn create(stream: Stream, peer: SocketAddr, config: SessionConfig) -> Self {
        let mut builder = Protocol::builder()
            .with_hostname(config.hostname.clone())
            .with_ident(config.ident)
            .with_config(config.protocol)
            .with_policy(SessionPolicy {
                monkey: config.monkey.clone(),
                mechanisms: config.auth_mechanisms,
            });

        if let Some(storage) = config.storage {
            builder = builder.with_handler(StoreMessage {
                storage,
                hostname: config.hostname,
                broadcast: config.broadcast,
            });
        }

        if config.tls.is_some() {
            builder = builder.with_tls(OfferStartTls);
        }

        let throttle = config
            .monkey
            .as_ref()
            .and_then(|monkey| monkey.link_speed())
            .map(LinkSpeed::new);

        Self {
            peer,
            connection: Connection::plain(stream),
            protocol: builder.build(),
            buffer: Vec::new(),
            tls: config.tls,
            monkey: config.monkey,
            throttle,
            timeouts: config.timeouts,
            start_time: Instant::now(),
        }
    }

    /// The read deadline for the current state.
    const fn timeout_secs(&self) -> u64 {
        match self.protocol.state() {
            State::Data => self.timeouts.data_secs,
            _ => self.timeouts.command_secs,
        }
    }

    /// Runs the session until the client quits, disconnects, times out or
    /// the server shuts down.
    ///
    /// # Errors
    /// On transport failures, timeouts, a failed TLS handshake, and
    /// shutdown (after `421` has been sent).
    #[tracing::instrument(level = "debug", skip_all, fields(peer = %self.peer))]
    pub async fn run(
        mut self,
        mut signal: broadcast::Receiver<Signal>,
    ) -> Result<(), SessionError> {
        internal!(level = INFO, "Starting session");

        let greeting = self.protocol.start();
        self.reply(&greeting).await?;

        let mut listening = true;
        let mut chunk = [0; READ_CHUNK];

        loop {
            let lifetime = self.timeouts.connection_timeout();
            let remaining = lifetime.saturating_sub(self.start_time.elapsed());
            if remaining.is_zero() {
                internal!(
                    level = WARN,
                    "Connection exceeded maximum lifetime of {}s, closing",
                    self.timeouts.connection_secs
                );
                return Err(SessionError::Timeout(self.timeouts.connection_secs));
            }

            let (timeout, timeout_secs) = {
                let secs = self.timeout_secs();
                let idle = std::time::Duration::from_secs(secs);
                if remaining < idle {
                    (remaining, self.timeouts.connection_secs)
                } else {
                    (idle, secs)
                }
            };

            let read = tokio::select! {
                received = signal.recv(), if listening => match received {
                    Ok(Signal::Shutdown) | Err(RecvError::Lagged(_)) => {
                        internal!(level = INFO, "Server shutting down, closing session");
                        self.reply(&Reply::shutting_down()).await?;
                        return Err(SessionError::Shutdown);
                    }
                    Ok(Signal::Finalised) => continue,
                    Err(RecvError::Closed) => {
                        listening = false;
                        continue;
                    }
                },
                result = tokio::time::timeout(timeout, self.connection.receive(&mut chunk)) => {
                    let Ok(read) = result else {
                        internal!(
                            level = WARN,
                            "[{}] Client timed out after {}s",
                            self.protocol.state(),
                            timeout_secs
                        );
                        return Err(SessionError::Timeout(timeout_secs));
                    };
                    read?
                }
            };

            if read == 0 {
                internal!(level = INFO, "Connection closed by remote host");
                return Ok(());
            }

            if let Some(throttle) = self.throttle.as_mut() {
                throttle.pace(read).await;
            }

            incoming!(
                "Received {} bytes: '{}'",
                read,
                escape(&String::from_utf8_lossy(&chunk[..read]))
            );
            self.buffer.extend_from_slice(&chunk[..read]);

            match self.process().await? {
                Flow::Continue => {}
                Flow::Close => {
                    internal!(level = INFO, "Session finished");
                    return Ok(());
                }
                Flow::StartTls => self = self.start_tls().await?,
            }

            if self.monkey.as_ref().is_some_and(|monkey| monkey.disconnect()) {
                internal!(level = INFO, "Chaos monkey closed the connection");
                return Ok(());
            }
        }
    }

    /// Feeds every complete line in the buffer to the protocol, writing
    /// replies as they are produced.
    async fn process(&mut self) -> Result<Flow, SessionError> {
        let Some(end) = self.buffer.windows(2).rposition(|pair| pair == b"\r\n") else {
            return Ok(Flow::Continue);
        };

        let complete: Vec<u8> = self.buffer.drain(..end + 2).collect();
        let mut pending: &[u8] = &complete;

        while let Some(position) = pending.windows(2).position(|pair| pair == b"\r\n") {
            let (line, rest) = pending.split_at(position + 2);
            pending = rest;

            let reply = match std::str::from_utf8(line) {
                Ok(line) => self.protocol.parse(line).1,
                Err(err) => {
                    internal!(level = DEBUG, "Received a line that is not UTF-8: {}", err);
                    self.protocol.reject_line()
                }
            };

            let Some(reply) = reply else {
                continue;
            };

            self.reply(&reply).await?;

            if reply.status == Status::GoodBye {
                return Ok(Flow::Close);
            }

            if reply.after_send() == Some(AfterSend::StartTls) {
                if !pending.is_empty() || !self.buffer.is_empty() {
                    internal!(
                        level = DEBUG,
                        "Discarding {} bytes pipelined after STARTTLS",
                        pending.len() + self.buffer.len()
                    );
                }
                self.buffer.clear();
                return Ok(Flow::StartTls);
            }
        }

        Ok(Flow::Continue)
    }

    async fn reply(&mut self, reply: &Reply) -> Result<(), SessionError> {
        let wire = reply.lines().concat();
        outgoing!("{}", escape(&wire));

        if let Some(throttle) = self.throttle.as_mut() {
            throttle.pace(wire.len()).await;
        }

        self.connection.send(wire.as_bytes()).await.map_err(|err| {
            internal!(level = ERROR, "Failed to send reply: {}", err);
            SessionError::Connection(err)
        })
    }

    async fn start_tls(mut self) -> Result<Self, SessionError> {
        let Some(tls) = self.tls.clone() else {
            self.protocol.tls_complete(false);
            return Ok(self);
        };

        match self.connection.upgrade(&tls).await {
            Ok(connection) => {
                self.connection = connection;
                self.protocol.tls_complete(true);
                internal!(level = DEBUG, "Connection successfully upgraded");
                Ok(self)
            }
            Err(err) => {
                internal!(level = ERROR, "STARTTLS failed: {}", err);
                Err(SessionError::Protocol(err.to_string()))
            }
        }
    }
}
