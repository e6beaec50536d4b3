use std::sync::Arc;

use mailhog_common::{Message, Signal, internal};
use mailhog_smtp::{ChaosMonkey, Listener, SessionConfig};
use mailhog_storage::Storage;
use tokio::sync::broadcast;

use crate::config::Config;

/// How many messages a slow subscriber may fall behind before it starts
/// missing some.
const MESSAGE_BACKLOG: usize = 64;

/// Room for shutdown signals a listener has not yet picked up.
const SIGNAL_BACKLOG: usize = 16;

async fn shutdown(signal: &broadcast::Sender<Signal>) -> anyhow::Result<()> {
    let mut terminate = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            internal!(level = INFO, "CTRL+C entered -- Enter it again to force shutdown");
        }
        _ = terminate.recv() => {
            internal!(level = INFO, "Terminate Signal received, shutting down");
        }
    };

    if signal.send(Signal::Shutdown).is_err() {
        internal!("Nothing left to notify of shutdown");
    }

    Ok(())
}

/// Owns the storage backend and wires it, the chaos monkey and the SMTP
/// listener together.
#[derive(Debug)]
pub struct MailHog {
    config: Config,
    storage: Arc<dyn Storage>,
    messages: broadcast::Sender<Message>,
}

impl MailHog {
    #[must_use]
    pub fn new(config: Config) -> Self {
        let storage = config.storage.clone().into_storage();
        let (messages, _receiver) = broadcast::channel(MESSAGE_BACKLOG);

        Self {
            config,
            storage,
            messages,
        }
    }

    #[must_use]
    pub fn storage(&self) -> Arc<dyn Storage> {
        Arc::clone(&self.storage)
    }

    /// Receives every message as soon as it has been stored.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<Message> {
        self.messages.subscribe()
    }

    #[must_use]
    pub fn session_config(&self) -> SessionConfig {
        let smtp = &self.config.smtp;

        let mut builder = SessionConfig::builder()
            .with_hostname(self.config.hostname.clone())
            .with_ident(smtp.ident.clone())
            .with_protocol(smtp.protocol.clone())
            .with_auth_mechanisms(smtp.auth_mechanisms.clone())
            .with_timeouts(smtp.timeouts.clone())
            .with_storage(self.storage())
            .with_broadcast(self.messages.clone());

        if let Some(jim) = self.config.jim.clone() {
            internal!(level = INFO, "Chaos monkey enabled: {:?}", jim);
            builder = builder.with_monkey(Arc::new(jim) as Arc<dyn ChaosMonkey>);
        }

        builder.build()
    }

    /// The SMTP listener, with STARTTLS when certificates are configured.
    #[must_use]
    pub fn listener(&self) -> Listener {
        let listener = Listener::new(self.config.smtp.bind, self.session_config());

        match self.config.smtp.tls.clone() {
            Some(tls) => listener.with_tls(tls),
            None => listener,
        }
    }

    /// Runs the SMTP listener until CTRL+C or SIGTERM, then waits for open
    /// sessions to finish. A second CTRL+C stops waiting.
    ///
    /// # Errors
    /// If the TLS files cannot be loaded, the listener cannot bind, or
    /// accepting connections fails.
    #[tracing::instrument(level = "trace", skip_all, err)]
    pub async fn run(self) -> anyhow::Result<()> {
        internal!(level = INFO, "Controller running");

        let (signal, receiver) = broadcast::channel(SIGNAL_BACKLOG);
        let listener = self.listener();
        let mut server = tokio::spawn(async move { listener.serve(receiver).await });

        tokio::select! {
            result = &mut server => {
                return Ok(result??);
            }
            result = shutdown(&signal) => result?,
        }

        internal!(level = INFO, "Shutting down...");

        tokio::select! {
            result = server => result??,
            _ = tokio::signal::ctrl_c() => {
                internal!(level = WARN, "Forced shutdown, abandoning open sessions");
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use mailhog_common::SmtpMessage;
    use mailhog_storage::StorageConfig;

    use super::*;

    #[test]
    fn storage_follows_config() {
        let mailhog = MailHog::new(Config {
            storage: StorageConfig::Memory { capacity: Some(1) },
            ..Config::default()
        });

        let storage = mailhog.storage();
        let message = SmtpMessage {
            from: "a@b".to_string(),
            to: vec!["c@d".to_string()],
            data: "Subject: x\r\n\r\ny".to_string(),
            helo: "client".to_string(),
        };

        assert!(storage.store(message.clone().parse("mailhog.example")).is_ok());
        assert!(storage.store(message.parse("mailhog.example")).is_err());
    }

    #[test]
    fn session_config_carries_settings() {
        let mut config = Config::default();
        config.hostname = "capture.local".to_string();
        config.smtp.auth_mechanisms = vec!["LOGIN".to_string()];
        config.jim = Some(mailhog_smtp::Jim::default());

        let session = MailHog::new(config).session_config();

        assert_eq!(session.hostname, "capture.local");
        assert_eq!(session.auth_mechanisms, vec!["LOGIN".to_string()]);
        assert!(session.monkey.is_some());
        assert!(session.storage.is_some());
        assert!(session.broadcast.is_some());
    }

    #[test]
    fn no_monkey_by_default() {
        let session = MailHog::new(Config::default()).session_config();
        assert!(session.monkey.is_none());
        assert!(session.tls.is_none());
    }
}
