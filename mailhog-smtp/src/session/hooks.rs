//! The protocol collaborators a session wires up from its [`super::SessionConfig`].

use std::sync::Arc;

use mailhog_common::{Message, MessageId, SmtpMessage, internal};
use mailhog_storage::Storage;
use tokio::sync::broadcast;

use crate::{
    Reply,
    error::HandlerError,
    hooks::{MessageHandler, Policy, TlsHandler},
    monkey::ChaosMonkey,
};

/// Parses each completed envelope, persists it and publishes it to any
/// subscribers.
pub(super) struct StoreMessage {
    pub(super) storage: Arc<dyn Storage>,
    pub(super) hostname: String,
    pub(super) broadcast: Option<broadcast::Sender<Message>>,
}

impl MessageHandler for StoreMessage {
    fn received(&self, envelope: SmtpMessage) -> Result<MessageId, HandlerError> {
        let message = envelope.parse(&self.hostname);
        let published = self.broadcast.as_ref().map(|_| message.clone());

        let id = self.storage.store(message)?;
        internal!(level = INFO, "Storing message {}", id);

        if let (Some(sender), Some(message)) = (&self.broadcast, published)
            && sender.send(message).is_err()
        {
            internal!("No subscribers for message {}", id);
        }

        Ok(id)
    }
}

/// Routes MAIL, RCPT and AUTH decisions through the chaos monkey, if any,
/// and advertises the configured AUTH mechanisms.
pub(super) struct SessionPolicy {
    pub(super) monkey: Option<Arc<dyn ChaosMonkey>>,
    pub(super) mechanisms: Vec<String>,
}

impl Policy for SessionPolicy {
    fn accept_sender(&self, from: &str) -> bool {
        self.monkey.as_ref().is_none_or(|monkey| monkey.valid_mail(from))
    }

    fn accept_recipient(&self, to: &str) -> bool {
        self.monkey.as_ref().is_none_or(|monkey| monkey.valid_rcpt(to))
    }

    fn authenticate(&self, mechanism: &str, args: &[&str]) -> Result<(), Reply> {
        match &self.monkey {
            Some(monkey) if !monkey.valid_auth(mechanism, args) => Err(Reply::invalid_auth()),
            _ => Ok(()),
        }
    }

    fn auth_mechanisms(&self) -> Vec<String> {
        self.mechanisms.clone()
    }
}

/// Present only when certificates are configured.
pub(super) struct OfferStartTls;

impl TlsHandler for OfferStartTls {}
