//! Collaborators the [`crate::Protocol`] consults while processing commands.
//!
//! Each one is optional. When it is absent the protocol behaves as follows:
//! without a [`MessageHandler`] every completed message is answered with
//! `452 No storage backend`; without a [`Policy`] every sender, recipient
//! and credential is accepted, no verbs are filtered and EHLO advertises no
//! AUTH mechanisms; without a [`TlsHandler`] STARTTLS is not offered.

use mailhog_common::{MessageId, SmtpMessage};

use crate::{Reply, error::HandlerError};

/// Receives each completed envelope, exactly once per DATA phase.
pub trait MessageHandler: Send + Sync {
    /// Parses and persists `message`, returning the ID it was stored under.
    fn received(&self, message: SmtpMessage) -> Result<MessageId, HandlerError>;
}

impl<F> MessageHandler for F
where
    F: Fn(SmtpMessage) -> Result<MessageId, HandlerError> + Send + Sync,
{
    fn received(&self, message: SmtpMessage) -> Result<MessageId, HandlerError> {
        self(message)
    }
}

/// Accept/reject decisions. Every method defaults to the permissive answer.
pub trait Policy: Send + Sync {
    /// Consulted before any other dispatch. A reply short-circuits the command.
    fn filter_verb(&self, _verb: &str) -> Option<Reply> {
        None
    }

    fn accept_sender(&self, _from: &str) -> bool {
        true
    }

    fn accept_recipient(&self, _to: &str) -> bool {
        true
    }

    /// `args` depends on the mechanism: `[user, pass]` for PLAIN, the two raw
    /// base64 lines for LOGIN, the raw response for CRAM-MD5 and the given
    /// identity for EXTERNAL. An `Err` reply is sent to the client as is.
    fn authenticate(&self, _mechanism: &str, _args: &[&str]) -> Result<(), Reply> {
        Ok(())
    }

    /// Mechanisms advertised in the EHLO reply.
    fn auth_mechanisms(&self) -> Vec<String> {
        Vec::new()
    }
}

/// Offers STARTTLS. The handshake itself is run by the transport once the
/// `220 Ready to start TLS` reply has been flushed.
pub trait TlsHandler: Send + Sync {
    /// Called when STARTTLS arrives; an `Err` reply refuses the upgrade.
    fn prepare(&self) -> Result<(), Reply> {
        Ok(())
    }
}
