//! Shared data model for the MailHog capture server.
//!
//! Everything a captured message is made of lives here: the SMTP [`Path`],
//! the raw [`SmtpMessage`] envelope accumulated during a session, the parsed
//! [`Message`] with its [`Content`] tree, and the logging macros every other
//! crate in the workspace uses.

pub mod config;
pub mod content;
pub mod envelope;
pub mod error;
pub mod logging;
pub mod message;
pub mod path;

pub use content::{Content, MimeBody};
pub use envelope::SmtpMessage;
pub use message::{Message, MessageId, Messages};
pub use path::Path;
pub use tracing;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    Shutdown,
    Finalised,
}
