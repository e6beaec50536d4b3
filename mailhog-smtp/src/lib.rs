//! The SMTP side of the MailHog capture server.
//!
//! [`Protocol`] is a synchronous state machine that turns lines into
//! [`Reply`] values. [`Session`] drives it over a byte stream (plain or
//! upgraded to TLS), and [`Listener`] accepts TCP connections and spawns a
//! session for each one. A [`ChaosMonkey`] can be plugged in to inject
//! rejections, disconnects and slow links.

pub mod command;
pub mod connection;
pub mod error;
pub mod hooks;
pub mod listener;
pub mod monkey;
pub mod protocol;
pub mod reply;
pub mod session;
pub mod state;
pub mod status;
pub mod throttle;

pub use command::Command;
pub use connection::{ServerTls, TlsContext};
pub use hooks::{MessageHandler, Policy, TlsHandler};
pub use listener::Listener;
pub use monkey::{ChaosMonkey, Jim};
pub use protocol::{Protocol, ProtocolBuilder, ProtocolConfig};
pub use reply::{AfterSend, Reply};
pub use session::{Session, SessionConfig};
pub use state::State;
pub use status::Status;
