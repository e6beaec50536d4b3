//! MailHog: a disposable SMTP server that captures every message it is sent.
//!
//! This crate ties the workspace together: [`config::Config`] describes a
//! server, and [`controller::MailHog`] builds the storage backend, chaos
//! monkey and SMTP listener from it.

pub mod config;
pub mod controller;

pub use config::Config;
pub use controller::MailHog;
