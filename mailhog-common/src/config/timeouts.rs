//! Read deadlines applied to SMTP sessions.
//!
//! The state machine itself never times anything out; these limits are
//! enforced by the session wrapper around each read from the transport.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Server-side SMTP timeout configuration.
///
/// Defaults follow the RFC 5321 recommendations for a receiving server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerTimeouts {
    /// Time allowed between command lines (HELO, MAIL, RCPT, ...).
    ///
    /// Default: 300 seconds
    #[serde(default = "defaults::command_secs")]
    pub command_secs: u64,

    /// Time allowed between reads while a message body is being received.
    ///
    /// Default: 180 seconds
    #[serde(default = "defaults::data_secs")]
    pub data_secs: u64,

    /// Maximum total connection duration.
    ///
    /// Default: 1800 seconds
    #[serde(default = "defaults::connection_secs")]
    pub connection_secs: u64,
}

impl Default for ServerTimeouts {
    fn default() -> Self {
        Self {
            command_secs: defaults::command_secs(),
            data_secs: defaults::data_secs(),
            connection_secs: defaults::connection_secs(),
        }
    }
}

impl ServerTimeouts {
    #[must_use]
    pub const fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_secs)
    }

    #[must_use]
    pub const fn data_timeout(&self) -> Duration {
        Duration::from_secs(self.data_secs)
    }

    #[must_use]
    pub const fn connection_timeout(&self) -> Duration {
        Duration::from_secs(self.connection_secs)
    }
}

mod defaults {
    pub const fn command_secs() -> u64 {
        300
    }
    pub const fn data_secs() -> u64 {
        180
    }
    pub const fn connection_secs() -> u64 {
        1800
    }
}
