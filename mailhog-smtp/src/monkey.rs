//! Fault injection for exercising client resilience.
//!
//! A [`ChaosMonkey`] is consulted by the listener and the session at a few
//! fixed points: once per accepted connection, once per session for the link
//! speed, on every MAIL, RCPT and AUTH, and after every read.

use core::fmt::Debug;
use std::net::SocketAddr;

use mailhog_common::internal;
use serde::{Deserialize, Serialize};

pub trait ChaosMonkey: Send + Sync + Debug {
    /// `false` drops the connection before any SMTP dialogue.
    fn accept(&self, peer: SocketAddr) -> bool;

    /// Bytes per second to shape this session to, if any.
    fn link_speed(&self) -> Option<u64>;

    fn valid_mail(&self, from: &str) -> bool;

    fn valid_rcpt(&self, to: &str) -> bool;

    fn valid_auth(&self, mechanism: &str, args: &[&str]) -> bool;

    /// `true` closes the connection mid-session.
    fn disconnect(&self) -> bool;
}

/// Draws from the thread-local generator, so concurrent sessions never
/// contend on a shared RNG.
fn chance(probability: f64) -> bool {
    rand::random::<f64>() < probability
}

/// The stock chaos monkey: every decision is an independent random draw
/// against its configured probability.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Jim {
    #[serde(default = "defaults::disconnect_chance")]
    pub disconnect_chance: f64,
    #[serde(default = "defaults::accept_chance")]
    pub accept_chance: f64,
    #[serde(default = "defaults::link_speed_affect")]
    pub link_speed_affect: f64,
    /// Bytes per second
    #[serde(default = "defaults::link_speed_min")]
    pub link_speed_min: f64,
    /// Bytes per second
    #[serde(default = "defaults::link_speed_max")]
    pub link_speed_max: f64,
    #[serde(default = "defaults::reject_chance")]
    pub reject_sender_chance: f64,
    #[serde(default = "defaults::reject_chance")]
    pub reject_recipient_chance: f64,
    #[serde(default = "defaults::reject_chance")]
    pub reject_auth_chance: f64,
}

impl Default for Jim {
    fn default() -> Self {
        Self {
            disconnect_chance: defaults::disconnect_chance(),
            accept_chance: defaults::accept_chance(),
            link_speed_affect: defaults::link_speed_affect(),
            link_speed_min: defaults::link_speed_min(),
            link_speed_max: defaults::link_speed_max(),
            reject_sender_chance: defaults::reject_chance(),
            reject_recipient_chance: defaults::reject_chance(),
            reject_auth_chance: defaults::reject_chance(),
        }
    }
}

impl ChaosMonkey for Jim {
    fn accept(&self, peer: SocketAddr) -> bool {
        if chance(self.accept_chance) {
            internal!("Jim: Allowing connection from {}", peer);
            true
        } else {
            internal!(level = INFO, "Jim: Rejecting connection from {}", peer);
            false
        }
    }

    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        reason = "Link speeds are small positive byte rates"
    )]
    fn link_speed(&self) -> Option<u64> {
        if !chance(self.link_speed_affect) {
            internal!("Jim: Allowing unrestricted throughput");
            return None;
        }

        let spread = (self.link_speed_max - self.link_speed_min).max(0.0);
        let speed = (self.link_speed_min + spread * rand::random::<f64>()).max(1.0) as u64;
        internal!(level = INFO, "Jim: Restricting throughput to {} bytes/sec", speed);
        Some(speed)
    }

    fn valid_mail(&self, from: &str) -> bool {
        if chance(self.reject_sender_chance) {
            internal!(level = INFO, "Jim: Rejecting sender {}", from);
            return false;
        }

        internal!("Jim: Allowing sender {}", from);
        true
    }

    fn valid_rcpt(&self, to: &str) -> bool {
        if chance(self.reject_recipient_chance) {
            internal!(level = INFO, "Jim: Rejecting recipient {}", to);
            return false;
        }

        internal!("Jim: Allowing recipient {}", to);
        true
    }

    fn valid_auth(&self, mechanism: &str, args: &[&str]) -> bool {
        if chance(self.reject_auth_chance) {
            internal!(level = INFO, "Jim: Rejecting authentication {}: {:?}", mechanism, args);
            return false;
        }

        internal!("Jim: Allowing authentication {}: {:?}", mechanism, args);
        true
    }

    fn disconnect(&self) -> bool {
        if chance(self.disconnect_chance) {
            internal!(level = INFO, "Jim: Being nasty, kicking them off");
            return true;
        }

        internal!("Jim: Being nice, letting them stay");
        false
    }
}

mod defaults {
    pub const fn disconnect_chance() -> f64 {
        0.005
    }
    pub const fn accept_chance() -> f64 {
        0.99
    }
    pub const fn link_speed_affect() -> f64 {
        0.1
    }
    pub const fn link_speed_min() -> f64 {
        1024.0
    }
    pub const fn link_speed_max() -> f64 {
        10240.0
    }
    pub const fn reject_chance() -> f64 {
        0.05
    }
}
