//! Server configuration, read from a RON file.
//!
//! Every field is optional; an empty `MailHog()` runs a capture server on
//! `0.0.0.0:1025` with unlimited in-memory storage and no chaos monkey.
//!
//! ```ron
//! MailHog (
//!     hostname: "mailhog.example",
//!     smtp: (
//!         bind: "127.0.0.1:2525",
//!         protocol: (maximum_recipients: 10),
//!         tls: (certificate: "certs/cert.pem", key: "certs/key.pem"),
//!     ),
//!     storage: Memory(capacity: Some(1000)),
//!     jim: (disconnect_chance: 0.0),
//! )
//! ```

use std::{
    net::{Ipv4Addr, SocketAddr},
    path::{Path, PathBuf},
    str::FromStr,
};

use mailhog_common::config::ServerTimeouts;
use mailhog_smtp::{
    Jim, ProtocolConfig, TlsContext,
    protocol::{DEFAULT_HOSTNAME, DEFAULT_IDENT},
};
use mailhog_storage::StorageConfig;
use ron::extensions::Extensions;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Files looked at, in order, when no explicit path is given.
pub const DEFAULT_LOCATIONS: [&str; 2] = ["./mailhog.config.ron", "/etc/mailhog/mailhog.config.ron"];

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config from {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config: {0}")]
    Parse(#[from] ron::error::SpannedError),

    #[error("Config file does not exist: {0}")]
    Missing(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename = "MailHog")]
pub struct Config {
    /// Used in the greeting, message IDs and Received headers
    #[serde(default = "defaults::hostname")]
    pub hostname: String,
    #[serde(default)]
    pub smtp: SmtpConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    /// Chaos monkey settings; absent disables it
    #[serde(default)]
    pub jim: Option<Jim>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SmtpConfig {
    #[serde(default = "defaults::bind")]
    pub bind: SocketAddr,
    #[serde(default = "defaults::ident")]
    pub ident: String,
    #[serde(default)]
    pub protocol: ProtocolConfig,
    #[serde(default = "defaults::auth_mechanisms")]
    pub auth_mechanisms: Vec<String>,
    #[serde(default)]
    pub tls: Option<TlsContext>,
    #[serde(default)]
    pub timeouts: ServerTimeouts,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            hostname: defaults::hostname(),
            smtp: SmtpConfig::default(),
            storage: StorageConfig::default(),
            jim: None,
        }
    }
}

impl Default for SmtpConfig {
    fn default() -> Self {
        Self {
            bind: defaults::bind(),
            ident: defaults::ident(),
            protocol: ProtocolConfig::default(),
            auth_mechanisms: defaults::auth_mechanisms(),
            tls: None,
            timeouts: ServerTimeouts::default(),
        }
    }
}

impl FromStr for Config {
    type Err = ConfigError;

    fn from_str(config: &str) -> Result<Self, Self::Err> {
        Ok(ron::Options::default()
            .with_default_extension(Extensions::IMPLICIT_SOME)
            .from_str(config)?)
    }
}

impl Config {
    /// Reads and parses the file at `path`.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;

        content.parse()
    }

    /// Picks the config file to use.
    ///
    /// An explicit path must exist. Otherwise the first existing `candidate`
    /// wins, and `None` means defaults should be used.
    pub fn locate(
        explicit: Option<PathBuf>,
        candidates: &[PathBuf],
    ) -> Result<Option<PathBuf>, ConfigError> {
        if let Some(path) = explicit {
            return if path.exists() {
                Ok(Some(path))
            } else {
                Err(ConfigError::Missing(path.display().to_string()))
            };
        }

        Ok(candidates.iter().find(|path| path.exists()).cloned())
    }

    /// Locates and loads the configuration, falling back to defaults when
    /// no file is found.
    pub fn load(explicit: Option<PathBuf>) -> Result<Self, ConfigError> {
        let candidates = DEFAULT_LOCATIONS.map(PathBuf::from);

        match Self::locate(explicit, &candidates)? {
            Some(path) => Self::from_file(&path),
            None => Ok(Self::default()),
        }
    }
}

mod defaults {
    use super::{DEFAULT_HOSTNAME, DEFAULT_IDENT, Ipv4Addr, SocketAddr};

    pub fn hostname() -> String {
        DEFAULT_HOSTNAME.to_string()
    }

    pub fn ident() -> String {
        DEFAULT_IDENT.to_string()
    }

    pub fn bind() -> SocketAddr {
        SocketAddr::from((Ipv4Addr::UNSPECIFIED, 1025))
    }

    pub fn auth_mechanisms() -> Vec<String> {
        vec!["PLAIN".to_string()]
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn empty_config_is_all_defaults() {
        let config: Config = "MailHog()".parse().unwrap();

        assert_eq!(config, Config::default());
        assert_eq!(config.hostname, "mailhog.example");
        assert_eq!(config.smtp.bind, "0.0.0.0:1025".parse().unwrap());
        assert_eq!(config.smtp.ident, "ESMTP MailHog");
        assert_eq!(config.smtp.auth_mechanisms, vec!["PLAIN".to_string()]);
        assert_eq!(config.smtp.timeouts.command_secs, 300);
        assert_eq!(config.storage, StorageConfig::Memory { capacity: None });
        assert!(config.jim.is_none());
    }

    #[test]
    fn unnamed_struct_is_accepted() {
        let config: Config = r#"(hostname: "capture.local")"#.parse().unwrap();
        assert_eq!(config.hostname, "capture.local");
    }

    #[test]
    fn full_config() {
        let config: Config = r#"
            MailHog (
                hostname: "capture.local",
                smtp: (
                    bind: "127.0.0.1:2525",
                    ident: "ESMTP Test",
                    protocol: (
                        maximum_line_length: 1000,
                        maximum_recipients: 10,
                        require_tls: true,
                    ),
                    auth_mechanisms: ["PLAIN", "LOGIN"],
                    tls: (certificate: "cert.pem", key: "key.pem"),
                    timeouts: (command_secs: 60),
                ),
                storage: Memory(capacity: 5),
                jim: (disconnect_chance: 0.0, accept_chance: 1.0),
            )
        "#
        .parse()
        .unwrap();

        assert_eq!(config.smtp.bind, "127.0.0.1:2525".parse().unwrap());
        assert_eq!(config.smtp.protocol.maximum_line_length, Some(1000));
        assert_eq!(config.smtp.protocol.maximum_recipients, Some(10));
        assert!(config.smtp.protocol.require_tls);
        assert!(!config.smtp.protocol.reject_broken_mail_syntax);
        assert_eq!(config.smtp.auth_mechanisms, vec!["PLAIN", "LOGIN"]);
        assert_eq!(
            config.smtp.tls,
            Some(TlsContext {
                certificate: PathBuf::from("cert.pem"),
                key: PathBuf::from("key.pem"),
            })
        );
        assert_eq!(config.smtp.timeouts.command_secs, 60);
        assert_eq!(config.smtp.timeouts.data_secs, 180);
        assert_eq!(config.storage, StorageConfig::Memory { capacity: Some(5) });

        let jim = config.jim.unwrap();
        assert!(jim.disconnect_chance.abs() < f64::EPSILON);
        assert!((jim.reject_sender_chance - 0.05).abs() < f64::EPSILON);
    }

    #[test]
    fn syntax_errors_are_reported() {
        let err = "MailHog(hostname: )".parse::<Config>().unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn explicit_path_must_exist() {
        let err = Config::locate(Some(PathBuf::from("/nonexistent/mailhog.ron")), &[]).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Config file does not exist: /nonexistent/mailhog.ron"
        );
    }

    #[test]
    fn nothing_found_means_defaults() {
        let candidates = [PathBuf::from("/nonexistent/a.ron"), PathBuf::from("/nonexistent/b.ron")];
        assert_eq!(Config::locate(None, &candidates).unwrap(), None);
    }
}
