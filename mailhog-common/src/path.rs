use std::{convert::Infallible, fmt, str::FromStr};

use serde::{Deserialize, Serialize};

/// A parsed SMTP forward or reverse path.
///
/// Accepts `mailbox@domain` as well as the source-routed form
/// `relay1,relay2:mailbox@domain`. Parsing never fails: anything without an
/// `@` becomes a bare mailbox with an empty domain.
#[derive(Debug, Default, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Path {
    pub relays: Vec<String>,
    pub mailbox: String,
    pub domain: String,
    /// Reserved for ESMTP parameters, always empty today.
    pub params: String,
}

impl Path {
    #[must_use]
    pub fn parse(path: &str) -> Self {
        let (relays, email) = match path.split_once(':') {
            Some((relays, email)) => (relays.split(',').map(str::to_string).collect(), email),
            None => (Vec::default(), path),
        };

        let (mailbox, domain) = email.split_once('@').unwrap_or((email, ""));

        Self {
            relays,
            mailbox: mailbox.to_string(),
            domain: domain.to_string(),
            params: String::default(),
        }
    }

    /// The `mailbox@domain` portion, without any source route.
    #[must_use]
    pub fn address(&self) -> String {
        if self.domain.is_empty() {
            self.mailbox.clone()
        } else {
            format!("{}@{}", self.mailbox, self.domain)
        }
    }
}

impl FromStr for Path {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::parse(s))
    }
}

impl From<&str> for Path {
    fn from(value: &str) -> Self {
        Self::parse(value)
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.relays.is_empty() {
            write!(f, "{}:", self.relays.join(","))?;
        }

        f.write_str(&self.address())
    }
}
