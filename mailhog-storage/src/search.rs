use std::{fmt, str::FromStr};

use mailhog_common::Message;
use serde::{Deserialize, Serialize};

use crate::StorageError;

/// Which part of a message a search query is matched against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchKind {
    /// Recipient paths and `To` header values.
    To,
    /// Sender path and `From` header values.
    From,
    /// Body and every header value.
    Containing,
}

impl FromStr for SearchKind {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "to" => Ok(Self::To),
            "from" => Ok(Self::From),
            "containing" => Ok(Self::Containing),
            other => Err(StorageError::InvalidSearchKind(other.to_string())),
        }
    }
}

impl fmt::Display for SearchKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::To => "to",
            Self::From => "from",
            Self::Containing => "containing",
        })
    }
}

impl SearchKind {
    /// Case-insensitive substring match of `query` against `message`.
    ///
    /// `query` is expected to be lowercase already.
    #[must_use]
    pub fn matches(self, message: &Message, query: &str) -> bool {
        let contains = |haystack: &str| haystack.to_lowercase().contains(query);
        let header = |name: &str| {
            message
                .content
                .header(name)
                .is_some_and(|values| values.iter().any(|value| contains(value)))
        };

        match self {
            Self::To => {
                message.to.iter().any(|to| contains(&to.address())) || header("To")
            }
            Self::From => contains(&message.from.address()) || header("From"),
            Self::Containing => {
                contains(&message.content.body)
                    || message
                        .content
                        .headers
                        .values()
                        .flatten()
                        .any(|value| contains(value))
            }
        }
    }
}
