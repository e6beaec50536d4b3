use core::fmt::{self, Display, Formatter};

use serde::{Deserialize, Serialize};

/// Where a session is in the SMTP dialogue.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum State {
    /// Before the greeting has been sent.
    #[default]
    Invalid,
    /// Greeted, waiting for HELO/EHLO.
    Establish,
    /// Waiting for the base64 `\0user\0pass` line.
    AuthPlain,
    /// Waiting for the username line.
    AuthLogin,
    /// Waiting for the password line.
    AuthLogin2,
    /// Waiting for the challenge response.
    AuthCramMd5,
    Mail,
    Rcpt,
    Data,
    /// After QUIT; nothing more is processed.
    Done,
}

impl Display for State {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> fmt::Result {
        fmt.write_str(match self {
            Self::Invalid => "INVALID",
            Self::Establish => "ESTABLISH",
            Self::AuthPlain => "AUTHPLAIN",
            Self::AuthLogin => "AUTHLOGIN",
            Self::AuthLogin2 => "AUTHLOGIN2",
            Self::AuthCramMd5 => "AUTHCRAMMD5",
            Self::Mail => "MAIL",
            Self::Rcpt => "RCPT",
            Self::Data => "DATA",
            Self::Done => "DONE",
        })
    }
}
