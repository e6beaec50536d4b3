use core::fmt::Display;

use crate::status::Status;

/// Side effect the transport must perform once a reply is fully flushed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AfterSend {
    /// Run the TLS handshake, then report the outcome through
    /// [`crate::Protocol::tls_complete`].
    StartTls,
}

/// A status code and the text lines that go with it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub status: Status,
    lines: Vec<String>,
    after_send: Option<AfterSend>,
}

impl Reply {
    #[must_use]
    pub fn new<S: Into<String>>(status: Status, lines: impl IntoIterator<Item = S>) -> Self {
        Self {
            status,
            lines: lines.into_iter().map(Into::into).collect(),
            after_send: None,
        }
    }

    fn single(status: Status, line: impl Into<String>) -> Self {
        Self::new(status, [line.into()])
    }

    /// The wire form, one `\r\n`-terminated string per line.
    ///
    /// All lines but the last use the `code-text` continuation form.
    #[must_use]
    pub fn lines(&self) -> Vec<String> {
        let Some((last, rest)) = self.lines.split_last() else {
            return vec![format!("{}\r\n", self.status)];
        };

        rest.iter()
            .map(|line| format!("{}-{line}\r\n", self.status))
            .chain(std::iter::once(format!("{} {last}\r\n", self.status)))
            .collect()
    }

    /// The text lines without status codes.
    #[must_use]
    pub fn text(&self) -> &[String] {
        &self.lines
    }

    #[must_use]
    pub const fn after_send(&self) -> Option<AfterSend> {
        self.after_send
    }

    #[must_use]
    pub fn ident(ident: impl Into<String>) -> Self {
        Self::single(Status::ServiceReady, ident)
    }

    #[must_use]
    pub fn ready_to_start_tls() -> Self {
        Self {
            after_send: Some(AfterSend::StartTls),
            ..Self::single(Status::ServiceReady, "Ready to start TLS")
        }
    }

    #[must_use]
    pub fn bye() -> Self {
        Self::single(Status::GoodBye, "Bye")
    }

    #[must_use]
    pub fn auth_ok() -> Self {
        Self::single(Status::AuthSuccessful, "Authentication successful")
    }

    #[must_use]
    pub fn ok() -> Self {
        Self::single(Status::Ok, "Ok")
    }

    #[must_use]
    pub fn ok_with<S: Into<String>>(lines: impl IntoIterator<Item = S>) -> Self {
        Self::new(Status::Ok, lines)
    }

    #[must_use]
    pub fn sender_ok(sender: &str) -> Self {
        Self::single(Status::Ok, format!("Sender {sender} ok"))
    }

    #[must_use]
    pub fn recipient_ok(recipient: &str) -> Self {
        Self::single(Status::Ok, format!("Recipient {recipient} ok"))
    }

    #[must_use]
    pub fn auth_response(response: impl Into<String>) -> Self {
        Self::single(Status::AuthContinue, response)
    }

    #[must_use]
    pub fn data_response() -> Self {
        Self::single(Status::StartMailInput, "End data with <CR><LF>.<CR><LF>")
    }

    #[must_use]
    pub fn shutting_down() -> Self {
        Self::single(Status::Unavailable, "Server shutting down")
    }

    #[must_use]
    pub fn storage_failed(reason: impl Into<String>) -> Self {
        Self::single(Status::InsufficientStorage, reason)
    }

    #[must_use]
    pub fn unrecognised_command() -> Self {
        Self::single(Status::Unrecognised, "Unrecognised command")
    }

    #[must_use]
    pub fn line_too_long() -> Self {
        Self::single(Status::Unrecognised, "Line too long")
    }

    #[must_use]
    pub fn syntax_error(detail: &str) -> Self {
        if detail.is_empty() {
            Self::single(Status::SyntaxError, "Syntax error")
        } else {
            Self::single(Status::SyntaxError, format!("Syntax error ({detail})"))
        }
    }

    #[must_use]
    pub fn unsupported_auth() -> Self {
        Self::single(Status::UnsupportedAuth, "Unsupported authentication mechanism")
    }

    #[must_use]
    pub fn must_issue_starttls_first() -> Self {
        Self::single(Status::StartTlsRequired, "Must issue a STARTTLS command first")
    }

    #[must_use]
    pub fn invalid_auth() -> Self {
        Self::single(Status::InvalidCredentials, "Authentication credentials invalid")
    }

    #[must_use]
    pub fn error(err: impl Display) -> Self {
        Self::single(Status::Error, err.to_string())
    }

    #[must_use]
    pub fn too_many_recipients() -> Self {
        Self::single(Status::ExceededStorage, "Too many recipients")
    }
}
