use std::sync::LazyLock;

use base64::{Engine, engine::general_purpose::STANDARD};
use mailhog_common::{SmtpMessage, internal, logging::escape};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::{
    Command, Reply, State,
    error::{AuthError, SyntaxError},
    hooks::{MessageHandler, Policy, TlsHandler},
};

pub const DEFAULT_HOSTNAME: &str = "mailhog.example";
pub const DEFAULT_IDENT: &str = "ESMTP MailHog";

/// base64 "Username:"
const LOGIN_USERNAME_PROMPT: &str = "VXNlcm5hbWU6";
/// base64 "Password:"
const LOGIN_PASSWORD_PROMPT: &str = "UGFzc3dvcmQ6";
const CRAM_MD5_CHALLENGE: &str =
    "PDQxOTI5NDIzNDEuMTI4Mjg0NzJAc291cmNlZm91ci5hbmRyZXcuY211LmVkdT4=";

static MAIL_TOLERANT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i:From):\s*<([^>]+)>").expect("static MAIL regex"));
static MAIL_STRICT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i:From):<([^>]+)>").expect("static MAIL regex"));
static RCPT_TOLERANT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i:To):\s*<([^>]+)>").expect("static RCPT regex"));
static RCPT_STRICT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i:To):<([^>]+)>").expect("static RCPT regex"));

/// Limits and strictness switches for a [`Protocol`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtocolConfig {
    /// Longest accepted line in bytes, excluding CRLF (None = unlimited).
    #[serde(default)]
    pub maximum_line_length: Option<usize>,
    /// Most recipients per message (None = unlimited).
    #[serde(default)]
    pub maximum_recipients: Option<usize>,
    /// Reject `MAIL FROM: <addr>` (space after the colon).
    #[serde(default)]
    pub reject_broken_mail_syntax: bool,
    /// Reject `RCPT TO: <addr>` (space after the colon).
    #[serde(default)]
    pub reject_broken_rcpt_syntax: bool,
    /// Refuse everything but HELO/EHLO/STARTTLS/RSET/NOOP/QUIT until TLS is up.
    #[serde(default)]
    pub require_tls: bool,
}

/// The SMTP server state machine for a single session.
///
/// Purely synchronous: it is fed lines through [`Protocol::parse`] and
/// answers with [`Reply`] values. It never touches the transport; the one
/// side effect it asks for (the TLS handshake) is signalled through
/// [`Reply::after_send`].
pub struct Protocol {
    state: State,
    message: SmtpMessage,
    last_command: Option<Command>,
    /// Set when a DATA line could not be decoded; the message is refused
    /// at the terminator.
    data_undecodable: bool,
    tls_pending: bool,
    tls_upgraded: bool,
    hostname: String,
    ident: String,
    config: ProtocolConfig,
    policy: Option<Box<dyn Policy>>,
    handler: Option<Box<dyn MessageHandler>>,
    tls: Option<Box<dyn TlsHandler>>,
}

impl core::fmt::Debug for Protocol {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Protocol")
            .field("state", &self.state)
            .field("message", &self.message)
            .field("tls_pending", &self.tls_pending)
            .field("tls_upgraded", &self.tls_upgraded)
            .field("hostname", &self.hostname)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Default for Protocol {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// Builder for [`Protocol`]
#[derive(Default)]
pub struct ProtocolBuilder {
    hostname: Option<String>,
    ident: Option<String>,
    config: ProtocolConfig,
    policy: Option<Box<dyn Policy>>,
    handler: Option<Box<dyn MessageHandler>>,
    tls: Option<Box<dyn TlsHandler>>,
}

impl ProtocolBuilder {
    #[must_use]
    pub fn with_hostname(mut self, hostname: impl Into<String>) -> Self {
        self.hostname = Some(hostname.into());
        self
    }

    #[must_use]
    pub fn with_ident(mut self, ident: impl Into<String>) -> Self {
        self.ident = Some(ident.into());
        self
    }

    #[must_use]
    pub fn with_config(mut self, config: ProtocolConfig) -> Self {
        self.config = config;
        self
    }

    #[must_use]
    pub fn with_policy(mut self, policy: impl Policy + 'static) -> Self {
        self.policy = Some(Box::new(policy));
        self
    }

    #[must_use]
    pub fn with_handler(mut self, handler: impl MessageHandler + 'static) -> Self {
        self.handler = Some(Box::new(handler));
        self
    }

    #[must_use]
    pub fn with_tls(mut self, tls: impl TlsHandler + 'static) -> Self {
        self.tls = Some(Box::new(tls));
        self
    }

    #[must_use]
    pub fn build(self) -> Protocol {
        Protocol {
            state: State::Invalid,
            message: SmtpMessage::default(),
            last_command: None,
            data_undecodable: false,
            tls_pending: false,
            tls_upgraded: false,
            hostname: self.hostname.unwrap_or_else(|| DEFAULT_HOSTNAME.to_string()),
            ident: self.ident.unwrap_or_else(|| DEFAULT_IDENT.to_string()),
            config: self.config,
            policy: self.policy,
            handler: self.handler,
            tls: self.tls,
        }
    }
}

impl Protocol {
    #[must_use]
    pub fn builder() -> ProtocolBuilder {
        ProtocolBuilder::default()
    }

    #[must_use]
    pub const fn state(&self) -> State {
        self.state
    }

    /// The envelope being accumulated for the current transaction.
    #[must_use]
    pub const fn message(&self) -> &SmtpMessage {
        &self.message
    }

    #[must_use]
    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    #[must_use]
    pub const fn tls_upgraded(&self) -> bool {
        self.tls_upgraded
    }

    /// Starts the session, returning the greeting.
    pub fn start(&mut self) -> Reply {
        internal!("[{}] Started session, switching to ESTABLISH state", self.state);
        self.state = State::Establish;
        Reply::ident(format!("{} {}", self.hostname, self.ident))
    }

    /// Takes one CRLF-terminated line off the front of `buffer` and
    /// processes it.
    ///
    /// Returns the unconsumed remainder. Without a complete line the buffer
    /// comes back untouched with no reply, and the caller should read more.
    pub fn parse<'a>(&mut self, buffer: &'a str) -> (&'a str, Option<Reply>) {
        let Some((line, rest)) = buffer.split_once("\r\n") else {
            return (buffer, None);
        };

        if self
            .config
            .maximum_line_length
            .is_some_and(|maximum| line.len() > maximum)
        {
            internal!(level = DEBUG, "[{}] Line too long: {} bytes", self.state, line.len());
            return (rest, Some(Reply::line_too_long()));
        }

        let reply = if self.state == State::Data {
            self.process_data(line)
        } else {
            Some(self.process_command(line))
        };

        (rest, reply)
    }

    /// Handles a line that is not valid UTF-8.
    ///
    /// Outside DATA it is a syntax error. Inside DATA the line is dropped and
    /// the whole message is refused once the terminator arrives.
    pub fn reject_line(&mut self) -> Option<Reply> {
        if self.state == State::Data {
            internal!(level = DEBUG, "[{}] Dropping undecodable body line", self.state);
            self.data_undecodable = true;
            return None;
        }

        internal!(level = DEBUG, "[{}] Undecodable command line", self.state);
        Some(Reply::syntax_error("Command is not valid UTF-8"))
    }

    /// Appends one body line, finishing the message on the `.` terminator.
    pub fn process_data(&mut self, line: &str) -> Option<Reply> {
        self.message.data.push_str(line);
        self.message.data.push_str("\r\n");

        let data = &self.message.data;
        if data != ".\r\n" && !data.ends_with("\r\n.\r\n") {
            return None;
        }

        internal!("[{}] Got EOF, storing message and switching to MAIL state", self.state);

        // Framing the data with a leading CRLF lets a stuffed first line be
        // undone like every other line.
        let framed = format!("\r\n{data}").replace("\r\n..", "\r\n.");
        let body = framed
            .strip_suffix("\r\n.\r\n")
            .unwrap_or(&framed)
            .strip_prefix("\r\n")
            .unwrap_or_default()
            .to_string();

        let envelope = SmtpMessage {
            data: body,
            ..self.reset_envelope()
        };
        self.state = State::Mail;

        if std::mem::take(&mut self.data_undecodable) {
            internal!(level = WARN, "[{}] Refusing message with undecodable body", self.state);
            return Some(Reply::error("Message body is not valid UTF-8"));
        }

        let Some(handler) = self.handler.as_ref() else {
            return Some(Reply::storage_failed("No storage backend"));
        };

        Some(match handler.received(envelope) {
            Ok(id) => Reply::ok_with([format!("Ok: queued as {id}")]),
            Err(err) => {
                internal!(level = ERROR, "[{}] Error storing message: {}", self.state, err);
                Reply::storage_failed("Unable to store message")
            }
        })
    }

    /// Parses and dispatches a single command line.
    pub fn process_command(&mut self, line: &str) -> Reply {
        let line = line.trim_matches(['\r', '\n']);
        internal!("[{}] Processing line: {}", self.state, escape(line));

        self.command(Command::parse(line))
    }

    /// Dispatches a parsed command against the current state.
    pub fn command(&mut self, command: Command) -> Reply {
        let reply = self.dispatch(&command);
        self.last_command = Some(command);
        reply
    }

    fn dispatch(&mut self, command: &Command) -> Reply {
        internal!(
            "[{}] Got command '{}', args '{}'",
            self.state,
            command.verb,
            command.args
        );

        if let Some(reply) = self
            .policy
            .as_ref()
            .and_then(|policy| policy.filter_verb(&command.verb))
        {
            internal!("[{}] Response returned by SMTP verb filter", self.state);
            return reply;
        }

        if self.tls_pending && !self.tls_upgraded {
            internal!("[{}] Got command before TLS upgrade complete", self.state);
            return Reply::bye();
        }

        match command.verb.as_str() {
            "RSET" => {
                internal!("[{}] Got RSET command, switching to MAIL state", self.state);
                self.state = State::Mail;
                self.reset_envelope();
                return Reply::ok();
            }
            "NOOP" => {
                internal!("[{}] Got NOOP verb, staying in {} state", self.state, self.state);
                return Reply::ok();
            }
            "QUIT" => {
                internal!("[{}] Got QUIT verb, switching to DONE state", self.state);
                self.state = State::Done;
                return Reply::bye();
            }
            _ => {}
        }

        if self.state == State::Establish {
            return match command.verb.as_str() {
                "HELO" => self.helo(&command.args),
                "EHLO" => self.ehlo(&command.args),
                "STARTTLS" => self.starttls(&command.args),
                _ => {
                    internal!(
                        "[{}] Got unknown command for ESTABLISH state: '{}'",
                        self.state,
                        command.verb
                    );
                    Reply::unrecognised_command()
                }
            };
        }

        if command.verb == "STARTTLS" {
            internal!("[{}] Got STARTTLS command outside ESTABLISH state", self.state);
            return self.starttls(&command.args);
        }

        if self.config.require_tls && !self.tls_upgraded {
            internal!("[{}] TLS required but not yet upgraded", self.state);
            return Reply::must_issue_starttls_first();
        }

        match self.state {
            State::AuthPlain => {
                internal!("[{}] Got PLAIN authentication response, switching to MAIL state", self.state);
                self.state = State::Mail;
                self.auth_plain(&command.orig)
            }
            State::AuthLogin => {
                internal!("[{}] Got LOGIN username, switching to AUTHLOGIN2 state", self.state);
                self.state = State::AuthLogin2;
                Reply::auth_response(LOGIN_PASSWORD_PROMPT)
            }
            State::AuthLogin2 => {
                internal!("[{}] Got LOGIN password, switching to MAIL state", self.state);
                self.state = State::Mail;
                let username = self
                    .last_command
                    .as_ref()
                    .map_or("", |last| last.orig.as_str());
                self.authenticate("LOGIN", &[username, command.orig.as_str()])
            }
            State::AuthCramMd5 => {
                internal!("[{}] Got CRAM-MD5 response, switching to MAIL state", self.state);
                self.state = State::Mail;
                self.authenticate("CRAM-MD5", &[command.orig.as_str()])
            }
            State::Mail => match command.verb.as_str() {
                "AUTH" => self.auth(&command.args),
                "MAIL" => self.mail(&command.args),
                "HELO" => self.helo(&command.args),
                "EHLO" => self.ehlo(&command.args),
                _ => {
                    internal!("[{}] Got unknown command for MAIL state: '{}'", self.state, command);
                    Reply::unrecognised_command()
                }
            },
            State::Rcpt => match command.verb.as_str() {
                "RCPT" => self.rcpt(&command.args),
                "HELO" => self.helo(&command.args),
                "EHLO" => self.ehlo(&command.args),
                "DATA" => {
                    internal!("[{}] Got DATA command, switching to DATA state", self.state);
                    self.state = State::Data;
                    Reply::data_response()
                }
                _ => {
                    internal!("[{}] Got unknown command for RCPT state: '{}'", self.state, command);
                    Reply::unrecognised_command()
                }
            },
            _ => {
                internal!("[{}] Command not recognised", self.state);
                Reply::unrecognised_command()
            }
        }
    }

    /// Handles HELO, moving to the MAIL state.
    pub fn helo(&mut self, args: &str) -> Reply {
        internal!("[{}] Got HELO command, switching to MAIL state", self.state);
        self.state = State::Mail;
        args.clone_into(&mut self.message.helo);
        Reply::ok_with([format!("Hello {args}")])
    }

    /// Handles EHLO, moving to the MAIL state and listing extensions.
    pub fn ehlo(&mut self, args: &str) -> Reply {
        internal!("[{}] Got EHLO command, switching to MAIL state", self.state);
        self.state = State::Mail;
        args.clone_into(&mut self.message.helo);

        let mut lines = vec![format!("Hello {args}"), "PIPELINING".to_string()];

        if self.tls.is_some() && !self.tls_pending && !self.tls_upgraded {
            lines.push("STARTTLS".to_string());
        }

        if !self.config.require_tls || self.tls_upgraded {
            let mechanisms = self
                .policy
                .as_ref()
                .map(|policy| policy.auth_mechanisms())
                .unwrap_or_default();

            if !mechanisms.is_empty() {
                lines.push(format!("AUTH {}", mechanisms.join(" ")));
            }
        }

        Reply::ok_with(lines)
    }

    /// Handles STARTTLS. A successful reply asks the transport to run the
    /// handshake, after which [`Protocol::tls_complete`] must be called.
    pub fn starttls(&mut self, args: &str) -> Reply {
        if self.tls_upgraded {
            return Reply::unrecognised_command();
        }

        let Some(tls) = self.tls.as_ref() else {
            internal!("[{}] TLS handler not found", self.state);
            return Reply::unrecognised_command();
        };

        if !args.is_empty() {
            return Reply::syntax_error("no parameters allowed");
        }

        if let Err(reply) = tls.prepare() {
            return reply;
        }

        self.tls_pending = true;
        Reply::ready_to_start_tls()
    }

    /// Records the outcome of a TLS handshake.
    ///
    /// On success the session starts over in the ESTABLISH state with an
    /// empty envelope.
    pub fn tls_complete(&mut self, ok: bool) {
        internal!("[{}] TLS upgrade finished, success: {}", self.state, ok);
        self.tls_upgraded = ok;
        self.tls_pending = ok;

        if ok {
            self.message = SmtpMessage::default();
            self.state = State::Establish;
        }
    }

    /// Extracts the sender from a MAIL argument.
    pub fn parse_mail(&self, args: &str) -> Result<String, SyntaxError> {
        let regex = if self.config.reject_broken_mail_syntax {
            &*MAIL_STRICT
        } else {
            &*MAIL_TOLERANT
        };

        capture(regex, args).ok_or(SyntaxError::Mail)
    }

    /// Extracts the recipient from a RCPT argument.
    pub fn parse_rcpt(&self, args: &str) -> Result<String, SyntaxError> {
        let regex = if self.config.reject_broken_rcpt_syntax {
            &*RCPT_STRICT
        } else {
            &*RCPT_TOLERANT
        };

        capture(regex, args).ok_or(SyntaxError::Rcpt)
    }

    fn mail(&mut self, args: &str) -> Reply {
        let from = match self.parse_mail(args) {
            Ok(from) => from,
            Err(err) => return Reply::error(err),
        };

        if !self.policy.as_ref().is_none_or(|policy| policy.accept_sender(&from)) {
            return Reply::error(format!("Invalid sender {from}"));
        }

        internal!("[{}] Got MAIL command, switching to RCPT state", self.state);
        let reply = Reply::sender_ok(&from);
        self.message.from = from;
        self.state = State::Rcpt;
        reply
    }

    fn rcpt(&mut self, args: &str) -> Reply {
        if self
            .config
            .maximum_recipients
            .is_some_and(|maximum| self.message.to.len() >= maximum)
        {
            return Reply::too_many_recipients();
        }

        let to = match self.parse_rcpt(args) {
            Ok(to) => to,
            Err(err) => return Reply::error(err),
        };

        if !self.policy.as_ref().is_none_or(|policy| policy.accept_recipient(&to)) {
            return Reply::error(format!("Invalid recipient {to}"));
        }

        internal!("[{}] Got RCPT command", self.state);
        let reply = Reply::recipient_ok(&to);
        self.message.to.push(to);
        reply
    }

    fn auth(&mut self, args: &str) -> Reply {
        if let Some(payload) = args.strip_prefix("PLAIN ") {
            internal!("[{}] Got PLAIN authentication", self.state);
            return self.auth_plain(payload);
        }

        if let Some(identity) = args.strip_prefix("EXTERNAL ") {
            internal!("[{}] Got EXTERNAL authentication", self.state);
            return self.authenticate("EXTERNAL", &[identity]);
        }

        match args {
            "LOGIN" => {
                internal!("[{}] Got LOGIN authentication, switching to AUTHLOGIN state", self.state);
                self.state = State::AuthLogin;
                Reply::auth_response(LOGIN_USERNAME_PROMPT)
            }
            "PLAIN" => {
                internal!("[{}] Got PLAIN authentication (no args), switching to AUTHPLAIN state", self.state);
                self.state = State::AuthPlain;
                Reply::auth_response("")
            }
            "CRAM-MD5" => {
                internal!("[{}] Got CRAM-MD5 authentication, switching to AUTHCRAMMD5 state", self.state);
                self.state = State::AuthCramMd5;
                Reply::auth_response(CRAM_MD5_CHALLENGE)
            }
            _ => Reply::unsupported_auth(),
        }
    }

    /// Validates a base64 `\0user\0pass` payload. Only decoded when a
    /// policy is registered to look at the credentials.
    fn auth_plain(&self, payload: &str) -> Reply {
        if self.policy.is_none() {
            return Reply::auth_ok();
        }

        match plain_credentials(payload) {
            Ok((user, pass)) => self.authenticate("PLAIN", &[user.as_str(), pass.as_str()]),
            Err(err) => Reply::error(err),
        }
    }

    fn authenticate(&self, mechanism: &str, args: &[&str]) -> Reply {
        match self
            .policy
            .as_ref()
            .map_or(Ok(()), |policy| policy.authenticate(mechanism, args))
        {
            Ok(()) => Reply::auth_ok(),
            Err(reply) => reply,
        }
    }

    /// Clears the envelope, keeping the HELO argument. Returns the old one.
    fn reset_envelope(&mut self) -> SmtpMessage {
        let helo = self.message.helo.clone();
        std::mem::replace(
            &mut self.message,
            SmtpMessage {
                helo,
                ..SmtpMessage::default()
            },
        )
    }
}

fn capture(regex: &Regex, args: &str) -> Option<String> {
    regex
        .captures(args)
        .and_then(|captures| captures.get(1))
        .map(|address| address.as_str().to_string())
}

fn plain_credentials(payload: &str) -> Result<(String, String), AuthError> {
    let decoded = STANDARD
        .decode(payload.trim())
        .map_err(|_| AuthError::BadlyFormed)?;
    let decoded = String::from_utf8_lossy(&decoded);

    let mut parts = decoded.split('\0');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(_), Some(user), Some(pass)) => Ok((user.to_string(), pass.to_string())),
        _ => Err(AuthError::BadlyFormed),
    }
}
