use std::fmt;

use base64::{Engine, engine::general_purpose::URL_SAFE};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Content, MimeBody, Path, SmtpMessage, internal};

/// RFC 1123 with a numeric zone, as used in `Received` headers.
const RFC1123Z: &str = "%a, %d %b %Y %H:%M:%S %z";

/// A unique message identifier of the form `<random>@<hostname>`.
#[derive(Debug, Default, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(String);

impl MessageId {
    /// 32 random bytes, URL-safe base64 encoded, scoped by `hostname`.
    #[must_use]
    pub fn generate(hostname: &str) -> Self {
        let bytes = rand::random::<[u8; 32]>();
        Self(format!("{}@{hostname}", URL_SAFE.encode(bytes)))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for MessageId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for MessageId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// A fully parsed message, as handed to storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Message {
    #[serde(rename = "ID")]
    pub id: MessageId,
    pub from: Path,
    pub to: Vec<Path>,
    pub content: Content,
    pub created: DateTime<Utc>,
    /// Same value as `content.mime`, kept at the top level for consumers
    /// that only look here.
    #[serde(rename = "MIME")]
    pub mime: Option<MimeBody>,
    pub raw: Option<SmtpMessage>,
}

pub type Messages = Vec<Message>;

impl SmtpMessage {
    /// Turns a completed envelope into a [`Message`].
    ///
    /// Generates a fresh ID and injects `Message-ID` (only when absent),
    /// `Received` and `Return-Path` (appended when the header already
    /// exists) into the root headers.
    #[must_use]
    pub fn parse(self, hostname: &str) -> Message {
        let id = MessageId::generate(hostname);
        let created = Utc::now();

        let mut content = Content::parse(&self.data);
        let mime = content.is_mime().then(|| {
            internal!("Parsing MIME body");
            content.parse_mime_body()
        });
        content.mime.clone_from(&mime);

        if content.header_key("Message-ID").is_none() {
            content
                .headers
                .insert("Message-ID".to_string(), vec![id.to_string()]);
        }

        let received = format!(
            "from {} by {hostname} (MailHog)\r\n          id {id}; {}",
            self.helo,
            created.format(RFC1123Z)
        );
        append_header(&mut content, "Received", received);
        append_header(&mut content, "Return-Path", format!("<{}>", self.from));

        Message {
            id,
            from: Path::parse(&self.from),
            to: self.to.iter().map(String::as_str).map(Path::parse).collect(),
            content,
            created,
            mime,
            raw: Some(self),
        }
    }
}

fn append_header(content: &mut Content, name: &str, value: String) {
    let key = content
        .header_key(name)
        .map_or_else(|| name.to_string(), str::to_string);

    content.headers.entry(key).or_default().push(value);
}

impl Message {
    /// Re-emits the root entity as `Key: value` lines, a blank line and the
    /// body. Header names are written in sorted order.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut keys = self.content.headers.keys().collect::<Vec<_>>();
        keys.sort();

        let mut buffer = String::with_capacity(self.content.size);
        for key in keys {
            for value in &self.content.headers[key] {
                buffer.push_str(key);
                buffer.push_str(": ");
                buffer.push_str(value);
                buffer.push_str("\r\n");
            }
        }
        buffer.push_str("\r\n");
        buffer.push_str(&self.content.body);

        buffer.into_bytes()
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn envelope(data: &str) -> SmtpMessage {
        SmtpMessage {
            from: "nobody@mailhog.example".to_string(),
            to: vec!["someone@mailhog.example".to_string()],
            data: data.to_string(),
            helo: "localhost".to_string(),
        }
    }

    #[test]
    fn message_id_shape() {
        let id = MessageId::generate("mailhog.example");
        let (random, host) = id.as_str().split_once('@').unwrap();

        assert_eq!(host, "mailhog.example");
        // 32 bytes in padded base64
        assert_eq!(random.len(), 44);
        assert!(!random.contains(['+', '/']));
        assert_ne!(id, MessageId::generate("mailhog.example"));
    }

    #[test]
    fn injects_synthetic_headers() {
        let message = envelope("Subject: hi\r\n\r\nbody").parse("mailhog.example");
        let headers = &message.content.headers;

        assert_eq!(headers["Message-ID"], vec![message.id.to_string()]);
        assert_eq!(headers["Return-Path"], vec!["<nobody@mailhog.example>"]);
        assert_eq!(headers["Received"].len(), 1);
        assert!(headers["Received"][0].starts_with(&format!(
            "from localhost by mailhog.example (MailHog)\r\n          id {}; ",
            message.id
        )));
        assert!(headers["Received"][0].ends_with("+0000"));
    }

    #[test]
    fn appends_to_existing_headers_and_keeps_message_id() {
        let data = "Message-Id: <original@x>\r\nreceived: earlier\r\nReturn-Path: <bounce@x>\r\n\r\nbody";
        let message = envelope(data).parse("mailhog.example");
        let headers = &message.content.headers;

        assert_eq!(headers["Message-Id"], vec!["<original@x>"]);
        assert!(!headers.contains_key("Message-ID"));
        assert_eq!(headers["received"].len(), 2);
        assert_eq!(headers["received"][0], "earlier");
        assert!(!headers.contains_key("Received"));
        assert_eq!(
            headers["Return-Path"],
            vec!["<bounce@x>", "<nobody@mailhog.example>"]
        );
    }

    #[test]
    fn paths_and_raw_are_kept() {
        let raw = envelope("body only");
        let message = raw.clone().parse("mailhog.example");

        assert_eq!(message.from.mailbox, "nobody");
        assert_eq!(message.from.domain, "mailhog.example");
        assert_eq!(message.to.len(), 1);
        assert_eq!(message.to[0].mailbox, "someone");
        assert_eq!(message.content.body, "body only");
        assert_eq!(message.raw, Some(raw));
        assert!(message.mime.is_none());
    }

    #[test]
    fn to_bytes_writes_headers_then_body() {
        let message = envelope("Subject: hi\r\n\r\nthe body").parse("mailhog.example");
        let text = String::from_utf8(message.to_bytes()).unwrap();

        assert!(text.contains("Subject: hi\r\n"));
        assert!(text.contains(&format!("Message-ID: {}\r\n", message.id)));
        assert!(text.ends_with("\r\n\r\nthe body"));
    }
}
