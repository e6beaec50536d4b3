use serde::{Deserialize, Serialize};

/// The raw envelope accumulated while an SMTP transaction is in progress.
///
/// Filled in command by command (HELO, MAIL, RCPT, DATA) and handed to the
/// message-received handler exactly once, when the DATA terminator arrives.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SmtpMessage {
    pub from: String,
    pub to: Vec<String>,
    pub data: String,
    pub helo: String,
}

impl SmtpMessage {
    /// Serialises the envelope as `HELO:<..>`, `FROM:<..>` and one `TO:<..>`
    /// line per recipient, a blank line, then the data verbatim.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buffer = format!("HELO:<{}>\r\nFROM:<{}>\r\n", self.helo, self.from);
        for to in &self.to {
            buffer.push_str(&format!("TO:<{to}>\r\n"));
        }
        buffer.push_str("\r\n");
        buffer.push_str(&self.data);

        buffer.into_bytes()
    }

    /// Reads back the format written by [`SmtpMessage::to_bytes`].
    ///
    /// Unknown envelope lines are ignored. Input without the blank line
    /// separator is treated as envelope lines only.
    #[must_use]
    pub fn from_bytes(bytes: &[u8]) -> Self {
        let text = String::from_utf8_lossy(bytes);
        let (envelope, data) = text
            .split_once("\r\n\r\n")
            .unwrap_or((text.trim_end_matches("\r\n"), ""));

        let mut message = Self {
            data: data.to_string(),
            ..Self::default()
        };

        for line in envelope.split("\r\n") {
            let Some(value) = line
                .split_once(":<")
                .and_then(|(key, rest)| Some(key).zip(rest.strip_suffix('>')))
            else {
                continue;
            };

            match value {
                ("HELO", helo) => helo.clone_into(&mut message.helo),
                ("FROM", from) => from.clone_into(&mut message.from),
                ("TO", to) => message.to.push(to.to_string()),
                _ => {}
            }
        }

        message
    }
}
