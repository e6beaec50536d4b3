//! Header/body splitting and recursive multipart decomposition.

use ahash::AHashMap;
use serde::{Deserialize, Serialize};

use crate::internal;

const HEADER_SEPARATOR: &str = "\r\n\r\n";

/// One MIME entity: headers, body and any nested multipart parts.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Content {
    /// Header name (exact case as received) to its values.
    pub headers: AHashMap<String, Vec<String>>,
    pub body: String,
    /// Length in bytes of the raw text this entity was parsed from.
    pub size: usize,
    #[serde(rename = "MIME")]
    pub mime: Option<MimeBody>,
}

/// The parts of a multipart entity, in the order they appeared.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct MimeBody {
    pub parts: Vec<Content>,
}

impl Content {
    /// Splits raw text into headers and body.
    ///
    /// The split happens on the first blank line. Text without one is all
    /// body. Continuation lines (leading space or tab) are folded onto the
    /// previous header's last value; a repeated `Key: value` line replaces
    /// the earlier value rather than adding to it.
    ///
    /// Nested MIME parts are not parsed here, see [`Content::parse_mime_body`].
    #[must_use]
    pub fn parse(data: &str) -> Self {
        internal!("Parsing Content from string: '{}'", crate::logging::escape(data));

        let Some((header_block, body)) = data.split_once(HEADER_SEPARATOR) else {
            return Self {
                headers: AHashMap::default(),
                body: data.to_string(),
                size: data.len(),
                mime: None,
            };
        };

        let mut headers: AHashMap<String, Vec<String>> = AHashMap::default();
        let mut last: Option<String> = None;

        for line in header_block.split("\r\n") {
            if line.starts_with([' ', '\t']) {
                let previous = last
                    .as_ref()
                    .and_then(|key| headers.get_mut(key))
                    .and_then(|values| values.last_mut());

                if let Some(value) = previous {
                    value.push_str(line);
                    continue;
                }
            }

            if let Some((key, value)) = line.split_once(": ") {
                headers.insert(key.to_string(), vec![value.to_string()]);
                last = Some(key.to_string());
            } else if !line.is_empty() {
                internal!(level = DEBUG, "Found invalid header: '{}'", line);
            }
        }

        Self {
            headers,
            body: body.to_string(),
            size: data.len(),
            mime: None,
        }
    }

    /// Case-insensitive header lookup. An exact-case key wins; among other
    /// spellings the lexically smallest one is used.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&[String]> {
        self.header_key(name)
            .and_then(|key| self.headers.get(key))
            .map(Vec::as_slice)
    }

    /// The key under which `name` is stored, if present. Same precedence
    /// as [`Content::header`].
    #[must_use]
    pub fn header_key(&self, name: &str) -> Option<&str> {
        if let Some((key, _)) = self.headers.get_key_value(name) {
            return Some(key);
        }

        self.headers
            .keys()
            .filter(|key| key.eq_ignore_ascii_case(name))
            .min()
            .map(String::as_str)
    }

    fn content_type(&self) -> Option<&str> {
        self.header("Content-Type")
            .and_then(<[String]>::first)
            .map(String::as_str)
    }

    /// Whether this entity declares a `multipart/*` content type.
    #[must_use]
    pub fn is_mime(&self) -> bool {
        self.content_type().is_some_and(|content_type| {
            content_type
                .get(..10)
                .is_some_and(|prefix| prefix.eq_ignore_ascii_case("multipart/"))
        })
    }

    /// Splits the body on the declared boundary, parsing every part and
    /// recursing into parts that are themselves multipart.
    ///
    /// Returns an empty body when there is no usable boundary parameter.
    #[must_use]
    pub fn parse_mime_body(&self) -> MimeBody {
        let Some(content_type) = self.content_type() else {
            return MimeBody::default();
        };

        let parsed = mailparse::parse_content_type(content_type);
        let Some(boundary) = parsed.params.get("boundary").filter(|b| !b.is_empty()) else {
            internal!(level = DEBUG, "Boundary not found: {}", content_type);
            return MimeBody::default();
        };

        internal!("Got boundary: {}", boundary);
        let delimiter = format!("--{boundary}");

        let mut parts = Vec::default();
        for segment in self.body.split(delimiter.as_str()) {
            let segment = segment.trim_matches(['\r', '\n']);
            if segment.is_empty() {
                continue;
            }

            // Close delimiter: whatever follows is epilogue.
            if segment.starts_with("--") {
                break;
            }

            let mut part = Self::parse(segment);
            if part.is_mime() {
                internal!("Parsing inner MIME body");
                part.mime = Some(part.parse_mime_body());
            }
            parts.push(part);
        }

        MimeBody { parts }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn splits_headers_and_body() {
        let data = "Subject: Hello\r\nFrom: a@b\r\n\r\nBody text\r\nmore";
        let content = Content::parse(data);

        assert_eq!(content.headers.len(), 2);
        assert_eq!(content.headers["Subject"], vec!["Hello"]);
        assert_eq!(content.headers["From"], vec!["a@b"]);
        assert_eq!(content.body, "Body text\r\nmore");
        assert_eq!(content.size, data.len());
        assert!(content.mime.is_none());
    }

    #[test]
    fn no_separator_is_all_body() {
        let data = "Subject: Hello\r\nno blank line";
        let content = Content::parse(data);

        assert!(content.headers.is_empty());
        assert_eq!(content.body, data);
        assert_eq!(content.size, data.len());
    }

    #[test]
    fn continuation_lines_fold_into_previous_value() {
        let content = Content::parse("Subject: a very\r\n long\r\n\tsubject\r\n\r\nbody");
        assert_eq!(content.headers["Subject"], vec!["a very long\tsubject"]);
    }

    #[test]
    fn repeated_headers_replace() {
        let content = Content::parse("X-Tag: one\r\nX-Tag: two\r\n\r\nbody");
        assert_eq!(content.headers["X-Tag"], vec!["two"]);
    }

    #[test]
    fn invalid_and_leading_continuation_lines_are_skipped() {
        let content = Content::parse(" dangling\r\nnot a header\r\nKey: value\r\n\r\nbody");
        assert_eq!(content.headers.len(), 1);
        assert_eq!(content.headers["Key"], vec!["value"]);
    }

    #[test]
    fn header_lookup_ignores_case() {
        let content = Content::parse("content-type: Multipart/Mixed; boundary=x\r\n\r\n");
        assert_eq!(content.header_key("Content-Type"), Some("content-type"));
        assert!(content.is_mime());
    }

    #[test]
    fn header_lookup_with_several_spellings() {
        let content = Content::parse("subject: lower\r\nSUBJECT: upper\r\nSubject: exact\r\n\r\n");
        assert_eq!(content.header("Subject"), Some(["exact".to_string()].as_slice()));
        assert_eq!(content.header_key("sUbJeCt"), Some("SUBJECT"));
        assert_eq!(content.header("sUbJeCt"), Some(["upper".to_string()].as_slice()));

        let content = Content::parse("subject: lower\r\nSUBJECT: upper\r\n\r\n");
        assert_eq!(content.header("Subject"), Some(["upper".to_string()].as_slice()));
    }

    #[test]
    fn non_multipart_is_not_mime() {
        assert!(!Content::parse("Content-Type: text/plain\r\n\r\nhi").is_mime());
        assert!(!Content::parse("Subject: x\r\n\r\nhi").is_mime());
    }

    #[test]
    fn missing_boundary_yields_no_parts() {
        let content = Content::parse("Content-Type: multipart/mixed\r\n\r\n--x\r\nA: b\r\n\r\nc");
        assert!(content.is_mime());
        assert!(content.parse_mime_body().parts.is_empty());
    }

    #[test]
    fn close_delimiter_ends_parts() {
        let data = concat!(
            "Content-Type: multipart/mixed; boundary=sep\r\n",
            "\r\n",
            "preamble\r\n",
            "--sep\r\n",
            "Content-Type: text/plain\r\n",
            "\r\n",
            "first\r\n",
            "--sep--\r\n",
            "epilogue",
        );

        let mime = Content::parse(data).parse_mime_body();

        assert_eq!(mime.parts.len(), 2);
        assert_eq!(mime.parts[0].body, "preamble");
        assert_eq!(mime.parts[1].headers["Content-Type"], vec!["text/plain"]);
        assert_eq!(mime.parts[1].body, "first");
    }

    #[test]
    fn nested_multipart_recurses() {
        let data = concat!(
            "Content-Type: multipart/mixed; boundary=\"outer\"\r\n",
            "\r\n",
            "--outer\r\n",
            "Content-Type: multipart/alternative; boundary=\"inner\"\r\n",
            "\r\n",
            "--inner\r\n",
            "Content-Type: text/plain\r\n",
            "\r\n",
            "plain\r\n",
            "--inner\r\n",
            "Content-Type: text/html\r\n",
            "\r\n",
            "<p>html</p>\r\n",
            "--inner--\r\n",
            "--outer\r\n",
            "Content-Type: application/octet-stream\r\n",
            "\r\n",
            "AAAA\r\n",
            "--outer--\r\n",
        );

        let root = Content::parse(data);
        let mime = root.parse_mime_body();
        assert_eq!(mime.parts.len(), 2);

        let alternative = &mime.parts[0];
        assert!(alternative.is_mime());
        let inner = alternative.mime.as_ref().map(|m| m.parts.len());
        assert_eq!(inner, Some(2));

        let attachment = &mime.parts[1];
        assert!(!attachment.is_mime());
        assert!(attachment.mime.is_none());
        assert_eq!(attachment.body, "AAAA");

        // The parent is untouched by parsing its parts.
        assert!(root.mime.is_none());
    }
}
