//! Decoded email record carried between queues.
//!
//! [`RawEmailRecord`] is what producers publish and what the validation
//! pipeline inspects: the envelope sender, the envelope recipients and the
//! untouched content bytes as received. Headers are parsed once from the
//! content at construction time so validators can inspect them without
//! re-parsing.

use crate::parse_raw_headers;

/// Immutable email record decoded from the wire.
///
/// Fields are private so that the content, once decoded, can never be
/// modified; re-encoding an unchanged record reproduces the same bytes.
/// The header list is derived from [`content`](Self::content) and is not part
/// of the wire representation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawEmailRecord {
    /// Envelope sender address.
    from: String,

    /// Envelope recipient addresses, in the order they were given.
    to: Vec<String>,

    /// Raw RFC 5322 content (headers + blank line + body) as received.
    content: Vec<u8>,

    /// Ordered header list parsed from `content` (case-preserved keys,
    /// trimmed and unfolded values).
    headers: Vec<(String, String)>,
}

impl RawEmailRecord {
    pub fn new(from: String, to: Vec<String>, content: Vec<u8>) -> Self {
        let headers = {
            let text = String::from_utf8_lossy(&content);
            let (headers, _) = parse_raw_headers(&text);
            headers
        };
        Self {
            from,
            to,
            content,
            headers,
        }
    }

    pub fn from_parts(from: &str, to: &[&str], content: &[u8]) -> Self {
        Self::new(
            from.to_string(),
            to.iter().map(|rcpt| rcpt.to_string()).collect(),
            content.to_vec(),
        )
    }

    /// Returns the envelope sender address.
    pub fn from(&self) -> &str {
        &self.from
    }

    /// Returns the envelope recipient addresses.
    pub fn to(&self) -> &[String] {
        &self.to
    }

    /// Returns the raw content bytes exactly as received.
    ///
    /// Use this for byte-exact operations such as DKIM signature verification.
    pub fn content(&self) -> &[u8] {
        &self.content
    }

    /// Returns a reference to the ordered header list.
    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    /// Returns the first header value matching `name` (case-insensitive).
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Returns every header value matching `name` (case-insensitive), in order.
    pub fn header_values<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.headers
            .iter()
            .filter(move |(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Returns the email subject (convenience for `header("Subject")`).
    pub fn subject(&self) -> &str {
        self.header("Subject").unwrap_or_default()
    }

    /// Returns the size of the content in bytes.
    pub fn len(&self) -> usize {
        self.content.len()
    }

    /// Returns whether the content is empty.
    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }
}
