//! Minimal HTTP/1.1 message model.
//!
//! Just enough structure for handshake-style exchanges: a start line, an
//! ordered header map, and an optional body. Not a general HTTP stack.

use std::fmt::Write as _;
use std::io::{self, Write};

/// Ordered, case-insensitive header map with unique keys.
///
/// Insertion order is preserved; inserting an existing key replaces its value
/// in place, keeping the original position and spelling of the first insert.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderMap {
    entries: Vec<(String, String)>,
}

impl HeaderMap {
    /// Creates an empty map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a header, replacing the value in place if the key is already
    /// present (compared case-insensitively).
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        for (existing, slot) in &mut self.entries {
            if existing.eq_ignore_ascii_case(&name) {
                *slot = value;
                return;
            }
        }
        self.entries.push((name, value));
    }

    /// Looks a header up case-insensitively.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// True if the header is present.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Iterates entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Number of headers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if no headers are present.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<'a> IntoIterator for &'a HeaderMap {
    type Item = (&'a str, &'a str);
    type IntoIter = Box<dyn Iterator<Item = (&'a str, &'a str)> + 'a>;

    fn into_iter(self) -> Self::IntoIter {
        Box::new(self.iter())
    }
}

/// One HTTP/1.1 message: start line, headers, optional body.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Message {
    /// Request or status line, without the trailing CRLF.
    pub start_line: String,
    /// Headers in insertion order.
    pub headers: HeaderMap,
    /// Message body, if any.
    pub body: Option<String>,
}

impl Message {
    /// Creates a message with the given start line.
    #[must_use]
    pub fn new(start_line: impl Into<String>) -> Self {
        Self {
            start_line: start_line.into(),
            headers: HeaderMap::new(),
            body: None,
        }
    }

    /// Serializes the message with CRLF line endings.
    pub fn write_to<W: Write>(&self, out: &mut W) -> io::Result<()> {
        let mut text = String::new();
        let _ = write!(text, "{}\r\n", self.start_line);
        for (name, value) in self.headers.iter() {
            let _ = write!(text, "{name}: {value}\r\n");
        }
        text.push_str("\r\n");
        if let Some(body) = &self.body {
            text.push_str(body);
        }
        out.write_all(text.as_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insertion_order_is_preserved() {
        let mut headers = HeaderMap::new();
        headers.insert("Upgrade", "websocket");
        headers.insert("Connection", "Upgrade");
        headers.insert("Sec-WebSocket-Key", "dGhlIHNhbXBsZSBub25jZQ==");

        let names: Vec<&str> = headers.iter().map(|(k, _)| k).collect();
        assert_eq!(names, ["Upgrade", "Connection", "Sec-WebSocket-Key"]);
    }

    #[test]
    fn insert_replaces_in_place_case_insensitively() {
        let mut headers = HeaderMap::new();
        headers.insert("Content-Type", "text/plain");
        headers.insert("Host", "example.net");
        headers.insert("content-type", "application/json");

        assert_eq!(headers.len(), 2);
        assert_eq!(headers.get("CONTENT-TYPE"), Some("application/json"));
        // Position and original spelling stay with the first insert.
        let first = headers.iter().next().unwrap();
        assert_eq!(first, ("Content-Type", "application/json"));
    }

    #[test]
    fn get_is_case_insensitive() {
        let mut headers = HeaderMap::new();
        headers.insert("Sec-WebSocket-Accept", "abc");
        assert_eq!(headers.get("sec-websocket-accept"), Some("abc"));
        assert_eq!(headers.get("missing"), None);
        assert!(headers.contains("SEC-WEBSOCKET-ACCEPT"));
    }

    #[test]
    fn message_serializes_with_crlf_and_blank_line() {
        let mut msg = Message::new("GET /chat HTTP/1.1");
        msg.headers.insert("Host", "example.net");
        msg.headers.insert("Upgrade", "websocket");

        let mut out = Vec::new();
        msg.write_to(&mut out).unwrap();
        assert_eq!(
            out,
            b"GET /chat HTTP/1.1\r\nHost: example.net\r\nUpgrade: websocket\r\n\r\n"
        );
    }

    #[test]
    fn message_body_follows_the_blank_line() {
        let mut msg = Message::new("HTTP/1.1 200 OK");
        msg.headers.insert("Content-Length", "5");
        msg.body = Some("hello".to_string());

        let mut out = Vec::new();
        msg.write_to(&mut out).unwrap();
        assert!(out.ends_with(b"\r\n\r\nhello"));
    }
}
