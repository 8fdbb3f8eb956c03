//! Deadline-bound message reads over non-blocking channels.

use crate::error::Error;
use crate::http::message::{HeaderMap, Message};
use std::io::{self, Read};
use std::thread;
use std::time::{Duration, Instant};

/// Pause between retries while the channel would block.
const RETRY_PAUSE: Duration = Duration::from_millis(1);

/// Reads one complete HTTP message, giving up at an absolute deadline.
///
/// The cutoff is computed once up front; would-block reads park briefly and
/// retry until it passes. On timeout the partial input is discarded and
/// a timeout error returned. The message is complete when the blank line
/// ends the header block and, if a `Content-Length` header is present, that
/// many body bytes have arrived.
pub fn read_message_deadline<R: Read>(reader: &mut R, timeout: Duration) -> Result<Message, Error> {
    let deadline = Instant::now() + timeout;
    let mut raw: Vec<u8> = Vec::new();
    let mut chunk = [0u8; 4096];

    loop {
        if let Some(message) = try_parse(&raw)? {
            return Ok(message);
        }
        if Instant::now() >= deadline {
            return Err(Error::timeout(format!(
                "message incomplete after {timeout:?}"
            )));
        }
        match reader.read(&mut chunk) {
            Ok(0) => {
                return Err(Error::invalid_frame("channel closed mid-message"));
            }
            Ok(n) => raw.extend_from_slice(&chunk[..n]),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => thread::sleep(RETRY_PAUSE),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e.into()),
        }
    }
}

/// Parses the accumulated bytes into a message if they form a complete one.
fn try_parse(raw: &[u8]) -> Result<Option<Message>, Error> {
    let Some(header_end) = find_blank_line(raw) else {
        return Ok(None);
    };
    let head = std::str::from_utf8(&raw[..header_end])
        .map_err(|_| Error::invalid_frame("message head is not UTF-8"))?;

    let mut lines = head.split("\r\n");
    let start_line = lines
        .next()
        .ok_or_else(|| Error::invalid_frame("empty message"))?
        .to_string();

    let mut headers = HeaderMap::new();
    for line in lines {
        if line.is_empty() {
            continue;
        }
        let (name, value) = line
            .split_once(':')
            .ok_or_else(|| Error::invalid_frame(format!("malformed header line: {line}")))?;
        headers.insert(name.trim(), value.trim());
    }

    let body_len: usize = match headers.get("Content-Length") {
        Some(value) => value
            .parse()
            .map_err(|_| Error::invalid_frame("unparseable Content-Length"))?,
        None => 0,
    };

    let body_start = header_end + 4;
    if raw.len() < body_start + body_len {
        return Ok(None);
    }
    let body = if body_len > 0 {
        let text = std::str::from_utf8(&raw[body_start..body_start + body_len])
            .map_err(|_| Error::invalid_frame("body is not UTF-8"))?;
        Some(text.to_string())
    } else {
        None
    };

    Ok(Some(Message {
        start_line,
        headers,
        body,
    }))
}

fn find_blank_line(raw: &[u8]) -> Option<usize> {
    raw.windows(4).position(|w| w == b"\r\n\r\n")
}
