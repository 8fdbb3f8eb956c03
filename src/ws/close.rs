//! Closure codes and close-frame payloads (RFC 6455 Section 7.4).
//!
//! A session that closes communicates a numeric status to the peer as the
//! two-byte big-endian payload of a Close frame, optionally followed by a
//! UTF-8 reason. Three codes (1005, 1006, 1015) are reserved for local
//! reporting and must never be put on the wire.

use crate::error::Error;
use crate::ws::frame::Frame;
use bytes::Bytes;

/// RFC 6455 closure status codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum ClosureCode {
    /// Normal closure (1000).
    Normal = 1000,
    /// Endpoint going away (1001).
    GoingAway = 1001,
    /// Protocol error (1002).
    ProtocolError = 1002,
    /// Unsupported data type (1003).
    Unsupported = 1003,
    /// No status present (1005); local reporting only.
    NoStatus = 1005,
    /// Abnormal closure (1006); local reporting only, connection dropped.
    AbnormalClose = 1006,
    /// Payload was not valid UTF-8 (1007).
    NoUtf8 = 1007,
    /// Message violated policy (1008).
    PolicyValidation = 1008,
    /// Message too big (1009).
    TooBig = 1009,
    /// Mandatory extension missing (1010).
    MandatoryExtension = 1010,
    /// Internal server error (1011).
    InternalError = 1011,
    /// TLS handshake failure (1015); local reporting only.
    TlsError = 1015,
}

impl ClosureCode {
    /// Parses a closure code from its wire value.
    #[must_use]
    pub fn from_u16(code: u16) -> Option<Self> {
        match code {
            1000 => Some(Self::Normal),
            1001 => Some(Self::GoingAway),
            1002 => Some(Self::ProtocolError),
            1003 => Some(Self::Unsupported),
            1005 => Some(Self::NoStatus),
            1006 => Some(Self::AbnormalClose),
            1007 => Some(Self::NoUtf8),
            1008 => Some(Self::PolicyValidation),
            1009 => Some(Self::TooBig),
            1010 => Some(Self::MandatoryExtension),
            1011 => Some(Self::InternalError),
            1015 => Some(Self::TlsError),
            _ => None,
        }
    }

    /// True if this code may appear in a Close frame on the wire.
    #[must_use]
    pub const fn is_sendable(self) -> bool {
        !matches!(self, Self::NoStatus | Self::AbnormalClose | Self::TlsError)
    }

    /// The two-byte big-endian wire encoding.
    #[must_use]
    pub fn to_be_bytes(self) -> [u8; 2] {
        (self as u16).to_be_bytes()
    }
}

impl From<ClosureCode> for u16 {
    fn from(code: ClosureCode) -> Self {
        code as Self
    }
}

/// Parsed payload of a Close frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseReason {
    /// Closure status code, if present.
    pub code: Option<ClosureCode>,
    /// UTF-8 reason text, if present.
    pub text: Option<String>,
}

impl CloseReason {
    /// Creates a close reason with a code and optional text.
    #[must_use]
    pub fn new(code: ClosureCode, text: Option<&str>) -> Self {
        Self {
            code: Some(code),
            text: text.map(String::from),
        }
    }

    /// Creates an empty close reason (no code, no text).
    #[must_use]
    pub fn empty() -> Self {
        Self {
            code: None,
            text: None,
        }
    }

    /// Parses a Close frame payload.
    ///
    /// A payload is empty, exactly two bytes (code), or two bytes of code
    /// followed by UTF-8 text. A one-byte payload is malformed, as is
    /// non-UTF-8 text.
    pub fn parse(payload: &[u8]) -> Result<Self, Error> {
        match payload.len() {
            0 => Ok(Self::empty()),
            1 => Err(Error::invalid_frame("close payload of one byte")),
            _ => {
                let raw = u16::from_be_bytes([payload[0], payload[1]]);
                let code = ClosureCode::from_u16(raw);
                let text = if payload.len() > 2 {
                    let text = std::str::from_utf8(&payload[2..])
                        .map_err(|_| Error::invalid_frame("close reason is not UTF-8"))?;
                    Some(text.to_string())
                } else {
                    None
                };
                Ok(Self { code, text })
            }
        }
    }

    /// Encodes this reason as a Close frame payload.
    #[must_use]
    pub fn encode(&self) -> Bytes {
        match (&self.code, &self.text) {
            (None, _) => Bytes::new(),
            (Some(code), None) => Bytes::copy_from_slice(&code.to_be_bytes()),
            (Some(code), Some(text)) => {
                let mut buf = Vec::with_capacity(2 + text.len());
                buf.extend_from_slice(&code.to_be_bytes());
                buf.extend_from_slice(text.as_bytes());
                Bytes::from(buf)
            }
        }
    }

    /// Builds the Close frame for this reason.
    ///
    /// Fails if the encoded payload exceeds the 125-byte control budget.
    pub fn to_frame(&self) -> Result<Frame, Error> {
        Frame::close_with_payload(self.encode())
    }
}

impl Default for CloseReason {
    fn default() -> Self {
        Self::empty()
    }
}
