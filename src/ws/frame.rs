//! WebSocket frame codec according to RFC 6455.
//!
//! Implements the wire format for framing messages: header bit layout,
//! extended payload lengths, masking, fragmentation chains, and control-frame
//! validation. Invariants are enforced at construction and at parse time,
//! never normalized after the fact.
//!
//! # Frame Format (RFC 6455 Section 5.2)
//!
//! ```text
//!  0                   1                   2                   3
//!  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
//! +-+-+-+-+-------+-+-------------+-------------------------------+
//! |F|R|R|R| opcode|M| Payload len |    Extended payload length    |
//! |I|S|S|S|  (4)  |A|     (7)     |             (16/64)           |
//! |N|V|V|V|       |S|             |   (if payload len==126/127)   |
//! | |1|2|3|       |K|             |                               |
//! +-+-+-+-+-------+-+-------------+ - - - - - - - - - - - - - - - +
//! |     Extended payload length continued, if payload len == 127  |
//! + - - - - - - - - - - - - - - - +-------------------------------+
//! |                               |Masking-key, if MASK set to 1  |
//! +-------------------------------+-------------------------------+
//! | Masking-key (continued)       |          Payload Data         |
//! +-------------------------------- - - - - - - - - - - - - - - - +
//! ```

use crate::codec::{Decoder, Encoder};
use crate::error::Error;
use bytes::{BufMut, Bytes, BytesMut};

/// FIN bit of header byte 0.
pub const FIN_BIT: u8 = 0x80;
/// RSV1 bit of header byte 0.
pub const RSV1_BIT: u8 = 0x40;
/// RSV2 bit of header byte 0.
pub const RSV2_BIT: u8 = 0x20;
/// RSV3 bit of header byte 0.
pub const RSV3_BIT: u8 = 0x10;
/// Opcode mask of header byte 0.
pub const OPCODE_MASK: u8 = 0x0F;
/// Mask bit of header byte 1.
pub const MASK_BIT: u8 = 0x80;
/// Inline 7-bit length mask of header byte 1.
pub const LENGTH_MASK: u8 = 0x7F;

/// WebSocket frame opcode (4 bits).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Opcode {
    /// Continuation frame of a fragmented message.
    Continuation = 0x0,
    /// Text data frame.
    Text = 0x1,
    /// Binary data frame.
    Binary = 0x2,
    // 0x3-0x7 reserved for non-control frames
    /// Connection close control frame.
    Close = 0x8,
    /// Ping control frame.
    Ping = 0x9,
    /// Pong control frame.
    Pong = 0xA,
    // 0xB-0xF reserved for control frames
}

impl Opcode {
    /// Returns true for control frames (Close, Ping, Pong).
    #[must_use]
    pub const fn is_control(self) -> bool {
        matches!(self, Self::Close | Self::Ping | Self::Pong)
    }

    /// Returns true for data frames (Continuation, Text, Binary).
    #[must_use]
    pub const fn is_data(self) -> bool {
        matches!(self, Self::Continuation | Self::Text | Self::Binary)
    }

    /// Parses an opcode from its 4-bit wire value.
    pub fn from_u8(value: u8) -> Result<Self, Error> {
        match value {
            0x0 => Ok(Self::Continuation),
            0x1 => Ok(Self::Text),
            0x2 => Ok(Self::Binary),
            0x8 => Ok(Self::Close),
            0x9 => Ok(Self::Ping),
            0xA => Ok(Self::Pong),
            _ => Err(Error::invalid_frame(format!("unrecognized opcode 0x{value:X}"))),
        }
    }
}

/// One WebSocket protocol unit.
///
/// A logical message may span a chain of frames: a non-final frame may own a
/// link to the frame that continues it. A frame with `fin` set may never
/// acquire such a link, and control frames must be final with all reserved
/// bits clear; both rules are enforced when the frame is built or linked.
#[derive(Debug, Clone)]
#[allow(clippy::struct_excessive_bools)] // RFC 6455 exposes these as independent header bits.
pub struct Frame {
    /// Final fragment flag (FIN bit). Kept private: a final frame never
    /// acquires a continuation link, so the flag is fixed at construction.
    fin: bool,
    /// Reserved bit 1.
    pub rsv1: bool,
    /// Reserved bit 2.
    pub rsv2: bool,
    /// Reserved bit 3.
    pub rsv3: bool,
    /// Frame opcode.
    pub opcode: Opcode,
    /// Mask flag (client-to-server frames must be masked).
    pub masked: bool,
    /// Masking key, present only if masked.
    pub mask_key: Option<[u8; 4]>,
    /// Payload data.
    pub payload: Bytes,
    /// Exclusively-owned link to the frame continuing this one.
    next: Option<Box<Frame>>,
}

impl Frame {
    /// Builds a frame, enforcing control-frame invariants.
    ///
    /// A control opcode with `fin == false`, or with any reserved bit set,
    /// is rejected immediately. Control payloads above 125 bytes are also
    /// rejected here rather than at encode time.
    pub fn new(
        fin: bool,
        rsv1: bool,
        rsv2: bool,
        rsv3: bool,
        opcode: Opcode,
        payload: impl Into<Bytes>,
    ) -> Result<Self, Error> {
        let payload = payload.into();
        if opcode.is_control() {
            if !fin {
                return Err(Error::invalid_frame("fragmented control frame"));
            }
            if rsv1 || rsv2 || rsv3 {
                return Err(Error::invalid_frame("reserved bit set on control frame"));
            }
            if payload.len() > 125 {
                return Err(Error::invalid_frame(format!(
                    "control payload of {} bytes exceeds 125",
                    payload.len()
                )));
            }
        }
        Ok(Self {
            fin,
            rsv1,
            rsv2,
            rsv3,
            opcode,
            masked: false,
            mask_key: None,
            payload,
            next: None,
        })
    }

    fn data(opcode: Opcode, payload: Bytes) -> Self {
        Self {
            fin: true,
            rsv1: false,
            rsv2: false,
            rsv3: false,
            opcode,
            masked: false,
            mask_key: None,
            payload,
            next: None,
        }
    }

    /// Creates a final text frame.
    #[must_use]
    pub fn text(payload: impl Into<Bytes>) -> Self {
        Self::data(Opcode::Text, payload.into())
    }

    /// Creates a final binary frame.
    #[must_use]
    pub fn binary(payload: impl Into<Bytes>) -> Self {
        Self::data(Opcode::Binary, payload.into())
    }

    /// Creates a ping frame, rejecting payloads above 125 bytes.
    pub fn ping(payload: impl Into<Bytes>) -> Result<Self, Error> {
        Self::new(true, false, false, false, Opcode::Ping, payload)
    }

    /// Creates a pong frame, rejecting payloads above 125 bytes.
    pub fn pong(payload: impl Into<Bytes>) -> Result<Self, Error> {
        Self::new(true, false, false, false, Opcode::Pong, payload)
    }

    /// Creates a Close frame carrying a closure code and optional reason.
    ///
    /// The reason may be at most 123 bytes; the code takes the other two of
    /// the 125-byte control payload budget.
    pub fn close(code: crate::ws::ClosureCode, reason: Option<&str>) -> Result<Self, Error> {
        let mut buf = BytesMut::with_capacity(2 + reason.map_or(0, str::len));
        buf.put_slice(&code.to_be_bytes());
        if let Some(reason) = reason {
            buf.put_slice(reason.as_bytes());
        }
        Self::new(true, false, false, false, Opcode::Close, buf.freeze())
    }

    /// Creates a Close frame from a pre-encoded payload of at most 125 bytes.
    pub fn close_with_payload(payload: Bytes) -> Result<Self, Error> {
        Self::new(true, false, false, false, Opcode::Close, payload)
    }

    /// Final fragment flag (FIN bit).
    #[must_use]
    pub fn fin(&self) -> bool {
        self.fin
    }

    /// Links `frame` as the continuation of this one.
    ///
    /// Fails if this frame is already final: a fin=true frame never acquires
    /// a continuation.
    pub fn set_next(&mut self, frame: Frame) -> Result<(), Error> {
        if self.fin {
            return Err(Error::invalid_frame("cannot link past a final frame"));
        }
        self.next = Some(Box::new(frame));
        Ok(())
    }

    /// Returns the continuation of this frame, if linked.
    #[must_use]
    pub fn next(&self) -> Option<&Frame> {
        self.next.as_deref()
    }

    /// Concatenates the payloads of this frame's chain, head to tail.
    #[must_use]
    pub fn effective_payload(&self) -> Bytes {
        if self.next.is_none() {
            return self.payload.clone();
        }
        let mut total = self.payload.len();
        let mut cursor = self.next.as_deref();
        while let Some(frame) = cursor {
            total += frame.payload.len();
            cursor = frame.next.as_deref();
        }
        let mut buf = BytesMut::with_capacity(total);
        buf.put_slice(&self.payload);
        let mut cursor = self.next.as_deref();
        while let Some(frame) = cursor {
            buf.put_slice(&frame.payload);
            cursor = frame.next.as_deref();
        }
        buf.freeze()
    }

    /// Splits an outbound data payload into consecutive frames of at most
    /// `limit` bytes each.
    ///
    /// The first frame carries the data opcode; every subsequent frame,
    /// including the last, carries Continuation; only the last has fin set.
    /// A payload within the limit yields a single final frame.
    pub fn split_data(opcode: Opcode, payload: Bytes, limit: usize) -> Result<Vec<Frame>, Error> {
        if !matches!(opcode, Opcode::Text | Opcode::Binary) {
            return Err(Error::invalid_frame("only text and binary frames split"));
        }
        if limit == 0 {
            return Err(Error::policy_violation("split limit must be non-zero"));
        }
        if payload.len() <= limit {
            return Ok(vec![Self::data(opcode, payload)]);
        }
        let mut frames = Vec::with_capacity(payload.len().div_ceil(limit));
        let mut offset = 0;
        while offset < payload.len() {
            let end = (offset + limit).min(payload.len());
            let last = end == payload.len();
            let op = if offset == 0 { opcode } else { Opcode::Continuation };
            let mut frame = Self::data(op, payload.slice(offset..end));
            frame.fin = last;
            frames.push(frame);
            offset = end;
        }
        Ok(frames)
    }
}

/// Role in the WebSocket connection; affects masking requirements.
///
/// Frames sent client-to-server must be masked; frames sent by a server must
/// never be masked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Client role: masks outbound frames, rejects masked inbound frames.
    Client,
    /// Server role: never masks, requires inbound frames to be masked.
    Server,
}

/// Decode state machine for the frame codec.
#[derive(Debug)]
enum DecodeState {
    /// Waiting for the first two header bytes.
    Header,
    /// Reading the 16- or 64-bit extended payload length.
    ExtendedLength { partial: PartialHeader, bytes_needed: usize },
    /// Reading the 4-byte mask key.
    MaskKey { partial: PartialHeader, payload_len: u64 },
    /// Reading the payload.
    Payload {
        partial: PartialHeader,
        mask_key: Option<[u8; 4]>,
        payload_len: u64,
    },
}

/// Header fields accumulated across decode states.
#[derive(Debug, Clone, Copy)]
#[allow(clippy::struct_excessive_bools)]
struct PartialHeader {
    fin: bool,
    rsv1: bool,
    rsv2: bool,
    rsv3: bool,
    opcode: Opcode,
    masked: bool,
}

/// WebSocket frame codec.
///
/// Stateful across `decode` calls: a frame split over multiple reads resumes
/// where the previous call stopped.
#[derive(Debug)]
pub struct FrameCodec {
    max_payload_size: usize,
    role: Role,
    state: DecodeState,
    validate_reserved_bits: bool,
    /// Bytes decoded so far for the in-flight fragmented message.
    fragment_total: u64,
}

impl FrameCodec {
    /// Default maximum payload size (16 MB).
    pub const DEFAULT_MAX_PAYLOAD_SIZE: usize = 16 * 1024 * 1024;

    /// Creates a frame codec for the given role.
    #[must_use]
    pub fn new(role: Role) -> Self {
        Self {
            max_payload_size: Self::DEFAULT_MAX_PAYLOAD_SIZE,
            role,
            state: DecodeState::Header,
            validate_reserved_bits: true,
            fragment_total: 0,
        }
    }

    /// Creates a client-role codec.
    #[must_use]
    pub fn client() -> Self {
        Self::new(Role::Client)
    }

    /// Creates a server-role codec.
    #[must_use]
    pub fn server() -> Self {
        Self::new(Role::Server)
    }

    /// Sets the maximum payload size.
    ///
    /// Caps both a single frame's payload and the cumulative payload of a
    /// fragmented message across its continuation frames.
    #[must_use]
    pub fn max_payload_size(mut self, size: usize) -> Self {
        self.max_payload_size = size;
        self
    }

    /// Sets whether reserved bits are rejected on data frames.
    ///
    /// Control frames reject reserved bits unconditionally.
    #[must_use]
    pub fn validate_reserved_bits(mut self, validate: bool) -> Self {
        self.validate_reserved_bits = validate;
        self
    }

    fn check_payload_len(&self, opcode: Opcode, len: u64) -> Result<(), Error> {
        let max = self.max_payload_size as u64;
        if len > max {
            return Err(Error::frame_too_big(len, self.max_payload_size));
        }
        if opcode == Opcode::Continuation {
            let total = self.fragment_total.saturating_add(len);
            if total > max {
                return Err(Error::frame_too_big(total, self.max_payload_size));
            }
        }
        Ok(())
    }
}

impl Decoder for FrameCodec {
    type Item = Frame;
    type Error = Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Frame>, Error> {
        loop {
            match &self.state {
                DecodeState::Header => {
                    if src.len() < 2 {
                        return Ok(None);
                    }
                    let b0 = src[0];
                    let b1 = src[1];

                    let partial = PartialHeader {
                        fin: b0 & FIN_BIT != 0,
                        rsv1: b0 & RSV1_BIT != 0,
                        rsv2: b0 & RSV2_BIT != 0,
                        rsv3: b0 & RSV3_BIT != 0,
                        opcode: Opcode::from_u8(b0 & OPCODE_MASK)?,
                        masked: b1 & MASK_BIT != 0,
                    };
                    let len7 = b1 & LENGTH_MASK;

                    if partial.opcode.is_control() {
                        if !partial.fin {
                            return Err(Error::invalid_frame("fragmented control frame"));
                        }
                        if partial.rsv1 || partial.rsv2 || partial.rsv3 {
                            return Err(Error::invalid_frame(
                                "reserved bit set on control frame",
                            ));
                        }
                        if len7 > 125 {
                            return Err(Error::invalid_frame(format!(
                                "control payload of {len7} bytes exceeds 125"
                            )));
                        }
                    } else if self.validate_reserved_bits
                        && (partial.rsv1 || partial.rsv2 || partial.rsv3)
                    {
                        return Err(Error::invalid_frame(
                            "reserved bit set without extension",
                        ));
                    }

                    // Masking rules: client-to-server frames must be masked,
                    // server-to-client frames must not be.
                    match self.role {
                        Role::Server if !partial.masked => return Err(Error::missing_mask()),
                        Role::Client if partial.masked => {
                            return Err(Error::invalid_frame("masked frame from server"));
                        }
                        _ => {}
                    }

                    let _ = src.split_to(2);

                    match len7 {
                        0..=125 => {
                            let payload_len = u64::from(len7);
                            self.check_payload_len(partial.opcode, payload_len)?;
                            self.state = if partial.masked {
                                DecodeState::MaskKey { partial, payload_len }
                            } else {
                                DecodeState::Payload {
                                    partial,
                                    mask_key: None,
                                    payload_len,
                                }
                            };
                        }
                        126 => {
                            self.state = DecodeState::ExtendedLength {
                                partial,
                                bytes_needed: 2,
                            };
                        }
                        127 => {
                            self.state = DecodeState::ExtendedLength {
                                partial,
                                bytes_needed: 8,
                            };
                        }
                        _ => unreachable!(),
                    }
                }

                DecodeState::ExtendedLength { partial, bytes_needed } => {
                    if src.len() < *bytes_needed {
                        return Ok(None);
                    }
                    let payload_len = if *bytes_needed == 2 {
                        let bytes = src.split_to(2);
                        u64::from(u16::from_be_bytes([bytes[0], bytes[1]]))
                    } else {
                        let bytes = src.split_to(8);
                        u64::from_be_bytes([
                            bytes[0], bytes[1], bytes[2], bytes[3], bytes[4], bytes[5], bytes[6],
                            bytes[7],
                        ])
                    };
                    let partial = *partial;
                    if let Err(e) = self.check_payload_len(partial.opcode, payload_len) {
                        // Length bytes already consumed; resynchronize.
                        self.state = DecodeState::Header;
                        return Err(e);
                    }
                    self.state = if partial.masked {
                        DecodeState::MaskKey { partial, payload_len }
                    } else {
                        DecodeState::Payload {
                            partial,
                            mask_key: None,
                            payload_len,
                        }
                    };
                }

                DecodeState::MaskKey { partial, payload_len } => {
                    if src.len() < 4 {
                        return Ok(None);
                    }
                    let bytes = src.split_to(4);
                    let mut mask_key = [0u8; 4];
                    mask_key.copy_from_slice(&bytes);
                    let (partial, payload_len) = (*partial, *payload_len);
                    self.state = DecodeState::Payload {
                        partial,
                        mask_key: Some(mask_key),
                        payload_len,
                    };
                }

                DecodeState::Payload {
                    partial,
                    mask_key,
                    payload_len,
                } => {
                    #[allow(clippy::cast_possible_truncation)]
                    let len = *payload_len as usize;
                    if src.len() < len {
                        return Ok(None);
                    }
                    let mut payload = src.split_to(len);
                    if let Some(key) = mask_key {
                        apply_mask(&mut payload, *key);
                    }
                    let frame = Frame {
                        fin: partial.fin,
                        rsv1: partial.rsv1,
                        rsv2: partial.rsv2,
                        rsv3: partial.rsv3,
                        opcode: partial.opcode,
                        masked: mask_key.is_some(),
                        mask_key: *mask_key,
                        payload: payload.freeze(),
                        next: None,
                    };
                    match frame.opcode {
                        Opcode::Text | Opcode::Binary if !frame.fin => {
                            self.fragment_total = *payload_len;
                        }
                        Opcode::Continuation if frame.fin => self.fragment_total = 0,
                        Opcode::Continuation => {
                            self.fragment_total =
                                self.fragment_total.saturating_add(*payload_len);
                        }
                        _ => {}
                    }
                    self.state = DecodeState::Header;
                    return Ok(Some(frame));
                }
            }
        }
    }
}

impl Encoder<Frame> for FrameCodec {
    type Error = Error;

    fn encode(&mut self, frame: Frame, dst: &mut BytesMut) -> Result<(), Error> {
        let payload_len = frame.payload.len();

        if frame.opcode.is_control() {
            if !frame.fin {
                return Err(Error::invalid_frame("fragmented control frame"));
            }
            if frame.rsv1 || frame.rsv2 || frame.rsv3 {
                return Err(Error::invalid_frame("reserved bit set on control frame"));
            }
            if payload_len > 125 {
                return Err(Error::invalid_frame(format!(
                    "control payload of {payload_len} bytes exceeds 125"
                )));
            }
        }

        let should_mask = self.role == Role::Client;

        let mut b0 = frame.opcode as u8;
        if frame.fin {
            b0 |= FIN_BIT;
        }
        if frame.rsv1 {
            b0 |= RSV1_BIT;
        }
        if frame.rsv2 {
            b0 |= RSV2_BIT;
        }
        if frame.rsv3 {
            b0 |= RSV3_BIT;
        }

        let mask_bit = if should_mask { MASK_BIT } else { 0 };
        let header_size = 2
            + if payload_len > 65_535 {
                8
            } else if payload_len > 125 {
                2
            } else {
                0
            }
            + if should_mask { 4 } else { 0 };
        dst.reserve(header_size + payload_len);

        dst.put_u8(b0);
        #[allow(clippy::cast_possible_truncation)]
        if payload_len <= 125 {
            dst.put_u8(mask_bit | payload_len as u8);
        } else if payload_len <= 65_535 {
            dst.put_u8(mask_bit | 126);
            dst.put_u16(payload_len as u16);
        } else {
            dst.put_u8(mask_bit | 127);
            dst.put_u64(payload_len as u64);
        }

        if should_mask {
            let mask_key = generate_mask_key();
            dst.put_slice(&mask_key);
            let mut masked = BytesMut::from(frame.payload.as_ref());
            apply_mask(&mut masked, mask_key);
            dst.put_slice(&masked);
        } else {
            dst.put_slice(&frame.payload);
        }

        Ok(())
    }
}

/// Applies XOR masking in place; masking and unmasking are the same
/// operation.
pub fn apply_mask(payload: &mut [u8], mask_key: [u8; 4]) {
    for (i, byte) in payload.iter_mut().enumerate() {
        *byte ^= mask_key[i % 4];
    }
}

/// Generates a client mask key.
///
/// RFC 6455 §5.3 requires mask keys to come from a strong entropy source to
/// prevent cross-protocol attacks through intermediary cache poisoning.
fn generate_mask_key() -> [u8; 4] {
    let mut key = [0u8; 4];
    getrandom::fill(&mut key).expect("OS RNG unavailable");
    key
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opcode_lookup_table() {
        assert_eq!(Opcode::from_u8(0x0).unwrap(), Opcode::Continuation);
        assert_eq!(Opcode::from_u8(0x1).unwrap(), Opcode::Text);
        assert_eq!(Opcode::from_u8(0x2).unwrap(), Opcode::Binary);
        assert_eq!(Opcode::from_u8(0x8).unwrap(), Opcode::Close);
        assert_eq!(Opcode::from_u8(0x9).unwrap(), Opcode::Ping);
        assert_eq!(Opcode::from_u8(0xA).unwrap(), Opcode::Pong);
        for value in [0x3, 0x4, 0x5, 0x6, 0x7, 0xB, 0xC, 0xD, 0xE, 0xF] {
            assert!(Opcode::from_u8(value).is_err(), "0x{value:X} should fail");
        }
    }

    #[test]
    fn opcode_classification() {
        for op in [Opcode::Continuation, Opcode::Text, Opcode::Binary] {
            assert!(op.is_data());
            assert!(!op.is_control());
        }
        for op in [Opcode::Close, Opcode::Ping, Opcode::Pong] {
            assert!(op.is_control());
            assert!(!op.is_data());
        }
    }

    #[test]
    fn fragmented_control_frame_rejected_at_construction() {
        for op in [Opcode::Close, Opcode::Ping, Opcode::Pong] {
            let result = Frame::new(false, false, false, false, op, Bytes::new());
            assert!(result.is_err(), "{op:?} with fin=false must fail");
        }
    }

    #[test]
    fn reserved_bits_on_control_frame_rejected_at_construction() {
        for op in [Opcode::Close, Opcode::Ping, Opcode::Pong] {
            for (rsv1, rsv2, rsv3) in [(true, false, false), (false, true, false), (false, false, true)] {
                let result = Frame::new(true, rsv1, rsv2, rsv3, op, Bytes::new());
                assert!(result.is_err(), "{op:?} with reserved bit must fail");
            }
        }
    }

    #[test]
    fn oversized_control_payload_rejected_at_construction() {
        let payload = Bytes::from(vec![0u8; 126]);
        assert!(Frame::new(true, false, false, false, Opcode::Ping, payload).is_err());
    }

    #[test]
    fn linking_past_final_frame_fails() {
        let mut final_frame = Frame::binary(Bytes::from_static(b"head"));
        let err = final_frame.set_next(Frame::binary(Bytes::from_static(b"tail")));
        assert!(err.is_err());
        assert!(final_frame.next().is_none());
    }

    #[test]
    fn chain_payload_concatenates_in_link_order() {
        let mut head = Frame::new(false, false, false, false, Opcode::Binary, &b"one "[..]).unwrap();
        let mut middle =
            Frame::new(false, false, false, false, Opcode::Continuation, &b"two "[..]).unwrap();
        let tail =
            Frame::new(true, false, false, false, Opcode::Continuation, &b"three"[..]).unwrap();
        middle.set_next(tail).unwrap();
        head.set_next(middle).unwrap();

        assert_eq!(head.effective_payload().as_ref(), b"one two three");
    }

    #[test]
    fn unchained_effective_payload_is_own_payload() {
        let frame = Frame::text("solo");
        assert_eq!(frame.effective_payload().as_ref(), b"solo");
    }

    #[test]
    fn split_two_limits_plus_ten_yields_three_frames() {
        let limit = 64;
        let payload = Bytes::from(vec![0xAB; 2 * limit + 10]);
        let frames = Frame::split_data(Opcode::Binary, payload, limit).unwrap();

        assert_eq!(frames.len(), 3);
        assert_eq!(frames[0].payload.len(), limit);
        assert!(!frames[0].fin());
        assert_eq!(frames[0].opcode, Opcode::Binary);
        assert_eq!(frames[1].payload.len(), limit);
        assert!(!frames[1].fin());
        assert_eq!(frames[1].opcode, Opcode::Continuation);
        assert_eq!(frames[2].payload.len(), 10);
        assert!(frames[2].fin());
        assert_eq!(frames[2].opcode, Opcode::Continuation);
    }

    #[test]
    fn split_within_limit_yields_single_final_frame() {
        let frames = Frame::split_data(Opcode::Text, Bytes::from_static(b"short"), 64).unwrap();
        assert_eq!(frames.len(), 1);
        assert!(frames[0].fin());
        assert_eq!(frames[0].opcode, Opcode::Text);
    }

    #[test]
    fn split_rejects_control_opcodes_and_zero_limit() {
        assert!(Frame::split_data(Opcode::Ping, Bytes::new(), 64).is_err());
        assert!(Frame::split_data(Opcode::Binary, Bytes::new(), 0).is_err());
    }

    #[test]
    fn header_bits_roundtrip() {
        // Server-to-client frames are unmasked, so parsed bytes reproduce the
        // original header exactly.
        let mut encoder = FrameCodec::server();
        let mut decoder = FrameCodec::client();
        for opcode in [Opcode::Text, Opcode::Binary, Opcode::Close, Opcode::Ping, Opcode::Pong] {
            for len in [0usize, 1, 125] {
                let frame =
                    Frame::new(true, false, false, false, opcode, Bytes::from(vec![0u8; len]))
                        .unwrap();
                let mut buf = BytesMut::new();
                encoder.encode(frame, &mut buf).unwrap();
                let first = buf[0];
                let second = buf[1];
                let parsed = decoder.decode(&mut buf).unwrap().unwrap();

                assert_eq!(parsed.fin(), first & FIN_BIT != 0);
                assert_eq!(parsed.opcode as u8, first & OPCODE_MASK);
                assert!(!parsed.rsv1 && !parsed.rsv2 && !parsed.rsv3);
                assert_eq!(parsed.masked, second & MASK_BIT != 0);
                assert_eq!(parsed.payload.len(), len);
            }
        }
    }

    #[test]
    fn reserved_bits_roundtrip_when_validation_disabled() {
        let mut encoder = FrameCodec::server();
        let mut decoder = FrameCodec::client().validate_reserved_bits(false);
        let mut frame = Frame::binary(Bytes::from_static(b"x"));
        frame.rsv1 = true;
        frame.rsv3 = true;

        let mut buf = BytesMut::new();
        encoder.encode(frame, &mut buf).unwrap();
        assert_eq!(buf[0] & RSV1_BIT, RSV1_BIT);
        assert_eq!(buf[0] & RSV3_BIT, RSV3_BIT);

        let parsed = decoder.decode(&mut buf).unwrap().unwrap();
        assert!(parsed.rsv1);
        assert!(!parsed.rsv2);
        assert!(parsed.rsv3);
    }

    #[test]
    fn server_rejects_unmasked_frame_with_missing_mask_error() {
        // Encode as a server (unmasked), then decode with a server codec.
        let mut encoder = FrameCodec::server();
        let mut decoder = FrameCodec::server();
        let mut buf = BytesMut::new();
        encoder.encode(Frame::text("no mask"), &mut buf).unwrap();

        let err = decoder.decode(&mut buf).unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::MissingMask);
    }

    #[test]
    fn client_rejects_masked_server_frame() {
        let mut encoder = FrameCodec::client();
        let mut decoder = FrameCodec::client();
        let mut buf = BytesMut::new();
        encoder.encode(Frame::text("masked"), &mut buf).unwrap();

        assert!(decoder.decode(&mut buf).is_err());
    }

    #[test]
    fn client_frames_are_masked_and_server_unmasks() {
        let mut encoder = FrameCodec::client();
        let mut decoder = FrameCodec::server();
        let mut buf = BytesMut::new();
        encoder.encode(Frame::text("hello"), &mut buf).unwrap();
        assert_ne!(buf[1] & MASK_BIT, 0);

        let parsed = decoder.decode(&mut buf).unwrap().unwrap();
        assert_eq!(parsed.payload.as_ref(), b"hello");
        assert!(parsed.masked);
    }

    #[test]
    fn server_frames_are_never_masked() {
        let mut encoder = FrameCodec::server();
        let mut buf = BytesMut::new();
        encoder.encode(Frame::binary(Bytes::from_static(b"abc")), &mut buf).unwrap();
        assert_eq!(buf[1] & MASK_BIT, 0);
    }

    #[test]
    fn extended_16_bit_length_roundtrip() {
        let mut encoder = FrameCodec::server();
        let mut decoder = FrameCodec::client();
        let mut buf = BytesMut::new();
        encoder
            .encode(Frame::binary(Bytes::from(vec![7u8; 300])), &mut buf)
            .unwrap();
        assert_eq!(buf[1] & LENGTH_MASK, 126);

        let parsed = decoder.decode(&mut buf).unwrap().unwrap();
        assert_eq!(parsed.payload.len(), 300);
    }

    #[test]
    fn extended_64_bit_length_roundtrip() {
        let mut encoder = FrameCodec::server();
        let mut decoder = FrameCodec::client();
        let mut buf = BytesMut::new();
        encoder
            .encode(Frame::binary(Bytes::from(vec![7u8; 70_000])), &mut buf)
            .unwrap();
        assert_eq!(buf[1] & LENGTH_MASK, 127);

        let parsed = decoder.decode(&mut buf).unwrap().unwrap();
        assert_eq!(parsed.payload.len(), 70_000);
    }

    #[test]
    fn oversized_payload_rejected() {
        let mut encoder = FrameCodec::server();
        let mut decoder = FrameCodec::client().max_payload_size(128);
        let mut buf = BytesMut::new();
        encoder
            .encode(Frame::binary(Bytes::from(vec![0u8; 256])), &mut buf)
            .unwrap();

        let err = decoder.decode(&mut buf).unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::FrameTooBig);
    }

    #[test]
    fn fragment_total_over_limit_rejected() {
        // Each fragment stays within the per-frame cap, but the running total
        // of the message crosses it on the final continuation.
        let mut encoder = FrameCodec::client();
        let mut decoder = FrameCodec::server().max_payload_size(128);
        let mut buf = BytesMut::new();
        let fragment = || Bytes::from(vec![0x5A; 64]);
        encoder
            .encode(
                Frame::new(false, false, false, false, Opcode::Binary, fragment()).unwrap(),
                &mut buf,
            )
            .unwrap();
        encoder
            .encode(
                Frame::new(false, false, false, false, Opcode::Continuation, fragment()).unwrap(),
                &mut buf,
            )
            .unwrap();
        encoder
            .encode(
                Frame::new(true, false, false, false, Opcode::Continuation, fragment()).unwrap(),
                &mut buf,
            )
            .unwrap();

        assert!(decoder.decode(&mut buf).unwrap().is_some());
        assert!(decoder.decode(&mut buf).unwrap().is_some());
        let err = decoder.decode(&mut buf).unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::FrameTooBig);
    }

    #[test]
    fn fragment_total_resets_between_messages() {
        let mut encoder = FrameCodec::client();
        let mut decoder = FrameCodec::server().max_payload_size(128);
        let mut buf = BytesMut::new();
        for _ in 0..2 {
            encoder
                .encode(
                    Frame::new(false, false, false, false, Opcode::Text, vec![b'a'; 64]).unwrap(),
                    &mut buf,
                )
                .unwrap();
            encoder
                .encode(
                    Frame::new(true, false, false, false, Opcode::Continuation, vec![b'b'; 64])
                        .unwrap(),
                    &mut buf,
                )
                .unwrap();
        }

        for _ in 0..4 {
            assert!(decoder.decode(&mut buf).unwrap().is_some());
        }
    }

    #[test]
    fn control_constructors_reject_oversized_payloads() {
        assert!(Frame::ping(vec![0u8; 126]).is_err());
        assert!(Frame::pong(vec![0u8; 126]).is_err());
        assert!(Frame::close_with_payload(Bytes::from(vec![0u8; 126])).is_err());

        // The reason shares the 125-byte budget with the two-byte code.
        let too_long = "x".repeat(124);
        assert!(Frame::close(crate::ws::ClosureCode::Normal, Some(&too_long)).is_err());
        let at_limit = "x".repeat(123);
        assert!(Frame::close(crate::ws::ClosureCode::Normal, Some(&at_limit)).is_ok());
        assert!(Frame::ping(&b"small"[..]).is_ok());
    }

    #[test]
    fn partial_input_returns_none_and_resumes() {
        let mut encoder = FrameCodec::client();
        let mut decoder = FrameCodec::server();
        let mut buf = BytesMut::new();
        encoder.encode(Frame::text("resumable"), &mut buf).unwrap();

        let mut partial = buf.split_to(3);
        assert!(decoder.decode(&mut partial).unwrap().is_none());
        partial.unsplit(buf);
        let parsed = decoder.decode(&mut partial).unwrap().unwrap();
        assert_eq!(parsed.payload.as_ref(), b"resumable");
    }

    #[test]
    fn two_frames_in_one_buffer_decode_in_order() {
        let mut encoder = FrameCodec::server();
        let mut decoder = FrameCodec::client();
        let mut buf = BytesMut::new();
        encoder.encode(Frame::text("first"), &mut buf).unwrap();
        encoder.encode(Frame::text("second"), &mut buf).unwrap();

        let a = decoder.decode(&mut buf).unwrap().unwrap();
        let b = decoder.decode(&mut buf).unwrap().unwrap();
        assert_eq!(a.payload.as_ref(), b"first");
        assert_eq!(b.payload.as_ref(), b"second");
    }

    #[test]
    fn apply_mask_is_an_involution() {
        let key = [0x37, 0xFA, 0x21, 0x3D];
        let mut payload = b"Hello".to_vec();
        let original = payload.clone();
        apply_mask(&mut payload, key);
        assert_ne!(payload, original);
        apply_mask(&mut payload, key);
        assert_eq!(payload, original);
    }

    #[test]
    fn fragmented_control_frame_rejected_on_parse() {
        // Hand-built header: Ping with fin=0, masked, length 0, zero key.
        let mut decoder = FrameCodec::server();
        let mut buf = BytesMut::from(&[0x09, 0x80, 0, 0, 0, 0][..]);
        assert!(decoder.decode(&mut buf).is_err());
    }

    #[test]
    fn reserved_bit_on_control_frame_rejected_on_parse() {
        // Close with fin=1 and rsv1 set.
        let mut decoder = FrameCodec::server();
        let mut buf = BytesMut::from(&[0x88 | RSV1_BIT, 0x80, 0, 0, 0, 0][..]);
        assert!(decoder.decode(&mut buf).is_err());
    }
}
