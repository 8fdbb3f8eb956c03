//! `Decoder` and `Encoder` traits.
//!
//! A codec turns a raw byte stream into typed protocol units and back. The
//! traits are synchronous and buffer-driven so they compose with any
//! transport: the caller owns the `BytesMut` accumulation buffer and feeds it
//! bytes as readiness events deliver them.

use bytes::BytesMut;
use std::io;

/// Decodes typed items from an accumulation buffer.
///
/// `decode` consumes as many bytes as it can interpret and returns:
///
/// - `Ok(Some(item))` when a complete item was parsed (bytes consumed),
/// - `Ok(None)` when more bytes are needed (buffer left intact past the
///   consumed prefix),
/// - `Err(_)` on a protocol violation (fail fast, at the point of parse).
pub trait Decoder {
    /// The item this decoder produces.
    type Item;
    /// The error type returned on malformed input.
    type Error: From<io::Error>;

    /// Attempts to decode one item from `src`.
    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error>;
}

/// Encodes typed items into an output buffer.
pub trait Encoder<Item> {
    /// The error type returned when an item cannot be represented.
    type Error: From<io::Error>;

    /// Appends the wire representation of `item` to `dst`.
    fn encode(&mut self, item: Item, dst: &mut BytesMut) -> Result<(), Self::Error>;
}
