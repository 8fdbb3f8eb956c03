//! Riptide: the transport/protocol core of a non-blocking HTTP/WebSocket
//! server toolkit.
//!
//! # Overview
//!
//! Riptide is built directly on non-blocking sockets and keeps the three hard
//! pieces of a from-scratch server under one roof:
//!
//! - a readiness-multiplexed **reactor** that dispatches accept/connect/read/
//!   write events to handlers without ever running handler code on its
//!   polling thread;
//! - a **secure channel** decorator that drives a TLS handshake state machine
//!   over the same non-blocking substrate;
//! - a **WebSocket frame codec** implementing RFC 6455 framing: header bit
//!   layout, fragmentation/continuation chains, control-frame validation,
//!   masking enforcement, and closure-code signaling.
//!
//! Reactor events reach session logic through one seam only: a bounded,
//! ordered, back-pressured [`queue::Operation`] channel.
//!
//! # Module Structure
//!
//! - [`ws`]: RFC 6455 frame codec, closure codes, serialized frame writer
//! - [`reactor`]: readiness multiplexer, event loop, worker pool, supervision
//! - [`queue`]: bounded operation hand-off from reactor to consumers
//! - [`tls`]: secure channel decorator over a raw non-blocking connection
//! - [`http`]: thin collaborators (ordered header map, deadline-bound reads)
//! - [`codec`]: `Decoder`/`Encoder` traits bridging byte buffers and frames
//! - [`error`]: the crate-wide error value and its kind taxonomy

#![warn(missing_docs)]
#![warn(clippy::pedantic)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::module_name_repetitions)]

pub mod codec;
pub mod error;
pub mod http;
pub mod queue;
pub mod reactor;
pub mod tls;
pub mod ws;

#[cfg(test)]
pub(crate) mod test_utils;

pub use codec::{Decoder, Encoder};
pub use error::{Error, ErrorKind, Result};
pub use queue::{operation_queue, Operation, OperationKind, QueueHandler};
pub use reactor::{Connection, Handler, ReactorEngine, ReactorHandle, SocketKind};
pub use tls::{HandshakeOutcome, HandshakeState, SecureChannel, TaskExecutor};
pub use ws::{ClosureCode, Frame, FrameCodec, Opcode, Role};
