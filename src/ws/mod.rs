//! RFC 6455 WebSocket framing.
//!
//! - [`frame`]: wire codec, fragmentation chains, masking, split rules
//! - [`close`]: closure codes and close-frame payloads
//! - [`writer`]: serialized outbound writer thread

pub mod close;
pub mod frame;
pub mod writer;

pub use close::{CloseReason, ClosureCode};
pub use frame::{apply_mask, Frame, FrameCodec, Opcode, Role};
pub use writer::{FrameWriter, WriteCommand};
