//! Readiness-multiplexed reactor.
//!
//! One polling thread watches every registered socket through the OS
//! selector and classifies readiness into accept, connect, read, and write
//! dispatches. Handler code runs exclusively on the [`workers`] pool; the
//! polling thread does nothing but poll, classify, and submit.
//!
//! The dispatch contract is at-most-once: a connection is removed from the
//! [`multiplexer`] table before its handler job is queued, so the same token
//! cannot fire again until the handler explicitly re-registers.

pub mod connection;
pub mod engine;
pub mod multiplexer;
pub mod workers;

pub use connection::{Connection, SocketKind};
pub use engine::{Handler, ReactorEngine, ReactorHandle};
pub use multiplexer::{Multiplexer, ReadyEvent, WAKER_TOKEN};
pub use workers::{JobHandle, WorkerPool};
