//! HTTP collaborators for the upgrade path.
//!
//! - [`message`]: start line plus ordered header map plus optional body
//! - [`deadline`]: bounded-time message reads over non-blocking channels

pub mod deadline;
pub mod message;

pub use deadline::read_message_deadline;
pub use message::{HeaderMap, Message};
