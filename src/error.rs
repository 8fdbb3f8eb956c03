//! Crate-wide error value.
//!
//! Protocol faults, I/O faults, and dispatch faults all flow through a single
//! [`Error`] carrying an [`ErrorKind`] plus contextual fields, instead of a
//! per-condition type hierarchy. Each kind has a dedicated constructor;
//! consumers match on the kind exhaustively.
//!
//! Protocol and masking violations are detected at the point of parse or
//! construction and fail fast. I/O and dispatch faults are caught at the
//! reactor boundary and converted to `on_exception` reports; they never
//! propagate into the polling loop.

use crate::ws::ClosureCode;
use std::io;
use thiserror::Error as ThisError;

/// Convenience result alias for fallible riptide operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Classification of an [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, ThisError)]
pub enum ErrorKind {
    /// Malformed frame: unrecognized opcode, fragmented control frame,
    /// reserved bit on a control frame, or linking past a final frame.
    #[error("invalid frame")]
    InvalidFrame,
    /// Unmasked frame received where masking is required.
    #[error("missing mask")]
    MissingMask,
    /// Underlying read/write fault.
    #[error("I/O failure")]
    Io,
    /// TLS negotiation rejected or faulted.
    #[error("handshake failure")]
    Handshake,
    /// Payload or fragment total exceeds the configured limit.
    #[error("frame too big")]
    FrameTooBig,
    /// Internal wiring fault (e.g. a channel with no backing connection).
    #[error("internal error")]
    Internal,
    /// A deadline-bound operation exceeded its cutoff.
    #[error("timed out")]
    Timeout,
    /// Fault raised while dispatching an accept/read/write event.
    #[error("dispatch fault")]
    Dispatch,
    /// The operation queue was disconnected.
    #[error("queue closed")]
    QueueClosed,
}

/// The crate-wide error value.
///
/// Carries a kind, an optional RFC 6455 closure code to signal to the peer
/// (when the channel is not already broken), a human-readable message, and an
/// optional source.
#[derive(Debug, ThisError)]
#[error("{kind}: {message}")]
pub struct Error {
    kind: ErrorKind,
    closure: Option<ClosureCode>,
    message: String,
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
}

impl Error {
    fn new(kind: ErrorKind, closure: Option<ClosureCode>, message: impl Into<String>) -> Self {
        Self {
            kind,
            closure,
            message: message.into(),
            source: None,
        }
    }

    /// Malformed frame detected at parse or construction time.
    #[must_use]
    pub fn invalid_frame(message: impl Into<String>) -> Self {
        Self::new(
            ErrorKind::InvalidFrame,
            Some(ClosureCode::ProtocolError),
            message,
        )
    }

    /// Frame construction rejected by policy rather than grammar.
    #[must_use]
    pub fn policy_violation(message: impl Into<String>) -> Self {
        Self::new(
            ErrorKind::InvalidFrame,
            Some(ClosureCode::PolicyValidation),
            message,
        )
    }

    /// Unmasked frame received by a reader that requires masking.
    #[must_use]
    pub fn missing_mask() -> Self {
        Self::new(
            ErrorKind::MissingMask,
            Some(ClosureCode::ProtocolError),
            "unmasked frame where masking is required",
        )
    }

    /// Payload or fragment total exceeds the configured limit.
    #[must_use]
    pub fn frame_too_big(size: u64, max: usize) -> Self {
        Self::new(
            ErrorKind::FrameTooBig,
            Some(ClosureCode::TooBig),
            format!("payload of {size} bytes exceeds limit of {max}"),
        )
    }

    /// TLS negotiation rejected or faulted; the raw connection is closed.
    #[must_use]
    pub fn handshake(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Handshake, Some(ClosureCode::TlsError), message)
    }

    /// Internal wiring fault.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(
            ErrorKind::Internal,
            Some(ClosureCode::InternalError),
            message,
        )
    }

    /// Deadline exceeded; any partial state has been discarded.
    #[must_use]
    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Timeout, None, message)
    }

    /// Fault raised while dispatching a reactor event.
    #[must_use]
    pub fn dispatch(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Dispatch, None, message)
    }

    /// Operation queue disconnected.
    #[must_use]
    pub fn queue_closed() -> Self {
        Self::new(ErrorKind::QueueClosed, None, "operation queue disconnected")
    }

    /// Attaches a source error.
    #[must_use]
    pub fn with_source(
        mut self,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    /// Returns the error classification.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Returns the closure code to communicate to the peer, if any.
    ///
    /// I/O faults carry [`ClosureCode::AbnormalClose`], which is never put on
    /// the wire; the connection is simply dropped.
    #[must_use]
    pub fn closure_code(&self) -> Option<ClosureCode> {
        self.closure
    }

    /// Returns the human-readable message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// True if this wraps an I/O would-block condition.
    #[must_use]
    pub fn is_would_block(&self) -> bool {
        matches!(
            self.source.as_deref().and_then(|s| s.downcast_ref::<io::Error>()),
            Some(e) if e.kind() == io::ErrorKind::WouldBlock
        )
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Self::new(
            ErrorKind::Io,
            Some(ClosureCode::AbnormalClose),
            err.to_string(),
        )
        .with_source(err)
    }
}
