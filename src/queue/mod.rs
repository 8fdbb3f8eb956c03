//! Bounded operation hand-off from the reactor to session consumers.
//!
//! Reactor dispatch and session logic meet at exactly one seam: handlers
//! convert readiness events into [`Operation`] values and push them into a
//! bounded queue; consumer threads pull them in submission order. The bound
//! is the back-pressure mechanism. When consumers fall behind, producers
//! block in `send` instead of growing the queue or dropping work.

pub mod chan;

use crate::error::Error;
use crate::reactor::{Connection, Handler, ReactorHandle};
use mio::Token;
use std::net::SocketAddr;

/// Discriminant of an [`Operation`], for logging and routing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    /// A listener produced a new inbound connection.
    Accept,
    /// An outbound connection finished establishing.
    Connect,
    /// A connection became readable.
    Read,
    /// A connection became writable.
    Write,
}

impl std::fmt::Display for OperationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Accept => "accept",
            Self::Connect => "connect",
            Self::Read => "read",
            Self::Write => "write",
        };
        f.write_str(name)
    }
}

/// A unit of work produced by the reactor.
///
/// Each variant carries the connection it concerns. Ownership of the
/// connection travels with the operation; while an operation is in flight the
/// reactor holds no reference to the connection and cannot re-dispatch it.
#[derive(Debug)]
pub enum Operation<A> {
    /// New inbound connection, not yet registered for readiness.
    Accept(Connection<A>),
    /// Outbound connection that completed its connect.
    Connect(Connection<A>),
    /// Connection with bytes (or EOF) waiting to be read.
    Read(Connection<A>),
    /// Connection with socket buffer space available.
    Write(Connection<A>),
}

impl<A> Operation<A> {
    /// Returns the discriminant of this operation.
    #[must_use]
    pub fn kind(&self) -> OperationKind {
        match self {
            Self::Accept(_) => OperationKind::Accept,
            Self::Connect(_) => OperationKind::Connect,
            Self::Read(_) => OperationKind::Read,
            Self::Write(_) => OperationKind::Write,
        }
    }

    /// Consumes the operation, returning the connection it carries.
    #[must_use]
    pub fn into_connection(self) -> Connection<A> {
        match self {
            Self::Accept(conn) | Self::Connect(conn) | Self::Read(conn) | Self::Write(conn) => conn,
        }
    }
}

/// Producer half of the operation queue. Cloneable across handler threads.
pub struct OperationSender<A> {
    tx: chan::Sender<Operation<A>>,
}

impl<A> OperationSender<A> {
    /// Enqueues an operation, blocking while the queue is full.
    pub fn send(&self, op: Operation<A>) -> Result<(), Error> {
        self.tx.send(op).map_err(|_| Error::queue_closed())
    }
}

impl<A> Clone for OperationSender<A> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

/// Consumer half of the operation queue.
pub struct OperationReceiver<A> {
    rx: chan::Receiver<Operation<A>>,
}

impl<A> OperationReceiver<A> {
    /// Dequeues the next operation in submission order, blocking while the
    /// queue is empty.
    pub fn recv(&self) -> Result<Operation<A>, Error> {
        self.rx.recv().map_err(|_| Error::queue_closed())
    }

    /// Dequeues without blocking; `Ok(None)` means the queue is currently
    /// empty but still connected.
    pub fn try_recv(&self) -> Result<Option<Operation<A>>, Error> {
        match self.rx.try_recv() {
            Ok(op) => Ok(Some(op)),
            Err(chan::TryRecvError::Empty) => Ok(None),
            Err(chan::TryRecvError::Disconnected) => Err(Error::queue_closed()),
        }
    }

    /// Number of operations currently queued.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rx.len()
    }

    /// True if no operations are currently queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}

/// Creates a bounded operation queue with the given capacity.
///
/// # Panics
///
/// Panics if `capacity` is zero.
#[must_use]
pub fn operation_queue<A>(capacity: usize) -> (OperationSender<A>, OperationReceiver<A>) {
    let (tx, rx) = chan::bounded(capacity);
    (OperationSender { tx }, OperationReceiver { rx })
}

/// Reactor handler that forwards every event into an operation queue.
///
/// This is the standard wiring: the reactor classifies readiness, this
/// handler wraps each dispatch as an [`Operation`] and enqueues it, and the
/// session logic consumes operations single-file on its own thread. Sending
/// blocks the worker when the queue is full, which propagates back-pressure
/// to dispatch without dropping events.
pub struct QueueHandler<A, F> {
    tx: OperationSender<A>,
    attach: F,
}

impl<A, F> QueueHandler<A, F> {
    /// Creates a forwarding handler; `attach` builds the attachment for each
    /// accepted peer.
    pub fn new(tx: OperationSender<A>, attach: F) -> Self {
        Self { tx, attach }
    }

    fn forward(&self, op: Operation<A>) {
        let kind = op.kind();
        if self.tx.send(op).is_err() {
            tracing::warn!(%kind, "operation queue closed; dropping connection");
        }
    }
}

impl<A, F> Handler<A> for QueueHandler<A, F>
where
    A: Send + 'static,
    F: Fn(&SocketAddr) -> A + Send + Sync + 'static,
{
    fn accept_attachment(&self, peer: &SocketAddr) -> A {
        (self.attach)(peer)
    }

    fn on_channel_accepted(&self, conn: Connection<A>, _reactor: &ReactorHandle<A>) {
        self.forward(Operation::Accept(conn));
    }

    fn on_channel_connected(&self, conn: Connection<A>, _reactor: &ReactorHandle<A>) {
        self.forward(Operation::Connect(conn));
    }

    fn on_read_channel(&self, conn: Connection<A>, _reactor: &ReactorHandle<A>) {
        self.forward(Operation::Read(conn));
    }

    fn on_write_channel(&self, conn: Connection<A>, _reactor: &ReactorHandle<A>) {
        self.forward(Operation::Write(conn));
    }

    fn on_exception(&self, token: Token, _attachment: Option<A>, error: Error) {
        tracing::warn!(token = token.0, error = %error, "reactor fault");
    }
}
