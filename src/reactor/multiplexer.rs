//! Readiness multiplexer over the OS selector.
//!
//! Owns the selector and the token-to-connection table. Exactly one thread,
//! the polling thread, touches it; ownership of the `Multiplexer` value is
//! the enforcement. Dispatch removes a connection from the table, so a token
//! cannot fire twice while a handler holds its connection.

use crate::reactor::connection::Connection;
use mio::{Events, Poll, Token, Waker};
use std::collections::HashMap;
use std::io;
use std::time::Duration;

/// Token reserved for the cross-thread waker.
pub const WAKER_TOKEN: Token = Token(usize::MAX);

/// Default event buffer capacity per poll tick.
const EVENTS_CAPACITY: usize = 1024;

/// A readiness event copied out of the selector buffer.
#[derive(Debug, Clone, Copy)]
pub struct ReadyEvent {
    /// Token of the connection that became ready.
    pub token: Token,
    /// Readable readiness (includes EOF).
    pub readable: bool,
    /// Writable readiness.
    pub writable: bool,
}

/// Selector plus registration table.
pub struct Multiplexer<A> {
    poll: Poll,
    events: Events,
    table: HashMap<Token, Connection<A>>,
}

impl<A> Multiplexer<A> {
    /// Creates a multiplexer with an empty table.
    pub fn new() -> io::Result<Self> {
        Ok(Self {
            poll: Poll::new()?,
            events: Events::with_capacity(EVENTS_CAPACITY),
            table: HashMap::new(),
        })
    }

    /// Creates a waker bound to this selector under [`WAKER_TOKEN`].
    pub fn waker(&self) -> io::Result<Waker> {
        Waker::new(self.poll.registry(), WAKER_TOKEN)
    }

    /// Registers a connection with the selector and records it in the table.
    ///
    /// On registration failure the connection is handed back so the caller
    /// can report it with its attachment intact.
    pub fn insert(&mut self, mut conn: Connection<A>) -> Result<(), (Connection<A>, io::Error)> {
        if let Err(err) = conn.register(self.poll.registry()) {
            return Err((conn, err));
        }
        self.table.insert(conn.token(), conn);
        Ok(())
    }

    /// Removes a connection from the table and the selector.
    ///
    /// After this returns the selector can no longer produce events for the
    /// token; the caller owns the connection exclusively.
    pub fn take(&mut self, token: Token) -> Option<Connection<A>> {
        let mut conn = self.table.remove(&token)?;
        if let Err(err) = conn.deregister(self.poll.registry()) {
            tracing::debug!(token = token.0, error = %err, "deregister failed");
        }
        Some(conn)
    }

    /// Borrows a registered connection without removing it.
    pub fn get_mut(&mut self, token: Token) -> Option<&mut Connection<A>> {
        self.table.get_mut(&token)
    }

    /// Number of registered connections.
    #[must_use]
    pub fn len(&self) -> usize {
        self.table.len()
    }

    /// True if no connections are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    /// Drains all registered connections, deregistering each.
    pub fn drain(&mut self) -> Vec<Connection<A>> {
        let tokens: Vec<Token> = self.table.keys().copied().collect();
        tokens.into_iter().filter_map(|t| self.take(t)).collect()
    }

    /// Blocks for readiness up to `timeout` and copies events into `out`.
    ///
    /// A signal-interrupted wait is treated as an empty tick.
    pub fn poll(&mut self, timeout: Duration, out: &mut Vec<ReadyEvent>) -> io::Result<()> {
        match self.poll.poll(&mut self.events, Some(timeout)) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::Interrupted => return Ok(()),
            Err(e) => return Err(e),
        }
        for event in &self.events {
            out.push(ReadyEvent {
                token: event.token(),
                readable: event.is_readable() || event.is_read_closed(),
                writable: event.is_writable(),
            });
        }
        Ok(())
    }
}
