//! Connection bookkeeping for the reactor.

use crate::error::Error;
use mio::net::{TcpListener, TcpStream};
use mio::{Interest, Registry, Token};
use std::io;
use std::net::SocketAddr;

/// The socket a connection wraps. Closed set: listeners and streams only.
#[derive(Debug)]
pub enum SocketKind {
    /// Accepting socket.
    Listener(TcpListener),
    /// Established (or establishing) stream socket.
    Stream(TcpStream),
}

impl SocketKind {
    fn register(&mut self, registry: &Registry, token: Token, interest: Interest) -> io::Result<()> {
        match self {
            Self::Listener(listener) => registry.register(listener, token, interest),
            Self::Stream(stream) => registry.register(stream, token, interest),
        }
    }

    fn reregister(
        &mut self,
        registry: &Registry,
        token: Token,
        interest: Interest,
    ) -> io::Result<()> {
        match self {
            Self::Listener(listener) => registry.reregister(listener, token, interest),
            Self::Stream(stream) => registry.reregister(stream, token, interest),
        }
    }

    fn deregister(&mut self, registry: &Registry) -> io::Result<()> {
        match self {
            Self::Listener(listener) => registry.deregister(listener),
            Self::Stream(stream) => registry.deregister(stream),
        }
    }
}

/// One registered socket plus its session state.
///
/// The attachment type `A` is chosen by the application; it rides along with
/// the connection through dispatch and back, with no downcasting anywhere.
///
/// Ownership doubles as the dispatch guarantee: while a handler holds the
/// connection, the multiplexer has no entry for its token and cannot deliver
/// another event for it.
#[derive(Debug)]
pub struct Connection<A> {
    token: Token,
    socket: SocketKind,
    interest: Interest,
    /// True for an outbound stream whose connect has not yet completed.
    connecting: bool,
    attachment: A,
}

impl<A> Connection<A> {
    /// Wraps a socket with its session attachment.
    #[must_use]
    pub fn new(token: Token, socket: SocketKind, attachment: A) -> Self {
        let interest = match socket {
            SocketKind::Listener(_) => Interest::READABLE,
            SocketKind::Stream(_) => Interest::READABLE.add(Interest::WRITABLE),
        };
        Self {
            token,
            socket,
            interest,
            connecting: false,
            attachment,
        }
    }

    /// Wraps an outbound stream still completing its non-blocking connect.
    #[must_use]
    pub fn connecting(token: Token, stream: TcpStream, attachment: A) -> Self {
        let mut conn = Self::new(token, SocketKind::Stream(stream), attachment);
        conn.interest = Interest::WRITABLE;
        conn.connecting = true;
        conn
    }

    /// The readiness token identifying this connection.
    #[must_use]
    pub fn token(&self) -> Token {
        self.token
    }

    /// True while the stream's connect is outstanding.
    #[must_use]
    pub fn is_connecting(&self) -> bool {
        self.connecting
    }

    /// Marks the connect as completed and restores read/write interest.
    pub fn connect_finished(&mut self) {
        self.connecting = false;
        self.interest = Interest::READABLE.add(Interest::WRITABLE);
    }

    /// The interest this connection registers with.
    #[must_use]
    pub fn interest(&self) -> Interest {
        self.interest
    }

    /// Replaces the interest used at the next (re)registration.
    pub fn set_interest(&mut self, interest: Interest) {
        self.interest = interest;
    }

    /// Borrows the session attachment.
    pub fn attachment(&self) -> &A {
        &self.attachment
    }

    /// Mutably borrows the session attachment.
    pub fn attachment_mut(&mut self) -> &mut A {
        &mut self.attachment
    }

    /// Consumes the connection, returning the attachment.
    #[must_use]
    pub fn into_attachment(self) -> A {
        self.attachment
    }

    /// True if this connection wraps a listener.
    #[must_use]
    pub fn is_listener(&self) -> bool {
        matches!(self.socket, SocketKind::Listener(_))
    }

    /// Borrows the stream socket, failing for listeners.
    pub fn stream_mut(&mut self) -> Result<&mut TcpStream, Error> {
        match &mut self.socket {
            SocketKind::Stream(stream) => Ok(stream),
            SocketKind::Listener(_) => Err(Error::internal("listener has no stream channel")),
        }
    }

    /// Accepts one pending connection, failing for streams.
    ///
    /// Would-block surfaces as the underlying `io::Error` so accept loops can
    /// drain until exhaustion.
    pub fn accept(&mut self) -> Result<(TcpStream, SocketAddr), io::Error> {
        match &mut self.socket {
            SocketKind::Listener(listener) => listener.accept(),
            SocketKind::Stream(_) => Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "stream socket cannot accept",
            )),
        }
    }

    pub(crate) fn register(&mut self, registry: &Registry) -> io::Result<()> {
        self.socket.register(registry, self.token, self.interest)
    }

    pub(crate) fn reregister(&mut self, registry: &Registry) -> io::Result<()> {
        self.socket.reregister(registry, self.token, self.interest)
    }

    pub(crate) fn deregister(&mut self, registry: &Registry) -> io::Result<()> {
        self.socket.deregister(registry)
    }

    /// Shuts down both directions of a stream socket; no-op for listeners.
    pub fn shutdown(&mut self) {
        if let SocketKind::Stream(stream) = &mut self.socket {
            let _ = stream.shutdown(std::net::Shutdown::Both);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bound_listener() -> TcpListener {
        TcpListener::bind("127.0.0.1:0".parse().unwrap()).unwrap()
    }

    #[test]
    fn listener_defaults_to_read_interest() {
        let conn = Connection::new(Token(1), SocketKind::Listener(bound_listener()), ());
        assert!(conn.is_listener());
        assert_eq!(conn.interest(), Interest::READABLE);
    }

    #[test]
    fn stream_defaults_to_read_write_interest() {
        let listener = bound_listener();
        let addr = listener.local_addr().unwrap();
        let stream = TcpStream::connect(addr).unwrap();
        let conn = Connection::new(Token(2), SocketKind::Stream(stream), ());
        assert!(!conn.is_listener());
        assert!(conn.interest().is_readable());
        assert!(conn.interest().is_writable());
    }

    #[test]
    fn connecting_stream_watches_writable_until_finished() {
        let listener = bound_listener();
        let addr = listener.local_addr().unwrap();
        let stream = TcpStream::connect(addr).unwrap();
        let mut conn = Connection::connecting(Token(3), stream, ());

        assert!(conn.is_connecting());
        assert_eq!(conn.interest(), Interest::WRITABLE);
        conn.connect_finished();
        assert!(!conn.is_connecting());
        assert!(conn.interest().is_readable());
    }

    #[test]
    fn listener_has_no_stream_channel() {
        let mut conn = Connection::new(Token(4), SocketKind::Listener(bound_listener()), ());
        assert!(conn.stream_mut().is_err());
    }

    #[test]
    fn attachment_travels_with_the_connection() {
        let mut conn = Connection::new(
            Token(5),
            SocketKind::Listener(bound_listener()),
            String::from("session"),
        );
        conn.attachment_mut().push_str("-state");
        assert_eq!(conn.attachment(), "session-state");
        assert_eq!(conn.into_attachment(), "session-state");
    }
}
