//! Secure channel decorator.
//!
//! Wraps a raw non-blocking byte channel and layers the TLS record protocol
//! on top, exposing the same read/write surface as the raw channel plus an
//! explicit handshake state machine. Callers drive the handshake with
//! [`SecureChannel::drive`] as readiness events arrive; plaintext is never
//! readable or writable before the handshake establishes.

use crate::error::Error;
use crate::tls::executor::TaskExecutor;
use rustls::{ClientConnection, ServerConnection};
use rustls_pki_types::ServerName;
use std::io::{self, Read, Write};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::{Duration, Instant};

/// Upper bound on one delegated processing task.
const TASK_TIMEOUT: Duration = Duration::from_secs(30);

/// Raw byte channel under a secure channel.
///
/// Reads and writes are non-blocking: both report `WouldBlock` instead of
/// waiting.
pub trait RawIo: Read + Write + Send {
    /// Closes the underlying transport in both directions.
    fn shutdown(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl RawIo for mio::net::TcpStream {
    fn shutdown(&mut self) -> io::Result<()> {
        mio::net::TcpStream::shutdown(self, std::net::Shutdown::Both)
    }
}

/// Client or server side of one TLS session.
pub enum TlsSession {
    /// Initiating side.
    Client(Box<ClientConnection>),
    /// Accepting side.
    Server(Box<ServerConnection>),
}

impl TlsSession {
    fn is_handshaking(&self) -> bool {
        match self {
            Self::Client(c) => c.is_handshaking(),
            Self::Server(s) => s.is_handshaking(),
        }
    }

    fn wants_read(&self) -> bool {
        match self {
            Self::Client(c) => c.wants_read(),
            Self::Server(s) => s.wants_read(),
        }
    }

    fn wants_write(&self) -> bool {
        match self {
            Self::Client(c) => c.wants_write(),
            Self::Server(s) => s.wants_write(),
        }
    }

    fn reader(&mut self) -> rustls::Reader<'_> {
        match self {
            Self::Client(c) => c.reader(),
            Self::Server(s) => s.reader(),
        }
    }

    fn writer(&mut self) -> rustls::Writer<'_> {
        match self {
            Self::Client(c) => c.writer(),
            Self::Server(s) => s.writer(),
        }
    }

    fn read_tls(&mut self, rd: &mut dyn Read) -> io::Result<usize> {
        match self {
            Self::Client(c) => c.read_tls(rd),
            Self::Server(s) => s.read_tls(rd),
        }
    }

    fn write_tls(&mut self, wr: &mut dyn Write) -> io::Result<usize> {
        match self {
            Self::Client(c) => c.write_tls(wr),
            Self::Server(s) => s.write_tls(wr),
        }
    }

    fn process_new_packets(&mut self) -> Result<rustls::IoState, rustls::Error> {
        match self {
            Self::Client(c) => c.process_new_packets(),
            Self::Server(s) => s.process_new_packets(),
        }
    }

    fn send_close_notify(&mut self) {
        match self {
            Self::Client(c) => c.send_close_notify(),
            Self::Server(s) => s.send_close_notify(),
        }
    }
}

/// What the channel needs next to make handshake progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeState {
    /// Produced records are waiting to be flushed to the raw channel.
    NeedWrap,
    /// More records from the peer are needed.
    NeedUnwrap,
    /// Buffered records are being processed on the task executor.
    NeedTask,
    /// Handshake complete; plaintext flows.
    Established,
    /// Handshake rejected or faulted; the channel is unusable.
    Failed,
    /// Channel closed.
    Closed,
}

/// Terminal result of the handshake.
#[derive(Debug)]
pub enum HandshakeOutcome {
    /// Negotiation completed.
    Success,
    /// The peer or the protocol rejected the session.
    Failed(String),
    /// The raw transport faulted mid-handshake.
    Error(io::Error),
}

/// TLS layered over a raw non-blocking channel.
pub struct SecureChannel<T: RawIo> {
    io: T,
    session: Option<TlsSession>,
    state: HandshakeState,
    outcome: Option<HandshakeOutcome>,
    executor: Option<Arc<TaskExecutor>>,
}

impl<T: RawIo> SecureChannel<T> {
    /// Wraps the accepting side of a raw channel.
    pub fn server(io: T, config: Arc<rustls::ServerConfig>) -> Result<Self, Error> {
        let conn = ServerConnection::new(config)
            .map_err(|e| Error::handshake("server session rejected config").with_source(e))?;
        Ok(Self::with_session(io, TlsSession::Server(Box::new(conn))))
    }

    /// Wraps the initiating side of a raw channel.
    pub fn client(
        io: T,
        config: Arc<rustls::ClientConfig>,
        server_name: &str,
    ) -> Result<Self, Error> {
        let name = ServerName::try_from(server_name.to_string())
            .map_err(|e| Error::handshake("invalid server name").with_source(e))?;
        let conn = ClientConnection::new(config, name)
            .map_err(|e| Error::handshake("client session rejected config").with_source(e))?;
        Ok(Self::with_session(io, TlsSession::Client(Box::new(conn))))
    }

    fn with_session(io: T, session: TlsSession) -> Self {
        Self {
            io,
            session: Some(session),
            state: HandshakeState::NeedUnwrap,
            outcome: None,
            executor: None,
        }
    }

    /// Delegates record processing to `executor` instead of running it on
    /// the driving thread.
    #[must_use]
    pub fn with_executor(mut self, executor: Arc<TaskExecutor>) -> Self {
        self.executor = Some(executor);
        self
    }

    /// Current handshake state.
    #[must_use]
    pub fn state(&self) -> HandshakeState {
        self.state
    }

    /// Terminal handshake outcome, once decided.
    #[must_use]
    pub fn outcome(&self) -> Option<&HandshakeOutcome> {
        self.outcome.as_ref()
    }

    /// Borrows the raw channel.
    pub fn get_ref(&self) -> &T {
        &self.io
    }

    /// Mutably borrows the raw channel.
    pub fn get_mut(&mut self) -> &mut T {
        &mut self.io
    }

    fn fail(&mut self, outcome: HandshakeOutcome, error: Error) -> Error {
        self.state = HandshakeState::Failed;
        self.outcome = Some(outcome);
        let _ = self.io.shutdown();
        error
    }

    fn session_mut(&mut self) -> Result<&mut TlsSession, Error> {
        self.session
            .as_mut()
            .ok_or_else(|| Error::internal("tls session detached"))
    }

    /// Processes buffered records, on the executor when one is attached.
    fn process_packets(&mut self) -> Result<(), rustls::Error> {
        let Some(executor) = self.executor.clone() else {
            if let Some(session) = self.session.as_mut() {
                session.process_new_packets()?;
            }
            return Ok(());
        };
        let Some(mut session) = self.session.take() else {
            return Ok(());
        };
        self.state = HandshakeState::NeedTask;
        let (tx, rx) = mpsc::channel();
        executor.execute(move || {
            let result = session.process_new_packets().map(|_| ());
            let _ = tx.send((session, result));
        });
        match rx.recv_timeout(TASK_TIMEOUT) {
            Ok((session, result)) => {
                self.session = Some(session);
                result
            }
            Err(_) => Err(rustls::Error::General("delegated task timed out".into())),
        }
    }

    /// Drives the handshake as far as current readiness allows.
    ///
    /// Returns the state the channel is parked in: `NeedUnwrap` or `NeedWrap`
    /// when blocked on the raw channel, `Established` when done. A rejection
    /// or transport fault moves the channel to `Failed`, records the outcome,
    /// and returns the error.
    pub fn drive(&mut self) -> Result<HandshakeState, Error> {
        match self.state {
            HandshakeState::Established | HandshakeState::Closed => return Ok(self.state),
            HandshakeState::Failed => {
                return Err(Error::handshake("handshake already failed"));
            }
            _ => {}
        }

        loop {
            if let Err(e) = self.process_packets() {
                let msg = e.to_string();
                // Flush any alert rustls queued for the peer.
                let _ = self.flush_records();
                return Err(self.fail(
                    HandshakeOutcome::Failed(msg.clone()),
                    Error::handshake(msg).with_source(e),
                ));
            }

            let mut write_would_block = false;
            while self.session_mut()?.wants_write() {
                let Self { io, session, .. } = self;
                let Some(session) = session.as_mut() else { break };
                match session.write_tls(io) {
                    Ok(0) => {
                        return Err(self.fail(
                            HandshakeOutcome::Failed("peer closed during handshake".into()),
                            Error::handshake("peer closed during handshake"),
                        ));
                    }
                    Ok(_) => {}
                    Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                        write_would_block = true;
                        break;
                    }
                    Err(e) => {
                        let error = Error::handshake("transport fault during handshake");
                        return Err(self.fail(HandshakeOutcome::Error(e), error));
                    }
                }
            }

            if !self.session_mut()?.is_handshaking() {
                self.state = HandshakeState::Established;
                self.outcome = Some(HandshakeOutcome::Success);
                tracing::debug!("tls handshake established");
                return Ok(self.state);
            }

            if self.session_mut()?.wants_read() {
                let Self { io, session, .. } = self;
                let Some(session) = session.as_mut() else {
                    return Err(Error::internal("tls session detached"));
                };
                match session.read_tls(io) {
                    Ok(0) => {
                        return Err(self.fail(
                            HandshakeOutcome::Failed("peer closed during handshake".into()),
                            Error::handshake("peer closed during handshake"),
                        ));
                    }
                    Ok(_) => {}
                    Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                        self.state = HandshakeState::NeedUnwrap;
                        return Ok(self.state);
                    }
                    Err(e) => {
                        let error = Error::handshake("transport fault during handshake");
                        return Err(self.fail(HandshakeOutcome::Error(e), error));
                    }
                }
            } else if write_would_block {
                self.state = HandshakeState::NeedWrap;
                return Ok(self.state);
            }
        }
    }

    /// Drives the handshake as far as readiness allows; would-block if it
    /// has not yet established.
    fn ensure_established(&mut self) -> io::Result<()> {
        match self.state {
            HandshakeState::Established => Ok(()),
            HandshakeState::NeedWrap | HandshakeState::NeedUnwrap | HandshakeState::NeedTask => {
                match self.drive() {
                    Ok(HandshakeState::Established) => Ok(()),
                    Ok(_) => Err(io::ErrorKind::WouldBlock.into()),
                    Err(e) => Err(io::Error::other(e)),
                }
            }
            HandshakeState::Failed => Err(io::Error::other("handshake failed")),
            HandshakeState::Closed => Err(io::ErrorKind::NotConnected.into()),
        }
    }

    /// Flushes pending TLS records to the raw channel; stops on would-block.
    fn flush_records(&mut self) -> io::Result<()> {
        loop {
            let Self { io, session, .. } = self;
            let Some(session) = session.as_mut() else {
                return Ok(());
            };
            if !session.wants_write() {
                return Ok(());
            }
            match session.write_tls(io) {
                Ok(0) => return Err(io::ErrorKind::WriteZero.into()),
                Ok(_) => {}
                Err(e) => return Err(e),
            }
        }
    }

    /// Reads decrypted plaintext.
    ///
    /// Drives the handshake first; while it is still in flight this returns
    /// `WouldBlock`, so plaintext is never surfaced from an unestablished
    /// channel. `Ok(0)` means the peer closed the session cleanly.
    pub fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.ensure_established()?;
        // Pump ciphertext in before asking for plaintext.
        loop {
            let Self { io, session, .. } = self;
            let Some(session) = session.as_mut() else {
                return Err(io::Error::other("tls session detached"));
            };
            if !session.wants_read() {
                break;
            }
            match session.read_tls(io) {
                Ok(0) => break,
                Ok(_) => {}
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) => return Err(e),
            }
        }
        self.process_packets().map_err(io::Error::other)?;
        let Some(session) = self.session.as_mut() else {
            return Err(io::Error::other("tls session detached"));
        };
        session.reader().read(buf)
    }

    /// Writes plaintext, encrypting and flushing as far as the raw channel
    /// accepts.
    ///
    /// Drives the handshake first; while it is still in flight this returns
    /// `WouldBlock`.
    pub fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.ensure_established()?;
        let Some(session) = self.session.as_mut() else {
            return Err(io::Error::other("tls session detached"));
        };
        let written = session.writer().write(buf)?;
        match self.flush_records() {
            Ok(()) => {}
            // Records stay buffered in the session; flushed on a later call.
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {}
            Err(e) => return Err(e),
        }
        Ok(written)
    }

    /// Closes the channel gracefully, bounded by `timeout`.
    ///
    /// Sends close_notify and flushes it until done or the deadline passes,
    /// then shuts the raw channel down either way.
    pub fn close(&mut self, timeout: Duration) {
        if matches!(self.state, HandshakeState::Closed) {
            return;
        }
        if self.state != HandshakeState::Failed {
            if let Some(session) = self.session.as_mut() {
                session.send_close_notify();
            }
            let deadline = Instant::now() + timeout;
            loop {
                match self.flush_records() {
                    Ok(()) => break,
                    Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                        if Instant::now() >= deadline {
                            tracing::debug!("close_notify flush timed out");
                            break;
                        }
                        thread::sleep(Duration::from_millis(1));
                    }
                    Err(err) => {
                        tracing::debug!(error = %err, "close_notify flush failed");
                        break;
                    }
                }
            }
        }
        let _ = self.io.shutdown();
        self.state = HandshakeState::Closed;
    }
}
