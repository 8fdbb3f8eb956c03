//! Reactor event loop and handler dispatch.
//!
//! One thread polls the selector; handler code always runs on the worker
//! pool. Dispatch is at-most-once by construction: the connection is removed
//! from the registration table before the handler job is submitted, and only
//! an explicit [`ReactorHandle::register`] puts it back.

use crate::error::Error;
use crate::reactor::connection::{Connection, SocketKind};
use crate::reactor::multiplexer::{Multiplexer, ReadyEvent, WAKER_TOKEN};
use crate::reactor::workers::WorkerPool;
use mio::{Token, Waker};
use parking_lot::Mutex;
use std::net::SocketAddr;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

const POLL_TIMEOUT: Duration = Duration::from_millis(100);
const SHUTDOWN_DRAIN: Duration = Duration::from_secs(5);

/// Application callbacks invoked by the reactor.
///
/// Each readiness callback receives the connection by value. The reactor has
/// already deregistered it; the handler decides whether to register it again,
/// hand it off, or drop it (which closes the socket).
///
/// Callbacks run on worker threads, never on the polling thread, and may
/// block.
pub trait Handler<A>: Send + Sync + 'static {
    /// Produces the attachment for a freshly accepted peer.
    ///
    /// Runs on a worker thread before [`Handler::on_channel_accepted`]; the
    /// reactor wraps the accepted stream and this attachment into the
    /// connection it hands over.
    fn accept_attachment(&self, peer: &SocketAddr) -> A;

    /// A listener produced a new inbound connection.
    ///
    /// The connection carries a fresh token and the attachment from
    /// [`Handler::accept_attachment`], but is not yet registered; register it
    /// to start receiving events.
    fn on_channel_accepted(&self, conn: Connection<A>, reactor: &ReactorHandle<A>);

    /// An outbound connect completed.
    fn on_channel_connected(&self, conn: Connection<A>, reactor: &ReactorHandle<A>);

    /// The connection became readable (or reached EOF).
    fn on_read_channel(&self, conn: Connection<A>, reactor: &ReactorHandle<A>);

    /// The connection became writable.
    fn on_write_channel(&self, conn: Connection<A>, reactor: &ReactorHandle<A>);

    /// A dispatch or registration fault. The attachment is present when the
    /// connection could be recovered, absent when it was lost with a panic.
    fn on_exception(&self, token: Token, attachment: Option<A>, error: Error);
}

struct HandleInner<A> {
    next_token: AtomicUsize,
    pending: Mutex<Vec<Connection<A>>>,
    waker: Waker,
    shutdown: AtomicBool,
}

/// Cloneable handle for talking to a running reactor from any thread.
pub struct ReactorHandle<A> {
    inner: Arc<HandleInner<A>>,
}

impl<A> Clone for ReactorHandle<A> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<A> ReactorHandle<A> {
    /// Allocates a fresh, never-reused readiness token.
    pub fn next_token(&self) -> Token {
        let raw = self.inner.next_token.fetch_add(1, Ordering::Relaxed);
        debug_assert_ne!(Token(raw), WAKER_TOKEN);
        Token(raw)
    }

    /// Queues a connection for registration and wakes the polling thread.
    ///
    /// The actual selector registration happens on the polling thread at the
    /// top of its next tick.
    pub fn register(&self, conn: Connection<A>) -> Result<(), Error> {
        if self.is_shutdown() {
            return Err(Error::queue_closed());
        }
        self.inner.pending.lock().push(conn);
        self.inner.waker.wake()?;
        Ok(())
    }

    /// Signals the reactor to stop after its current tick.
    pub fn shutdown(&self) {
        self.inner.shutdown.store(true, Ordering::Release);
        let _ = self.inner.waker.wake();
    }

    /// True once shutdown has been signaled.
    #[must_use]
    pub fn is_shutdown(&self) -> bool {
        self.inner.shutdown.load(Ordering::Acquire)
    }
}

/// The reactor: selector loop, dispatch, and worker supervision in one value.
pub struct ReactorEngine<A, H> {
    mux: Multiplexer<A>,
    handle: ReactorHandle<A>,
    handler: Arc<H>,
    workers: WorkerPool,
}

impl<A, H> ReactorEngine<A, H>
where
    A: Send + 'static,
    H: Handler<A>,
{
    /// Creates a reactor dispatching to `handler` on a worker pool of the
    /// given bounds.
    pub fn new(handler: Arc<H>, min_workers: usize, max_workers: usize) -> Result<Self, Error> {
        let mux = Multiplexer::new()?;
        let waker = mux.waker()?;
        let handle = ReactorHandle {
            inner: Arc::new(HandleInner {
                next_token: AtomicUsize::new(0),
                pending: Mutex::new(Vec::new()),
                waker,
                shutdown: AtomicBool::new(false),
            }),
        };
        Ok(Self {
            mux,
            handle,
            handler,
            workers: WorkerPool::new("reactor-worker", min_workers, max_workers),
        })
    }

    /// Returns a handle for registration and shutdown from other threads.
    #[must_use]
    pub fn handle(&self) -> ReactorHandle<A> {
        self.handle.clone()
    }

    /// Runs the polling loop until [`ReactorHandle::shutdown`] is called.
    ///
    /// On return all registered sockets have been closed and in-flight
    /// handler jobs drained (bounded).
    pub fn run(mut self) -> Result<(), Error> {
        let mut ready = Vec::new();
        while !self.handle.is_shutdown() {
            self.flush_pending();
            ready.clear();
            self.mux.poll(POLL_TIMEOUT, &mut ready)?;
            for event in ready.drain(..) {
                self.dispatch(event);
            }
        }

        tracing::debug!("reactor shutting down");
        if !self.workers.shutdown_and_wait(SHUTDOWN_DRAIN) {
            tracing::warn!("worker pool did not drain within shutdown timeout");
        }
        for mut conn in self.mux.drain() {
            conn.shutdown();
        }
        Ok(())
    }

    /// Registers connections queued by handles since the last tick.
    fn flush_pending(&mut self) {
        let pending: Vec<Connection<A>> = std::mem::take(&mut *self.handle.inner.pending.lock());
        for conn in pending {
            let token = conn.token();
            if let Err((conn, err)) = self.mux.insert(conn) {
                let handler = Arc::clone(&self.handler);
                let attachment = conn.into_attachment();
                self.workers.execute(move || {
                    handler.on_exception(token, Some(attachment), Error::from(err));
                });
            }
        }
    }

    fn dispatch(&mut self, event: ReadyEvent) {
        if event.token == WAKER_TOKEN {
            return;
        }
        let is_listener = match self.mux.get_mut(event.token) {
            Some(conn) => conn.is_listener(),
            None => return, // already taken this tick
        };
        if is_listener {
            self.drain_accepts(event.token);
        } else {
            self.dispatch_stream(event);
        }
    }

    /// Accepts until exhaustion. The listener stays registered; the selector
    /// is edge-triggered, so the drain must reach would-block.
    fn drain_accepts(&mut self, token: Token) {
        loop {
            let Some(conn) = self.mux.get_mut(token) else {
                return;
            };
            match conn.accept() {
                Ok((stream, peer)) => {
                    let handler = Arc::clone(&self.handler);
                    let handle = self.handle.clone();
                    self.workers.execute(move || {
                        let result = catch_unwind(AssertUnwindSafe(|| {
                            let attachment = handler.accept_attachment(&peer);
                            let conn = Connection::new(
                                handle.next_token(),
                                SocketKind::Stream(stream),
                                attachment,
                            );
                            handler.on_channel_accepted(conn, &handle);
                        }));
                        if result.is_err() {
                            handler.on_exception(
                                token,
                                None,
                                Error::dispatch("accept handler panicked"),
                            );
                        }
                    });
                }
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => return,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {}
                Err(e) => {
                    // Listener fault: unregister it and report with its
                    // attachment so the application can rebind.
                    if let Some(conn) = self.mux.take(token) {
                        let handler = Arc::clone(&self.handler);
                        let attachment = conn.into_attachment();
                        self.workers.execute(move || {
                            handler.on_exception(token, Some(attachment), Error::from(e));
                        });
                    }
                    return;
                }
            }
        }
    }

    fn dispatch_stream(&mut self, event: ReadyEvent) {
        let Some(mut conn) = self.mux.take(event.token) else {
            return;
        };
        let handler = Arc::clone(&self.handler);
        let handle = self.handle.clone();
        let token = event.token;

        self.workers.execute(move || {
            let result = catch_unwind(AssertUnwindSafe(|| {
                if conn.is_connecting() && event.writable {
                    conn.connect_finished();
                    handler.on_channel_connected(conn, &handle);
                } else if event.readable {
                    handler.on_read_channel(conn, &handle);
                } else {
                    handler.on_write_channel(conn, &handle);
                }
            }));
            if result.is_err() {
                handler.on_exception(token, None, Error::dispatch("channel handler panicked"));
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactor::connection::SocketKind;
    use mio::net::TcpListener;
    use std::io::{Read, Write};
    use std::sync::atomic::AtomicUsize;
    use std::thread;

    /// Counts callbacks; registers accepted streams for read exactly once.
    struct CountingHandler {
        accepted: AtomicUsize,
        reads: AtomicUsize,
        exceptions: AtomicUsize,
    }

    impl CountingHandler {
        fn new() -> Self {
            Self {
                accepted: AtomicUsize::new(0),
                reads: AtomicUsize::new(0),
                exceptions: AtomicUsize::new(0),
            }
        }
    }

    impl Handler<()> for CountingHandler {
        fn accept_attachment(&self, _peer: &SocketAddr) {}

        fn on_channel_accepted(&self, mut conn: Connection<()>, reactor: &ReactorHandle<()>) {
            self.accepted.fetch_add(1, Ordering::SeqCst);
            conn.set_interest(mio::Interest::READABLE);
            reactor.register(conn).unwrap();
        }

        fn on_channel_connected(&self, _conn: Connection<()>, _reactor: &ReactorHandle<()>) {}

        fn on_read_channel(&self, mut conn: Connection<()>, _reactor: &ReactorHandle<()>) {
            self.reads.fetch_add(1, Ordering::SeqCst);
            let mut buf = [0u8; 256];
            let _ = conn.stream_mut().unwrap().read(&mut buf);
            // Deliberately not re-registered: the connection is dropped and
            // no further read events may arrive for it.
        }

        fn on_write_channel(&self, _conn: Connection<()>, _reactor: &ReactorHandle<()>) {}

        fn on_exception(&self, _token: Token, _attachment: Option<()>, _error: Error) {
            self.exceptions.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn wait_until(deadline_ms: u64, mut done: impl FnMut() -> bool) -> bool {
        for _ in 0..(deadline_ms / 10) {
            if done() {
                return true;
            }
            thread::sleep(Duration::from_millis(10));
        }
        done()
    }

    #[test]
    fn accepted_connection_is_dispatched_for_read_exactly_once() {
        crate::test_utils::init_test_logging();
        let handler = Arc::new(CountingHandler::new());
        let engine = ReactorEngine::new(Arc::clone(&handler), 1, 4).unwrap();
        let handle = engine.handle();

        let listener = TcpListener::bind("127.0.0.1:0".parse().unwrap()).unwrap();
        let addr = listener.local_addr().unwrap();
        handle
            .register(Connection::new(
                handle.next_token(),
                SocketKind::Listener(listener),
                (),
            ))
            .unwrap();

        let runner = thread::spawn(move || engine.run());

        let mut client = std::net::TcpStream::connect(addr).unwrap();
        client.write_all(b"ping").unwrap();

        assert!(wait_until(2000, || handler.reads.load(Ordering::SeqCst) == 1));
        assert_eq!(handler.accepted.load(Ordering::SeqCst), 1);

        // The handler dropped the connection without re-registering; further
        // writes fail or vanish, and no second read dispatch happens.
        let _ = client.write_all(b"more");
        thread::sleep(Duration::from_millis(300));
        assert_eq!(handler.reads.load(Ordering::SeqCst), 1);
        assert_eq!(handler.exceptions.load(Ordering::SeqCst), 0);

        handle.shutdown();
        runner.join().unwrap().unwrap();
    }

    #[test]
    fn multiple_clients_each_dispatch_once() {
        crate::test_utils::init_test_logging();
        let handler = Arc::new(CountingHandler::new());
        let engine = ReactorEngine::new(Arc::clone(&handler), 1, 4).unwrap();
        let handle = engine.handle();

        let listener = TcpListener::bind("127.0.0.1:0".parse().unwrap()).unwrap();
        let addr = listener.local_addr().unwrap();
        handle
            .register(Connection::new(
                handle.next_token(),
                SocketKind::Listener(listener),
                (),
            ))
            .unwrap();
        let runner = thread::spawn(move || engine.run());

        let mut clients = Vec::new();
        for _ in 0..5 {
            let mut client = std::net::TcpStream::connect(addr).unwrap();
            client.write_all(b"hello").unwrap();
            clients.push(client);
        }

        assert!(wait_until(3000, || handler.reads.load(Ordering::SeqCst) == 5));
        assert_eq!(handler.accepted.load(Ordering::SeqCst), 5);

        handle.shutdown();
        runner.join().unwrap().unwrap();
    }

    /// Panicking handler converts to an exception report, and the reactor
    /// keeps serving other connections.
    struct PanickingHandler {
        exceptions: AtomicUsize,
    }

    impl Handler<()> for PanickingHandler {
        fn accept_attachment(&self, _peer: &SocketAddr) {}

        fn on_channel_accepted(&self, _conn: Connection<()>, _reactor: &ReactorHandle<()>) {
            panic!("boom");
        }
        fn on_channel_connected(&self, _conn: Connection<()>, _reactor: &ReactorHandle<()>) {}
        fn on_read_channel(&self, _conn: Connection<()>, _reactor: &ReactorHandle<()>) {}
        fn on_write_channel(&self, _conn: Connection<()>, _reactor: &ReactorHandle<()>) {}
        fn on_exception(&self, _token: Token, _attachment: Option<()>, error: Error) {
            assert_eq!(error.kind(), crate::ErrorKind::Dispatch);
            self.exceptions.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn handler_panic_surfaces_as_exception() {
        crate::test_utils::init_test_logging();
        let handler = Arc::new(PanickingHandler {
            exceptions: AtomicUsize::new(0),
        });
        let engine = ReactorEngine::new(Arc::clone(&handler), 1, 2).unwrap();
        let handle = engine.handle();

        let listener = TcpListener::bind("127.0.0.1:0".parse().unwrap()).unwrap();
        let addr = listener.local_addr().unwrap();
        handle
            .register(Connection::new(
                handle.next_token(),
                SocketKind::Listener(listener),
                (),
            ))
            .unwrap();
        let runner = thread::spawn(move || engine.run());

        let _client = std::net::TcpStream::connect(addr).unwrap();
        assert!(wait_until(2000, || {
            handler.exceptions.load(Ordering::SeqCst) >= 1
        }));

        handle.shutdown();
        runner.join().unwrap().unwrap();
    }

    #[test]
    fn register_after_shutdown_is_rejected() {
        let handler = Arc::new(CountingHandler::new());
        let engine = ReactorEngine::new(handler, 1, 2).unwrap();
        let handle = engine.handle();
        handle.shutdown();

        let listener = TcpListener::bind("127.0.0.1:0".parse().unwrap()).unwrap();
        let err = handle
            .register(Connection::new(
                Token(0),
                SocketKind::Listener(listener),
                (),
            ))
            .unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::QueueClosed);
    }
}
