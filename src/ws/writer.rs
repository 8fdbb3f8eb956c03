//! Serialized outbound frame writer.
//!
//! All writes to one socket funnel through a single dedicated thread, so
//! frames from any number of producer threads reach the wire whole and in
//! submission order. Producers talk to the thread over a bounded channel and
//! block when it fills.

use crate::codec::Encoder;
use crate::error::Error;
use crate::queue::chan::{self, Receiver, Sender};
use crate::ws::frame::{Frame, FrameCodec, Opcode};
use bytes::BytesMut;
use std::io::{self, Write};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Command accepted by the writer thread.
///
/// Shutdown is a distinct variant rather than a sentinel frame, so it can
/// never be confused with wire data.
#[derive(Debug)]
pub enum WriteCommand {
    /// Encode and write this frame.
    Frame(Frame),
    /// Stop the writer thread without writing anything.
    Shutdown,
}

/// Handle to a dedicated frame-writing thread.
///
/// Once a Close frame has been written, subsequent frames are logged and
/// discarded; RFC 6455 forbids data after Close.
pub struct FrameWriter {
    tx: Option<Sender<WriteCommand>>,
    handle: Option<JoinHandle<()>>,
}

impl FrameWriter {
    /// Default command channel capacity.
    pub const DEFAULT_CAPACITY: usize = 64;

    /// Spawns a writer thread encoding frames with `codec` into `sink`.
    pub fn spawn<W>(sink: W, codec: FrameCodec) -> io::Result<Self>
    where
        W: Write + Send + 'static,
    {
        Self::spawn_with_capacity(sink, codec, Self::DEFAULT_CAPACITY)
    }

    /// Spawns a writer thread with an explicit command channel capacity.
    pub fn spawn_with_capacity<W>(sink: W, codec: FrameCodec, capacity: usize) -> io::Result<Self>
    where
        W: Write + Send + 'static,
    {
        let (tx, rx) = chan::bounded(capacity);
        let handle = thread::Builder::new()
            .name("frame-writer".to_string())
            .spawn(move || write_loop(sink, codec, &rx))?;
        Ok(Self {
            tx: Some(tx),
            handle: Some(handle),
        })
    }

    /// Enqueues a frame for writing, blocking while the channel is full.
    pub fn send(&self, frame: Frame) -> Result<(), Error> {
        self.tx
            .as_ref()
            .ok_or_else(Error::queue_closed)?
            .send(WriteCommand::Frame(frame))
            .map_err(|_| Error::queue_closed())
    }

    /// Stops the writer thread after it drains already-queued frames, and
    /// waits for it to finish.
    pub fn close(mut self) {
        self.close_inner();
    }

    fn close_inner(&mut self) {
        if let Some(tx) = self.tx.take() {
            let _ = tx.send(WriteCommand::Shutdown);
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for FrameWriter {
    fn drop(&mut self) {
        self.close_inner();
    }
}

fn write_loop<W: Write>(mut sink: W, mut codec: FrameCodec, rx: &Receiver<WriteCommand>) {
    let mut buf = BytesMut::new();
    let mut close_sent = false;

    while let Ok(command) = rx.recv() {
        let frame = match command {
            WriteCommand::Frame(frame) => frame,
            WriteCommand::Shutdown => break,
        };
        if close_sent {
            tracing::warn!(opcode = ?frame.opcode, "discarding frame queued after close");
            continue;
        }
        let is_close = frame.opcode == Opcode::Close;

        buf.clear();
        if let Err(err) = codec.encode(frame, &mut buf) {
            tracing::error!(error = %err, "frame failed to encode; writer stopping");
            break;
        }
        if let Err(err) = write_all_retry(&mut sink, &buf) {
            tracing::error!(error = %err, "socket write failed; writer stopping");
            break;
        }
        if is_close {
            close_sent = true;
        }
    }
    let _ = sink.flush();
}

/// Writes the whole buffer, parking briefly on would-block.
fn write_all_retry<W: Write>(sink: &mut W, mut remaining: &[u8]) -> io::Result<()> {
    while !remaining.is_empty() {
        match sink.write(remaining) {
            Ok(0) => return Err(io::ErrorKind::WriteZero.into()),
            Ok(n) => remaining = &remaining[n..],
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                thread::sleep(Duration::from_millis(1));
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(())
}
