//! Bounded blocking MPSC channel.
//!
//! The hand-off primitive under the operation queue and the frame writer:
//! FIFO, capacity-bounded, with blocking back-pressure on the sending side.
//! A full channel makes `send` wait for space rather than drop or reallocate.

use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::sync::Arc;

/// Error returned when sending into a channel whose receiver is gone.
///
/// Carries the rejected value back to the caller.
#[derive(Debug)]
pub struct SendError<T>(pub T);

impl<T> std::fmt::Display for SendError<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("receiver disconnected")
    }
}

impl<T: std::fmt::Debug> std::error::Error for SendError<T> {}

/// Error returned when receiving from a channel with no remaining senders.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecvError;

impl std::fmt::Display for RecvError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("all senders disconnected")
    }
}

impl std::error::Error for RecvError {}

/// Error returned by [`Receiver::try_recv`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TryRecvError {
    /// Channel currently empty; senders still connected.
    Empty,
    /// Channel empty and all senders disconnected.
    Disconnected,
}

struct Inner<T> {
    queue: Mutex<State<T>>,
    /// Signaled when an item is popped, unblocking a waiting sender.
    space_available: Condvar,
    /// Signaled when an item is pushed, unblocking a waiting receiver.
    item_available: Condvar,
    capacity: usize,
}

struct State<T> {
    items: VecDeque<T>,
    sender_count: usize,
    receiver_alive: bool,
}

/// Sending half of a bounded channel. Cloneable.
pub struct Sender<T> {
    inner: Arc<Inner<T>>,
}

/// Receiving half of a bounded channel.
pub struct Receiver<T> {
    inner: Arc<Inner<T>>,
}

/// Creates a bounded channel with the given capacity.
///
/// # Panics
///
/// Panics if `capacity` is zero.
#[must_use]
pub fn bounded<T>(capacity: usize) -> (Sender<T>, Receiver<T>) {
    assert!(capacity > 0, "channel capacity must be non-zero");
    let inner = Arc::new(Inner {
        queue: Mutex::new(State {
            items: VecDeque::with_capacity(capacity),
            sender_count: 1,
            receiver_alive: true,
        }),
        space_available: Condvar::new(),
        item_available: Condvar::new(),
        capacity,
    });
    (
        Sender {
            inner: Arc::clone(&inner),
        },
        Receiver { inner },
    )
}

impl<T> Sender<T> {
    /// Sends an item, blocking while the channel is at capacity.
    ///
    /// Returns the item if the receiver has been dropped.
    pub fn send(&self, item: T) -> Result<(), SendError<T>> {
        let mut state = self.inner.queue.lock();
        loop {
            if !state.receiver_alive {
                return Err(SendError(item));
            }
            if state.items.len() < self.inner.capacity {
                state.items.push_back(item);
                drop(state);
                self.inner.item_available.notify_one();
                return Ok(());
            }
            self.inner.space_available.wait(&mut state);
        }
    }

    /// Sends without blocking; returns the item if the channel is full or
    /// the receiver is gone.
    pub fn try_send(&self, item: T) -> Result<(), SendError<T>> {
        let mut state = self.inner.queue.lock();
        if !state.receiver_alive || state.items.len() >= self.inner.capacity {
            return Err(SendError(item));
        }
        state.items.push_back(item);
        drop(state);
        self.inner.item_available.notify_one();
        Ok(())
    }
}

impl<T> Clone for Sender<T> {
    fn clone(&self) -> Self {
        self.inner.queue.lock().sender_count += 1;
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> Drop for Sender<T> {
    fn drop(&mut self) {
        let mut state = self.inner.queue.lock();
        state.sender_count -= 1;
        if state.sender_count == 0 {
            drop(state);
            self.inner.item_available.notify_all();
        }
    }
}

impl<T> Receiver<T> {
    /// Receives the next item, blocking while the channel is empty.
    ///
    /// Drains remaining items even after every sender has disconnected, and
    /// only then reports [`RecvError`].
    pub fn recv(&self) -> Result<T, RecvError> {
        let mut state = self.inner.queue.lock();
        loop {
            if let Some(item) = state.items.pop_front() {
                drop(state);
                self.inner.space_available.notify_one();
                return Ok(item);
            }
            if state.sender_count == 0 {
                return Err(RecvError);
            }
            self.inner.item_available.wait(&mut state);
        }
    }

    /// Receives without blocking.
    pub fn try_recv(&self) -> Result<T, TryRecvError> {
        let mut state = self.inner.queue.lock();
        if let Some(item) = state.items.pop_front() {
            drop(state);
            self.inner.space_available.notify_one();
            return Ok(item);
        }
        if state.sender_count == 0 {
            Err(TryRecvError::Disconnected)
        } else {
            Err(TryRecvError::Empty)
        }
    }

    /// Number of items currently queued.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.queue.lock().items.len()
    }

    /// True if no items are currently queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T> Drop for Receiver<T> {
    fn drop(&mut self) {
        let mut state = self.inner.queue.lock();
        state.receiver_alive = false;
        state.items.clear();
        drop(state);
        self.inner.space_available.notify_all();
    }
}
