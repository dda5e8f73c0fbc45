//! Fixed-capacity circular buffer with blocking produce/consume.
//!
//! The buffer is synchronized by a pair of counting semaphores: `filled`
//! counts items available to consume, `empty` counts free slots available to
//! produce into, and `filled + empty == capacity` at rest. The semaphore pair
//! is the sole cross-side synchronization; producers serialize among
//! themselves on the write index, consumers on the read index, and neither
//! side ever observes the other's index.
//!
//! # Backpressure and ordering
//!
//! `produce` on a full buffer blocks until a consumer frees a slot, and
//! `consume` on an empty buffer blocks until a producer delivers an item.
//! Items come out in exactly the order they went in: index advancement is
//! serialized per side and a `filled` permit is published only after its slot
//! is written, so the permit count always matches a written prefix of slots.
//!
//! # Shutdown
//!
//! `close` is idempotent and wakes every blocked producer and consumer
//! through a broadcast channel. Producers fail with [`ProduceError::Closed`],
//! getting their item back; consumers drain the items already buffered before
//! seeing [`ConsumeError::Closed`]. The closed flag is set under the
//! write-index guard, which linearizes close against produce: every item a
//! produce call acknowledged is covered by a `filled` permit before any
//! consumer can observe the buffer as closed, so an accepted item is always
//! consumable. Without an explicit close, `consume` on a permanently empty
//! buffer blocks forever, which is the intended default.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex as StdMutex;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::{broadcast, Semaphore};
use tracing::trace;

use crate::error::ConfigError;

/// Errors returned by produce operations.
///
/// Every variant hands the rejected item back to the caller, so a failed
/// produce never drops data.
#[derive(Error)]
pub enum ProduceError<T> {
    /// The buffer was closed; the item was not enqueued.
    #[error("buffer is closed")]
    Closed(T),

    /// The buffer stayed full for the whole timeout window.
    #[error("timed out waiting for a free slot")]
    TimedOut(T),

    /// The buffer is full (non-blocking variant only).
    #[error("buffer is full")]
    Full(T),
}

impl<T> ProduceError<T> {
    /// Recovers the item that could not be enqueued.
    pub fn into_inner(self) -> T {
        match self {
            Self::Closed(item) | Self::TimedOut(item) | Self::Full(item) => item,
        }
    }

    /// Returns whether the buffer was closed.
    pub fn is_closed(&self) -> bool {
        matches!(self, Self::Closed(_))
    }
}

impl<T> fmt::Debug for ProduceError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Closed(_) => f.write_str("Closed(..)"),
            Self::TimedOut(_) => f.write_str("TimedOut(..)"),
            Self::Full(_) => f.write_str("Full(..)"),
        }
    }
}

/// Errors returned by consume operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConsumeError {
    /// The buffer was closed and every remaining item has been drained.
    #[error("buffer is closed and drained")]
    Closed,

    /// The buffer stayed empty for the whole timeout window.
    #[error("timed out waiting for an item")]
    TimedOut,

    /// The buffer is empty (non-blocking variant only).
    #[error("buffer is empty")]
    Empty,
}

/// A bounded FIFO buffer of opaque items.
pub struct BoundedBuffer<T> {
    /// Fixed-length slot array. A slot mutex is never contended: the
    /// semaphore discipline keeps producers and consumers on disjoint slots,
    /// so the mutex exists only to satisfy shared-access rules.
    slots: Box<[StdMutex<Option<T>>]>,
    /// Next slot to write; advanced modulo capacity by producers only. Held
    /// only for index arithmetic and the slot store, never across an await.
    /// Also guards the closed flag on the produce path: `close` sets the
    /// flag under this mutex, so no producer is ever mid-commit when the
    /// flag becomes visible.
    write_pos: StdMutex<usize>,
    /// Next slot to read; advanced modulo capacity by consumers only.
    read_pos: StdMutex<usize>,
    /// Counts items available to consume. Starts at 0.
    filled: Semaphore,
    /// Counts free slots available to produce into. Starts at capacity.
    empty: Semaphore,
    closed: AtomicBool,
    /// Wakes blocked producers and consumers on close. The semaphores are
    /// never closed themselves, so remaining items stay drainable.
    shutdown_tx: broadcast::Sender<()>,
}

impl<T: Send> BoundedBuffer<T> {
    /// Creates a buffer with the given fixed capacity.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidCapacity`] if `capacity` is zero.
    pub fn new(capacity: usize) -> Result<Self, ConfigError> {
        if capacity == 0 {
            return Err(ConfigError::InvalidCapacity(capacity));
        }
        let (shutdown_tx, _) = broadcast::channel(1);
        Ok(Self {
            slots: (0..capacity).map(|_| StdMutex::new(None)).collect(),
            write_pos: StdMutex::new(0),
            read_pos: StdMutex::new(0),
            filled: Semaphore::new(0),
            empty: Semaphore::new(capacity),
            closed: AtomicBool::new(false),
            shutdown_tx,
        })
    }

    /// Returns the fixed capacity set at construction.
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Returns the number of items currently available to consume.
    ///
    /// The count is a snapshot; concurrent produce and consume calls may
    /// change it before the caller acts on it.
    pub fn len(&self) -> usize {
        self.filled.available_permits()
    }

    /// Returns whether no items are currently available.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns whether the buffer has been closed.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Closes the buffer, waking every blocked producer and consumer.
    ///
    /// Items already buffered remain consumable; new produce calls fail with
    /// [`ProduceError::Closed`]. Returns `true` if this call performed the
    /// close, `false` if the buffer was already closed.
    pub fn close(&self) -> bool {
        // Taking the write-index guard here excludes producers mid-commit:
        // once the flag is visible, every accepted item already has its
        // `filled` permit published, so the drain path cannot miss it.
        let already_closed = {
            let _pos = self.write_pos.lock().expect("write index mutex poisoned");
            self.closed.swap(true, Ordering::SeqCst)
        };
        if already_closed {
            return false;
        }
        trace!(capacity = self.capacity(), "buffer closed");
        // No receivers just means nobody was blocked.
        let _ = self.shutdown_tx.send(());
        true
    }

    /// Enqueues an item, blocking while the buffer is full.
    ///
    /// # Errors
    ///
    /// Returns [`ProduceError::Closed`] with the item if the buffer is or
    /// becomes closed before a slot frees up. An `Ok` return means the item
    /// is consumable: a producer that was handed a slot as the buffer closed
    /// rejects the item back to the caller instead of stranding it.
    pub async fn produce(&self, item: T) -> Result<(), ProduceError<T>> {
        // Subscribe before checking the flag: a close that lands after the
        // check is then guaranteed to reach this receiver.
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        if self.is_closed() {
            return Err(ProduceError::Closed(item));
        }
        let permit = tokio::select! {
            permit = self.empty.acquire() => {
                permit.expect("empty semaphore is never closed")
            }
            _ = shutdown_rx.recv() => return Err(ProduceError::Closed(item)),
        };
        match self.commit_write(item) {
            Ok(()) => {
                permit.forget();
                Ok(())
            }
            // Closed while we held the permit; dropping it returns the slot.
            Err(item) => Err(ProduceError::Closed(item)),
        }
    }

    /// Enqueues an item, giving up after `timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`ProduceError::TimedOut`] with the item if no slot freed up
    /// in time, or [`ProduceError::Closed`] if the buffer closed first.
    pub async fn produce_timeout(&self, item: T, timeout: Duration) -> Result<(), ProduceError<T>> {
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        if self.is_closed() {
            return Err(ProduceError::Closed(item));
        }
        let permit = tokio::select! {
            acquired = tokio::time::timeout(timeout, self.empty.acquire()) => {
                match acquired {
                    Ok(permit) => permit.expect("empty semaphore is never closed"),
                    Err(_) => return Err(ProduceError::TimedOut(item)),
                }
            }
            _ = shutdown_rx.recv() => return Err(ProduceError::Closed(item)),
        };
        match self.commit_write(item) {
            Ok(()) => {
                permit.forget();
                Ok(())
            }
            Err(item) => Err(ProduceError::Closed(item)),
        }
    }

    /// Enqueues an item only if a slot is free right now.
    ///
    /// # Errors
    ///
    /// Returns [`ProduceError::Full`] with the item if the buffer is full,
    /// or [`ProduceError::Closed`] if it has been closed.
    pub async fn try_produce(&self, item: T) -> Result<(), ProduceError<T>> {
        if self.is_closed() {
            return Err(ProduceError::Closed(item));
        }
        match self.empty.try_acquire() {
            Ok(permit) => match self.commit_write(item) {
                Ok(()) => {
                    permit.forget();
                    Ok(())
                }
                Err(item) => Err(ProduceError::Closed(item)),
            },
            Err(_) if self.is_closed() => Err(ProduceError::Closed(item)),
            Err(_) => Err(ProduceError::Full(item)),
        }
    }

    /// Dequeues the next item, blocking while the buffer is empty.
    ///
    /// # Errors
    ///
    /// Returns [`ConsumeError::Closed`] once the buffer is closed and every
    /// remaining item has been drained.
    pub async fn consume(&self) -> Result<T, ConsumeError> {
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        loop {
            if self.is_closed() {
                return self.drain_one().await;
            }
            tokio::select! {
                permit = self.filled.acquire() => {
                    let permit = permit.expect("filled semaphore is never closed");
                    let item = self.commit_read();
                    permit.forget();
                    return Ok(item);
                }
                // Closed while waiting: fall back to the drain path, which
                // picks up any item that was still in flight.
                _ = shutdown_rx.recv() => continue,
            }
        }
    }

    /// Dequeues the next item, giving up after `timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`ConsumeError::TimedOut`] if no item arrived in time.
    pub async fn consume_timeout(&self, timeout: Duration) -> Result<T, ConsumeError> {
        match tokio::time::timeout(timeout, self.consume()).await {
            Ok(result) => result,
            Err(_) => Err(ConsumeError::TimedOut),
        }
    }

    /// Dequeues an item only if one is available right now.
    ///
    /// # Errors
    ///
    /// Returns [`ConsumeError::Empty`] if nothing is buffered, or
    /// [`ConsumeError::Closed`] if the buffer is closed and drained.
    pub async fn try_consume(&self) -> Result<T, ConsumeError> {
        match self.filled.try_acquire() {
            Ok(permit) => {
                let item = self.commit_read();
                permit.forget();
                Ok(item)
            }
            Err(_) if self.is_closed() => Err(ConsumeError::Closed),
            Err(_) => Err(ConsumeError::Empty),
        }
    }

    /// Drain path after close: take a leftover item if there is one.
    async fn drain_one(&self) -> Result<T, ConsumeError> {
        match self.filled.try_acquire() {
            Ok(permit) => {
                let item = self.commit_read();
                permit.forget();
                Ok(item)
            }
            Err(_) => Err(ConsumeError::Closed),
        }
    }

    /// Writes an item at the current write index and publishes a `filled`
    /// permit. The permit is added while the index guard is still held, so
    /// the permit count never runs ahead of the written slot prefix. The
    /// closed flag is re-checked under the same guard; past that check the
    /// commit and the flag set cannot interleave, so a closed buffer hands
    /// the item back rather than accepting a write no consumer will see.
    fn commit_write(&self, item: T) -> Result<(), T> {
        let mut pos = self.write_pos.lock().expect("write index mutex poisoned");
        if self.closed.load(Ordering::SeqCst) {
            return Err(item);
        }
        let slot = *pos;
        *pos = (*pos + 1) % self.capacity();
        *self.slots[slot].lock().expect("slot mutex poisoned") = Some(item);
        self.filled.add_permits(1);
        Ok(())
    }

    /// Takes the item at the current read index and returns an `empty`
    /// permit, mirroring `commit_write`. No closed check here: draining a
    /// closed buffer is exactly what the shutdown contract wants.
    fn commit_read(&self) -> T {
        let mut pos = self.read_pos.lock().expect("read index mutex poisoned");
        let slot = *pos;
        *pos = (*pos + 1) % self.capacity();
        let item = self.slots[slot]
            .lock()
            .expect("slot mutex poisoned")
            .take()
            .expect("filled permit always covers a written slot");
        self.empty.add_permits(1);
        item
    }
}
