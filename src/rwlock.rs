//! Reader/writer lock with many concurrent readers or one exclusive writer.
//!
//! The lock is built from two primitives: a reader census guarded by a mutex,
//! and a single-permit semaphore representing exclusive access. The first
//! reader to arrive takes the exclusive permit on behalf of the whole reader
//! cohort; the last reader to leave returns it. A writer takes the permit
//! directly. Readers therefore never block each other, while a writer excludes
//! readers and other writers.
//!
//! # Fairness
//!
//! The basic (unfair) variant admits writer starvation: under sustained reader
//! arrival a new reader can always slip in between writer attempts, so a
//! writer may wait indefinitely. This is a documented property, not a bug to
//! paper over. Constructing the lock with `fair = true` threads both writers
//! and newly arriving readers through a service-queue mutex, which guarantees
//! that once a writer has entered the queue, no reader arriving after it can
//! overtake it.
//!
//! # Contract
//!
//! Lock and unlock calls are explicitly paired: the permit taken by
//! [`write_lock`](ReaderWriterLock::write_lock) may be returned by a
//! different task than the one that took it, which is why the exclusive slot
//! is a semaphore rather than a guard-based mutex. Unlocking without a
//! matching lock returns [`LockError::NotLocked`].

use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::{Mutex, Semaphore};

use crate::error::LockError;

/// A reader/writer lock allowing many readers or one writer, never both.
pub struct ReaderWriterLock {
    /// Number of active readers; only touched under this guard.
    reader_count: Mutex<usize>,
    /// Single-permit semaphore held by the active writer, or by the first
    /// reader on behalf of all readers.
    exclusive: Semaphore,
    /// Present iff the lock is fair. Writers and arriving readers both pass
    /// through here, so readers arriving behind a waiting writer queue up
    /// instead of overtaking it.
    service_queue: Option<Mutex<()>>,
    /// Tracks whether a writer currently holds the lock, so that a stray
    /// `write_unlock` is rejected instead of minting an extra permit.
    writer_active: AtomicBool,
}

impl ReaderWriterLock {
    /// Creates a new lock.
    ///
    /// With `fair = false` the lock favors readers and a writer may starve
    /// under continuous reader arrival. With `fair = true` writers are
    /// granted the lock ahead of any reader that arrives after them.
    pub fn new(fair: bool) -> Self {
        Self {
            reader_count: Mutex::new(0),
            exclusive: Semaphore::new(1),
            service_queue: fair.then(|| Mutex::new(())),
            writer_active: AtomicBool::new(false),
        }
    }

    /// Returns whether this lock uses the fair service-queue discipline.
    pub fn is_fair(&self) -> bool {
        self.service_queue.is_some()
    }

    /// Blocks until the caller may read.
    ///
    /// The 0 -> 1 reader transition acquires the exclusive permit while still
    /// holding the census guard, so a second reader cannot observe a non-zero
    /// count before exclusion against writers is actually established.
    pub async fn read_lock(&self) {
        let turn = match &self.service_queue {
            Some(q) => Some(q.lock().await),
            None => None,
        };
        let mut count = self.reader_count.lock().await;
        // The service-queue turn only orders arrival; release it before
        // possibly waiting on the writer so later writers are not blocked
        // by a reader that is itself waiting.
        drop(turn);

        *count += 1;
        if *count == 1 {
            self.exclusive
                .acquire()
                .await
                .expect("exclusive semaphore is never closed")
                .forget();
        }
    }

    /// Releases a read lock.
    ///
    /// The 1 -> 0 transition returns the exclusive permit, allowing a writer
    /// to proceed.
    pub async fn read_unlock(&self) -> Result<(), LockError> {
        let mut count = self.reader_count.lock().await;
        if *count == 0 {
            return Err(LockError::NotLocked);
        }
        *count -= 1;
        if *count == 0 {
            self.exclusive.add_permits(1);
        }
        Ok(())
    }

    /// Blocks until no readers and no other writer hold the lock.
    pub async fn write_lock(&self) {
        let turn = match &self.service_queue {
            Some(q) => Some(q.lock().await),
            None => None,
        };
        self.exclusive
            .acquire()
            .await
            .expect("exclusive semaphore is never closed")
            .forget();
        drop(turn);
        self.writer_active.store(true, Ordering::SeqCst);
    }

    /// Releases the write lock.
    pub fn write_unlock(&self) -> Result<(), LockError> {
        if !self.writer_active.swap(false, Ordering::SeqCst) {
            return Err(LockError::NotLocked);
        }
        self.exclusive.add_permits(1);
        Ok(())
    }
}

impl Default for ReaderWriterLock {
    fn default() -> Self {
        Self::new(false)
    }
}
