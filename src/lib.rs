//! workbound: bounded concurrency building blocks for job pipelines.
//!
//! Three components, built bottom-up:
//!
//! - [`ReaderWriterLock`]: many concurrent readers or one exclusive writer,
//!   never both, with an optional fair variant that prevents writer
//!   starvation.
//! - [`BoundedBuffer`]: a fixed-capacity FIFO queue synchronized by a pair of
//!   counting semaphores, giving producers blocking backpressure and
//!   consumers blocking delivery.
//! - [`WorkerPool`]: a fixed or semaphore-capped set of execution units that
//!   pull jobs from an internal bounded queue and publish results to a
//!   bounded sink with the same backpressure discipline.
//!
//! # Example
//!
//! ```rust,no_run
//! use workbound::{WorkerPool, WorkerPoolConfig};
//!
//! # async fn run() -> Result<(), workbound::PoolError> {
//! let mut pool = WorkerPool::new(WorkerPoolConfig::new(4))?;
//!
//! for i in 0..10u32 {
//!     pool.add_job(async move { i * i }).await?;
//! }
//! pool.close();
//!
//! while let Ok(result) = pool.get_result().await {
//!     println!("job finished: {result:?}");
//! }
//! pool.shutdown().await?;
//! # Ok(())
//! # }
//! ```
//!
//! Everything blocks at suspension points rather than busy-waiting, nothing
//! in the crate terminates the process, and shutdown is always explicit:
//! closing a buffer or pool drains what was already queued before reporting
//! a distinguishable closed outcome.

pub mod buffer;
pub mod collab;
pub mod error;
pub mod pool;
pub mod rwlock;

pub use buffer::{BoundedBuffer, ConsumeError, ProduceError};
pub use collab::{BloomFilter, DynamicBitSet, ShardedCache};
pub use error::{ConfigError, LockError};
pub use pool::{BoxedJob, JobError, JobResult, PoolError, PoolStats, Strategy, WorkerPool, WorkerPoolConfig};
pub use rwlock::ReaderWriterLock;
