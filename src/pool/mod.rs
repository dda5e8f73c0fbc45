//! Worker pool executing typed jobs pulled from a bounded queue.
//!
//! - **WorkerPool**: fixed or elastic concurrency behind one type
//! - **Job types**: futures in, tagged error-or-value results out
//!
//! # Architecture
//!
//! ```text
//!   add_job ──► job queue (BoundedBuffer) ──► workers ──► result sink ──► get_result
//! ```
//!
//! Submission applies backpressure at the job queue's capacity; result
//! collection blocks until a job finishes. Results arrive in completion
//! order, which only matches submission order when a single fixed worker is
//! configured.

pub mod job;
pub mod worker_pool;

pub use job::{BoxedJob, JobError, JobResult};
pub use worker_pool::{PoolError, PoolStats, Strategy, WorkerPool, WorkerPoolConfig};
