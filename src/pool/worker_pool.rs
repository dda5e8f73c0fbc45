//! Worker pool executing submitted jobs with bounded concurrency.
//!
//! The pool composes two [`BoundedBuffer`]s: a job queue feeding execution
//! units and a result sink they publish into, both with the same blocking
//! backpressure discipline. Two concurrency strategies are supported behind
//! one type:
//!
//! - **Fixed**: `worker_count` long-lived workers started at construction,
//!   each repeatedly dequeuing and executing jobs. Concurrency is bounded by
//!   construction, with no extra limiter.
//! - **Elastic**: a single dispatch loop that acquires a semaphore permit per
//!   job and spawns a fresh task for it, allowing burst concurrency up to
//!   `worker_count` without fixed worker identity. The permit is released on
//!   every exit path, including job failure.
//!
//! Results come out in completion order, not submission order; with a single
//! fixed worker the two coincide. Closing the job queue lets every job that
//! was already queued drain before the workers exit, after which the result
//! sink is closed by the last execution unit to retire.

use std::future::Future;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::buffer::BoundedBuffer;
use crate::error::ConfigError;

use super::job::{run_job, BoxedJob, JobResult};

/// Errors that can occur in the worker pool.
#[derive(Debug, Error)]
pub enum PoolError {
    /// Pool construction was given an invalid configuration.
    #[error("invalid pool configuration: {0}")]
    Config(#[from] ConfigError),

    /// The job queue has been closed; no new jobs are accepted.
    #[error("job queue is closed")]
    QueueClosed,

    /// The job queue stayed full for the whole submission timeout.
    #[error("job submission timed out after {0:?}")]
    SubmitTimeout(Duration),

    /// Every worker has exited and all results have been drained.
    #[error("result channel is closed and drained")]
    ResultsClosed,

    /// No result became available within the timeout.
    #[error("timed out waiting for a result after {0:?}")]
    ResultTimeout(Duration),

    /// Workers did not stop within the shutdown timeout.
    #[error("shutdown timed out after {0:?}")]
    ShutdownTimeout(Duration),
}

/// How the pool bounds its concurrency.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// A fixed set of long-lived workers pinned at construction.
    Fixed,
    /// Per-job spawned tasks capped by a semaphore.
    Elastic,
}

/// Configuration for the worker pool.
#[derive(Debug, Clone)]
pub struct WorkerPoolConfig {
    /// Number of concurrent execution units.
    pub worker_count: usize,
    /// Concurrency strategy.
    pub strategy: Strategy,
    /// Capacity of the job queue; submission blocks beyond this.
    pub queue_capacity: usize,
    /// Capacity of the result sink; workers block beyond this until results
    /// are collected.
    pub result_capacity: usize,
    /// Timeout for graceful shutdown.
    pub shutdown_timeout: Duration,
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self {
            worker_count: 4,
            strategy: Strategy::Fixed,
            queue_capacity: 64,
            result_capacity: 64,
            shutdown_timeout: Duration::from_secs(30),
        }
    }
}

impl WorkerPoolConfig {
    /// Creates a configuration with the specified number of workers.
    pub fn new(worker_count: usize) -> Self {
        Self {
            worker_count,
            ..Default::default()
        }
    }

    /// Sets the concurrency strategy.
    pub fn with_strategy(mut self, strategy: Strategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Sets the job queue capacity.
    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    /// Sets the result sink capacity.
    pub fn with_result_capacity(mut self, capacity: usize) -> Self {
        self.result_capacity = capacity;
        self
    }

    /// Sets the graceful shutdown timeout.
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }
}

/// Statistics snapshot for a worker pool.
#[derive(Debug, Clone, Default)]
pub struct PoolStats {
    /// Number of execution units configured for the pool.
    pub worker_count: usize,
    /// Number of jobs currently executing.
    pub active_jobs: usize,
    /// Jobs that completed with a value.
    pub jobs_completed: u64,
    /// Jobs that ended in a tagged error result.
    pub jobs_failed: u64,
    /// Average job execution duration.
    pub average_job_duration: Duration,
}

impl PoolStats {
    /// Returns the total number of jobs processed (completed + failed).
    pub fn total_processed(&self) -> u64 {
        self.jobs_completed + self.jobs_failed
    }

    /// Returns the success rate as a percentage.
    pub fn success_rate(&self) -> f64 {
        let total = self.total_processed();
        if total == 0 {
            return 0.0;
        }
        (self.jobs_completed as f64 / total as f64) * 100.0
    }
}

/// Shared counters behind the stats snapshot.
struct SharedPoolStats {
    jobs_completed: AtomicU64,
    jobs_failed: AtomicU64,
    total_duration_ms: AtomicU64,
    active_jobs: AtomicUsize,
}

impl SharedPoolStats {
    fn new() -> Self {
        Self {
            jobs_completed: AtomicU64::new(0),
            jobs_failed: AtomicU64::new(0),
            total_duration_ms: AtomicU64::new(0),
            active_jobs: AtomicUsize::new(0),
        }
    }

    fn record_completion(&self, duration: Duration) {
        self.jobs_completed.fetch_add(1, Ordering::SeqCst);
        self.total_duration_ms
            .fetch_add(duration.as_millis() as u64, Ordering::SeqCst);
    }

    fn record_failure(&self, duration: Duration) {
        self.jobs_failed.fetch_add(1, Ordering::SeqCst);
        self.total_duration_ms
            .fetch_add(duration.as_millis() as u64, Ordering::SeqCst);
    }

    fn snapshot(&self, worker_count: usize) -> PoolStats {
        let completed = self.jobs_completed.load(Ordering::SeqCst);
        let failed = self.jobs_failed.load(Ordering::SeqCst);
        let total_duration_ms = self.total_duration_ms.load(Ordering::SeqCst);

        let total = completed + failed;
        let average_job_duration = if total > 0 {
            Duration::from_millis(total_duration_ms / total)
        } else {
            Duration::ZERO
        };

        PoolStats {
            worker_count,
            active_jobs: self.active_jobs.load(Ordering::SeqCst),
            jobs_completed: completed,
            jobs_failed: failed,
            average_job_duration,
        }
    }
}

/// State shared between the pool handle and its execution units.
struct PoolShared<R> {
    jobs: BoundedBuffer<BoxedJob<R>>,
    results: BoundedBuffer<JobResult<R>>,
    stats: SharedPoolStats,
    /// Execution units still running: the fixed workers, or the elastic
    /// dispatch loop. The last one to retire closes the result sink.
    live_units: AtomicUsize,
}

/// Worker pool processing typed jobs with bounded concurrency.
///
/// Must be constructed within a Tokio runtime; workers are spawned at
/// construction and run until the job queue is closed and drained.
pub struct WorkerPool<R> {
    config: WorkerPoolConfig,
    shared: Arc<PoolShared<R>>,
    handles: Vec<JoinHandle<()>>,
}

impl<R: Send + 'static> WorkerPool<R> {
    /// Creates a pool and starts its execution units.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::Config`] if the worker count or either queue
    /// capacity is zero.
    pub fn new(config: WorkerPoolConfig) -> Result<Self, PoolError> {
        if config.worker_count == 0 {
            return Err(ConfigError::InvalidWorkerCount(0).into());
        }
        let shared = Arc::new(PoolShared {
            jobs: BoundedBuffer::new(config.queue_capacity)?,
            results: BoundedBuffer::new(config.result_capacity)?,
            stats: SharedPoolStats::new(),
            live_units: AtomicUsize::new(match config.strategy {
                Strategy::Fixed => config.worker_count,
                Strategy::Elastic => 1,
            }),
        });

        let mut handles = Vec::with_capacity(config.worker_count);
        match config.strategy {
            Strategy::Fixed => {
                for id in 0..config.worker_count {
                    handles.push(tokio::spawn(fixed_worker(id, Arc::clone(&shared))));
                }
            }
            Strategy::Elastic => {
                let limiter = Arc::new(Semaphore::new(config.worker_count));
                handles.push(tokio::spawn(elastic_dispatch(
                    Arc::clone(&shared),
                    limiter,
                    config.worker_count,
                )));
            }
        }

        info!(
            worker_count = config.worker_count,
            strategy = ?config.strategy,
            "worker pool started"
        );
        Ok(Self {
            config,
            shared,
            handles,
        })
    }

    /// Submits a job, blocking while the job queue is at capacity.
    ///
    /// Jobs are never silently dropped: either the job is queued or the call
    /// reports why it was not.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::QueueClosed`] after [`close`](Self::close) or
    /// [`shutdown`](Self::shutdown) has been called.
    pub async fn add_job<F>(&self, job: F) -> Result<(), PoolError>
    where
        F: Future<Output = R> + Send + 'static,
    {
        self.shared
            .jobs
            .produce(Box::pin(job))
            .await
            .map_err(|_| PoolError::QueueClosed)
    }

    /// Submits a job, giving up after `timeout` if the queue stays full.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::SubmitTimeout`] on expiry or
    /// [`PoolError::QueueClosed`] if the pool shut down first.
    pub async fn add_job_timeout<F>(&self, job: F, timeout: Duration) -> Result<(), PoolError>
    where
        F: Future<Output = R> + Send + 'static,
    {
        match self.shared.jobs.produce_timeout(Box::pin(job), timeout).await {
            Ok(()) => Ok(()),
            Err(err) if err.is_closed() => Err(PoolError::QueueClosed),
            Err(_) => Err(PoolError::SubmitTimeout(timeout)),
        }
    }

    /// Blocks until the next result is available, in completion order.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::ResultsClosed`] once every worker has exited and
    /// all results have been collected.
    pub async fn get_result(&self) -> Result<JobResult<R>, PoolError> {
        self.shared
            .results
            .consume()
            .await
            .map_err(|_| PoolError::ResultsClosed)
    }

    /// Blocks for a result, giving up after `timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::ResultTimeout`] on expiry.
    pub async fn get_result_timeout(&self, timeout: Duration) -> Result<JobResult<R>, PoolError> {
        match self.shared.results.consume_timeout(timeout).await {
            Ok(result) => Ok(result),
            Err(crate::buffer::ConsumeError::TimedOut) => Err(PoolError::ResultTimeout(timeout)),
            Err(_) => Err(PoolError::ResultsClosed),
        }
    }

    /// Closes the job queue without waiting for workers.
    ///
    /// Queued jobs still drain; results remain collectable until the last
    /// one is consumed. Idempotent: returns `true` only for the call that
    /// performed the close.
    pub fn close(&self) -> bool {
        self.shared.jobs.close()
    }

    /// Graceful shutdown: close the job queue and wait for workers to drain
    /// it and exit.
    ///
    /// Safe to call more than once; later calls have nothing left to await.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::ShutdownTimeout`] if workers are still running
    /// when the configured timeout expires; they keep draining detached.
    pub async fn shutdown(&mut self) -> Result<(), PoolError> {
        self.shared.jobs.close();
        info!("worker pool shutdown initiated");

        let mut handles = std::mem::take(&mut self.handles);
        let drain = async move {
            for handle in handles.drain(..) {
                if let Err(e) = handle.await {
                    error!(error = %e, "worker task panicked during shutdown");
                }
            }
        };

        match tokio::time::timeout(self.config.shutdown_timeout, drain).await {
            Ok(()) => {
                info!("worker pool shutdown complete");
                Ok(())
            }
            Err(_) => Err(PoolError::ShutdownTimeout(self.config.shutdown_timeout)),
        }
    }

    /// Returns whether any execution unit is still running.
    pub fn is_running(&self) -> bool {
        !self.shared.results.is_closed()
    }

    /// Returns the configured number of execution units.
    pub fn worker_count(&self) -> usize {
        self.config.worker_count
    }

    /// Returns the configured concurrency strategy.
    pub fn strategy(&self) -> Strategy {
        self.config.strategy
    }

    /// Returns the number of jobs currently waiting in the queue.
    pub fn queued_jobs(&self) -> usize {
        self.shared.jobs.len()
    }

    /// Returns a statistics snapshot.
    pub fn stats(&self) -> PoolStats {
        self.shared.stats.snapshot(self.config.worker_count)
    }
}

/// Executes one job and publishes its outcome. Returns `false` when the
/// result sink is gone and the caller should stop.
async fn execute_and_publish<R: Send + 'static>(shared: &PoolShared<R>, job: BoxedJob<R>) -> bool {
    shared.stats.active_jobs.fetch_add(1, Ordering::SeqCst);
    let started = Instant::now();
    let outcome = run_job(job).await;
    let elapsed = started.elapsed();
    match &outcome {
        Ok(_) => shared.stats.record_completion(elapsed),
        Err(_) => shared.stats.record_failure(elapsed),
    }
    shared.stats.active_jobs.fetch_sub(1, Ordering::SeqCst);
    shared.results.produce(outcome).await.is_ok()
}

/// Marks one execution unit as retired; the last one closes the result sink.
fn retire_unit<R: Send>(shared: &PoolShared<R>) {
    if shared.live_units.fetch_sub(1, Ordering::SeqCst) == 1 {
        shared.results.close();
    }
}

/// Long-lived worker loop for the fixed strategy.
async fn fixed_worker<R: Send + 'static>(id: usize, shared: Arc<PoolShared<R>>) {
    debug!(worker_id = id, "worker started");
    loop {
        let job = match shared.jobs.consume().await {
            Ok(job) => job,
            // Closed: the queue is shut down and fully drained.
            Err(_) => break,
        };
        if !execute_and_publish(&shared, job).await {
            break;
        }
    }
    retire_unit(&shared);
    debug!(worker_id = id, "worker stopped");
}

/// Dispatch loop for the elastic strategy: one spawned task per job, capped
/// by the limiter.
async fn elastic_dispatch<R: Send + 'static>(
    shared: Arc<PoolShared<R>>,
    limiter: Arc<Semaphore>,
    burst: usize,
) {
    debug!(burst, "dispatch loop started");
    loop {
        let job = match shared.jobs.consume().await {
            Ok(job) => job,
            Err(_) => break,
        };
        let permit = Arc::clone(&limiter)
            .acquire_owned()
            .await
            .expect("limiter semaphore is never closed");
        let shared = Arc::clone(&shared);
        tokio::spawn(async move {
            // Holding the owned permit in the task body guarantees release
            // on every exit path, including a panicking job.
            let _permit = permit;
            let _ = execute_and_publish(&shared, job).await;
        });
    }
    // Reclaiming every permit means all in-flight jobs have finished.
    let drained = limiter
        .acquire_many(burst as u32)
        .await
        .expect("limiter semaphore is never closed");
    drop(drained);
    retire_unit(&shared);
    debug!("dispatch loop stopped");
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use tokio::time::sleep;

    use super::super::job::JobError;
    use super::*;

    #[test]
    fn test_worker_pool_config_default() {
        let config = WorkerPoolConfig::default();

        assert_eq!(config.worker_count, 4);
        assert_eq!(config.strategy, Strategy::Fixed);
        assert_eq!(config.queue_capacity, 64);
        assert_eq!(config.result_capacity, 64);
        assert_eq!(config.shutdown_timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_worker_pool_config_builder() {
        let config = WorkerPoolConfig::new(8)
            .with_strategy(Strategy::Elastic)
            .with_queue_capacity(16)
            .with_result_capacity(32)
            .with_shutdown_timeout(Duration::from_secs(5));

        assert_eq!(config.worker_count, 8);
        assert_eq!(config.strategy, Strategy::Elastic);
        assert_eq!(config.queue_capacity, 16);
        assert_eq!(config.result_capacity, 32);
        assert_eq!(config.shutdown_timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_pool_stats_calculations() {
        let stats = PoolStats {
            worker_count: 4,
            active_jobs: 2,
            jobs_completed: 80,
            jobs_failed: 20,
            average_job_duration: Duration::from_secs(60),
        };

        assert_eq!(stats.total_processed(), 100);
        assert!((stats.success_rate() - 80.0).abs() < f64::EPSILON);

        let empty = PoolStats::default();
        assert_eq!(empty.total_processed(), 0);
        assert!((empty.success_rate() - 0.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_zero_worker_count_is_rejected() {
        let err = WorkerPool::<u32>::new(WorkerPoolConfig::new(0)).err();
        assert!(matches!(
            err,
            Some(PoolError::Config(ConfigError::InvalidWorkerCount(0)))
        ));
    }

    #[tokio::test]
    async fn test_single_fixed_worker_preserves_submission_order() {
        let mut pool = WorkerPool::new(WorkerPoolConfig::new(1)).unwrap();

        for i in 1..=3u32 {
            pool.add_job(async move { i }).await.unwrap();
        }
        for i in 1..=3u32 {
            assert_eq!(pool.get_result().await.unwrap(), Ok(i));
        }
        pool.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_multiple_workers_preserve_result_multiset() {
        let mut pool =
            WorkerPool::new(WorkerPoolConfig::new(4).with_queue_capacity(32)).unwrap();

        for i in 0..20u32 {
            pool.add_job(async move { i }).await.unwrap();
        }
        pool.close();

        let mut results = Vec::new();
        loop {
            match pool.get_result().await {
                Ok(result) => results.push(result.unwrap()),
                Err(PoolError::ResultsClosed) => break,
                Err(err) => panic!("unexpected error: {err}"),
            }
        }
        results.sort_unstable();
        assert_eq!(results, (0..20).collect::<Vec<u32>>());
        pool.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_panicking_job_yields_tagged_error_and_pool_survives() {
        let mut pool = WorkerPool::new(WorkerPoolConfig::new(1)).unwrap();

        pool.add_job(async { panic!("job exploded") }).await.unwrap();
        pool.add_job(async { 7u32 }).await.unwrap();

        assert_eq!(
            pool.get_result().await.unwrap(),
            Err(JobError::Panicked("job exploded".to_string()))
        );
        assert_eq!(pool.get_result().await.unwrap(), Ok(7));

        let stats = pool.stats();
        assert_eq!(stats.jobs_completed, 1);
        assert_eq!(stats.jobs_failed, 1);
        pool.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_shutdown_drains_queued_jobs() {
        let mut pool = WorkerPool::new(
            WorkerPoolConfig::new(2).with_queue_capacity(16),
        )
        .unwrap();

        for i in 0..10u32 {
            pool.add_job(async move {
                sleep(Duration::from_millis(2)).await;
                i
            })
            .await
            .unwrap();
        }
        // Close immediately: every queued job must still execute.
        pool.close();

        let mut results = Vec::new();
        loop {
            match pool.get_result().await {
                Ok(result) => results.push(result.unwrap()),
                Err(PoolError::ResultsClosed) => break,
                Err(err) => panic!("unexpected error: {err}"),
            }
        }
        assert_eq!(results.len(), 10);
        pool.shutdown().await.unwrap();
        assert!(!pool.is_running());
    }

    #[tokio::test]
    async fn test_shutdown_is_idempotent() {
        let mut pool = WorkerPool::<u32>::new(WorkerPoolConfig::new(2)).unwrap();
        pool.shutdown().await.unwrap();
        pool.shutdown().await.unwrap();
        assert!(!pool.close());
    }

    #[tokio::test]
    async fn test_add_job_after_close_is_rejected() {
        let mut pool = WorkerPool::<u32>::new(WorkerPoolConfig::new(1)).unwrap();
        pool.close();
        assert!(matches!(
            pool.add_job(async { 1 }).await,
            Err(PoolError::QueueClosed)
        ));
        pool.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_get_result_timeout_on_idle_pool() {
        let mut pool = WorkerPool::<u32>::new(WorkerPoolConfig::new(1)).unwrap();
        assert!(matches!(
            pool.get_result_timeout(Duration::from_millis(10)).await,
            Err(PoolError::ResultTimeout(_))
        ));
        pool.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_elastic_strategy_runs_jobs_concurrently() {
        let mut pool = WorkerPool::new(
            WorkerPoolConfig::new(4)
                .with_strategy(Strategy::Elastic)
                .with_queue_capacity(16),
        )
        .unwrap();

        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        for i in 0..8u32 {
            let in_flight = Arc::clone(&in_flight);
            let peak = Arc::clone(&peak);
            pool.add_job(async move {
                let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                sleep(Duration::from_millis(50)).await;
                in_flight.fetch_sub(1, Ordering::SeqCst);
                i
            })
            .await
            .unwrap();
        }
        pool.close();

        let mut results = Vec::new();
        loop {
            match pool.get_result().await {
                Ok(result) => results.push(result.unwrap()),
                Err(PoolError::ResultsClosed) => break,
                Err(err) => panic!("unexpected error: {err}"),
            }
        }
        results.sort_unstable();
        assert_eq!(results, (0..8).collect::<Vec<u32>>());
        assert!(
            peak.load(Ordering::SeqCst) >= 2,
            "elastic pool should overlap job execution"
        );
        pool.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_elastic_panicking_job_releases_its_permit() {
        let mut pool = WorkerPool::new(
            WorkerPoolConfig::new(1).with_strategy(Strategy::Elastic),
        )
        .unwrap();

        // With a single permit, the second job can only run if the first
        // job's permit came back despite the panic.
        pool.add_job(async { panic!("boom") }).await.unwrap();
        pool.add_job(async { 5u32 }).await.unwrap();

        let mut outcomes = Vec::new();
        for _ in 0..2 {
            outcomes.push(pool.get_result().await.unwrap());
        }
        assert!(outcomes.contains(&Ok(5)));
        assert!(outcomes
            .iter()
            .any(|outcome| matches!(outcome, Err(JobError::Panicked(_)))));
        pool.shutdown().await.unwrap();
    }
}
