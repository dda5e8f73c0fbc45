//! Job and result types for the worker pool.
//!
//! Jobs are typed futures rather than opaque payloads: a pool of result type
//! `R` accepts any `Future<Output = R>` and its result channel carries
//! [`JobResult<R>`], an explicit error-or-value variant. A job that fails by
//! panicking is captured per job and surfaced as a tagged error result; it
//! never reaches the worker loop.

use std::any::Any;
use std::panic::AssertUnwindSafe;

use futures::future::BoxFuture;
use futures::FutureExt;
use thiserror::Error;
use tracing::warn;

/// A queued job: a boxed future producing the pool's result type.
pub type BoxedJob<R> = BoxFuture<'static, R>;

/// Ways a job can fail without producing a value.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum JobError {
    /// The job panicked; the payload is the panic message where one was
    /// recoverable.
    #[error("job panicked: {0}")]
    Panicked(String),
}

/// The tagged outcome delivered for every submitted job.
pub type JobResult<R> = Result<R, JobError>;

/// Runs a job to completion, converting a panic into a tagged error result.
pub(crate) async fn run_job<R>(job: BoxedJob<R>) -> JobResult<R> {
    match AssertUnwindSafe(job).catch_unwind().await {
        Ok(value) => Ok(value),
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            warn!(panic = %message, "job panicked");
            Err(JobError::Panicked(message))
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_run_job_returns_value() {
        let job: BoxedJob<u32> = Box::pin(async { 41 + 1 });
        assert_eq!(run_job(job).await, Ok(42));
    }

    #[tokio::test]
    async fn test_run_job_captures_panic_message() {
        let job: BoxedJob<u32> = Box::pin(async { panic!("boom") });
        assert_eq!(
            run_job(job).await,
            Err(JobError::Panicked("boom".to_string()))
        );
    }

    #[tokio::test]
    async fn test_run_job_captures_formatted_panic() {
        let code = 7;
        let job: BoxedJob<u32> = Box::pin(async move { panic!("failed with code {code}") });
        assert_eq!(
            run_job(job).await,
            Err(JobError::Panicked("failed with code 7".to_string()))
        );
    }
}
