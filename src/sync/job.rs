//! Idempotent re-entry point for the background scheduler.
//!
//! The scheduler owns periodicity and backoff; this driver only classifies
//! one attempt. It holds no in-memory state, so the scheduler may kill an
//! invocation mid-flight and start another — all progress is the cache's
//! durable state.

use super::{SyncEngine, SyncError};

/// What the scheduler should do after one attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOutcome {
    /// Work is done; wait for the next regular interval.
    Success,
    /// Transient failure; re-attempt with backoff.
    Retry,
    /// Permanent failure; stop retrying and surface to the user.
    Failure,
}

impl JobOutcome {
    /// Process exit code for the background-job contract:
    /// 0 = success, 75 (EX_TEMPFAIL) = retry, 1 = permanent failure.
    pub fn exit_code(self) -> i32 {
        match self {
            JobOutcome::Success => 0,
            JobOutcome::Retry => 75,
            JobOutcome::Failure => 1,
        }
    }
}

/// Run one sync attempt and classify the result.
///
/// While initial sync is incomplete, any failure maps to `Retry` — a first
/// snapshot must eventually land and is always worth another attempt. Once
/// initialized, transient failures (network, timeout, 5xx) map to `Retry`
/// and permanent ones (auth rejected, corrupt cache) to `Failure`.
pub async fn run(engine: &SyncEngine) -> JobOutcome {
    let conf = match engine.database().conf().await {
        Ok(conf) => conf,
        Err(e) => {
            tracing::error!(error = %e, "Cache unavailable, giving up");
            return JobOutcome::Failure;
        }
    };

    if !conf.initial_sync_completed {
        return match engine.perform_initial_sync().await {
            Ok(()) => JobOutcome::Success,
            Err(e) => {
                tracing::warn!(error = %e, "Initial sync attempt failed, will retry");
                JobOutcome::Retry
            }
        };
    }

    match engine.sync().await {
        Ok(()) => JobOutcome::Success,
        Err(e) if e.is_transient() => {
            tracing::warn!(error = %e, "Sync failed transiently, will retry");
            JobOutcome::Retry
        }
        Err(e) => {
            tracing::error!(error = %e, "Sync failed permanently");
            JobOutcome::Failure
        }
    }
}

/// Classification helper shared with callers that surface errors directly.
pub fn classify(error: &SyncError) -> JobOutcome {
    if error.is_transient() {
        JobOutcome::Retry
    } else {
        JobOutcome::Failure
    }
}
