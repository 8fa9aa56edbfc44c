//! Fire-and-forget background jobs.
//!
//! Requests never wait on soft refreshes or legacy migrations. Those run as
//! spawned tasks through [`BackgroundJobs`], which counts outcomes and sends
//! every failure over a channel so it is logged instead of lost.
//!
//! # Usage
//!
//! ```ignore
//! let jobs = BackgroundJobs::new();
//! jobs.start_reporter();
//!
//! jobs.spawn("total-supply-refresh", async move {
//!     let supply = source.fetch_total_supply().await?;
//!     store.set_total_supply(supply).await
//! });
//!
//! // On shutdown
//! jobs.wait_idle().await;
//! ```

use rugmirror_core::{MirrorError, MirrorResult};
use serde::Serialize;
use std::future::Future;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tokio::sync::Notify;
use tokio::task::JoinHandle;

// ============================================================================
// METRICS
// ============================================================================

/// Counters for background job outcomes since startup.
#[derive(Debug, Default)]
pub struct JobMetrics {
    pub spawned: AtomicU64,
    pub succeeded: AtomicU64,
    pub failed: AtomicU64,
}

impl JobMetrics {
    pub fn snapshot(&self) -> JobMetricsSnapshot {
        JobMetricsSnapshot {
            spawned: self.spawned.load(Ordering::Relaxed),
            succeeded: self.succeeded.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of job metrics at a point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct JobMetricsSnapshot {
    pub spawned: u64,
    pub succeeded: u64,
    pub failed: u64,
}

/// A job that returned an error.
#[derive(Debug, Clone)]
pub struct JobFailure {
    pub job: &'static str,
    pub error: MirrorError,
}

// ============================================================================
// RUNNER
// ============================================================================

struct JobsInner {
    failures: UnboundedSender<JobFailure>,
    receiver: Mutex<Option<UnboundedReceiver<JobFailure>>>,
    in_flight: AtomicUsize,
    idle: Notify,
    metrics: JobMetrics,
}

/// Decrements the in-flight count when a job ends, including by panic.
struct InFlightGuard(Arc<JobsInner>);

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        if self.0.in_flight.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.0.idle.notify_waiters();
        }
    }
}

/// Spawner for detached tasks. Cheap to clone.
#[derive(Clone)]
pub struct BackgroundJobs {
    inner: Arc<JobsInner>,
}

impl Default for BackgroundJobs {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for BackgroundJobs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackgroundJobs")
            .field("in_flight", &self.in_flight())
            .field("metrics", &self.inner.metrics.snapshot())
            .finish()
    }
}

impl BackgroundJobs {
    pub fn new() -> Self {
        let (tx, rx) = unbounded_channel();
        Self {
            inner: Arc::new(JobsInner {
                failures: tx,
                receiver: Mutex::new(Some(rx)),
                in_flight: AtomicUsize::new(0),
                idle: Notify::new(),
                metrics: JobMetrics::default(),
            }),
        }
    }

    /// Run `task` on the current tokio runtime without waiting for it.
    pub fn spawn<F>(&self, job: &'static str, task: F)
    where
        F: Future<Output = MirrorResult<()>> + Send + 'static,
    {
        self.inner.metrics.spawned.fetch_add(1, Ordering::Relaxed);
        self.inner.in_flight.fetch_add(1, Ordering::AcqRel);
        let guard = InFlightGuard(Arc::clone(&self.inner));

        tokio::spawn(async move {
            let inner = Arc::clone(&guard.0);
            match task.await {
                Ok(()) => {
                    inner.metrics.succeeded.fetch_add(1, Ordering::Relaxed);
                    tracing::debug!(job, "background job finished");
                }
                Err(error) => {
                    inner.metrics.failed.fetch_add(1, Ordering::Relaxed);
                    // Receiver gone means nobody is reporting; the counter still moved.
                    let _ = inner.failures.send(JobFailure { job, error });
                }
            }
            drop(guard);
        });
    }

    /// Take the failure channel. Only the first caller gets it.
    pub fn take_failures(&self) -> Option<UnboundedReceiver<JobFailure>> {
        self.inner
            .receiver
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .take()
    }

    /// Spawn a task that logs every job failure at `warn`.
    ///
    /// Returns `None` if the failure channel was already taken.
    pub fn start_reporter(&self) -> Option<JoinHandle<()>> {
        let mut failures = self.take_failures()?;
        Some(tokio::spawn(async move {
            while let Some(failure) = failures.recv().await {
                tracing::warn!(
                    job = failure.job,
                    error = %failure.error,
                    "background job failed"
                );
            }
        }))
    }

    pub fn in_flight(&self) -> usize {
        self.inner.in_flight.load(Ordering::Acquire)
    }

    pub fn metrics(&self) -> JobMetricsSnapshot {
        self.inner.metrics.snapshot()
    }

    /// Wait until no job is running.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.inner.idle.notified();
            if self.in_flight() == 0 {
                return;
            }
            notified.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rugmirror_core::StorageError;
    use std::time::Duration;

    #[tokio::test]
    async fn test_wait_idle_sees_completion() {
        let jobs = BackgroundJobs::new();
        jobs.spawn("sleepy", async {
            tokio::time::sleep(Duration::from_millis(20)).await;
            Ok(())
        });
        assert_eq!(jobs.in_flight(), 1);

        jobs.wait_idle().await;
        assert_eq!(jobs.in_flight(), 0);
        assert_eq!(
            jobs.metrics(),
            JobMetricsSnapshot {
                spawned: 1,
                succeeded: 1,
                failed: 0
            }
        );
    }

    #[tokio::test]
    async fn test_failures_reach_the_channel() {
        let jobs = BackgroundJobs::new();
        let mut failures = jobs.take_failures().expect("first take");
        assert!(jobs.take_failures().is_none());

        jobs.spawn("broken", async { Err(StorageError::LockPoisoned.into()) });
        jobs.wait_idle().await;

        let failure = failures.recv().await.expect("failure delivered");
        assert_eq!(failure.job, "broken");
        assert!(matches!(failure.error, MirrorError::Storage(_)));
        assert_eq!(jobs.metrics().failed, 1);
    }

    #[tokio::test]
    async fn test_wait_idle_with_nothing_running() {
        BackgroundJobs::new().wait_idle().await;
    }
}
