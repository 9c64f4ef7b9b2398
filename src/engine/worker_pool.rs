//! Bounded background worker pool
//!
//! Interlock and linkage work is submitted as explicit tasks. A semaphore caps
//! how many execute at once, every submission returns a [`TaskHandle`], and
//! [`WorkerPool::drain`] waits until nothing is left in flight. Deferred tasks
//! sleep before they take a worker slot, so a long delay never occupies one.

use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Notify, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, info, Instrument};

use super::error::{EngineError, EngineResult};

/// Counts outstanding work and wakes waiters when it reaches zero
#[derive(Debug, Default)]
pub struct InFlight {
    count: AtomicUsize,
    idle: Notify,
}

impl InFlight {
    /// Create an idle tracker
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Register one unit of work until the guard drops
    pub fn enter(self: &Arc<Self>) -> InFlightGuard {
        self.count.fetch_add(1, Ordering::SeqCst);
        InFlightGuard(Arc::clone(self))
    }

    /// Outstanding units
    pub fn current(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }

    /// Wait until no work is outstanding
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.idle.notified();
            if self.current() == 0 {
                return;
            }
            notified.await;
        }
    }
}

/// Releases one unit of in-flight work on drop
#[derive(Debug)]
pub struct InFlightGuard(Arc<InFlight>);

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        if self.0.count.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.0.idle.notify_waiters();
        }
    }
}

/// Handle to a submitted task
#[derive(Debug)]
pub struct TaskHandle<T> {
    label: &'static str,
    handle: JoinHandle<EngineResult<T>>,
}

impl<T> TaskHandle<T> {
    /// Wait for the task's output
    pub async fn join(self) -> EngineResult<T> {
        match self.handle.await {
            Ok(result) => result,
            Err(join_error) => Err(EngineError::task_failed(format!(
                "{}: {}",
                self.label, join_error
            ))),
        }
    }

    /// Whether the task has finished
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Task label
    pub fn label(&self) -> &'static str {
        self.label
    }
}

/// Point-in-time pool counters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    /// Configured worker count
    pub workers: usize,
    /// Tasks accepted
    pub submitted: u64,
    /// Tasks that ran to completion
    pub completed: u64,
    /// Tasks submitted but not yet finished, including deferred ones
    pub in_flight: usize,
}

#[derive(Debug)]
struct PoolInner {
    workers: usize,
    permits: Arc<Semaphore>,
    in_flight: Arc<InFlight>,
    accepting: AtomicBool,
    submitted: AtomicU64,
    completed: Arc<AtomicU64>,
}

/// Semaphore-bounded task pool with observable completion
#[derive(Debug, Clone)]
pub struct WorkerPool {
    inner: Arc<PoolInner>,
}

impl WorkerPool {
    /// Create a pool running at most `workers` tasks at once
    pub fn new(workers: usize) -> Self {
        let workers = workers.max(1);
        info!("Starting worker pool with {} workers", workers);
        Self {
            inner: Arc::new(PoolInner {
                workers,
                permits: Arc::new(Semaphore::new(workers)),
                in_flight: InFlight::new(),
                accepting: AtomicBool::new(true),
                submitted: AtomicU64::new(0),
                completed: Arc::new(AtomicU64::new(0)),
            }),
        }
    }

    /// Run `task` as soon as a worker is free
    pub fn submit<F, T>(&self, label: &'static str, task: F) -> EngineResult<TaskHandle<T>>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        self.submit_after(label, Duration::ZERO, task)
    }

    /// Run `task` after `delay`, then as soon as a worker is free
    pub fn submit_after<F, T>(
        &self,
        label: &'static str,
        delay: Duration,
        task: F,
    ) -> EngineResult<TaskHandle<T>>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        if !self.inner.accepting.load(Ordering::SeqCst) {
            return Err(EngineError::ShuttingDown);
        }

        let guard = self.inner.in_flight.enter();
        let permits = Arc::clone(&self.inner.permits);
        let completed = Arc::clone(&self.inner.completed);
        self.inner.submitted.fetch_add(1, Ordering::Relaxed);

        let span = tracing::debug_span!("pool_task", task = label, delay_ms = delay.as_millis() as u64);
        let handle = tokio::spawn(
            async move {
                let _guard = guard;
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                let _permit = match permits.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => return Err(EngineError::ShuttingDown),
                };
                let output = task.await;
                completed.fetch_add(1, Ordering::Relaxed);
                Ok(output)
            }
            .instrument(span),
        );

        Ok(TaskHandle { label, handle })
    }

    /// Wait until every submitted task, deferred ones included, has finished
    pub async fn drain(&self) {
        let pending = self.inner.in_flight.current();
        if pending > 0 {
            debug!("Draining {} in-flight task(s)", pending);
        }
        self.inner.in_flight.wait_idle().await;
    }

    /// Stop accepting work and drain what was already submitted
    pub async fn shutdown(&self) {
        self.inner.accepting.store(false, Ordering::SeqCst);
        self.drain().await;
        info!("Worker pool shut down");
    }

    /// Whether new work is accepted
    pub fn is_accepting(&self) -> bool {
        self.inner.accepting.load(Ordering::SeqCst)
    }

    /// Current counters
    pub fn stats(&self) -> PoolStats {
        PoolStats {
            workers: self.inner.workers,
            submitted: self.inner.submitted.load(Ordering::Relaxed),
            completed: self.inner.completed.load(Ordering::Relaxed),
            in_flight: self.inner.in_flight.current(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[tokio::test]
    async fn test_submit_and_join() {
        let pool = WorkerPool::new(2);
        let handle = pool.submit("answer", async { 42 }).unwrap();
        assert_eq!(handle.join().await.unwrap(), 42);

        pool.drain().await;
        let stats = pool.stats();
        assert_eq!(stats.submitted, 1);
        assert_eq!(stats.completed, 1);
        assert_eq!(stats.in_flight, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrency_is_bounded() {
        let pool = WorkerPool::new(2);
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        for _ in 0..6 {
            let running = Arc::clone(&running);
            let peak = Arc::clone(&peak);
            pool.submit("busy", async move {
                let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(100)).await;
                running.fetch_sub(1, Ordering::SeqCst);
            })
            .unwrap();
        }

        pool.drain().await;
        assert_eq!(peak.load(Ordering::SeqCst), 2);
        assert_eq!(pool.stats().completed, 6);
    }

    #[tokio::test(start_paused = true)]
    async fn test_deferred_task_does_not_hold_a_worker() {
        let pool = WorkerPool::new(1);
        let deferred = pool
            .submit_after("later", Duration::from_secs(60), async { "late" })
            .unwrap();
        let immediate = pool.submit("now", async { "now" }).unwrap();

        assert_eq!(immediate.join().await.unwrap(), "now");
        assert!(!deferred.is_finished());
        assert_eq!(pool.stats().in_flight, 1);

        assert_eq!(deferred.join().await.unwrap(), "late");
    }

    #[tokio::test]
    async fn test_panicking_task_reports_failure_and_drains() {
        let pool = WorkerPool::new(1);
        let handle = pool
            .submit("boom", async {
                panic!("task exploded");
            })
            .unwrap();

        let err: EngineError = handle.join().await.unwrap_err();
        assert!(matches!(err, EngineError::TaskFailed(_)));
        pool.drain().await;
        assert_eq!(pool.stats().in_flight, 0);
    }

    #[tokio::test]
    async fn test_shutdown_rejects_new_work() {
        let pool = WorkerPool::new(1);
        pool.shutdown().await;
        assert!(!pool.is_accepting());
        assert!(matches!(
            pool.submit("late", async {}),
            Err(EngineError::ShuttingDown)
        ));
    }
}
