//! # Cluster Session
//!
//! An explicitly started pool of executor threads standing in for a cluster
//! context. It is acquired once per benchmark run, handed to the distributed
//! backend by handle, and shut down exactly once when the run ends, on every
//! exit path: `with_session` shuts it down after the closure returns, and
//! `Drop` covers unwinding.
//!
//! Submitting work to a session that has been shut down fails with
//! `BenchError::BackendUnavailable`.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, unbounded, Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;

use crate::{BenchError, BenchResult, Deadline};

/// Configuration for a cluster session
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Application name, used as the executor thread prefix
    pub app_name: String,
    /// Number of executor threads
    pub num_executors: usize,
    /// Maximum queued tasks before `submit` blocks
    pub queue_depth: usize,
    /// Stack size per executor (mining recursion is deep on long transactions)
    pub stack_size: usize,
}

impl SessionConfig {
    pub fn new(app_name: impl Into<String>, num_executors: usize) -> Self {
        Self {
            app_name: app_name.into(),
            num_executors: num_executors.max(1),
            queue_depth: 1024,
            stack_size: 8 * 1024 * 1024,
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self::new("fpgrowth", num_cpus::get())
    }
}

/// Task to execute on an executor
type Task = Box<dyn FnOnce() + Send + 'static>;

/// Session metrics
#[derive(Debug, Default)]
pub struct SessionMetrics {
    pub tasks_submitted: AtomicU64,
    pub tasks_completed: AtomicU64,
    pub tasks_panicked: AtomicU64,
    /// Total execution time (microseconds)
    pub total_exec_time_us: AtomicU64,
    /// Maximum execution time seen (microseconds)
    pub max_exec_time_us: AtomicU64,
}

impl SessionMetrics {
    fn record_execution(&self, duration: Duration) {
        self.tasks_completed.fetch_add(1, Ordering::Release);
        let us = duration.as_micros() as u64;
        self.total_exec_time_us.fetch_add(us, Ordering::Relaxed);
        let _ = self.max_exec_time_us.fetch_max(us, Ordering::Relaxed);
    }
}

/// Cheap, cloneable submission handle onto a running session.
#[derive(Clone)]
pub struct SessionHandle {
    sender: Sender<Task>,
    metrics: Arc<SessionMetrics>,
    shutdown: Arc<Mutex<bool>>,
    executors: usize,
}

impl SessionHandle {
    pub fn executors(&self) -> usize {
        self.executors
    }

    pub fn metrics(&self) -> &SessionMetrics {
        &self.metrics
    }

    pub fn is_active(&self) -> bool {
        !*self.shutdown.lock()
    }

    /// Queue a task, blocking while the queue is full.
    pub fn submit<F>(&self, task: F) -> BenchResult<()>
    where
        F: FnOnce() + Send + 'static,
    {
        if !self.is_active() {
            return Err(BenchError::BackendUnavailable(
                "cluster session has been shut down".into(),
            ));
        }
        self.metrics.tasks_submitted.fetch_add(1, Ordering::Relaxed);
        self.sender
            .send(Box::new(task))
            .map_err(|_| BenchError::BackendUnavailable("cluster session has no executors".into()))
    }

    /// Whether no task is queued or running.
    pub fn is_idle(&self) -> bool {
        // skipped and panicked tasks are counted as completed too
        self.metrics.tasks_completed.load(Ordering::Acquire)
            >= self.metrics.tasks_submitted.load(Ordering::Acquire)
    }

    /// Block until no task is queued or running.
    pub fn wait_idle(&self) {
        while self.is_active() && !self.is_idle() {
            thread::sleep(Duration::from_millis(1));
        }
    }

    /// Run every job on the executors and gather results in job order.
    ///
    /// A job that panics is reported as `MiningFailure`. With a deadline, the
    /// wait for results stops at `deadline.at()` and `RepetitionTimeout` is
    /// returned. On any error the batch is cancelled: queued jobs are skipped
    /// and the call returns only once the jobs already running have finished,
    /// so no work of this batch outlives it.
    pub fn run_all<T, F>(&self, jobs: Vec<F>, deadline: Option<Deadline>) -> BenchResult<Vec<T>>
    where
        F: FnOnce() -> BenchResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let expected = jobs.len();
        let (tx, rx) = unbounded::<(usize, BenchResult<T>)>();
        let cancelled = Arc::new(AtomicBool::new(false));

        let mut submitted = Ok(());
        for (idx, job) in jobs.into_iter().enumerate() {
            let tx = tx.clone();
            let cancelled = cancelled.clone();
            submitted = self.submit(move || {
                if cancelled.load(Ordering::Acquire) {
                    return;
                }
                let outcome = panic::catch_unwind(AssertUnwindSafe(job)).unwrap_or_else(|_| {
                    Err(BenchError::MiningFailure(format!("executor task {} panicked", idx)))
                });
                let _ = tx.send((idx, outcome));
            });
            if submitted.is_err() {
                break;
            }
        }
        drop(tx);

        let gathered = submitted.and_then(|()| Self::gather(&rx, expected, deadline));
        if gathered.is_err() {
            cancelled.store(true, Ordering::Release);
            // every task holds a sender; disconnection means none is left
            while rx.recv().is_ok() {}
        }
        gathered
    }

    fn gather<T>(
        rx: &Receiver<(usize, BenchResult<T>)>,
        expected: usize,
        deadline: Option<Deadline>,
    ) -> BenchResult<Vec<T>> {
        let until = deadline.and_then(|d| d.at().map(|at| (d, at)));
        let mut slots: Vec<Option<T>> = (0..expected).map(|_| None).collect();
        for _ in 0..expected {
            let (idx, outcome) = match until {
                Some((d, at)) => match rx.recv_deadline(at) {
                    Ok(msg) => msg,
                    Err(RecvTimeoutError::Timeout) => return Err(d.error()),
                    Err(RecvTimeoutError::Disconnected) => return Err(lost_tasks()),
                },
                None => rx.recv().map_err(|_| lost_tasks())?,
            };
            slots[idx] = Some(outcome?);
        }

        slots
            .into_iter()
            .map(|slot| slot.ok_or_else(lost_tasks))
            .collect()
    }
}

fn lost_tasks() -> BenchError {
    BenchError::BackendUnavailable("cluster session dropped queued tasks".into())
}

/// A running cluster session
pub struct ClusterSession {
    config: SessionConfig,
    handle: SessionHandle,
    workers: Vec<JoinHandle<()>>,
}

impl ClusterSession {
    /// Spawn the executors.
    pub fn start(config: SessionConfig) -> BenchResult<Self> {
        let (sender, receiver) = bounded(config.queue_depth);
        let metrics = Arc::new(SessionMetrics::default());
        let shutdown = Arc::new(Mutex::new(false));

        let mut workers = Vec::with_capacity(config.num_executors);
        for i in 0..config.num_executors {
            let exec_receiver = receiver.clone();
            let exec_metrics = metrics.clone();
            let exec_shutdown = shutdown.clone();
            let name = format!("{}-exec-{}", config.app_name, i);

            let spawned = thread::Builder::new()
                .name(name)
                .stack_size(config.stack_size)
                .spawn(move || Self::executor_loop(exec_receiver, exec_metrics, exec_shutdown));
            match spawned {
                Ok(worker) => workers.push(worker),
                Err(e) => {
                    *shutdown.lock() = true;
                    for worker in workers {
                        let _ = worker.join();
                    }
                    return Err(BenchError::BackendUnavailable(format!(
                        "failed to spawn executor: {}",
                        e
                    )));
                }
            }
        }

        tracing::info!(
            app = %config.app_name,
            executors = config.num_executors,
            "cluster session started"
        );

        Ok(Self {
            handle: SessionHandle {
                sender,
                metrics,
                shutdown,
                executors: config.num_executors,
            },
            config,
            workers,
        })
    }

    /// Executor thread main loop
    fn executor_loop(
        receiver: Receiver<Task>,
        metrics: Arc<SessionMetrics>,
        shutdown: Arc<Mutex<bool>>,
    ) {
        loop {
            if *shutdown.lock() {
                break;
            }

            match receiver.recv_timeout(Duration::from_millis(50)) {
                Ok(task) => {
                    let start = Instant::now();

                    if panic::catch_unwind(AssertUnwindSafe(task)).is_err() {
                        metrics.tasks_panicked.fetch_add(1, Ordering::Relaxed);
                    }

                    metrics.record_execution(start.elapsed());
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
    }

    pub fn handle(&self) -> SessionHandle {
        self.handle.clone()
    }

    /// Stop accepting work and join every executor. Idempotent.
    ///
    /// Blocks until tasks already running finish; queued tasks are dropped.
    pub fn shutdown(&mut self) {
        *self.handle.shutdown.lock() = true;
        if self.workers.is_empty() {
            return;
        }
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
        let metrics = &self.handle.metrics;
        tracing::info!(
            app = %self.config.app_name,
            tasks = metrics.tasks_completed.load(Ordering::Relaxed),
            panicked = metrics.tasks_panicked.load(Ordering::Relaxed),
            busy_ms = metrics.total_exec_time_us.load(Ordering::Relaxed) / 1000,
            longest_task_ms = metrics.max_exec_time_us.load(Ordering::Relaxed) / 1000,
            "cluster session stopped"
        );
    }
}

impl Drop for ClusterSession {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Run `f` with a freshly started session, shutting it down afterwards
/// whether `f` succeeds, fails or panics.
pub fn with_session<T>(
    config: SessionConfig,
    f: impl FnOnce(&ClusterSession) -> BenchResult<T>,
) -> BenchResult<T> {
    let mut session = ClusterSession::start(config)?;
    let result = f(&session);
    session.shutdown();
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn small() -> SessionConfig {
        SessionConfig::new("test", 2)
    }

    #[test]
    fn test_run_all_preserves_job_order() {
        let session = ClusterSession::start(small()).unwrap();
        let jobs: Vec<_> = (0..16u64)
            .map(|i| {
                move || {
                    thread::sleep(Duration::from_millis(16 - i));
                    Ok(i * 10)
                }
            })
            .collect();
        let out = session.handle().run_all(jobs, None).unwrap();
        assert_eq!(out, (0..16u64).map(|i| i * 10).collect::<Vec<_>>());
    }

    #[test]
    fn test_job_error_propagates() {
        let session = ClusterSession::start(small()).unwrap();
        let jobs: Vec<Box<dyn FnOnce() -> BenchResult<u32> + Send>> = vec![
            Box::new(|| Ok(1)),
            Box::new(|| Err(BenchError::MiningFailure("bad shard".into()))),
        ];
        let err = session.handle().run_all(jobs, None).unwrap_err();
        assert!(matches!(err, BenchError::MiningFailure(_)));
    }

    #[test]
    fn test_panicking_job_is_mining_failure() {
        let session = ClusterSession::start(small()).unwrap();
        let jobs = vec![|| -> BenchResult<u32> { panic!("boom") }];
        let err = session.handle().run_all(jobs, None).unwrap_err();
        assert!(matches!(err, BenchError::MiningFailure(_)));
        // executors survive the panic
        let ok = session.handle().run_all(vec![|| Ok(7u32)], None).unwrap();
        assert_eq!(ok, vec![7]);
    }

    #[test]
    fn test_deadline_yields_timeout() {
        let session = ClusterSession::start(small()).unwrap();
        let deadline = Deadline::new(Instant::now(), Duration::from_millis(20));
        let jobs = vec![|| {
            thread::sleep(Duration::from_millis(300));
            Ok(())
        }];
        let err = session.handle().run_all(jobs, Some(deadline)).unwrap_err();
        assert!(matches!(err, BenchError::RepetitionTimeout { .. }));
    }

    #[test]
    fn test_timed_out_batch_leaves_executors_free() {
        let session = ClusterSession::start(SessionConfig::new("test", 1)).unwrap();
        let handle = session.handle();
        let ran = Arc::new(AtomicUsize::new(0));
        let jobs: Vec<_> = (0..3)
            .map(|_| {
                let ran = ran.clone();
                move || {
                    ran.fetch_add(1, Ordering::SeqCst);
                    thread::sleep(Duration::from_millis(150));
                    Ok(())
                }
            })
            .collect();

        let deadline = Deadline::new(Instant::now(), Duration::from_millis(20));
        let err = handle.run_all(jobs, Some(deadline)).unwrap_err();
        assert!(matches!(err, BenchError::RepetitionTimeout { .. }));
        // the running job finished, the queued ones were skipped
        assert_eq!(ran.load(Ordering::SeqCst), 1);

        let start = Instant::now();
        handle.run_all(vec![|| Ok(1u32)], None).unwrap();
        assert!(start.elapsed() < Duration::from_millis(100), "{:?}", start.elapsed());
    }

    #[test]
    fn test_unrepresentable_deadline_waits_unbounded() {
        let session = ClusterSession::start(small()).unwrap();
        let deadline = Deadline::new(Instant::now(), Duration::MAX);
        let out = session.handle().run_all(vec![|| Ok(3u8)], Some(deadline)).unwrap();
        assert_eq!(out, vec![3]);
    }

    #[test]
    fn test_wait_idle_after_submit() {
        let session = ClusterSession::start(small()).unwrap();
        let handle = session.handle();
        handle
            .submit(|| thread::sleep(Duration::from_millis(30)))
            .unwrap();
        handle.wait_idle();
        assert!(handle.is_idle());
    }

    #[test]
    fn test_submit_after_shutdown_is_unavailable() {
        let mut session = ClusterSession::start(small()).unwrap();
        let handle = session.handle();
        session.shutdown();
        session.shutdown();
        assert!(!handle.is_active());
        assert!(matches!(
            handle.submit(|| {}),
            Err(BenchError::BackendUnavailable(_))
        ));
    }

    #[test]
    fn test_with_session_releases_on_error() {
        let mut leaked = None;
        let result: BenchResult<()> = with_session(small(), |s| {
            leaked = Some(s.handle());
            Err(BenchError::Config("abort".into()))
        });
        assert!(result.is_err());
        assert!(!leaked.unwrap().is_active());
    }

    #[test]
    fn test_metrics_count_completed_tasks() {
        let session = ClusterSession::start(small()).unwrap();
        let handle = session.handle();
        let jobs: Vec<_> = (0..2).map(|_| || Ok(())).collect();
        handle.run_all(jobs, None).unwrap();
        assert_eq!(handle.metrics().tasks_submitted.load(Ordering::Relaxed), 2);
        // the result is sent before the executor records completion
        thread::sleep(Duration::from_millis(50));
        assert_eq!(handle.metrics().tasks_completed.load(Ordering::Relaxed), 2);
    }
}
