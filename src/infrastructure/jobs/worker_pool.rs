//! Worker Pool
//!
//! Bounded pool that executes job closures on the shared runtime. A
//! semaphore caps concurrency at `MAX_JOB_WORKERS`; submissions beyond the
//! cap queue in FIFO order, which is the backpressure controllers feel
//! when the pool is saturated.
//!
//! The pool is shared across jobs, not per-job. Cancellation is
//! cooperative: a queued closure is dropped before it starts, a running
//! closure observes its `CancellationToken` at its own checkpoints.

use once_cell::sync::OnceCell;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{Notify, Semaphore};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Handle to one submitted closure
///
/// Await `join` for the closure's output; `None` means the closure was
/// cancelled before it started (or the task was aborted).
pub struct WorkerHandle<T> {
    id: u64,
    job_id: String,
    token: CancellationToken,
    join: JoinHandle<Option<T>>,
}

impl<T> WorkerHandle<T> {
    /// The job this closure belongs to
    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    /// The cancellation token observed by the closure
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Waits for the closure to settle
    pub async fn join(self) -> Option<T> {
        match self.join.await {
            Ok(result) => result,
            Err(e) => {
                warn!("Worker task for job {} aborted: {}", self.job_id, e);
                None
            }
        }
    }
}

/// Bounded worker pool
pub struct WorkerPool {
    capacity: usize,
    semaphore: Arc<Semaphore>,
    /// handle id -> job id, for closures that hold a permit right now
    running: Arc<Mutex<HashMap<u64, String>>>,
    /// submitted-but-unsettled closure count, for shutdown draining
    outstanding: Arc<Mutex<usize>>,
    drained: Arc<Notify>,
    next_id: AtomicU64,
    shutdown: CancellationToken,
}

impl WorkerPool {
    /// Creates a pool with the given capacity
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        info!("Creating worker pool with {} slots", capacity);
        Self {
            capacity,
            semaphore: Arc::new(Semaphore::new(capacity)),
            running: Arc::new(Mutex::new(HashMap::new())),
            outstanding: Arc::new(Mutex::new(0)),
            drained: Arc::new(Notify::new()),
            next_id: AtomicU64::new(1),
            shutdown: CancellationToken::new(),
        }
    }

    /// Pool capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of closures currently holding a slot
    pub fn running_count(&self) -> usize {
        self.running.lock().expect("worker pool poisoned").len()
    }

    /// Job ids of currently-running closures
    pub fn active(&self) -> Vec<String> {
        let running = self.running.lock().expect("worker pool poisoned");
        let mut ids: Vec<String> = running.values().cloned().collect();
        ids.sort();
        ids.dedup();
        ids
    }

    /// Submits a closure for execution
    ///
    /// The closure starts when a slot frees up, in submission order. It
    /// receives a `CancellationToken` to observe at its checkpoints.
    pub fn submit<T, F, Fut>(self: &Arc<Self>, job_id: impl Into<String>, f: F) -> WorkerHandle<T>
    where
        T: Send + 'static,
        F: FnOnce(CancellationToken) -> Fut + Send + 'static,
        Fut: std::future::Future<Output = T> + Send + 'static,
    {
        let job_id = job_id.into();
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let token = self.shutdown.child_token();

        *self.outstanding.lock().expect("worker pool poisoned") += 1;

        let semaphore = self.semaphore.clone();
        let running = self.running.clone();
        let outstanding = self.outstanding.clone();
        let drained = self.drained.clone();
        let task_token = token.clone();
        let task_job_id = job_id.clone();

        let join = tokio::spawn(async move {
            let result = Self::run_slot(
                semaphore, running, id, task_job_id, task_token, f,
            )
            .await;

            let remaining = {
                let mut count = outstanding.lock().expect("worker pool poisoned");
                *count -= 1;
                *count
            };
            if remaining == 0 {
                drained.notify_waiters();
            }
            result
        });

        WorkerHandle {
            id,
            job_id,
            token,
            join,
        }
    }

    async fn run_slot<T, F, Fut>(
        semaphore: Arc<Semaphore>,
        running: Arc<Mutex<HashMap<u64, String>>>,
        id: u64,
        job_id: String,
        token: CancellationToken,
        f: F,
    ) -> Option<T>
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: std::future::Future<Output = T>,
    {
        // Queued: wait for a slot unless cancelled first. The semaphore is
        // FIFO, so submission order is dispatch order.
        let permit = tokio::select! {
            permit = semaphore.acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => {
                    debug!("Worker pool closed while job {} was queued", job_id);
                    return None;
                }
            },
            _ = token.cancelled() => {
                debug!("Job {} closure cancelled while queued", job_id);
                return None;
            }
        };

        running
            .lock()
            .expect("worker pool poisoned")
            .insert(id, job_id.clone());

        let result = f(token).await;

        running.lock().expect("worker pool poisoned").remove(&id);
        drop(permit);
        Some(result)
    }

    /// Cancels a submitted closure
    ///
    /// Returns true when the closure had not started running; a running
    /// closure is signalled cooperatively instead and keeps its slot until
    /// it observes the token.
    pub fn cancel<T>(&self, handle: &WorkerHandle<T>) -> bool {
        handle.token.cancel();
        !self
            .running
            .lock()
            .expect("worker pool poisoned")
            .contains_key(&handle.id)
    }

    /// Shuts the pool down
    ///
    /// With `wait`, blocks until all submitted closures settle (bounded by
    /// `timeout` when given). Without `wait`, pending closures are
    /// cancelled and running ones are signalled. Returns true when the
    /// pool fully drained.
    pub async fn shutdown(&self, wait: bool, timeout: Option<Duration>) -> bool {
        if !wait {
            info!("Aborting worker pool");
            self.shutdown.cancel();
        } else {
            info!("Draining worker pool");
        }

        let drain = async {
            loop {
                let notified = self.drained.notified();
                if *self.outstanding.lock().expect("worker pool poisoned") == 0 {
                    return;
                }
                notified.await;
            }
        };

        let drained = match timeout {
            Some(timeout) => tokio::time::timeout(timeout, drain).await.is_ok(),
            None => {
                drain.await;
                true
            }
        };
        if !drained {
            warn!("Worker pool shutdown timed out with closures outstanding");
        }
        drained
    }
}

/// Lazily created process-wide pool
static POOL: OnceCell<Arc<WorkerPool>> = OnceCell::new();

/// Accessor for the shared worker pool
///
/// The first caller fixes the capacity; later callers get the same pool.
pub fn global_worker_pool(capacity: usize) -> Arc<WorkerPool> {
    POOL.get_or_init(|| Arc::new(WorkerPool::new(capacity))).clone()
}
