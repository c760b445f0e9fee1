//! Task executors and the placement pool.
//!
//! An [`Executor`] is how the server partitions accept handling,
//! per-connection I/O and user handler execution onto separate lanes of the
//! runtime. It accepts work in two ways: [`execute`](Executor::execute)
//! queues a task behind a fixed set of workers draining a shared FIFO, and
//! [`spawn`](Executor::spawn) runs a task on the runtime directly, tied to
//! the executor's lifetime but never occupying a queue worker. Queued tasks
//! suit short completions; spawned tasks suit loops that live as long as a
//! socket does. A faulting queued task is contained to itself: the worker
//! logs the panic and keeps draining.
//!
//! An [`ExecutorPool`] holds several independent executors and places work
//! either round-robin or keyed, so that all work for one key lands on the
//! same executor.

use std::collections::hash_map::DefaultHasher;
use std::future::Future;
use std::hash::{Hash, Hasher};
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;
use tokio::sync::{mpsc, oneshot, Mutex, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

type Job = BoxFuture<'static, ()>;

/// A FIFO task queue drained by a fixed number of workers, plus the
/// free-running tasks spawned through it.
pub struct Executor {
    queue: mpsc::UnboundedSender<Job>,
    shared: Arc<Shared>,
    workers: std::sync::Mutex<Vec<JoinHandle<()>>>,
    tasks: std::sync::Mutex<Vec<JoinHandle<()>>>,
}

struct Shared {
    jobs: Mutex<mpsc::UnboundedReceiver<Job>>,
    shutdown: Notify,
    stopped: AtomicBool,
}

impl Executor {
    /// Starts an executor with `worker_count` background workers.
    ///
    /// With zero workers nothing is spawned; the owner drives the queue
    /// itself by awaiting [`run`](Executor::run).
    pub fn start(worker_count: usize) -> Self {
        let (queue, jobs) = mpsc::unbounded_channel();
        let shared = Arc::new(Shared {
            jobs: Mutex::new(jobs),
            shutdown: Notify::new(),
            stopped: AtomicBool::new(false),
        });
        let workers = (0..worker_count)
            .map(|worker| tokio::spawn(drain(worker, Arc::clone(&shared))))
            .collect();
        Executor {
            queue,
            shared,
            workers: std::sync::Mutex::new(workers),
            tasks: std::sync::Mutex::new(Vec::new()),
        }
    }

    /// Runs a task on the runtime directly instead of through the queue.
    ///
    /// Spawned tasks run concurrently with each other and with queued work,
    /// so a task that lives as long as a connection does not hold up a queue
    /// worker. They share the executor's lifetime: [`stop`](Executor::stop)
    /// aborts whatever is still running.
    pub fn spawn<F>(&self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if self.shared.stopped.load(Ordering::Acquire) {
            warn!("executor is stopped, dropping task");
            return;
        }
        let mut tasks = self.tasks.lock().expect("executor task list poisoned");
        tasks.retain(|handle| !handle.is_finished());
        tasks.push(tokio::spawn(task));
    }

    /// Enqueues a task. Tasks submitted from one caller run in submission
    /// order whenever the executor has a single worker.
    pub fn execute<F>(&self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if self.shared.stopped.load(Ordering::Acquire) {
            warn!("executor is stopped, dropping task");
            return;
        }
        if self.queue.send(task.boxed()).is_err() {
            warn!("executor queue is closed, dropping task");
        }
    }

    /// Enqueues a task and returns a receiver for its result.
    ///
    /// If the task faults (or the executor stops before running it) the
    /// sender is dropped and the receiver yields an error.
    pub fn execute_with_future<F, T>(&self, task: F) -> oneshot::Receiver<T>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let (result, receiver) = oneshot::channel();
        self.execute(async move {
            let _ = result.send(task.await);
        });
        receiver
    }

    /// Drains the queue on the calling task, for executors started with zero
    /// workers. Returns once [`stop`](Executor::stop) is called.
    pub async fn run(&self) {
        drain(0, Arc::clone(&self.shared)).await;
    }

    /// Signals workers to exit, wakes the queue and joins them. Queued tasks
    /// that have not started are abandoned; spawned tasks are aborted.
    pub async fn stop(&self) {
        if self.shared.stopped.swap(true, Ordering::AcqRel) {
            return;
        }
        self.shared.shutdown.notify_waiters();
        let mut handles: Vec<_> = {
            let mut workers = self.workers.lock().expect("executor worker list poisoned");
            workers.drain(..).collect()
        };
        {
            let mut tasks = self.tasks.lock().expect("executor task list poisoned");
            handles.extend(tasks.drain(..));
        }
        for handle in &handles {
            handle.abort();
        }
        for handle in handles {
            let _ = handle.await;
        }
    }
}

async fn drain(worker: usize, shared: Arc<Shared>) {
    loop {
        if shared.stopped.load(Ordering::Acquire) {
            break;
        }
        // The lock is held only while dequeueing, so sibling workers keep
        // draining while this one runs its job.
        let job = {
            let mut jobs = shared.jobs.lock().await;
            tokio::select! {
                job = jobs.recv() => job,
                _ = shared.shutdown.notified() => None,
            }
        };
        let Some(job) = job else { break };
        if AssertUnwindSafe(job).catch_unwind().await.is_err() {
            error!("executor worker {} caught a panicking task and resumes", worker);
        }
    }
    debug!("executor worker {} finished", worker);
}

/// A set of independent executors with two placement policies.
pub struct ExecutorPool {
    executors: Vec<Executor>,
    current: AtomicUsize,
}

impl ExecutorPool {
    /// Starts `pool_size` executors with `workers_per_executor` workers each.
    pub fn start(pool_size: usize, workers_per_executor: usize) -> Self {
        assert!(pool_size > 0, "executor pool needs at least one executor");
        let executors = (0..pool_size).map(|_| Executor::start(workers_per_executor)).collect();
        ExecutorPool { executors, current: AtomicUsize::new(0) }
    }

    pub fn len(&self) -> usize {
        self.executors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.executors.is_empty()
    }

    /// Round-robin placement.
    pub fn next(&self) -> &Executor {
        let index = self.current.fetch_add(1, Ordering::Relaxed) % self.executors.len();
        &self.executors[index]
    }

    /// Keyed placement: every call with the same key lands on the same
    /// executor.
    pub fn for_key<K: Hash>(&self, key: &K) -> &Executor {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        let index = (hasher.finish() as usize) % self.executors.len();
        &self.executors[index]
    }

    pub fn execute<F>(&self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.next().execute(task);
    }

    pub fn execute_with_future<F, T>(&self, task: F) -> oneshot::Receiver<T>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        self.next().execute_with_future(task)
    }

    pub async fn stop(&self) {
        for executor in &self.executors {
            executor.stop().await;
        }
        self.current.store(0, Ordering::Relaxed);
    }
}
