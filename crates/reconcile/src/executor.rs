//! Worker pool - executes tasks from a bounded queue on a fixed set of workers

use crate::counter::{Ticket, WorkCounter};
use crate::task::BoxedTask;
use crate::types::{EngineError, SyncStats};
use anyhow::Result;
use crossbeam_channel::{Receiver, Sender, bounded};
use log::debug;
use parking_lot::Mutex;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Default number of workers
pub const DEFAULT_WORKERS: usize = 5;

/// Capacity of the task queue. Producers block when it is full.
pub const QUEUE_CAPACITY: usize = 2000;

struct Job {
    task: BoxedTask,
    // Released when the job is dropped, after `run` returns or is skipped.
    _tickets: Vec<Ticket>,
}

/// State shared between the pool handle and its workers
struct Shared {
    outstanding: Arc<WorkCounter>,
    aborted: AtomicBool,
    failure: Mutex<Option<String>>,
    stats: Arc<SyncStats>,
}

impl Shared {
    fn fail(&self, message: String) {
        let mut failure = self.failure.lock();
        if failure.is_none() {
            *failure = Some(message);
        }
        self.aborted.store(true, Ordering::SeqCst);
    }

    fn check(&self) -> Result<()> {
        match self.failure.lock().as_ref() {
            Some(message) => Err(EngineError::Aborted(message.clone()).into()),
            None => Ok(()),
        }
    }
}

/// Fixed-size pool of workers consuming one bounded queue.
///
/// Every submitted task holds a ticket on the pool's outstanding-work
/// counter. The first fatal task error stops execution: queued tasks are
/// drained without running and every later [`submit`](Self::submit) or
/// [`wait`](Self::wait) reports the failure.
pub struct WorkerPool {
    sender: Sender<Job>,
    shared: Arc<Shared>,
    workers: usize,
    // Keeps the worker threads' pool alive for the lifetime of the handle.
    _threads: rayon::ThreadPool,
}

impl WorkerPool {
    /// Start `workers` workers.
    pub fn new(workers: usize, stats: Arc<SyncStats>) -> Result<Self> {
        Self::with_capacity(workers, QUEUE_CAPACITY, stats)
    }

    /// Start `workers` workers on a queue holding at most `capacity` tasks.
    pub fn with_capacity(workers: usize, capacity: usize, stats: Arc<SyncStats>) -> Result<Self> {
        let workers = workers.max(1);
        let threads = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("worker-{i}"))
            .build()
            .map_err(|e| EngineError::PoolCreation(e.to_string()))?;

        let (sender, receiver) = bounded::<Job>(capacity);
        let shared = Arc::new(Shared {
            outstanding: WorkCounter::new(),
            aborted: AtomicBool::new(false),
            failure: Mutex::new(None),
            stats,
        });

        for worker in 0..workers {
            let receiver = receiver.clone();
            let shared = Arc::clone(&shared);
            threads.spawn(move || work(worker, &receiver, &shared));
        }

        Ok(Self {
            sender,
            shared,
            workers,
            _threads: threads,
        })
    }

    /// Number of workers.
    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Number of submitted tasks that have not finished.
    pub fn outstanding(&self) -> usize {
        self.shared.outstanding.pending()
    }

    /// Queue a task. Blocks while the queue is full.
    pub fn submit(&self, task: BoxedTask) -> Result<()> {
        self.enqueue(task, Vec::new())
    }

    /// Queue a task that also holds a ticket on a private barrier.
    pub fn submit_tracked(&self, task: BoxedTask, barrier: &Arc<WorkCounter>) -> Result<()> {
        self.enqueue(task, vec![barrier.ticket()])
    }

    /// Block until a private barrier drains.
    pub fn wait_for(&self, barrier: &WorkCounter) -> Result<()> {
        barrier.wait();
        self.shared.check()
    }

    /// Stop the pool after a fatal error raised outside a task.
    ///
    /// Queued tasks are drained without running, as after a task failure.
    pub fn abort(&self, reason: impl Into<String>) {
        self.shared.fail(reason.into());
    }

    /// Block until every submitted task has finished.
    pub fn wait(&self) -> Result<()> {
        self.shared.outstanding.wait();
        self.shared.check()
    }

    fn enqueue(&self, task: BoxedTask, mut tickets: Vec<Ticket>) -> Result<()> {
        self.shared.check()?;
        // Counted before queueing so a concurrent `wait` never misses it.
        tickets.push(self.shared.outstanding.ticket());
        self.sender
            .send(Job {
                task,
                _tickets: tickets,
            })
            .map_err(|_| EngineError::Disconnected)?;
        Ok(())
    }
}

fn work(worker: usize, receiver: &Receiver<Job>, shared: &Shared) {
    for job in receiver.iter() {
        if shared.aborted.load(Ordering::SeqCst) {
            debug!("Skipping {} after fatal error", job.task.description());
            continue;
        }

        match catch_unwind(AssertUnwindSafe(|| job.task.run(worker))) {
            Ok(Ok(true)) => shared.stats.record_write(),
            Ok(Ok(false)) => {}
            Ok(Err(err)) => shared.fail(format!("{err:#}")),
            Err(_) => shared.fail(EngineError::Panicked(job.task.description()).to_string()),
        }
    }
}
