use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use log::{debug, error, info, warn};

use super::timer::{run_timer, Delayed};
use crate::error::QueueError;
use crate::queue::{
    dispatch, start_chord, ChordRegistry, TaskEnvelope, TaskHandler, TaskOutcome, TaskQueue,
};

/// State shared by the pool handle, its workers and the timer.
struct PoolShared {
    task_sender: Sender<TaskEnvelope>,
    timer_sender: Sender<Delayed>,
    chords: ChordRegistry,
    shutdown: Arc<AtomicBool>,
    /// Tasks queued, delayed or running.
    outstanding: AtomicUsize,
    idle_lock: Mutex<()>,
    idle: Condvar,
}

impl PoolShared {
    fn accept(&self) -> Result<(), QueueError> {
        if self.shutdown.load(Ordering::Relaxed) {
            return Err(QueueError::ShuttingDown);
        }
        self.outstanding.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn finish_one(&self) {
        if self.outstanding.fetch_sub(1, Ordering::SeqCst) == 1 {
            let _guard = self.idle_lock.lock().unwrap_or_else(PoisonError::into_inner);
            self.idle.notify_all();
        }
    }
}

impl TaskQueue for PoolShared {
    fn schedule(&self, envelope: TaskEnvelope) -> Result<(), QueueError> {
        self.accept()?;
        self.task_sender.send(envelope).map_err(|_| {
            self.finish_one();
            QueueError::ChannelClosed
        })
    }

    fn schedule_after(&self, envelope: TaskEnvelope, delay: Duration) -> Result<(), QueueError> {
        if delay.is_zero() {
            return self.schedule(envelope);
        }
        self.accept()?;
        let delayed = Delayed {
            due: Instant::now() + delay,
            envelope,
        };
        self.timer_sender.send(delayed).map_err(|_| {
            self.finish_one();
            QueueError::ChannelClosed
        })
    }

    fn chord(
        &self,
        members: Vec<TaskEnvelope>,
        continuation: TaskEnvelope,
    ) -> Result<(), QueueError> {
        start_chord(self, &self.chords, members, continuation)
    }
}

/// In-process queue: N worker threads over an unbounded crossbeam channel,
/// plus a timer thread for delayed deliveries.
pub struct WorkerPool {
    shared: Arc<PoolShared>,
    workers: Vec<JoinHandle<()>>,
    timer: Option<JoinHandle<()>>,
}

impl WorkerPool {
    /// Starts `worker_count` workers running `handler`.
    ///
    /// # Panics
    /// Panics if `worker_count` is 0.
    pub fn new(handler: Arc<dyn TaskHandler>, worker_count: usize) -> Result<Self, QueueError> {
        assert!(worker_count > 0, "worker_count must be > 0");

        let (task_sender, task_receiver) = unbounded::<TaskEnvelope>();
        let (timer_sender, timer_receiver) = unbounded::<Delayed>();
        let shutdown = Arc::new(AtomicBool::new(false));

        let shared = Arc::new(PoolShared {
            task_sender: task_sender.clone(),
            timer_sender,
            chords: ChordRegistry::new(),
            shutdown: Arc::clone(&shutdown),
            outstanding: AtomicUsize::new(0),
            idle_lock: Mutex::new(()),
            idle: Condvar::new(),
        });

        let mut pool = Self {
            shared,
            workers: Vec::with_capacity(worker_count),
            timer: None,
        };

        let timer_flag = Arc::clone(&shutdown);
        let timer = thread::Builder::new()
            .name("quizgen-timer".to_string())
            .spawn(move || run_timer(timer_receiver, task_sender, timer_flag))
            .map_err(|e| QueueError::SpawnFailed(e.to_string()))?;
        pool.timer = Some(timer);

        for worker_id in 0..worker_count {
            let receiver = task_receiver.clone();
            let shared = Arc::clone(&pool.shared);
            let handler = Arc::clone(&handler);

            let spawned = thread::Builder::new()
                .name(format!("quizgen-worker-{}", worker_id))
                .spawn(move || run_worker(worker_id, receiver, shared, handler));

            match spawned {
                Ok(handle) => pool.workers.push(handle),
                Err(e) => {
                    pool.shutdown();
                    pool.join_all();
                    return Err(QueueError::SpawnFailed(e.to_string()));
                }
            }
        }

        info!("Started {} workers", worker_count);

        Ok(pool)
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    /// Tasks queued, delayed or running.
    pub fn outstanding(&self) -> usize {
        self.shared.outstanding.load(Ordering::SeqCst)
    }

    /// Blocks until no task is queued, delayed or running, or until
    /// `timeout` passes. Returns `true` if the pool went idle.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut guard = self
            .shared
            .idle_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        loop {
            if self.outstanding() == 0 {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            guard = self
                .shared
                .idle
                .wait_timeout(guard, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
    }

    pub fn shutdown(&self) {
        info!("Shutting down worker pool...");
        self.shared.shutdown.store(true, Ordering::Relaxed);
    }

    pub fn is_shutdown(&self) -> bool {
        self.shared.shutdown.load(Ordering::Relaxed)
    }

    /// Stops the pool and joins every thread. Queued and delayed tasks that
    /// have not started are dropped.
    pub fn wait(mut self) {
        self.shutdown();
        self.join_all();
        info!("All workers have stopped");
    }

    fn join_all(&mut self) {
        for (i, worker) in self.workers.drain(..).enumerate() {
            if let Err(e) = worker.join() {
                error!("Worker {} panicked: {:?}", i, e);
            } else {
                debug!("Worker {} finished", i);
            }
        }
        if let Some(timer) = self.timer.take() {
            if timer.join().is_err() {
                error!("Timer thread panicked");
            }
        }
    }
}

impl TaskQueue for WorkerPool {
    fn schedule(&self, envelope: TaskEnvelope) -> Result<(), QueueError> {
        self.shared.schedule(envelope)
    }

    fn schedule_after(&self, envelope: TaskEnvelope, delay: Duration) -> Result<(), QueueError> {
        self.shared.schedule_after(envelope, delay)
    }

    fn chord(
        &self,
        members: Vec<TaskEnvelope>,
        continuation: TaskEnvelope,
    ) -> Result<(), QueueError> {
        self.shared.chord(members, continuation)
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

fn run_worker(
    worker_id: usize,
    receiver: Receiver<TaskEnvelope>,
    shared: Arc<PoolShared>,
    handler: Arc<dyn TaskHandler>,
) {
    debug!("Worker {} started", worker_id);

    loop {
        if shared.shutdown.load(Ordering::Relaxed) {
            debug!("Worker {} received shutdown signal", worker_id);
            break;
        }

        match receiver.recv_timeout(Duration::from_millis(100)) {
            Ok(envelope) => {
                debug!(
                    "Worker {} running {} (attempt {})",
                    worker_id,
                    envelope.task.kind(),
                    envelope.attempt
                );

                let run = panic::catch_unwind(AssertUnwindSafe(|| handler.handle(&envelope)));
                let outcome = match run {
                    Ok(outcome) => outcome,
                    Err(payload) => {
                        let message = panic_message(payload.as_ref());
                        error!(
                            "Worker {} task {} panicked: {}",
                            worker_id, envelope.id, message
                        );
                        TaskOutcome::failed(format!("task panicked: {}", message))
                    }
                };

                if let Err(e) = dispatch(shared.as_ref(), &shared.chords, &envelope, outcome) {
                    warn!(
                        "Worker {} could not apply outcome of task {}: {}",
                        worker_id, envelope.id, e
                    );
                }
                shared.finish_one();
            }
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => {
                debug!("Worker {} task channel disconnected", worker_id);
                break;
            }
        }
    }

    debug!("Worker {} stopped", worker_id);
}
