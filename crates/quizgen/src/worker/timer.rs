use std::cmp::{Ordering as CmpOrdering, Reverse};
use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use log::{debug, error};

use crate::queue::TaskEnvelope;

const IDLE_TICK: Duration = Duration::from_millis(100);

/// A task waiting for its due time.
pub(crate) struct Delayed {
    pub due: Instant,
    pub envelope: TaskEnvelope,
}

struct Entry {
    due: Instant,
    seq: u64,
    envelope: TaskEnvelope,
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.due == other.due && self.seq == other.seq
    }
}

impl Eq for Entry {}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl Ord for Entry {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        (self.due, self.seq).cmp(&(other.due, other.seq))
    }
}

/// Holds delayed tasks and forwards each to `ready` once it is due. Tasks
/// with the same due time keep submission order.
pub(crate) fn run_timer(
    incoming: Receiver<Delayed>,
    ready: Sender<TaskEnvelope>,
    shutdown: Arc<AtomicBool>,
) {
    debug!("Timer started");

    let mut heap: BinaryHeap<Reverse<Entry>> = BinaryHeap::new();
    let mut seq = 0u64;

    loop {
        if shutdown.load(Ordering::Relaxed) {
            debug!("Timer received shutdown signal ({} tasks dropped)", heap.len());
            break;
        }

        let now = Instant::now();
        while heap.peek().is_some_and(|Reverse(entry)| entry.due <= now) {
            if let Some(Reverse(entry)) = heap.pop() {
                if ready.send(entry.envelope).is_err() {
                    error!("Timer could not deliver task: worker channel closed");
                    return;
                }
            }
        }

        let wait = heap
            .peek()
            .map(|Reverse(entry)| entry.due.saturating_duration_since(now))
            .unwrap_or(IDLE_TICK)
            .min(IDLE_TICK);

        match incoming.recv_timeout(wait) {
            Ok(delayed) => {
                heap.push(Reverse(Entry {
                    due: delayed.due,
                    seq,
                    envelope: delayed.envelope,
                }));
                seq += 1;
            }
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => {
                debug!("Timer channel disconnected");
                break;
            }
        }
    }

    debug!("Timer stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::Task;
    use crossbeam_channel::unbounded;

    fn envelope(job: &str) -> TaskEnvelope {
        TaskEnvelope::new(Task::Finalize {
            job_id: job.to_string(),
        })
    }

    #[test]
    fn test_delivers_in_due_order() {
        let (in_tx, in_rx) = unbounded();
        let (out_tx, out_rx) = unbounded();
        let shutdown = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&shutdown);
        let handle = std::thread::spawn(move || run_timer(in_rx, out_tx, flag));

        let now = Instant::now();
        in_tx
            .send(Delayed {
                due: now + Duration::from_millis(120),
                envelope: envelope("late"),
            })
            .unwrap();
        in_tx
            .send(Delayed {
                due: now + Duration::from_millis(30),
                envelope: envelope("early"),
            })
            .unwrap();

        let first = out_rx.recv_timeout(Duration::from_secs(2)).unwrap();
        let second = out_rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!(first.task.job_id(), "early");
        assert_eq!(second.task.job_id(), "late");
        assert!(Instant::now() >= now + Duration::from_millis(120));

        shutdown.store(true, Ordering::Relaxed);
        handle.join().unwrap();
    }
}
