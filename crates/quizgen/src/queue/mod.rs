//! Task queue substrate.
//!
//! Handlers return a [`TaskOutcome`] describing what should happen next;
//! [`dispatch`] applies it through a [`TaskQueue`]. Fan-in is a chord: a set
//! of member tasks and a continuation that runs once after every member has
//! settled, successfully or not.

use std::time::Duration;

use crate::error::QueueError;

pub mod chord;
pub mod manual;
pub mod task;

pub use chord::{ChordRegistry, ChordStart};
pub use manual::ManualQueue;
pub use task::{OutcomeKind, Task, TaskEnvelope, TaskOutcome};

/// Delivery primitives a substrate provides.
pub trait TaskQueue: Send + Sync {
    fn schedule(&self, envelope: TaskEnvelope) -> Result<(), QueueError>;

    fn schedule_after(&self, envelope: TaskEnvelope, delay: Duration) -> Result<(), QueueError>;

    /// Schedules `members` and runs `continuation` after all of them have
    /// settled. With no members the continuation is scheduled right away.
    fn chord(
        &self,
        members: Vec<TaskEnvelope>,
        continuation: TaskEnvelope,
    ) -> Result<(), QueueError>;
}

/// Executes tasks. Implementations block the calling thread.
pub trait TaskHandler: Send + Sync {
    fn handle(&self, envelope: &TaskEnvelope) -> TaskOutcome;
}

/// Opens a chord in `chords` and schedules its members on `queue`.
pub fn start_chord(
    queue: &dyn TaskQueue,
    chords: &ChordRegistry,
    members: Vec<TaskEnvelope>,
    continuation: TaskEnvelope,
) -> Result<(), QueueError> {
    match chords.open(members, continuation) {
        ChordStart::Immediate(continuation) => queue.schedule(continuation),
        ChordStart::Started { chord_id, members } => {
            log::debug!("Chord {} started with {} members", chord_id, members.len());
            for member in members {
                queue.schedule(member)?;
            }
            Ok(())
        }
    }
}

/// Applies the outcome of `envelope` to the queue.
///
/// A retry keeps the task id and chord membership, so the barrier waits for
/// the retried task. A settled task reports to its chord and, when it was
/// the last member, schedules the continuation.
pub fn dispatch(
    queue: &dyn TaskQueue,
    chords: &ChordRegistry,
    envelope: &TaskEnvelope,
    outcome: TaskOutcome,
) -> Result<(), QueueError> {
    match outcome {
        TaskOutcome::Retry { delay } => queue.schedule_after(envelope.next_attempt(), delay),
        TaskOutcome::FanOut {
            members,
            continuation,
        } => queue.chord(members, continuation),
        TaskOutcome::Succeeded | TaskOutcome::Failed { .. } => {
            let Some(chord_id) = envelope.chord.as_deref() else {
                return Ok(());
            };
            match chords.complete(chord_id, &envelope.id) {
                Some(continuation) => {
                    log::debug!(
                        "Chord {} complete, scheduling {}",
                        chord_id,
                        continuation.task.kind()
                    );
                    queue.schedule(continuation)
                }
                None => Ok(()),
            }
        }
    }
}
