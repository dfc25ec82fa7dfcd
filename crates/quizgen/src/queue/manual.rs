use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use super::{
    dispatch, start_chord, ChordRegistry, OutcomeKind, TaskEnvelope, TaskHandler, TaskQueue,
};
use crate::error::QueueError;

#[derive(Default)]
struct ManualState {
    ready: VecDeque<TaskEnvelope>,
    delayed: Vec<(TaskEnvelope, Duration)>,
    requested_delays: Vec<Duration>,
    history: Vec<(TaskEnvelope, OutcomeKind)>,
}

/// A queue driven by the caller, one task at a time.
///
/// Nothing runs until the caller asks. Delayed tasks wait until
/// [`release_delayed`](Self::release_delayed) and their requested delays are
/// recorded, which lets ordering and backoff be checked without sleeping.
#[derive(Default)]
pub struct ManualQueue {
    state: Mutex<ManualState>,
    chords: ChordRegistry,
}

impl ManualQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, ManualState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn chords(&self) -> &ChordRegistry {
        &self.chords
    }

    pub fn ready(&self) -> Vec<TaskEnvelope> {
        self.lock().ready.iter().cloned().collect()
    }

    pub fn delayed(&self) -> Vec<(TaskEnvelope, Duration)> {
        self.lock().delayed.clone()
    }

    /// Every delay passed to `schedule_after`, in call order.
    pub fn requested_delays(&self) -> Vec<Duration> {
        self.lock().requested_delays.clone()
    }

    /// Every executed task with the kind of outcome it produced.
    pub fn history(&self) -> Vec<(TaskEnvelope, OutcomeKind)> {
        self.lock().history.clone()
    }

    pub fn is_idle(&self) -> bool {
        let state = self.lock();
        state.ready.is_empty() && state.delayed.is_empty()
    }

    /// Runs `envelope` whether or not it is queued. Used to simulate
    /// duplicate delivery.
    pub fn deliver(
        &self,
        handler: &dyn TaskHandler,
        envelope: TaskEnvelope,
    ) -> Result<OutcomeKind, QueueError> {
        let outcome = handler.handle(&envelope);
        let kind = outcome.kind();
        self.lock().history.push((envelope.clone(), kind));
        dispatch(self, &self.chords, &envelope, outcome)?;
        Ok(kind)
    }

    /// Runs the oldest ready task. `Ok(None)` when nothing is ready.
    pub fn run_next(&self, handler: &dyn TaskHandler) -> Result<Option<OutcomeKind>, QueueError> {
        let next = self.lock().ready.pop_front();
        match next {
            Some(envelope) => self.deliver(handler, envelope).map(Some),
            None => Ok(None),
        }
    }

    /// Runs the first ready task matching `predicate`, leaving the others in
    /// place.
    pub fn run_where<F>(
        &self,
        handler: &dyn TaskHandler,
        predicate: F,
    ) -> Result<Option<OutcomeKind>, QueueError>
    where
        F: Fn(&TaskEnvelope) -> bool,
    {
        let next = {
            let mut state = self.lock();
            state
                .ready
                .iter()
                .position(|e| predicate(e))
                .and_then(|index| state.ready.remove(index))
        };
        match next {
            Some(envelope) => self.deliver(handler, envelope).map(Some),
            None => Ok(None),
        }
    }

    /// Moves every delayed task to the back of the ready list, as if its
    /// delay had elapsed. Returns how many were moved.
    pub fn release_delayed(&self) -> usize {
        let mut state = self.lock();
        let released: Vec<TaskEnvelope> = state.delayed.drain(..).map(|(e, _)| e).collect();
        let count = released.len();
        state.ready.extend(released);
        count
    }

    /// Runs ready tasks, releasing delayed ones whenever the ready list runs
    /// dry, until both are empty. Returns the number of tasks executed.
    pub fn run_until_idle(&self, handler: &dyn TaskHandler) -> Result<usize, QueueError> {
        let mut executed = 0;
        loop {
            if self.run_next(handler)?.is_some() {
                executed += 1;
                continue;
            }
            if self.release_delayed() == 0 {
                return Ok(executed);
            }
        }
    }
}

impl TaskQueue for ManualQueue {
    fn schedule(&self, envelope: TaskEnvelope) -> Result<(), QueueError> {
        self.lock().ready.push_back(envelope);
        Ok(())
    }

    fn schedule_after(&self, envelope: TaskEnvelope, delay: Duration) -> Result<(), QueueError> {
        let mut state = self.lock();
        state.requested_delays.push(delay);
        state.delayed.push((envelope, delay));
        Ok(())
    }

    fn chord(
        &self,
        members: Vec<TaskEnvelope>,
        continuation: TaskEnvelope,
    ) -> Result<(), QueueError> {
        start_chord(self, &self.chords, members, continuation)
    }
}
