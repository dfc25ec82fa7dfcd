use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

use super::TaskEnvelope;

/// Result of opening a chord.
#[derive(Debug)]
pub enum ChordStart {
    /// No members: run the continuation now.
    Immediate(TaskEnvelope),
    /// Members tagged with the chord id, ready to schedule.
    Started {
        chord_id: String,
        members: Vec<TaskEnvelope>,
    },
}

struct PendingChord {
    pending: HashSet<String>,
    continuation: TaskEnvelope,
}

/// Fan-in barriers. Tracks which members of each chord have not settled yet
/// and hands out the continuation when the last one does.
#[derive(Default)]
pub struct ChordRegistry {
    chords: Mutex<HashMap<String, PendingChord>>,
}

impl ChordRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, PendingChord>> {
        self.chords.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn open(&self, members: Vec<TaskEnvelope>, continuation: TaskEnvelope) -> ChordStart {
        if members.is_empty() {
            return ChordStart::Immediate(continuation);
        }

        let chord_id = uuid::Uuid::new_v4().to_string();
        let members: Vec<TaskEnvelope> = members
            .into_iter()
            .map(|mut member| {
                member.chord = Some(chord_id.clone());
                member
            })
            .collect();
        let pending = members.iter().map(|m| m.id.clone()).collect();

        self.lock().insert(
            chord_id.clone(),
            PendingChord {
                pending,
                continuation,
            },
        );

        ChordStart::Started { chord_id, members }
    }

    /// Records that `member_id` settled. Returns the continuation exactly
    /// once, on the report that empties the chord. Repeated reports for the
    /// same member are ignored.
    pub fn complete(&self, chord_id: &str, member_id: &str) -> Option<TaskEnvelope> {
        let mut chords = self.lock();
        let chord = chords.get_mut(chord_id)?;
        if !chord.pending.remove(member_id) {
            return None;
        }
        if !chord.pending.is_empty() {
            return None;
        }
        chords.remove(chord_id).map(|c| c.continuation)
    }

    /// Members of `chord_id` that have not settled, or `None` once it fired.
    pub fn pending(&self, chord_id: &str) -> Option<usize> {
        self.lock().get(chord_id).map(|c| c.pending.len())
    }

    /// Number of chords still waiting.
    pub fn open_count(&self) -> usize {
        self.lock().len()
    }
}
