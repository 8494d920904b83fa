//! Transition scheduling.
//!
//! Precomputes the wall-clock instants at which each step completes so a host
//! can arrange to be woken exactly then. Hosts without reliable wake-ups can
//! poll instead, see [`latest_due`].

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use super::record::SessionRecord;
use super::schedule::Millis;

/// The moment step `step_index` completes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TransitionInstant {
    pub at_ms: Millis,
    pub step_index: usize,
}

/// One instant per step, strictly increasing.
pub fn transition_instants(record: &SessionRecord) -> Vec<TransitionInstant> {
    let mut at_ms = record.start_time_ms;
    record
        .timeline
        .steps()
        .iter()
        .enumerate()
        .map(|(step_index, step)| {
            at_ms = at_ms.saturating_add(step.duration_ms());
            TransitionInstant { at_ms, step_index }
        })
        .collect()
}

/// Instants that still lie ahead of `now` (inclusive). Used when re-arming a
/// rehydrated session; instants strictly in the past are skipped.
pub fn pending_instants(record: &SessionRecord, now: Millis) -> Vec<TransitionInstant> {
    transition_instants(record)
        .into_iter()
        .filter(|t| t.at_ms >= now)
        .collect()
}

/// The most recent instant at or before `now`, if any.
pub fn latest_due(record: &SessionRecord, now: Millis) -> Option<TransitionInstant> {
    transition_instants(record)
        .into_iter()
        .take_while(|t| t.at_ms <= now)
        .last()
}

/// Host wake-up facility. Implementations arrange for the session service's
/// transition callback to run at or after each armed instant.
pub trait TransitionTimer {
    fn arm(&mut self, instant: TransitionInstant);
    fn cancel_all(&mut self);
}

/// In-process timer: an ordered queue of armed instants that a host loop
/// drains as wall-clock time passes.
#[derive(Debug, Default, Clone)]
pub struct AlarmQueue {
    armed: BTreeSet<TransitionInstant>,
}

impl AlarmQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.armed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.armed.is_empty()
    }

    pub fn next_deadline(&self) -> Option<Millis> {
        self.armed.first().map(|t| t.at_ms)
    }

    /// Remove and return every instant due at `now`, earliest first.
    pub fn pop_due(&mut self, now: Millis) -> Vec<TransitionInstant> {
        let mut due = Vec::new();
        while let Some(first) = self.armed.first().copied() {
            if first.at_ms > now {
                break;
            }
            self.armed.remove(&first);
            due.push(first);
        }
        due
    }
}

impl TransitionTimer for AlarmQueue {
    fn arm(&mut self, instant: TransitionInstant) {
        self.armed.insert(instant);
    }

    fn cancel_all(&mut self) {
        self.armed.clear();
    }
}
