//! Session clock.
//!
//! Answers "where are we now" purely from a [`SessionRecord`] and a wall-clock
//! timestamp. There is no cached step index: every call walks the timeline from
//! the start, so the answer is the same in a freshly restarted process as in the
//! one that started the session.

use serde::{Deserialize, Serialize};

use super::record::SessionRecord;
use super::schedule::{Millis, StepType};

/// Position within a session at a given instant. Never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionState {
    pub step_index: usize,
    pub step_type: StepType,
    pub step_start_time_ms: Millis,
    pub step_duration_ms: u64,
}

impl SessionState {
    pub fn remaining_ms(&self, now: Millis) -> u64 {
        self.step_start_time_ms
            .saturating_add(self.step_duration_ms)
            .saturating_sub(now)
    }

    pub fn snapshot(&self, now: Millis) -> SessionSnapshot {
        SessionSnapshot {
            step_index: self.step_index,
            step_type: self.step_type,
            remaining_ms: self.remaining_ms(now),
            step_total_ms: self.step_duration_ms,
        }
    }
}

/// Answer to a state query, as handed to hosts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub step_index: usize,
    pub step_type: StepType,
    pub remaining_ms: u64,
    pub step_total_ms: u64,
}

impl SessionSnapshot {
    /// e.g. `Zazen · 4:59`
    pub fn status_line(&self) -> String {
        format!(
            "{} · {}",
            self.step_type.label(),
            format_remaining(self.remaining_ms)
        )
    }
}

/// Compute the session state at `now`.
///
/// Returns `None` when there is no record or the last step has ended.
/// A `now` before the session start is treated as the very start of the first
/// step.
pub fn state_at(record: Option<&SessionRecord>, now: Millis) -> Option<SessionState> {
    let record = record?;
    let now = now.max(record.start_time_ms);
    let mut step_start = record.start_time_ms;
    for (i, step) in record.timeline.steps().iter().enumerate() {
        let step_end = step_start.saturating_add(step.duration_ms());
        if now < step_end {
            return Some(SessionState {
                step_index: i,
                step_type: step.step_type(),
                step_start_time_ms: step_start,
                step_duration_ms: step.duration_ms(),
            });
        }
        step_start = step_end;
    }
    None
}

/// State at the very start of step `step_index`, regardless of the current
/// time.
pub fn state_for_step(record: &SessionRecord, step_index: usize) -> Option<SessionState> {
    let step = record.timeline.get(step_index)?;
    Some(SessionState {
        step_index,
        step_type: step.step_type(),
        step_start_time_ms: record
            .start_time_ms
            .saturating_add(record.timeline.step_offset_ms(step_index)),
        step_duration_ms: step.duration_ms(),
    })
}

/// Format milliseconds as `m:ss`, rounding partial seconds up so a step never
/// shows `0:00` while time remains.
pub fn format_remaining(ms: u64) -> String {
    let secs = ms.div_ceil(1000);
    format!("{}:{:02}", secs / 60, secs % 60)
}
