use super::schedule::{Millis, Timeline};

/// The persisted unit of truth for a running session.
///
/// Everything else (current step, remaining time, pending transitions) is
/// derived from this plus a "now" timestamp.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionRecord {
    pub timeline: Timeline,
    pub start_time_ms: Millis,
}

impl SessionRecord {
    pub fn new(timeline: Timeline, start_time_ms: Millis) -> Self {
        Self {
            timeline,
            start_time_ms,
        }
    }

    /// Wall-clock instant at which the last step completes.
    pub fn end_time_ms(&self) -> Millis {
        self.start_time_ms.saturating_add(self.timeline.total_ms())
    }

    /// Wall-clock instant at which step `step_index` completes.
    pub fn step_end_ms(&self, step_index: usize) -> Millis {
        self.start_time_ms
            .saturating_add(self.timeline.step_offset_ms(step_index + 1))
    }
}
