mod clock;
mod record;
mod schedule;
mod transitions;

pub use clock::{format_remaining, state_at, state_for_step, SessionSnapshot, SessionState};
pub use record::SessionRecord;
pub use schedule::{build_timeline, Millis, RawStep, StepSpec, StepType, Timeline};
pub use transitions::{
    latest_due, pending_instants, transition_instants, AlarmQueue, TransitionInstant,
    TransitionTimer,
};
