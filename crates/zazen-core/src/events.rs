use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::effects::EffectKind;
use crate::timer::{Millis, StepType};

/// Why a transition callback did nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IgnoreReason {
    /// The session ended or was cancelled before the callback ran.
    NoSession,
    /// This transition, or a later one, was already handled.
    AlreadyFired,
    /// The index does not name a step of the active session.
    UnknownStep,
    /// The step has not completed yet in the active session, typically a
    /// wake-up armed for a session that has since been replaced.
    NotDue,
}

/// Every session state change produces an Event. Hosts print or forward them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    SessionStarted {
        step_count: usize,
        first_step: StepType,
        total_ms: u64,
        at: DateTime<Utc>,
    },
    TransitionFired {
        step_index: usize,
        from: StepType,
        /// `None` when the session just completed.
        to: Option<StepType>,
        effect: EffectKind,
        at: DateTime<Utc>,
    },
    TransitionIgnored {
        step_index: usize,
        reason: IgnoreReason,
        at: DateTime<Utc>,
    },
    /// A running session was picked up by a fresh process.
    SessionRehydrated {
        armed: usize,
        skipped: usize,
        at: DateTime<Utc>,
    },
    /// A persisted session had already run out while no process was tracking
    /// it. Its outstanding effects are dropped.
    SessionExpired {
        at: DateTime<Utc>,
    },
    SessionCompleted {
        at: DateTime<Utc>,
    },
    SessionCancelled {
        at: DateTime<Utc>,
    },
}

/// Convert epoch milliseconds to a UTC timestamp, clamping out-of-range values
/// to the epoch.
pub fn timestamp(ms: Millis) -> DateTime<Utc> {
    i64::try_from(ms)
        .ok()
        .and_then(DateTime::<Utc>::from_timestamp_millis)
        .unwrap_or_default()
}
