//! # Zazen Core Library
//!
//! Session-tracking core of the zazen meditation timer. A session is an
//! ordered list of timed steps (waiting, zazen, kinhin, ...). The core answers
//! "where are we now" from wall-clock time alone, precomputes the instants at
//! which steps change, and decides which vibration pattern each change gets.
//!
//! ## Architecture
//!
//! - **Timer**: immutable [`Timeline`], the pure [`state_at`] clock and the
//!   transition instants a host should wake up for
//! - **Effects**: the transition → vibration table and the [`EffectSink`]
//!   host seam
//! - **Storage**: the persisted [`SessionRecord`] behind [`SessionStore`]
//!   (SQLite or in-memory) and TOML [`Config`]
//! - **Session**: [`SessionService`], which wires the above to a host
//!
//! Nothing about a running session is kept in process memory. A host that is
//! killed and restarted calls [`SessionService::rehydrate`] and carries on.

pub mod effects;
pub mod error;
pub mod events;
pub mod session;
pub mod storage;
pub mod timer;

pub use effects::{effect_for, EffectKind, EffectSink, RecordingSink};
pub use error::{ConfigError, CoreError, DatabaseError};
pub use events::{Event, IgnoreReason};
pub use session::SessionService;
pub use storage::{Config, Database, KvSessionStore, MemorySessionStore, SchedulingMode, SessionStore};
pub use timer::{
    build_timeline, state_at, transition_instants, AlarmQueue, Millis, RawStep, SessionRecord,
    SessionSnapshot, SessionState, StepType, Timeline, TransitionInstant, TransitionTimer,
};

/// Current wall-clock time in epoch milliseconds.
pub fn now_ms() -> Millis {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
