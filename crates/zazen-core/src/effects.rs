//! Transition effects.
//!
//! Maps a step transition to the vibration pattern the host should play. The
//! core never touches hardware; it hands an [`EffectKind`] to an
//! [`EffectSink`] supplied by the host.

use serde::{Deserialize, Serialize};

use crate::timer::{SessionState, StepType};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EffectKind {
    NoEffect,
    ThreeMediumPulses,
    TwoMediumPulses,
    OneLongPulse,
}

impl EffectKind {
    /// Vibration waveform as alternating off/on durations in milliseconds,
    /// starting with an initial delay.
    pub fn waveform(&self) -> &'static [u64] {
        match self {
            EffectKind::NoEffect => &[],
            EffectKind::ThreeMediumPulses => &[0, 100, 200, 100, 200, 100],
            EffectKind::TwoMediumPulses => &[0, 100, 200, 100],
            EffectKind::OneLongPulse => &[0, 300],
        }
    }

    pub fn is_silent(&self) -> bool {
        matches!(self, EffectKind::NoEffect)
    }
}

/// Effect for leaving `from` and entering `to`. `to == None` means the session
/// just completed.
///
/// Only the pairings listed here produce an effect; everything else is
/// `NoEffect`.
pub fn effect_for(from: StepType, to: Option<StepType>) -> EffectKind {
    match (from, to) {
        (_, None) => EffectKind::OneLongPulse,
        (StepType::PreStart, Some(StepType::Zazen)) => EffectKind::ThreeMediumPulses,
        (StepType::Zazen, Some(StepType::Kinhin)) => EffectKind::TwoMediumPulses,
        (StepType::Kinhin, Some(StepType::Zazen)) => EffectKind::ThreeMediumPulses,
        _ => EffectKind::NoEffect,
    }
}

/// External collaborator that executes effects (vibration, ongoing
/// notification). Failures stay inside the implementation.
pub trait EffectSink {
    /// Play the effect. `NoEffect` is passed through so hosts can log it.
    fn perform(&mut self, effect: EffectKind);

    /// A new step is now current; hosts typically refresh their status
    /// notification.
    fn step_started(&mut self, state: &SessionState);

    /// The session has ended, normally or by cancellation.
    fn session_finished(&mut self);
}

/// Sink that records what it was asked to do.
#[derive(Debug, Default, Clone)]
pub struct RecordingSink {
    pub effects: Vec<EffectKind>,
    pub started_steps: Vec<usize>,
    pub finished: usize,
}

impl EffectSink for RecordingSink {
    fn perform(&mut self, effect: EffectKind) {
        self.effects.push(effect);
    }

    fn step_started(&mut self, state: &SessionState) {
        self.started_steps.push(state.step_index);
    }

    fn session_finished(&mut self) {
        self.finished += 1;
    }
}
