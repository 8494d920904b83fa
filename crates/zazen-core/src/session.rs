//! Session service.
//!
//! Glues the pure pieces (clock, transition instants, effect table) to the
//! three host-facing collaborators: a [`SessionStore`], a [`TransitionTimer`]
//! and an [`EffectSink`].
//!
//! The service keeps no session state of its own. Every operation reloads the
//! record from the store, so the same calls work in the process that started
//! the session and in one that was launched long after the original died.
//!
//! ## Usage
//!
//! ```ignore
//! let mut service = SessionService::new(store, AlarmQueue::new(), sink);
//! service.start(&steps, now_ms())?;
//! // When woken by the host timer:
//! service.on_transition(step_index, now_ms())?;
//! // Any time:
//! service.query(now_ms());
//! ```

use tracing::{debug, info};

use crate::effects::{effect_for, EffectSink};
use crate::error::Result;
use crate::events::{timestamp, Event, IgnoreReason};
use crate::storage::SessionStore;
use crate::timer::{
    build_timeline, latest_due, pending_instants, state_at, state_for_step, transition_instants,
    AlarmQueue, Millis, RawStep, SessionRecord, SessionSnapshot, TransitionTimer,
};

pub struct SessionService<S, T, E> {
    store: S,
    timer: T,
    sink: E,
}

impl<S, T, E> SessionService<S, T, E>
where
    S: SessionStore,
    T: TransitionTimer,
    E: EffectSink,
{
    pub fn new(store: S, timer: T, sink: E) -> Self {
        Self { store, timer, sink }
    }

    // ── Accessors ────────────────────────────────────────────────────

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn timer(&self) -> &T {
        &self.timer
    }

    pub fn sink(&self) -> &E {
        &self.sink
    }

    pub fn into_parts(self) -> (S, T, E) {
        (self.store, self.timer, self.sink)
    }

    // ── Commands ─────────────────────────────────────────────────────

    /// Start a new session at `now`, replacing any session already running.
    ///
    /// # Errors
    /// Returns `CoreError::EmptyTimeline` if no step has a positive duration
    /// (nothing is persisted in that case), or a store error if the record
    /// cannot be written.
    pub fn start(&mut self, raw_steps: &[RawStep], now: Millis) -> Result<Event> {
        let timeline = build_timeline(raw_steps)?;
        let record = SessionRecord::new(timeline, now);

        self.timer.cancel_all();
        self.store.save(&record)?;
        for instant in transition_instants(&record) {
            debug!(step_index = instant.step_index, at_ms = instant.at_ms, "Arming transition");
            self.timer.arm(instant);
        }

        if let Some(state) = state_for_step(&record, 0) {
            self.sink.step_started(&state);
        }

        let first_step = record.timeline.steps()[0].step_type();
        info!(
            steps = record.timeline.len(),
            total_ms = record.timeline.total_ms(),
            "Session started"
        );
        Ok(Event::SessionStarted {
            step_count: record.timeline.len(),
            first_step,
            total_ms: record.timeline.total_ms(),
            at: timestamp(now),
        })
    }

    /// Cancel the active session. Pending transitions become no-ops.
    ///
    /// Returns `None` if no session was running.
    ///
    /// # Errors
    /// Returns a store error if the record cannot be cleared.
    pub fn stop(&mut self, now: Millis) -> Result<Option<Event>> {
        let was_active = self.store.load().is_some();
        self.store.clear()?;
        self.timer.cancel_all();
        if !was_active {
            return Ok(None);
        }
        self.sink.session_finished();
        info!("Session cancelled");
        Ok(Some(Event::SessionCancelled { at: timestamp(now) }))
    }

    /// Current position, recomputed from the store. Never fails; any problem
    /// reads as "no active session".
    pub fn query(&self, now: Millis) -> Option<SessionSnapshot> {
        let record = self.store.load();
        state_at(record.as_ref(), now).map(|state| state.snapshot(now))
    }

    /// Transition callback: step `step_index` has just completed.
    ///
    /// Plays the effect for the transition, refreshes the host's status for
    /// the next step, and ends the session after the last step. Late
    /// callbacks are accepted. Callbacks for a cancelled session, an unknown
    /// step, a step that has not completed yet in the stored session, or a
    /// transition already handled are ignored and reported as
    /// `Event::TransitionIgnored`.
    ///
    /// # Errors
    /// Returns a store error if the progress cursor or the record cannot be
    /// written.
    pub fn on_transition(&mut self, step_index: usize, now: Millis) -> Result<Vec<Event>> {
        let at = timestamp(now);
        let Some(record) = self.store.load() else {
            return Ok(ignored(step_index, IgnoreReason::NoSession, now));
        };
        let Some(step) = record.timeline.get(step_index) else {
            return Ok(ignored(step_index, IgnoreReason::UnknownStep, now));
        };
        if now < record.step_end_ms(step_index) {
            return Ok(ignored(step_index, IgnoreReason::NotDue, now));
        }
        if !self.store.advance_cursor(step_index)? {
            return Ok(ignored(step_index, IgnoreReason::AlreadyFired, now));
        }

        let from = step.step_type();
        let next = state_for_step(&record, step_index + 1);
        let to = next.map(|s| s.step_type);
        let effect = effect_for(from, to);
        self.sink.perform(effect);
        info!(step_index, ?from, ?to, ?effect, "Transition");

        let mut events = vec![Event::TransitionFired {
            step_index,
            from,
            to,
            effect,
            at,
        }];

        match next {
            Some(state) => self.sink.step_started(&state),
            None => {
                self.store.clear()?;
                self.timer.cancel_all();
                self.sink.session_finished();
                info!("Session completed");
                events.push(Event::SessionCompleted { at });
            }
        }
        Ok(events)
    }

    /// Pick up a persisted session after a restart.
    ///
    /// Transitions that passed while no process was running are marked as
    /// handled without playing their effects; only future transitions are
    /// armed. A session that ran out entirely is cleared.
    ///
    /// Returns `None` if there is no persisted session.
    ///
    /// # Errors
    /// Returns a store error if the cursor or record cannot be written.
    pub fn rehydrate(&mut self, now: Millis) -> Result<Option<Event>> {
        let Some(record) = self.store.load() else {
            return Ok(None);
        };
        self.timer.cancel_all();

        let pending = pending_instants(&record, now);
        if pending.is_empty() {
            self.store.clear()?;
            self.sink.session_finished();
            info!("Persisted session expired while untracked");
            return Ok(Some(Event::SessionExpired { at: timestamp(now) }));
        }

        let skipped = record.timeline.len() - pending.len();
        if skipped > 0 {
            self.store.advance_cursor(skipped - 1)?;
        }
        let cursor = self.store.last_fired();
        let mut armed = 0;
        for instant in pending {
            if cursor.is_some_and(|c| instant.step_index <= c) {
                continue;
            }
            self.timer.arm(instant);
            armed += 1;
        }

        if let Some(state) = state_at(Some(&record), now) {
            self.sink.step_started(&state);
        }
        info!(armed, skipped, "Session rehydrated");
        Ok(Some(Event::SessionRehydrated {
            armed,
            skipped,
            at: timestamp(now),
        }))
    }

    /// Polling fallback for hosts without precise wake-ups.
    ///
    /// Handles the most recent transition at or before `now` if it has not
    /// been handled yet. Earlier unhandled transitions are passed over.
    ///
    /// # Errors
    /// Same as [`SessionService::on_transition`].
    pub fn poll(&mut self, now: Millis) -> Result<Vec<Event>> {
        let Some(record) = self.store.load() else {
            return Ok(Vec::new());
        };
        let Some(due) = latest_due(&record, now) else {
            return Ok(Vec::new());
        };
        if self
            .store
            .last_fired()
            .is_some_and(|c| c >= due.step_index)
        {
            return Ok(Vec::new());
        }
        self.on_transition(due.step_index, now)
    }
}

impl<S, E> SessionService<S, AlarmQueue, E>
where
    S: SessionStore,
    E: EffectSink,
{
    /// Run the transition callback for every armed instant due at `now`.
    ///
    /// If the queue turns out to have been armed for a session that another
    /// process has since replaced, it is rebuilt from the stored record.
    ///
    /// # Errors
    /// Same as [`SessionService::on_transition`].
    pub fn fire_due(&mut self, now: Millis) -> Result<Vec<Event>> {
        let mut events = Vec::new();
        let mut stale = false;
        for instant in self.timer.pop_due(now) {
            let handled = self.on_transition(instant.step_index, now)?;
            stale |= handled.iter().any(|e| {
                matches!(
                    e,
                    Event::TransitionIgnored {
                        reason: IgnoreReason::NotDue,
                        ..
                    }
                )
            });
            events.extend(handled);
        }
        if stale {
            events.extend(self.rehydrate(now)?);
        }
        Ok(events)
    }

    pub fn next_deadline(&self) -> Option<Millis> {
        self.timer.next_deadline()
    }
}

fn ignored(step_index: usize, reason: IgnoreReason, now: Millis) -> Vec<Event> {
    debug!(step_index, ?reason, "Ignoring transition callback");
    vec![Event::TransitionIgnored {
        step_index,
        reason,
        at: timestamp(now),
    }]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::effects::{EffectKind, RecordingSink};
    use crate::error::CoreError;
    use crate::storage::MemorySessionStore;
    use crate::timer::StepType;

    type Service = SessionService<MemorySessionStore, AlarmQueue, RecordingSink>;

    fn service() -> Service {
        SessionService::new(
            MemorySessionStore::new(),
            AlarmQueue::new(),
            RecordingSink::default(),
        )
    }

    fn steps() -> Vec<RawStep> {
        vec![
            RawStep::new(StepType::PreStart, 5),
            RawStep::new(StepType::Zazen, 10),
            RawStep::new(StepType::Kinhin, 5),
            RawStep::new(StepType::Zazen, 10),
        ]
    }

    fn fired_effect(events: &[Event]) -> Option<EffectKind> {
        events.iter().find_map(|e| match e {
            Event::TransitionFired { effect, .. } => Some(*effect),
            _ => None,
        })
    }

    #[test]
    fn start_arms_every_transition() {
        let mut svc = service();
        let event = svc.start(&steps(), 0).unwrap();
        assert!(matches!(
            event,
            Event::SessionStarted {
                step_count: 4,
                first_step: StepType::PreStart,
                total_ms: 30_000,
                ..
            }
        ));
        assert_eq!(svc.timer().len(), 4);
        assert_eq!(svc.next_deadline(), Some(5_000));
        assert_eq!(svc.sink().started_steps, vec![0]);
    }

    #[test]
    fn empty_start_persists_nothing() {
        let mut svc = service();
        let err = svc.start(&[RawStep::new(StepType::Zazen, 0)], 0).unwrap_err();
        assert!(matches!(err, CoreError::EmptyTimeline));
        assert!(svc.store().load().is_none());
        assert!(svc.timer().is_empty());
    }

    #[test]
    fn duplicate_and_out_of_order_callbacks_are_ignored() {
        let mut svc = service();
        svc.start(&steps(), 0).unwrap();
        assert_eq!(
            fired_effect(&svc.on_transition(1, 15_000).unwrap()),
            Some(EffectKind::TwoMediumPulses)
        );
        for index in [1, 0] {
            let events = svc.on_transition(index, 15_100).unwrap();
            assert!(matches!(
                events.as_slice(),
                [Event::TransitionIgnored {
                    reason: IgnoreReason::AlreadyFired,
                    ..
                }]
            ));
        }
        assert_eq!(svc.sink().effects, vec![EffectKind::TwoMediumPulses]);
    }

    #[test]
    fn unknown_step_is_ignored() {
        let mut svc = service();
        svc.start(&steps(), 0).unwrap();
        let events = svc.on_transition(9, 1_000).unwrap();
        assert!(matches!(
            events.as_slice(),
            [Event::TransitionIgnored {
                reason: IgnoreReason::UnknownStep,
                ..
            }]
        ));
    }

    #[test]
    fn early_callback_is_ignored() {
        let mut svc = service();
        svc.start(&steps(), 0).unwrap();
        let events = svc.on_transition(3, 10_000).unwrap();
        assert!(matches!(
            events.as_slice(),
            [Event::TransitionIgnored {
                reason: IgnoreReason::NotDue,
                ..
            }]
        ));
        assert!(svc.store().load().is_some());
        assert_eq!(svc.store().last_fired(), None);
        assert!(svc.sink().effects.is_empty());
        assert_eq!(svc.sink().finished, 0);

        // One millisecond short of the boundary is still early.
        assert!(fired_effect(&svc.on_transition(0, 4_999).unwrap()).is_none());
        assert_eq!(
            fired_effect(&svc.on_transition(0, 5_000).unwrap()),
            Some(EffectKind::ThreeMediumPulses)
        );
    }

    #[test]
    fn late_callback_still_fires() {
        let mut svc = service();
        svc.start(&steps(), 0).unwrap();
        assert_eq!(
            fired_effect(&svc.on_transition(0, 9_000).unwrap()),
            Some(EffectKind::ThreeMediumPulses)
        );
    }

    #[test]
    fn stop_silences_pending_callbacks() {
        let mut svc = service();
        svc.start(&steps(), 0).unwrap();
        assert!(svc.stop(1_000).unwrap().is_some());
        assert!(svc.timer().is_empty());
        assert!(svc.query(2_000).is_none());

        let events = svc.on_transition(0, 5_000).unwrap();
        assert!(matches!(
            events.as_slice(),
            [Event::TransitionIgnored {
                reason: IgnoreReason::NoSession,
                ..
            }]
        ));
        assert!(svc.sink().effects.is_empty());
        assert_eq!(svc.sink().finished, 1);

        // Stopping again is harmless.
        assert!(svc.stop(3_000).unwrap().is_none());
    }

    #[test]
    fn final_transition_completes_session() {
        let mut svc = service();
        svc.start(&steps(), 0).unwrap();
        let events = svc.on_transition(3, 30_000).unwrap();
        assert_eq!(fired_effect(&events), Some(EffectKind::OneLongPulse));
        assert!(matches!(events.last(), Some(Event::SessionCompleted { .. })));
        assert!(svc.store().load().is_none());
        assert!(svc.timer().is_empty());
        assert_eq!(svc.sink().finished, 1);
    }

    #[test]
    fn fire_due_drains_alarm_queue() {
        let mut svc = service();
        svc.start(&steps(), 0).unwrap();
        assert!(svc.fire_due(4_999).unwrap().is_empty());
        let events = svc.fire_due(5_000).unwrap();
        assert_eq!(fired_effect(&events), Some(EffectKind::ThreeMediumPulses));
        assert_eq!(svc.next_deadline(), Some(15_000));
        assert_eq!(svc.sink().started_steps, vec![0, 1]);
    }

    #[test]
    fn rehydrate_arms_only_future_transitions() {
        let store = MemorySessionStore::new();
        let mut first = SessionService::new(store, AlarmQueue::new(), RecordingSink::default());
        first.start(&steps(), 0).unwrap();
        let (store, _, _) = first.into_parts();

        let mut svc = SessionService::new(store, AlarmQueue::new(), RecordingSink::default());
        let event = svc.rehydrate(17_000).unwrap();
        assert!(matches!(
            event,
            Some(Event::SessionRehydrated {
                armed: 2,
                skipped: 2,
                ..
            })
        ));
        assert_eq!(svc.store().last_fired(), Some(1));
        assert_eq!(svc.next_deadline(), Some(20_000));
        // Missed transitions stay silent, even if their callback shows up late.
        assert!(matches!(
            svc.on_transition(1, 17_500).unwrap().as_slice(),
            [Event::TransitionIgnored { .. }]
        ));
        assert!(svc.sink().effects.is_empty());
        assert_eq!(svc.sink().started_steps, vec![2]);
    }

    #[test]
    fn rehydrate_expired_session_clears_it() {
        let mut svc = service();
        svc.start(&steps(), 0).unwrap();
        let event = svc.rehydrate(45_000).unwrap();
        assert!(matches!(event, Some(Event::SessionExpired { .. })));
        assert!(svc.store().load().is_none());
        assert!(svc.timer().is_empty());
        assert!(svc.sink().effects.is_empty());
        assert!(service().rehydrate(0).unwrap().is_none());
    }

    #[test]
    fn poll_fires_latest_due_once() {
        let mut svc = service();
        svc.start(&steps(), 0).unwrap();
        assert!(svc.poll(4_000).unwrap().is_empty());
        assert_eq!(
            fired_effect(&svc.poll(5_400).unwrap()),
            Some(EffectKind::ThreeMediumPulses)
        );
        assert!(svc.poll(6_400).unwrap().is_empty());
        // Slept through two boundaries: only the latest one plays.
        assert_eq!(
            fired_effect(&svc.poll(21_000).unwrap()),
            Some(EffectKind::ThreeMediumPulses)
        );
        assert_eq!(svc.store().last_fired(), Some(2));
        assert_eq!(svc.sink().effects.len(), 2);
    }
}
