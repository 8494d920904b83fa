//! Property tests for the session clock, transition instants and store round
//! trip.

use proptest::prelude::*;

use zazen_core::timer::{latest_due, pending_instants};
use zazen_core::{
    build_timeline, state_at, transition_instants, Database, KvSessionStore, RawStep,
    SessionRecord, SessionStore, StepType,
};

fn step_type() -> impl Strategy<Value = StepType> {
    prop_oneof![
        Just(StepType::PreStart),
        Just(StepType::Zazen),
        Just(StepType::Kinhin),
    ]
}

/// Non-empty timelines, with the occasional zero-length step mixed in.
fn record() -> impl Strategy<Value = SessionRecord> {
    let steps = prop::collection::vec((step_type(), 0i64..900), 1..12).prop_filter(
        "needs one positive step",
        |steps| steps.iter().any(|(_, d)| *d > 0),
    );
    (steps, 1u64..4_000_000_000_000).prop_map(|(steps, start)| {
        let raw: Vec<RawStep> = steps.into_iter().map(|(t, d)| RawStep::new(t, d)).collect();
        SessionRecord::new(build_timeline(&raw).unwrap(), start)
    })
}

proptest! {
    #[test]
    fn state_index_in_range_until_end(rec in record(), offset in 0u64..1_000_000) {
        let now = rec.start_time_ms + offset;
        let total = rec.timeline.total_ms();
        match state_at(Some(&rec), now) {
            Some(state) => {
                prop_assert!(offset < total);
                prop_assert!(state.step_index < rec.timeline.len());
                prop_assert!(state.remaining_ms(now) > 0);
                prop_assert!(state.remaining_ms(now) <= state.step_duration_ms);
            }
            None => prop_assert!(offset >= total),
        }
    }

    #[test]
    fn state_is_idempotent(rec in record(), offset in 0u64..1_000_000) {
        let now = rec.start_time_ms + offset;
        prop_assert_eq!(state_at(Some(&rec), now), state_at(Some(&rec), now));
    }

    #[test]
    fn instants_strictly_increase(rec in record()) {
        let instants = transition_instants(&rec);
        prop_assert_eq!(instants.len(), rec.timeline.len());
        for pair in instants.windows(2) {
            prop_assert!(pair[0].at_ms < pair[1].at_ms);
            prop_assert_eq!(pair[0].step_index + 1, pair[1].step_index);
        }
        prop_assert_eq!(instants.last().map(|t| t.at_ms), Some(rec.end_time_ms()));
    }

    #[test]
    fn pending_and_due_partition_instants(rec in record(), offset in 0u64..1_000_000) {
        let now = rec.start_time_ms + offset;
        let pending = pending_instants(&rec, now);
        let passed = transition_instants(&rec).into_iter().filter(|t| t.at_ms < now).count();
        prop_assert_eq!(pending.len() + passed, rec.timeline.len());
        if let Some(due) = latest_due(&rec, now) {
            prop_assert!(due.at_ms <= now);
        }
    }

    #[test]
    fn store_round_trip_preserves_state(rec in record(), offset in 0u64..1_000_000) {
        let store = KvSessionStore::new(Database::open_memory().unwrap());
        store.save(&rec).unwrap();
        let loaded = store.load().unwrap();
        let now = rec.start_time_ms + offset;
        prop_assert_eq!(state_at(Some(&loaded), now), state_at(Some(&rec), now));
        prop_assert_eq!(loaded, rec);
    }
}

#[test]
fn zero_length_steps_never_break_the_clock() {
    let raw = vec![
        RawStep::new(StepType::Zazen, 0),
        RawStep::new(StepType::Kinhin, 5),
        RawStep::new(StepType::PreStart, 0),
    ];
    let rec = SessionRecord::new(build_timeline(&raw).unwrap(), 1_000);
    assert_eq!(rec.timeline.len(), 1);
    assert_eq!(state_at(Some(&rec), 1_000).unwrap().step_type, StepType::Kinhin);
    assert!(state_at(Some(&rec), 6_000).is_none());
}
