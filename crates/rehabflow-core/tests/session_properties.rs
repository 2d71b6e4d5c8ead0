//! Property tests for the session reducer.
//!
//! Random action sequences (including the stale, duplicated and out-of-order
//! ones a real user produces) must never break the session invariants.

use chrono::{Duration, TimeZone, Utc};
use proptest::prelude::*;
use rehabflow_core::session::{reduce, reduce_slot, Action, ActionKind, SessionState};
use rehabflow_core::{Program, RuntimePhase, SessionStatus};

fn program() -> Program {
    Program::from_json(
        r#"{ "id": "hip", "name": "Hip", "exercises": [
            { "id": "clam", "name": "Clam", "order": 1, "targetSets": 2, "targetRepsPerSet": 2,
              "setRestSeconds": 20 },
            { "id": "plank", "name": "Plank", "order": 2, "targetSets": 1, "targetRepsPerSet": 2,
              "holdSeconds": 3, "repRestSeconds": 1 },
            { "id": "lunge", "name": "Lunge", "order": 3, "targetSets": 1, "targetRepsPerSet": 1 }
        ] }"#,
    )
    .unwrap()
}

fn action_kind() -> impl Strategy<Value = ActionKind> {
    prop_oneof![
        4 => Just(ActionKind::IncrementRep),
        1 => Just(ActionKind::DecrementRep),
        2 => Just(ActionKind::CompleteSet),
        2 => Just(ActionKind::StartNextSet),
        1 => (0.0f64..40.0)
            .prop_map(|elapsed_seconds| ActionKind::TickRestTimer { elapsed_seconds }),
        2 => Just(ActionKind::StartHoldTimer),
        1 => Just(ActionKind::StopHoldTimer),
        1 => Just(ActionKind::ResetHoldTimer),
        2 => (0.0f64..5.0)
            .prop_map(|elapsed_seconds| ActionKind::TickHoldTimer { elapsed_seconds }),
        2 => Just(ActionKind::CompleteHoldRep),
        2 => Just(ActionKind::StartRoutine),
        1 => Just(ActionKind::PauseRoutine),
        1 => Just(ActionKind::ResumeRoutine),
        1 => (0u64..4_000)
            .prop_map(|remaining_ms| ActionKind::TickRuntimeCountdown { remaining_ms }),
        2 => Just(ActionKind::CompleteRuntimeCountdown),
        3 => Just(ActionKind::CompleteExercise),
        2 => Just(ActionKind::SkipExercise),
        1 => Just(ActionKind::StartSession { session_id: None }),
        1 => Just(ActionKind::EndSessionEarly),
        1 => Just(ActionKind::FinishSession),
    ]
}

fn start(program: &Program) -> SessionState {
    let at = Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap();
    let action = Action::new(ActionKind::StartSession {
        session_id: Some("prop".into()),
    })
    .at(at);
    reduce_slot(None, &action, &program.exercises).unwrap()
}

fn assert_invariants(state: &SessionState, program: &Program) {
    let catalog = &program.exercises;
    state.validate().unwrap();
    state.validate_against(catalog).unwrap();
    assert!(state.cursor_in_sync(catalog));

    let mut queue = state.skip_queue.clone();
    queue.sort();
    queue.dedup();
    assert_eq!(queue.len(), state.skip_queue.len());

    for progress in state.exercise_progress.values() {
        assert!(!(progress.hold_timer_running && progress.rest_timer_running));
        for set in &progress.sets {
            assert!(set.completed_reps <= set.target_reps);
        }
        if progress.completed {
            assert!(progress.all_sets_met());
        }
    }

    if state.status.is_terminal() {
        assert!(state.current_exercise_id.is_none());
        assert_eq!(state.runtime.phase, RuntimePhase::Complete);
        assert!(state.ended_at.is_some());
        assert_eq!(state.ended_early, state.status == SessionStatus::EndedEarly);
    } else {
        assert!(state.current_exercise_id.is_some());
    }
}

proptest! {
    #[test]
    fn invariants_hold_for_any_action_sequence(
        kinds in prop::collection::vec(action_kind(), 0..120)
    ) {
        let program = program();
        let t0 = Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap();
        let mut state = start(&program);
        assert_invariants(&state, &program);

        for (i, kind) in kinds.into_iter().enumerate() {
            let action = Action::new(kind).at(t0 + Duration::seconds(i as i64 + 1));
            let next = reduce(&state, &action, &program.exercises);
            assert_invariants(&next, &program);

            if state.status.is_terminal() {
                // Terminal sessions absorb everything.
                prop_assert_eq!(&next, &state);
            }
            for (id, progress) in &next.exercise_progress {
                prop_assert!(progress.skipped_count >= state.exercise_progress[id].skipped_count);
            }
            state = next;
        }
    }

    #[test]
    fn primary_skips_enqueue_each_exercise_once(skips in 1usize..6) {
        let program = program();
        let mut state = start(&program);
        for i in 0..skips {
            let at = state.updated_at + Duration::seconds(i as i64 + 1);
            let action = Action::new(ActionKind::SkipExercise).at(at);
            state = reduce(&state, &action, &program.exercises);
        }
        let mut queue = state.skip_queue.clone();
        queue.sort();
        queue.dedup();
        prop_assert_eq!(queue.len(), state.skip_queue.len());
        prop_assert_eq!(state.skip_queue.len(), skips.min(program.exercises.len()));
    }
}
