//! Session reducer.
//!
//! `reduce(state, action, catalog)` returns the next session value. Any
//! action that is illegal for the current status, phase or progress returns
//! the input unchanged: rapid or stale taps are expected and are never
//! errors.
//!
//! ## Advancement
//!
//! ```text
//! primary pass: catalog[0] .. catalog[n-1] -> skip pass (queue head) | completed
//! skip pass:    head -> (complete: drop head | skip: move head to tail) -> completed
//! ```
//!
//! The coarse progress cursor (`currentExerciseId`, `activeSetIndex`,
//! `completedReps`) is authoritative. After every applied action the runtime
//! cursor is re-derived from it, so the two can never diverge.

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use super::action::{Action, ActionKind};
use super::model::{
    ExerciseProgress, PassPhase, SessionRuntimeState, SessionState, SessionStatus,
};
use crate::catalog::Exercise;
use crate::timer::{transition, PhaseEvent, RuntimePhase};

/// Reduce against an optional session root.
///
/// `start_session` creates a session when there is none; every other action
/// needs an existing root. An existing root ignores `start_session`.
pub fn reduce_slot(
    state: Option<&SessionState>,
    action: &Action,
    catalog: &[Exercise],
) -> Option<SessionState> {
    match state {
        Some(state) => Some(reduce(state, action, catalog)),
        None => match &action.kind {
            ActionKind::StartSession { session_id } => {
                let at = action.at.unwrap_or_else(Utc::now);
                let session_id = session_id
                    .clone()
                    .unwrap_or_else(|| format!("session-{}", at.timestamp_millis()));
                let created = SessionState::create(catalog, session_id, at);
                if let Some(session) = &created {
                    info!(
                        session_id = %session.session_id,
                        exercises = catalog.len(),
                        "session started"
                    );
                }
                created
            }
            _ => None,
        },
    }
}

/// Next session state for `action`.
pub fn reduce(state: &SessionState, action: &Action, catalog: &[Exercise]) -> SessionState {
    match apply(state, action, catalog) {
        Some(mut next) => {
            next.updated_at = stamp(state, action);
            sync_runtime_cursor(&mut next, catalog);
            debug_assert!(next.cursor_in_sync(catalog));
            next
        }
        None => {
            debug!(action = action.kind.name(), "action ignored");
            state.clone()
        }
    }
}

fn apply(state: &SessionState, action: &Action, catalog: &[Exercise]) -> Option<SessionState> {
    if state.status.is_terminal() {
        return None;
    }
    if let Some(target) = &action.exercise_id {
        if state.current_exercise_id.as_ref() != Some(target) {
            return None;
        }
    }
    let at = stamp(state, action);
    let exercise = state.current_exercise(catalog)?;
    let mut next = state.clone();

    match &action.kind {
        ActionKind::StartSession { .. } => return None,

        ActionKind::StartRoutine => {
            if !current(&next)?.active_set()?.has_capacity() {
                return None;
            }
            let phase = transition(next.runtime.phase, PhaseEvent::Start, None)?;
            next.runtime.phase = phase;
            next.runtime.remaining_ms = to_ms(exercise.hold_ms());
            next.runtime.previous_phase = None;
        }

        ActionKind::PauseRoutine => {
            let from = next.runtime.phase;
            next.runtime.phase = transition(from, PhaseEvent::Pause, None)?;
            next.runtime.previous_phase = Some(from);
        }

        ActionKind::ResumeRoutine => {
            let runtime = &mut next.runtime;
            runtime.phase = transition(runtime.phase, PhaseEvent::Resume, runtime.previous_phase)?;
            runtime.previous_phase = None;
        }

        ActionKind::TickRuntimeCountdown { remaining_ms } => {
            if !next.runtime.phase.is_counting() || next.runtime.remaining_ms == *remaining_ms {
                return None;
            }
            next.runtime.remaining_ms = *remaining_ms;
        }

        ActionKind::CompleteRuntimeCountdown => {
            if !exercise.is_hold() {
                return None;
            }
            match next.runtime.phase {
                RuntimePhase::Hold => {
                    let set = current_mut(&mut next)?.active_set_mut()?;
                    set.completed_reps = (set.completed_reps + 1).min(set.target_reps);
                    let met = set.is_met();
                    if met {
                        next.runtime.phase =
                            transition(next.runtime.phase, PhaseEvent::Complete, None)?;
                        next.runtime.remaining_ms = 0;
                    } else {
                        next.runtime.phase = RuntimePhase::RepRest;
                        next.runtime.remaining_ms = to_ms(exercise.rep_rest_ms());
                    }
                }
                RuntimePhase::RepRest => {
                    next.runtime.phase = RuntimePhase::Hold;
                    next.runtime.remaining_ms = to_ms(exercise.hold_ms());
                }
                _ => return None,
            }
        }

        ActionKind::IncrementRep => {
            let progress = current_mut(&mut next)?;
            if exercise.is_hold() || progress.any_timer_running() {
                return None;
            }
            let set = progress.active_set_mut()?;
            if !set.has_capacity() {
                return None;
            }
            set.completed_reps += 1;
        }

        ActionKind::DecrementRep => {
            let progress = current_mut(&mut next)?;
            if exercise.is_hold() || progress.any_timer_running() {
                return None;
            }
            let set = progress.active_set_mut()?;
            if set.completed_reps == 0 {
                return None;
            }
            set.completed_reps -= 1;
        }

        ActionKind::CompleteSet => {
            let progress = current_mut(&mut next)?;
            if progress.rest_timer_running
                || !progress.has_next_set()
                || !progress.active_set()?.is_met()
            {
                return None;
            }
            progress.clear_hold();
            progress.rest_timer_running = true;
            progress.rest_elapsed_seconds = 0.0;
            if next.runtime.phase != RuntimePhase::Idle {
                next.runtime.phase = RuntimePhase::SetRest;
                next.runtime.remaining_ms = to_ms(exercise.set_rest_ms());
                next.runtime.previous_phase = None;
            }
        }

        ActionKind::StartNextSet => {
            let progress = current_mut(&mut next)?;
            if !progress.rest_timer_running || !progress.has_next_set() {
                return None;
            }
            progress.active_set_index += 1;
            progress.clear_rest();
            next.runtime = SessionRuntimeState::idle(next.runtime.exercise_index);
        }

        ActionKind::TickRestTimer { elapsed_seconds } => {
            let progress = current_mut(&mut next)?;
            if !progress.rest_timer_running {
                return None;
            }
            let elapsed = clamp_elapsed(*elapsed_seconds, exercise.set_rest_seconds)?;
            if elapsed == progress.rest_elapsed_seconds {
                return None;
            }
            progress.rest_elapsed_seconds = elapsed;
        }

        ActionKind::StartHoldTimer => {
            let progress = current_mut(&mut next)?;
            if !exercise.is_hold()
                || progress.any_timer_running()
                || !progress.active_set()?.has_capacity()
            {
                return None;
            }
            progress.hold_timer_running = true;
        }

        ActionKind::StopHoldTimer => {
            let progress = current_mut(&mut next)?;
            if !exercise.is_hold() || !progress.hold_timer_running {
                return None;
            }
            progress.hold_timer_running = false;
        }

        ActionKind::ResetHoldTimer => {
            let progress = current_mut(&mut next)?;
            if !exercise.is_hold()
                || (!progress.hold_timer_running && progress.hold_elapsed_seconds == 0.0)
            {
                return None;
            }
            progress.clear_hold();
        }

        ActionKind::TickHoldTimer { elapsed_seconds } => {
            let hold_seconds = exercise.hold_seconds?;
            let progress = current_mut(&mut next)?;
            if !progress.hold_timer_running {
                return None;
            }
            let elapsed = clamp_elapsed(*elapsed_seconds, hold_seconds)?;
            if elapsed == progress.hold_elapsed_seconds {
                return None;
            }
            progress.hold_elapsed_seconds = elapsed;
        }

        ActionKind::CompleteHoldRep => {
            let hold_seconds = exercise.hold_seconds?;
            let progress = current_mut(&mut next)?;
            if progress.hold_elapsed_seconds < hold_seconds {
                return None;
            }
            let set = progress.active_set_mut()?;
            if !set.has_capacity() {
                return None;
            }
            set.completed_reps += 1;
            progress.clear_hold();
        }

        ActionKind::CompleteExercise => {
            let progress = current_mut(&mut next)?;
            if !progress.all_sets_met() {
                return None;
            }
            progress.completed = true;
            progress.clear_timers();
            match next.current_phase {
                PassPhase::Primary => advance_primary(&mut next, catalog, at),
                PassPhase::Skip => advance_skip(&mut next, catalog, at),
            }
        }

        ActionKind::SkipExercise => {
            let id = exercise.id.clone();
            let progress = current_mut(&mut next)?;
            progress.skipped_count += 1;
            progress.clear_timers();
            match next.current_phase {
                PassPhase::Primary => {
                    if !next.skip_queue.contains(&id) {
                        next.skip_queue.push(id);
                    }
                    advance_primary(&mut next, catalog, at);
                }
                PassPhase::Skip => {
                    next.skip_queue.retain(|queued| *queued != id);
                    next.skip_queue.push(id);
                    make_current_queue_head(&mut next, catalog);
                }
            }
        }

        ActionKind::EndSessionEarly => finalize(&mut next, SessionStatus::EndedEarly, at),

        ActionKind::FinishSession => finalize(&mut next, SessionStatus::Completed, at),
    }

    Some(next)
}

/// The action's timestamp, never earlier than the session's last update.
fn stamp(state: &SessionState, action: &Action) -> DateTime<Utc> {
    action.at.unwrap_or_else(Utc::now).max(state.updated_at)
}

fn current(state: &SessionState) -> Option<&ExerciseProgress> {
    state.current_progress()
}

fn current_mut(state: &mut SessionState) -> Option<&mut ExerciseProgress> {
    let id = state.current_exercise_id.as_ref()?;
    state.exercise_progress.get_mut(id)
}

fn advance_primary(state: &mut SessionState, catalog: &[Exercise], at: DateTime<Utc>) {
    let cursor = state.primary_cursor + 1;
    if let Some(exercise) = catalog.get(cursor) {
        state.primary_cursor = cursor;
        state.current_exercise_id = Some(exercise.id.clone());
        state.runtime = SessionRuntimeState::idle(cursor);
    } else if !state.skip_queue.is_empty() {
        state.current_phase = PassPhase::Skip;
        make_current_queue_head(state, catalog);
    } else {
        finalize(state, SessionStatus::Completed, at);
    }
}

fn advance_skip(state: &mut SessionState, catalog: &[Exercise], at: DateTime<Utc>) {
    if let Some(id) = state.current_exercise_id.clone() {
        state.skip_queue.retain(|queued| *queued != id);
    }
    if state.skip_queue.is_empty() {
        finalize(state, SessionStatus::Completed, at);
    } else {
        make_current_queue_head(state, catalog);
    }
}

fn make_current_queue_head(state: &mut SessionState, catalog: &[Exercise]) {
    let head = state.skip_queue.first().cloned();
    let index = head
        .as_deref()
        .and_then(|id| catalog.iter().position(|e| e.id == id))
        .unwrap_or(0);
    state.current_exercise_id = head;
    state.runtime = SessionRuntimeState::idle(index);
}

/// Shared terminal transition.
fn finalize(state: &mut SessionState, status: SessionStatus, at: DateTime<Utc>) {
    state.status = status;
    state.ended_early = status == SessionStatus::EndedEarly;
    state.ended_at = Some(at);
    state.current_exercise_id = None;
    for progress in state.exercise_progress.values_mut() {
        progress.hold_timer_running = false;
        progress.rest_timer_running = false;
    }
    state.runtime.phase = transition(state.runtime.phase, PhaseEvent::Complete, None)
        .unwrap_or(RuntimePhase::Complete);
    state.runtime.previous_phase = None;
    state.runtime.remaining_ms = 0;
    info!(session_id = %state.session_id, status = ?status, "session ended");
}

fn sync_runtime_cursor(state: &mut SessionState, catalog: &[Exercise]) {
    if !state.is_in_progress() {
        return;
    }
    let Some(index) = state.current_index(catalog) else {
        return;
    };
    let Some(progress) = state.current_progress() else {
        return;
    };
    let set_index = progress.active_set_index;
    let rep_index = progress.active_set().map_or(0, |s| s.completed_reps);
    state.runtime.exercise_index = index;
    state.runtime.set_index = set_index;
    state.runtime.rep_index = rep_index;
}

fn clamp_elapsed(elapsed_seconds: f64, limit: f64) -> Option<f64> {
    if !elapsed_seconds.is_finite() {
        return None;
    }
    Some(elapsed_seconds.max(0.0).min(limit.max(0.0)))
}

fn to_ms(ms: f64) -> u64 {
    if ms.is_finite() {
        ms.max(0.0).round() as u64
    } else {
        0
    }
}
