use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What the user or the countdown asked for.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ActionKind {
    StartSession {
        #[serde(default, rename = "sessionId")]
        session_id: Option<String>,
    },
    StartRoutine,
    PauseRoutine,
    ResumeRoutine,
    TickRuntimeCountdown {
        #[serde(rename = "remainingMs")]
        remaining_ms: u64,
    },
    CompleteRuntimeCountdown,
    IncrementRep,
    DecrementRep,
    CompleteSet,
    StartNextSet,
    TickRestTimer {
        /// Total rest elapsed since the rest timer started.
        #[serde(rename = "elapsedSeconds")]
        elapsed_seconds: f64,
    },
    StartHoldTimer,
    StopHoldTimer,
    ResetHoldTimer,
    TickHoldTimer {
        /// Total hold elapsed since the hold timer was reset.
        #[serde(rename = "elapsedSeconds")]
        elapsed_seconds: f64,
    },
    CompleteHoldRep,
    CompleteExercise,
    SkipExercise,
    EndSessionEarly,
    FinishSession,
}

impl ActionKind {
    /// The wire tag, e.g. `"increment_rep"`.
    pub fn name(&self) -> &'static str {
        match self {
            ActionKind::StartSession { .. } => "start_session",
            ActionKind::StartRoutine => "start_routine",
            ActionKind::PauseRoutine => "pause_routine",
            ActionKind::ResumeRoutine => "resume_routine",
            ActionKind::TickRuntimeCountdown { .. } => "tick_runtime_countdown",
            ActionKind::CompleteRuntimeCountdown => "complete_runtime_countdown",
            ActionKind::IncrementRep => "increment_rep",
            ActionKind::DecrementRep => "decrement_rep",
            ActionKind::CompleteSet => "complete_set",
            ActionKind::StartNextSet => "start_next_set",
            ActionKind::TickRestTimer { .. } => "tick_rest_timer",
            ActionKind::StartHoldTimer => "start_hold_timer",
            ActionKind::StopHoldTimer => "stop_hold_timer",
            ActionKind::ResetHoldTimer => "reset_hold_timer",
            ActionKind::TickHoldTimer { .. } => "tick_hold_timer",
            ActionKind::CompleteHoldRep => "complete_hold_rep",
            ActionKind::CompleteExercise => "complete_exercise",
            ActionKind::SkipExercise => "skip_exercise",
            ActionKind::EndSessionEarly => "end_session_early",
            ActionKind::FinishSession => "finish_session",
        }
    }
}

/// An action plus the caller's context.
///
/// `exercise_id` pins the action to the exercise the caller was looking at:
/// a stale tap for an exercise that is no longer current is ignored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Action {
    #[serde(flatten)]
    pub kind: ActionKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exercise_id: Option<String>,
}

impl Action {
    pub fn new(kind: ActionKind) -> Self {
        Self {
            kind,
            at: None,
            exercise_id: None,
        }
    }

    pub fn at(mut self, at: DateTime<Utc>) -> Self {
        self.at = Some(at);
        self
    }

    pub fn for_exercise(mut self, exercise_id: impl Into<String>) -> Self {
        self.exercise_id = Some(exercise_id.into());
        self
    }
}

impl From<ActionKind> for Action {
    fn from(kind: ActionKind) -> Self {
        Action::new(kind)
    }
}
