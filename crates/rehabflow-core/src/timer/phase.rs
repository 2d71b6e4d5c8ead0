//! Runtime phase machine for a single exercise.
//!
//! ```text
//! Idle --start--> Hold
//! {Hold, RepRest, SetRest, ExerciseRest} --pause--> Paused --resume--> previous
//! any (except Complete) --complete--> Complete
//! ```
//!
//! The machine is stateless; the caller keeps the current and previous
//! phase in its runtime state.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RuntimePhase {
    Idle,
    Hold,
    RepRest,
    SetRest,
    ExerciseRest,
    Paused,
    Complete,
}

impl RuntimePhase {
    /// Phases that can be paused and later restored.
    pub fn is_active(self) -> bool {
        matches!(
            self,
            RuntimePhase::Hold
                | RuntimePhase::RepRest
                | RuntimePhase::SetRest
                | RuntimePhase::ExerciseRest
        )
    }

    /// Phases whose remaining time is driven by the runtime countdown.
    pub fn is_counting(self) -> bool {
        matches!(self, RuntimePhase::Hold | RuntimePhase::RepRest)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PhaseEvent {
    Start,
    Pause,
    Resume,
    Complete,
}

/// Next phase, or `None` when the event is illegal in `phase`.
pub fn transition(
    phase: RuntimePhase,
    event: PhaseEvent,
    previous: Option<RuntimePhase>,
) -> Option<RuntimePhase> {
    match event {
        PhaseEvent::Start => (phase == RuntimePhase::Idle).then_some(RuntimePhase::Hold),
        PhaseEvent::Pause => phase.is_active().then_some(RuntimePhase::Paused),
        PhaseEvent::Resume => match (phase, previous) {
            (RuntimePhase::Paused, Some(prev)) => Some(prev),
            _ => None,
        },
        PhaseEvent::Complete => (phase != RuntimePhase::Complete).then_some(RuntimePhase::Complete),
    }
}
