mod action;
mod engine;
mod model;
mod reducer;

pub use action::{Action, ActionKind};
pub use engine::SessionEngine;
pub use model::{
    ExerciseProgress, PassPhase, SessionRuntimeState, SessionState, SessionStatus, SetProgress,
};
pub use reducer::{reduce, reduce_slot};
