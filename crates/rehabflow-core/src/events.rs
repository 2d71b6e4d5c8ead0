use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::session::{PassPhase, SessionState, SessionStatus};
use crate::timer::RuntimePhase;

/// Every dispatched action produces an Event.
/// The CLI prints them; a GUI would poll for them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    SessionStarted {
        session_id: String,
        first_exercise_id: Option<String>,
        at: DateTime<Utc>,
    },
    /// The action changed the session.
    ActionApplied {
        action: String,
        current_exercise_id: Option<String>,
        current_phase: PassPhase,
        runtime_phase: RuntimePhase,
        remaining_ms: u64,
        at: DateTime<Utc>,
    },
    /// The action was illegal in the current state and had no effect.
    ActionIgnored {
        action: String,
        at: DateTime<Utc>,
    },
    /// Terminal transition. The stored snapshot has been cleared.
    SessionEnded {
        session_id: String,
        status: SessionStatus,
        ended_at: DateTime<Utc>,
    },
    /// A stored in-progress session is available to resume.
    ResumeOffered {
        session_id: String,
        current_exercise_id: Option<String>,
        updated_at: DateTime<Utc>,
    },
}

impl Event {
    pub(crate) fn applied(action: &str, state: &SessionState) -> Self {
        Event::ActionApplied {
            action: action.to_string(),
            current_exercise_id: state.current_exercise_id.clone(),
            current_phase: state.current_phase,
            runtime_phase: state.runtime.phase,
            remaining_ms: state.runtime.remaining_ms,
            at: state.updated_at,
        }
    }

    pub(crate) fn ended(state: &SessionState) -> Self {
        Event::SessionEnded {
            session_id: state.session_id.clone(),
            status: state.status,
            ended_at: state.ended_at.unwrap_or(state.updated_at),
        }
    }

    pub(crate) fn resume_offered(state: &SessionState) -> Self {
        Event::ResumeOffered {
            session_id: state.session_id.clone(),
            current_exercise_id: state.current_exercise_id.clone(),
            updated_at: state.updated_at,
        }
    }
}
