//! Session state types.
//!
//! A [`SessionState`] is only ever replaced, never edited in place, by the
//! reducer. The validators live next to the types they check so a persisted
//! snapshot is held to the same shape the reducer produces.

use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::catalog::Exercise;
use crate::error::ValidationError;
use crate::timer::RuntimePhase;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    InProgress,
    Completed,
    EndedEarly,
}

impl SessionStatus {
    pub fn is_terminal(self) -> bool {
        self != SessionStatus::InProgress
    }
}

/// Which traversal the user is in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PassPhase {
    Primary,
    Skip,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetProgress {
    /// 1-based.
    pub set_number: u32,
    pub completed_reps: u32,
    pub target_reps: u32,
}

impl SetProgress {
    pub fn is_met(&self) -> bool {
        self.completed_reps >= self.target_reps
    }

    pub fn has_capacity(&self) -> bool {
        self.completed_reps < self.target_reps
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExerciseProgress {
    pub completed: bool,
    pub skipped_count: u32,
    pub active_set_index: usize,
    pub sets: Vec<SetProgress>,
    pub hold_timer_running: bool,
    pub hold_elapsed_seconds: f64,
    pub rest_timer_running: bool,
    pub rest_elapsed_seconds: f64,
}

impl ExerciseProgress {
    pub fn for_exercise(exercise: &Exercise) -> Self {
        let sets = (1..=exercise.target_sets.max(1))
            .map(|set_number| SetProgress {
                set_number,
                completed_reps: 0,
                target_reps: exercise.target_reps_per_set,
            })
            .collect();
        Self {
            completed: false,
            skipped_count: 0,
            active_set_index: 0,
            sets,
            hold_timer_running: false,
            hold_elapsed_seconds: 0.0,
            rest_timer_running: false,
            rest_elapsed_seconds: 0.0,
        }
    }

    pub fn active_set(&self) -> Option<&SetProgress> {
        self.sets.get(self.active_set_index)
    }

    pub(crate) fn active_set_mut(&mut self) -> Option<&mut SetProgress> {
        self.sets.get_mut(self.active_set_index)
    }

    pub fn has_next_set(&self) -> bool {
        self.active_set_index + 1 < self.sets.len()
    }

    pub fn all_sets_met(&self) -> bool {
        self.sets.iter().all(SetProgress::is_met)
    }

    pub fn any_timer_running(&self) -> bool {
        self.hold_timer_running || self.rest_timer_running
    }

    pub(crate) fn clear_hold(&mut self) {
        self.hold_timer_running = false;
        self.hold_elapsed_seconds = 0.0;
    }

    pub(crate) fn clear_rest(&mut self) {
        self.rest_timer_running = false;
        self.rest_elapsed_seconds = 0.0;
    }

    pub(crate) fn clear_timers(&mut self) {
        self.clear_hold();
        self.clear_rest();
    }

    fn validate(&self, id: &str) -> Result<(), ValidationError> {
        let field = |name: &str| format!("exerciseProgress.{id}.{name}");
        if self.sets.is_empty() {
            return Err(ValidationError::invalid(field("sets"), "must not be empty"));
        }
        if self.active_set_index >= self.sets.len() {
            return Err(ValidationError::OutOfBounds {
                collection: field("sets"),
                index: self.active_set_index,
                len: self.sets.len(),
            });
        }
        for (index, set) in self.sets.iter().enumerate() {
            if set.set_number as usize != index + 1 {
                return Err(ValidationError::invalid(
                    field("sets.setNumber"),
                    format!("expected {}, found {}", index + 1, set.set_number),
                ));
            }
            if set.completed_reps > set.target_reps {
                return Err(ValidationError::invalid(
                    field("sets.completedReps"),
                    format!("{} exceeds target {}", set.completed_reps, set.target_reps),
                ));
            }
        }
        if self.hold_timer_running && self.rest_timer_running {
            return Err(ValidationError::invalid(
                field("timers"),
                "hold and rest timers both running",
            ));
        }
        for (name, value) in [
            ("holdElapsedSeconds", self.hold_elapsed_seconds),
            ("restElapsedSeconds", self.rest_elapsed_seconds),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(ValidationError::invalid(field(name), "must be a non-negative number"));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRuntimeState {
    pub phase: RuntimePhase,
    pub exercise_index: usize,
    pub set_index: usize,
    pub rep_index: u32,
    pub remaining_ms: u64,
    /// Phase to restore on resume; only set while paused.
    #[serde(deserialize_with = "nullable")]
    pub previous_phase: Option<RuntimePhase>,
}

impl SessionRuntimeState {
    pub fn idle(exercise_index: usize) -> Self {
        Self {
            phase: RuntimePhase::Idle,
            exercise_index,
            set_index: 0,
            rep_index: 0,
            remaining_ms: 0,
            previous_phase: None,
        }
    }

    fn validate(&self) -> Result<(), ValidationError> {
        match (self.phase, self.previous_phase) {
            (RuntimePhase::Paused, Some(prev)) if prev.is_active() => Ok(()),
            (RuntimePhase::Paused, _) => Err(ValidationError::invalid(
                "runtime.previousPhase",
                "paused runtime needs an active previous phase",
            )),
            (_, Some(_)) => Err(ValidationError::invalid(
                "runtime.previousPhase",
                "only set while paused",
            )),
            (_, None) => Ok(()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionState {
    pub session_id: String,
    pub status: SessionStatus,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(deserialize_with = "nullable")]
    pub ended_at: Option<DateTime<Utc>>,
    pub ended_early: bool,
    pub current_phase: PassPhase,
    pub primary_cursor: usize,
    #[serde(deserialize_with = "nullable")]
    pub current_exercise_id: Option<String>,
    pub skip_queue: Vec<String>,
    pub exercise_progress: BTreeMap<String, ExerciseProgress>,
    pub runtime: SessionRuntimeState,
}

impl SessionState {
    /// Fresh session over `catalog`, or `None` for an empty catalog.
    pub fn create(catalog: &[Exercise], session_id: String, at: DateTime<Utc>) -> Option<Self> {
        let first = catalog.first()?;
        let exercise_progress = catalog
            .iter()
            .map(|e| (e.id.clone(), ExerciseProgress::for_exercise(e)))
            .collect();
        Some(Self {
            session_id,
            status: SessionStatus::InProgress,
            started_at: at,
            updated_at: at,
            ended_at: None,
            ended_early: false,
            current_phase: PassPhase::Primary,
            primary_cursor: 0,
            current_exercise_id: Some(first.id.clone()),
            skip_queue: Vec::new(),
            exercise_progress,
            runtime: SessionRuntimeState::idle(0),
        })
    }

    pub fn is_in_progress(&self) -> bool {
        self.status == SessionStatus::InProgress
    }

    pub fn current_progress(&self) -> Option<&ExerciseProgress> {
        self.current_exercise_id
            .as_ref()
            .and_then(|id| self.exercise_progress.get(id))
    }

    /// Catalog index of the current exercise.
    pub fn current_index(&self, catalog: &[Exercise]) -> Option<usize> {
        let id = self.current_exercise_id.as_deref()?;
        catalog.iter().position(|e| e.id == id)
    }

    pub fn current_exercise<'a>(&self, catalog: &'a [Exercise]) -> Option<&'a Exercise> {
        self.current_index(catalog).map(|i| &catalog[i])
    }

    /// Whether the runtime cursor matches the coarse progress cursor.
    pub fn cursor_in_sync(&self, catalog: &[Exercise]) -> bool {
        if !self.is_in_progress() {
            return true;
        }
        let (Some(index), Some(progress)) = (self.current_index(catalog), self.current_progress())
        else {
            return false;
        };
        self.runtime.exercise_index == index
            && self.runtime.set_index == progress.active_set_index
            && Some(self.runtime.rep_index) == progress.active_set().map(|s| s.completed_reps)
    }

    /// Structural checks beyond what typed decoding already guarantees.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.session_id.is_empty() {
            return Err(ValidationError::invalid("sessionId", "must not be empty"));
        }
        if self.ended_early != (self.status == SessionStatus::EndedEarly) {
            return Err(ValidationError::invalid("endedEarly", "disagrees with status"));
        }
        if self.exercise_progress.is_empty() {
            return Err(ValidationError::invalid("exerciseProgress", "must not be empty"));
        }
        for (id, progress) in &self.exercise_progress {
            progress.validate(id)?;
        }
        let mut seen = HashSet::new();
        for id in &self.skip_queue {
            if !seen.insert(id.as_str()) {
                return Err(ValidationError::invalid("skipQueue", format!("duplicate id '{id}'")));
            }
            match self.exercise_progress.get(id) {
                None => {
                    return Err(ValidationError::invalid("skipQueue", format!("unknown id '{id}'")))
                }
                Some(progress) if progress.completed => {
                    return Err(ValidationError::invalid(
                        "skipQueue",
                        format!("completed id '{id}' still queued"),
                    ))
                }
                Some(_) => {}
            }
        }
        self.runtime.validate()?;

        if self.status.is_terminal() {
            if self.current_exercise_id.is_some() {
                return Err(ValidationError::invalid(
                    "currentExerciseId",
                    "must be null once terminal",
                ));
            }
            if self.ended_at.is_none() {
                return Err(ValidationError::invalid("endedAt", "must be set once terminal"));
            }
            if self.runtime.phase != RuntimePhase::Complete {
                return Err(ValidationError::invalid(
                    "runtime.phase",
                    "must be complete once terminal",
                ));
            }
            if self.exercise_progress.values().any(ExerciseProgress::any_timer_running) {
                return Err(ValidationError::invalid(
                    "exerciseProgress",
                    "timer running once terminal",
                ));
            }
            return Ok(());
        }

        let Some(current) = self.current_exercise_id.as_deref() else {
            return Err(ValidationError::invalid("currentExerciseId", "missing while in progress"));
        };
        if !self.exercise_progress.contains_key(current) {
            return Err(ValidationError::invalid(
                "currentExerciseId",
                format!("unknown id '{current}'"),
            ));
        }
        if self.ended_at.is_some() {
            return Err(ValidationError::invalid("endedAt", "set while in progress"));
        }
        if self.current_phase == PassPhase::Skip && self.skip_queue.is_empty() {
            return Err(ValidationError::invalid("currentPhase", "skip pass with empty queue"));
        }
        if self.current_phase == PassPhase::Skip
            && self.skip_queue.first().map(String::as_str) != Some(current)
        {
            return Err(ValidationError::invalid(
                "currentExerciseId",
                "skip pass must be on the queue head",
            ));
        }
        Ok(())
    }

    /// Checks that tie the snapshot to a particular catalog.
    pub fn validate_against(&self, catalog: &[Exercise]) -> Result<(), ValidationError> {
        let keys_match = self.exercise_progress.len() == catalog.len()
            && catalog.iter().all(|e| self.exercise_progress.contains_key(&e.id));
        if !keys_match {
            return Err(ValidationError::invalid(
                "exerciseProgress",
                "keys do not match the catalog",
            ));
        }
        if self.primary_cursor >= catalog.len() {
            return Err(ValidationError::OutOfBounds {
                collection: "catalog".into(),
                index: self.primary_cursor,
                len: catalog.len(),
            });
        }
        if self.is_in_progress()
            && self.current_phase == PassPhase::Primary
            && self.current_exercise_id.as_deref() != Some(catalog[self.primary_cursor].id.as_str())
        {
            return Err(ValidationError::invalid(
                "currentExerciseId",
                "primary pass must be on the primary cursor",
            ));
        }
        for exercise in catalog {
            let progress = &self.exercise_progress[&exercise.id];
            if progress.sets.len() != exercise.target_sets.max(1) as usize {
                return Err(ValidationError::invalid(
                    format!("exerciseProgress.{}.sets", exercise.id),
                    "set count does not match the catalog",
                ));
            }
        }
        Ok(())
    }
}

/// An `Option` whose key must be present, as `null` when unset.
fn nullable<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer)
}
