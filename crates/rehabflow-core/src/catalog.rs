//! Exercise catalog.
//!
//! The session reducer trusts its catalog: ids are unique, `order` values are
//! unique and positive, and exercises arrive sorted by `order`.
//! [`Program::from_json`] / [`Program::load`] are the thin adapter that
//! establishes that contract for programs read from disk.

use std::collections::HashSet;
use std::path::Path;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::CatalogError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Exercise {
    pub id: String,
    pub name: String,
    pub order: u32,
    pub target_sets: u32,
    pub target_reps_per_set: u32,
    /// `None` for rep-counted exercises, hold duration otherwise.
    #[serde(default)]
    pub hold_seconds: Option<f64>,
    #[serde(default)]
    pub rep_rest_seconds: f64,
    #[serde(default)]
    pub set_rest_seconds: f64,
    #[serde(default)]
    pub exercise_rest_seconds: f64,
    #[serde(default)]
    pub optional: bool,
    #[serde(default)]
    pub available_from: Option<NaiveDate>,
}

impl Exercise {
    pub fn is_hold(&self) -> bool {
        self.hold_seconds.is_some()
    }

    /// Hold duration in milliseconds; zero for rep-counted exercises.
    pub fn hold_ms(&self) -> f64 {
        self.hold_seconds.map(|s| s * 1000.0).unwrap_or(0.0)
    }

    pub fn rep_rest_ms(&self) -> f64 {
        self.rep_rest_seconds * 1000.0
    }

    pub fn set_rest_ms(&self) -> f64 {
        self.set_rest_seconds * 1000.0
    }

    pub fn is_available_on(&self, day: NaiveDate) -> bool {
        self.available_from.map_or(true, |from| from <= day)
    }
}

/// A named, versioned routine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Program {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub version: String,
    pub exercises: Vec<Exercise>,
}

impl Program {
    /// Parse a program from JSON and establish the catalog contract.
    pub fn from_json(raw: &str) -> Result<Self, CatalogError> {
        let program: Program =
            serde_json::from_str(raw).map_err(|e| CatalogError::Parse(e.to_string()))?;
        program.normalized()
    }

    /// Parse a program from TOML (`[[exercises]]` tables).
    pub fn from_toml(raw: &str) -> Result<Self, CatalogError> {
        let program: Program =
            toml::from_str(raw).map_err(|e| CatalogError::Parse(e.to_string()))?;
        program.normalized()
    }

    /// Load a program from a `.json` or `.toml` file.
    pub fn load(path: &Path) -> Result<Self, CatalogError> {
        let raw = std::fs::read_to_string(path).map_err(|source| CatalogError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("toml") => Self::from_toml(&raw),
            _ => Self::from_json(&raw),
        }
    }

    pub fn exercise_ids(&self) -> impl Iterator<Item = &str> {
        self.exercises.iter().map(|e| e.id.as_str())
    }

    fn normalized(mut self) -> Result<Self, CatalogError> {
        if self.exercises.is_empty() {
            return Err(CatalogError::Empty);
        }
        {
            let mut ids = HashSet::new();
            let mut orders = HashSet::new();
            for exercise in &self.exercises {
                validate_exercise(exercise)?;
                if !ids.insert(exercise.id.as_str()) {
                    return Err(CatalogError::DuplicateId(exercise.id.clone()));
                }
                if !orders.insert(exercise.order) {
                    return Err(CatalogError::DuplicateOrder {
                        id: exercise.id.clone(),
                        order: exercise.order,
                    });
                }
            }
        }
        self.exercises.sort_by_key(|e| e.order);
        Ok(self)
    }
}

fn validate_exercise(exercise: &Exercise) -> Result<(), CatalogError> {
    let invalid = |message: &str| CatalogError::InvalidExercise {
        id: exercise.id.clone(),
        message: message.to_string(),
    };
    if exercise.id.trim().is_empty() {
        return Err(invalid("id is empty"));
    }
    if exercise.order == 0 {
        return Err(invalid("order must be positive"));
    }
    if exercise.target_sets == 0 || exercise.target_reps_per_set == 0 {
        return Err(invalid("targets must be positive"));
    }
    if let Some(hold) = exercise.hold_seconds {
        if !hold.is_finite() || hold <= 0.0 {
            return Err(invalid("holdSeconds must be a positive number"));
        }
    }
    for rest in [
        exercise.rep_rest_seconds,
        exercise.set_rest_seconds,
        exercise.exercise_rest_seconds,
    ] {
        if !rest.is_finite() || rest < 0.0 {
            return Err(invalid("rest durations must be non-negative"));
        }
    }
    Ok(())
}
