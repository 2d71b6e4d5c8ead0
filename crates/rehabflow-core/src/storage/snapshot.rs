//! Versioned session snapshots.
//!
//! ```text
//! { "version": 1, "programId": "...", "session": { ...SessionState... } }
//! ```
//!
//! Only in-progress sessions are stored. Anything that fails to read back
//! cleanly (storage error, bad JSON, other schema version, other program,
//! invalid shape, terminal, expired) is treated as absent and the slot is
//! cleared. Write failures are logged and swallowed: the interactive session
//! never waits on or fails because of storage.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::KeyValueStore;
use crate::catalog::{Exercise, Program};
use crate::error::{StorageError, ValidationError};
use crate::session::SessionState;

/// Current envelope schema version.
pub const SCHEMA_VERSION: u32 = 1;

pub const DEFAULT_STORAGE_KEY: &str = "active_session";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotEnvelope {
    pub version: u32,
    pub program_id: String,
    pub session: SessionState,
}

/// Why a stored snapshot was not offered for resume.
#[derive(Debug, Clone, PartialEq)]
pub enum SnapshotRejection {
    Missing,
    Unreadable(String),
    Malformed(String),
    VersionMismatch { found: Option<u64> },
    ProgramMismatch { found: String },
    Invalid(ValidationError),
    Terminal,
    Expired { updated_at: DateTime<Utc> },
}

/// Persistence gateway for one program's active session.
pub struct SessionStore<S: KeyValueStore> {
    store: S,
    key: String,
    program_id: String,
    catalog: Vec<Exercise>,
    expiry: Duration,
}

impl<S: KeyValueStore> SessionStore<S> {
    pub fn new(store: S, program: &Program) -> Self {
        Self {
            store,
            key: DEFAULT_STORAGE_KEY.to_string(),
            program_id: program.id.clone(),
            catalog: program.exercises.clone(),
            expiry: Duration::hours(12),
        }
    }

    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = key.into();
        self
    }

    pub fn with_expiry(mut self, expiry: Duration) -> Self {
        self.expiry = expiry;
        self
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Store an in-progress session; a terminal session clears the slot.
    pub fn persist(&self, session: &SessionState) {
        if let Err(e) = self.try_persist(session) {
            warn!(error = %e, key = %self.key, "failed to persist session snapshot");
        }
    }

    /// Best-effort removal of the stored snapshot.
    pub fn clear(&self) {
        if let Err(e) = self.store.remove(&self.key) {
            warn!(error = %e, key = %self.key, "failed to clear session snapshot");
        }
    }

    /// The stored session, if it is resumable now.
    pub fn read(&self) -> Option<SessionState> {
        self.read_at(Utc::now())
    }

    /// The stored session, if it is resumable at `now`.
    pub fn read_at(&self, now: DateTime<Utc>) -> Option<SessionState> {
        match self.load(now) {
            Ok(session) => Some(session),
            Err(SnapshotRejection::Missing) => None,
            Err(rejection) => {
                warn!(?rejection, key = %self.key, "discarding stored session snapshot");
                self.clear();
                None
            }
        }
    }

    fn try_persist(&self, session: &SessionState) -> Result<(), StorageError> {
        if session.status.is_terminal() {
            debug!(session_id = %session.session_id, "terminal session, clearing snapshot");
            return self.store.remove(&self.key);
        }
        let envelope = SnapshotEnvelope {
            version: SCHEMA_VERSION,
            program_id: self.program_id.clone(),
            session: session.clone(),
        };
        let raw = serde_json::to_string(&envelope)
            .map_err(|e| StorageError::Unavailable(format!("serialize snapshot: {e}")))?;
        self.store.set(&self.key, &raw)
    }

    /// Read and check the stored snapshot without side effects.
    pub fn load(&self, now: DateTime<Utc>) -> Result<SessionState, SnapshotRejection> {
        let raw = self
            .store
            .get(&self.key)
            .map_err(|e| SnapshotRejection::Unreadable(e.to_string()))?
            .ok_or(SnapshotRejection::Missing)?;
        let envelope = decode(&raw)?;
        if envelope.program_id != self.program_id {
            return Err(SnapshotRejection::ProgramMismatch {
                found: envelope.program_id,
            });
        }
        let session = envelope.session;
        session.validate().map_err(SnapshotRejection::Invalid)?;
        session
            .validate_against(&self.catalog)
            .map_err(SnapshotRejection::Invalid)?;
        if session.status.is_terminal() {
            return Err(SnapshotRejection::Terminal);
        }
        if now.signed_duration_since(session.updated_at) > self.expiry {
            return Err(SnapshotRejection::Expired {
                updated_at: session.updated_at,
            });
        }
        Ok(session)
    }
}

/// Decode an envelope, checking the version before the body.
pub fn decode(raw: &str) -> Result<SnapshotEnvelope, SnapshotRejection> {
    let value: serde_json::Value =
        serde_json::from_str(raw).map_err(|e| SnapshotRejection::Malformed(e.to_string()))?;
    let version = value.get("version").and_then(serde_json::Value::as_u64);
    if version != Some(u64::from(SCHEMA_VERSION)) {
        return Err(SnapshotRejection::VersionMismatch { found: version });
    }
    serde_json::from_value(value).map_err(|e| SnapshotRejection::Malformed(e.to_string()))
}
