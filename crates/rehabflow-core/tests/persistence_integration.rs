//! Session persistence over an on-disk SQLite database.
//!
//! Each "process" opens the database afresh, the way the CLI does.

use chrono::{Duration, TimeZone, Utc};
use rehabflow_core::storage::SnapshotRejection;
use rehabflow_core::{
    Action, ActionKind, Database, Event, KeyValueStore, Program, SessionEngine, SessionStatus,
    SessionStore,
};
use tempfile::TempDir;

fn program() -> Program {
    Program::from_toml(
        r#"
        id = "shoulder"
        name = "Shoulder"

        [[exercises]]
        id = "pendulum"
        name = "Pendulum"
        order = 2
        targetSets = 2
        targetRepsPerSet = 1
        setRestSeconds = 15

        [[exercises]]
        id = "wall-slide"
        name = "Wall slide"
        order = 1
        targetSets = 1
        targetRepsPerSet = 1
        "#,
    )
    .unwrap()
}

fn open(dir: &TempDir) -> Database {
    Database::open_at(&dir.path().join("rehabflow.db")).unwrap()
}

#[test]
fn session_survives_reopen() {
    let dir = TempDir::new().unwrap();
    {
        let db = open(&dir);
        let program = program();
        let mut engine = SessionEngine::open(program.clone(), SessionStore::new(&db, &program));
        assert!(engine.offered_resume().is_none());
        engine.dispatch(Action::new(ActionKind::StartSession {
            session_id: Some("morning".into()),
        }));
        // Catalog order wins over file order.
        assert_eq!(
            engine.session().unwrap().current_exercise_id.as_deref(),
            Some("wall-slide")
        );
        engine.dispatch(Action::new(ActionKind::IncrementRep));
        engine.dispatch(Action::new(ActionKind::CompleteExercise));
        engine.dispatch(Action::new(ActionKind::IncrementRep));
        engine.dispatch(Action::new(ActionKind::CompleteSet));
    }

    let db = open(&dir);
    let program = program();
    let mut engine = SessionEngine::open(program.clone(), SessionStore::new(&db, &program));
    let offered = engine.offered_resume().unwrap();
    assert_eq!(offered.session_id, "morning");
    assert_eq!(offered.current_exercise_id.as_deref(), Some("pendulum"));
    assert!(offered.exercise_progress["pendulum"].rest_timer_running);

    engine.accept_resume();
    engine.dispatch(Action::new(ActionKind::StartNextSet));
    engine.dispatch(Action::new(ActionKind::IncrementRep));
    let event = engine.dispatch(Action::new(ActionKind::CompleteExercise));
    assert!(matches!(
        event,
        Event::SessionEnded {
            status: SessionStatus::Completed,
            ..
        }
    ));
    assert!(db.kv_get("active_session").unwrap().is_none());
}

#[test]
fn expired_snapshot_is_cleared_on_read() {
    let dir = TempDir::new().unwrap();
    let db = open(&dir);
    let program = program();
    let store = SessionStore::new(&db, &program).with_expiry(Duration::hours(2));
    let mut engine = SessionEngine::new(program.clone(), store);
    let started = Utc.with_ymd_and_hms(2026, 5, 4, 7, 30, 0).unwrap();
    engine.dispatch(
        Action::new(ActionKind::StartSession {
            session_id: Some("old".into()),
        })
        .at(started),
    );

    let store = SessionStore::new(&db, &program).with_expiry(Duration::hours(2));
    assert!(store.read_at(started + Duration::minutes(119)).is_some());
    assert!(matches!(
        store.load(started + Duration::hours(3)),
        Err(SnapshotRejection::Expired { .. })
    ));
    assert!(store.read_at(started + Duration::hours(3)).is_none());
    assert!(db.get("active_session").unwrap().is_none());
}

#[test]
fn custom_storage_key_is_isolated() {
    let dir = TempDir::new().unwrap();
    let db = open(&dir);
    let program = program();
    let mut engine = SessionEngine::new(
        program.clone(),
        SessionStore::new(&db, &program).with_key("clinic_session"),
    );
    engine.dispatch(Action::new(ActionKind::StartSession { session_id: None }));

    assert!(db.kv_get("clinic_session").unwrap().is_some());
    assert!(SessionStore::new(&db, &program).read().is_none());
}

#[test]
fn snapshot_from_another_program_is_rejected() {
    let dir = TempDir::new().unwrap();
    let db = open(&dir);
    let program = program();
    let mut engine = SessionEngine::new(program.clone(), SessionStore::new(&db, &program));
    engine.dispatch(Action::new(ActionKind::StartSession { session_id: None }));

    let mut other = program.clone();
    other.id = "hip".into();
    let store = SessionStore::new(&db, &other);
    assert!(matches!(
        store.load(Utc::now()),
        Err(SnapshotRejection::ProgramMismatch { .. })
    ));
}
