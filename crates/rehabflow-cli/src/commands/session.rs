use std::error::Error;
use std::path::Path;
use std::time::Duration;

use clap::Subcommand;
use rehabflow_core::{
    format_remaining, Action, ActionKind, Config, Countdown, Database, Event, KeyValueStore,
    MemoryStore, MonotonicClock, Program, SessionEngine, SessionStore,
};
use serde::Serialize;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

type Engine<'a> = SessionEngine<&'a dyn KeyValueStore>;

#[derive(Subcommand)]
pub enum SessionAction {
    /// Start a new session (refuses while a resumable one is stored)
    Start {
        /// Session identifier (default: derived from the start time)
        #[arg(long)]
        session_id: Option<String>,
        /// Discard any stored session first
        #[arg(long)]
        fresh: bool,
    },
    /// Print the stored session as JSON
    Status,
    /// Accept the stored session as the active one
    Resume,
    /// Dispatch an action to the active session
    Act {
        /// Only apply if this exercise is still current
        #[arg(long)]
        exercise: Option<String>,
        #[command(subcommand)]
        action: ActAction,
    },
    /// Drive the runtime countdown live until it stops (Ctrl-C pauses)
    Countdown,
    /// Forget the stored session
    Discard,
}

#[derive(Subcommand)]
pub enum ActAction {
    StartRoutine,
    PauseRoutine,
    ResumeRoutine,
    TickRuntimeCountdown {
        #[arg(long)]
        remaining_ms: u64,
    },
    CompleteRuntimeCountdown,
    IncrementRep,
    DecrementRep,
    CompleteSet,
    StartNextSet,
    TickRestTimer {
        #[arg(long)]
        elapsed_seconds: f64,
    },
    StartHoldTimer,
    StopHoldTimer,
    ResetHoldTimer,
    TickHoldTimer {
        #[arg(long)]
        elapsed_seconds: f64,
    },
    CompleteHoldRep,
    CompleteExercise,
    SkipExercise,
    EndSessionEarly,
    FinishSession,
    /// Raw action JSON, e.g. '{"type":"increment_rep","exerciseId":"clam"}'
    Json {
        action: String,
    },
}

impl ActAction {
    fn into_action(self) -> Result<Action, serde_json::Error> {
        let kind = match self {
            ActAction::StartRoutine => ActionKind::StartRoutine,
            ActAction::PauseRoutine => ActionKind::PauseRoutine,
            ActAction::ResumeRoutine => ActionKind::ResumeRoutine,
            ActAction::TickRuntimeCountdown { remaining_ms } => {
                ActionKind::TickRuntimeCountdown { remaining_ms }
            }
            ActAction::CompleteRuntimeCountdown => ActionKind::CompleteRuntimeCountdown,
            ActAction::IncrementRep => ActionKind::IncrementRep,
            ActAction::DecrementRep => ActionKind::DecrementRep,
            ActAction::CompleteSet => ActionKind::CompleteSet,
            ActAction::StartNextSet => ActionKind::StartNextSet,
            ActAction::TickRestTimer { elapsed_seconds } => {
                ActionKind::TickRestTimer { elapsed_seconds }
            }
            ActAction::StartHoldTimer => ActionKind::StartHoldTimer,
            ActAction::StopHoldTimer => ActionKind::StopHoldTimer,
            ActAction::ResetHoldTimer => ActionKind::ResetHoldTimer,
            ActAction::TickHoldTimer { elapsed_seconds } => {
                ActionKind::TickHoldTimer { elapsed_seconds }
            }
            ActAction::CompleteHoldRep => ActionKind::CompleteHoldRep,
            ActAction::CompleteExercise => ActionKind::CompleteExercise,
            ActAction::SkipExercise => ActionKind::SkipExercise,
            ActAction::EndSessionEarly => ActionKind::EndSessionEarly,
            ActAction::FinishSession => ActionKind::FinishSession,
            ActAction::Json { action } => return serde_json::from_str(&action),
        };
        Ok(Action::new(kind))
    }
}

fn load_program(path: Option<&Path>, config: &Config) -> Result<Program, Box<dyn Error>> {
    let path = path
        .or(config.program.catalog_path.as_deref())
        .ok_or("no program catalog: pass --program or set program.catalog_path")?;
    Ok(Program::load(path)?)
}

fn open_store() -> Box<dyn KeyValueStore> {
    match Database::open() {
        Ok(db) => Box::new(db),
        Err(e) => {
            warn!(error = %e, "database unavailable, session will not survive this process");
            Box::new(MemoryStore::new())
        }
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<(), Box<dyn Error>> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn print_line<T: Serialize>(value: &T) -> Result<(), Box<dyn Error>> {
    println!("{}", serde_json::to_string(value)?);
    Ok(())
}

/// The stored session becomes the active one for every command but `start`.
fn take_stored(engine: &mut Engine<'_>) -> Result<(), Box<dyn Error>> {
    engine
        .accept_resume()
        .map(|_| ())
        .ok_or_else(|| "no active session: run `session start`".into())
}

pub fn run(program: Option<&Path>, action: SessionAction) -> Result<(), Box<dyn Error>> {
    let config = Config::load()?;
    let program = load_program(program, &config)?;
    let backend = open_store();
    let gateway = SessionStore::new(&*backend, &program)
        .with_key(config.persistence.storage_key.clone())
        .with_expiry(config.persistence.expiry());
    let mut engine: Engine<'_> = SessionEngine::open(program, gateway);

    match action {
        SessionAction::Start { session_id, fresh } => {
            if let Some(stored) = engine.offered_resume() {
                if !fresh {
                    print_json(&Event::ResumeOffered {
                        session_id: stored.session_id.clone(),
                        current_exercise_id: stored.current_exercise_id.clone(),
                        updated_at: stored.updated_at,
                    })?;
                    return Err(
                        "a resumable session is stored: run `session resume` or `session start --fresh`"
                            .into(),
                    );
                }
                engine.decline_resume();
            }
            let event = engine.dispatch(Action::new(ActionKind::StartSession { session_id }));
            if matches!(event, Event::ActionIgnored { .. }) {
                return Err("session could not be started".into());
            }
            print_json(&event)?;
        }
        SessionAction::Status => {
            engine.accept_resume();
            print_json(&engine.session())?;
        }
        SessionAction::Resume => {
            let event = engine
                .accept_resume()
                .ok_or("no resumable session stored")?;
            print_json(&event)?;
        }
        SessionAction::Act { exercise, action } => {
            take_stored(&mut engine)?;
            let mut action = action.into_action()?;
            if let Some(id) = exercise {
                action = action.for_exercise(id);
            }
            print_json(&engine.dispatch(action))?;
        }
        SessionAction::Countdown => {
            take_stored(&mut engine)?;
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()?;
            runtime.block_on(drive_countdown(&mut engine, config.countdown.cadence_ms))?;
        }
        SessionAction::Discard => {
            engine.discard();
            print_json(&serde_json::json!({ "type": "session_discarded" }))?;
        }
    }
    Ok(())
}

/// Poll the countdown every cadence and feed it into the session.
///
/// Events are printed one per line; the remaining time goes to stderr.
async fn drive_countdown(engine: &mut Engine<'_>, cadence_ms: u64) -> Result<(), Box<dyn Error>> {
    if engine.countdown_target().is_none() {
        return Err("nothing to count down: start the routine on a hold exercise".into());
    }

    let mut countdown = Countdown::with_cadence(MonotonicClock::new(), cadence_ms);
    for event in engine.arm(&mut countdown) {
        print_line(&event)?;
    }

    let mut interval = tokio::time::interval(Duration::from_millis(countdown.cadence_ms()));
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    while countdown.is_active() {
        tokio::select! {
            _ = interval.tick() => {
                for event in engine.pump(&mut countdown) {
                    print_line(&event)?;
                }
                if let Some(remaining_ms) = countdown.remaining_ms() {
                    let remaining_ms = i64::try_from(remaining_ms).unwrap_or(i64::MAX);
                    eprint!("\r{:>6}s", format_remaining(remaining_ms));
                }
            }
            signal = &mut ctrl_c => {
                signal?;
                debug!("interrupted, pausing routine");
                countdown.stop();
                print_line(&engine.dispatch(Action::new(ActionKind::PauseRoutine)))?;
                break;
            }
        }
    }
    eprintln!();
    Ok(())
}
