//! Session engine.
//!
//! Owns the catalog, the current session and its persistence gateway. Every
//! action goes through [`SessionEngine::dispatch`]; a transition that changes
//! the session is persisted immediately (or cleared, once terminal).
//!
//! ## Usage
//!
//! ```ignore
//! let mut engine = SessionEngine::open(program, store);
//! if engine.offered_resume().is_some() { engine.accept_resume(); }
//! engine.dispatch(Action::new(ActionKind::StartRoutine));
//! engine.arm(&mut countdown);
//! // In a loop, every cadence:
//! engine.pump(&mut countdown);
//! ```

use chrono::Utc;
use tracing::info;

use super::action::{Action, ActionKind};
use super::model::SessionState;
use super::reducer::reduce_slot;
use crate::catalog::Program;
use crate::events::Event;
use crate::storage::{KeyValueStore, SessionStore};
use crate::timer::{Countdown, CountdownSignal, TimeSource};

pub struct SessionEngine<S: KeyValueStore> {
    program: Program,
    store: SessionStore<S>,
    session: Option<SessionState>,
    offered: Option<SessionState>,
}

impl<S: KeyValueStore> SessionEngine<S> {
    /// Engine with no session and nothing offered.
    pub fn new(program: Program, store: SessionStore<S>) -> Self {
        Self {
            program,
            store,
            session: None,
            offered: None,
        }
    }

    /// Engine that asks the gateway for a resumable session first.
    pub fn open(program: Program, store: SessionStore<S>) -> Self {
        let offered = store.read();
        let mut engine = Self::new(program, store);
        engine.offered = offered;
        engine
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn program(&self) -> &Program {
        &self.program
    }

    pub fn session(&self) -> Option<&SessionState> {
        self.session.as_ref()
    }

    pub fn offered_resume(&self) -> Option<&SessionState> {
        self.offered.as_ref()
    }

    pub fn store(&self) -> &SessionStore<S> {
        &self.store
    }

    /// Remaining time the runtime countdown should run for, if any.
    pub fn countdown_target(&self) -> Option<u64> {
        let session = self.session.as_ref()?;
        if !session.is_in_progress() || !session.runtime.phase.is_counting() {
            return None;
        }
        let exercise = session.current_exercise(&self.program.exercises)?;
        exercise.is_hold().then_some(session.runtime.remaining_ms)
    }

    // ── Commands ─────────────────────────────────────────────────────

    /// Make the offered snapshot the current session.
    pub fn accept_resume(&mut self) -> Option<Event> {
        let session = self.offered.take()?;
        info!(session_id = %session.session_id, "resuming stored session");
        let event = Event::resume_offered(&session);
        self.session = Some(session);
        Some(event)
    }

    /// Drop the offered snapshot and clear it from storage.
    pub fn decline_resume(&mut self) {
        if self.offered.take().is_some() {
            self.store.clear();
        }
    }

    /// Forget the current session and its snapshot.
    pub fn discard(&mut self) {
        self.session = None;
        self.offered = None;
        self.store.clear();
    }

    pub fn dispatch(&mut self, action: Action) -> Event {
        let name = action.kind.name();
        let next = reduce_slot(self.session.as_ref(), &action, &self.program.exercises);
        let next = match next {
            Some(next) if Some(&next) != self.session.as_ref() => next,
            _ => {
                return Event::ActionIgnored {
                    action: name.to_string(),
                    at: action.at.unwrap_or_else(Utc::now),
                }
            }
        };

        self.store.persist(&next);
        let event = if self.session.is_none() {
            Event::SessionStarted {
                session_id: next.session_id.clone(),
                first_exercise_id: next.current_exercise_id.clone(),
                at: next.started_at,
            }
        } else if next.status.is_terminal() {
            Event::ended(&next)
        } else {
            Event::applied(name, &next)
        };
        self.session = Some(next);
        event
    }

    /// Start (or restart) `countdown` for the current runtime phase.
    ///
    /// Stops it when the phase does not count down.
    pub fn arm<T: TimeSource>(&mut self, countdown: &mut Countdown<T>) -> Vec<Event> {
        match self.countdown_target() {
            Some(remaining_ms) => {
                let signals = countdown.start(remaining_ms as f64);
                self.apply_signals(signals, countdown)
            }
            None => {
                countdown.stop();
                Vec::new()
            }
        }
    }

    /// Poll `countdown` and feed its signals into the session.
    pub fn pump<T: TimeSource>(&mut self, countdown: &mut Countdown<T>) -> Vec<Event> {
        let signals = countdown.poll();
        self.apply_signals(signals, countdown)
    }

    fn apply_signals<T: TimeSource>(
        &mut self,
        mut signals: Vec<CountdownSignal>,
        countdown: &mut Countdown<T>,
    ) -> Vec<Event> {
        let mut events = Vec::new();
        loop {
            let mut completed = false;
            for signal in signals.drain(..) {
                let kind = match signal {
                    CountdownSignal::Tick { remaining_ms } => {
                        ActionKind::TickRuntimeCountdown { remaining_ms }
                    }
                    CountdownSignal::Completed => {
                        completed = true;
                        ActionKind::CompleteRuntimeCountdown
                    }
                };
                let event = self.dispatch(Action::new(kind));
                if !matches!(event, Event::ActionIgnored { .. }) {
                    events.push(event);
                }
            }
            if !completed {
                break;
            }
            // The next phase (rep rest, next hold) gets a fresh countdown.
            match self.countdown_target() {
                Some(remaining_ms) => signals = countdown.start(remaining_ms as f64),
                None => break,
            }
        }
        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SessionStatus;
    use crate::storage::MemoryStore;
    use crate::timer::{ManualClock, RuntimePhase};

    fn program() -> Program {
        Program::from_json(
            r#"{ "id": "back", "name": "Back", "exercises": [
                { "id": "bird-dog", "name": "Bird Dog", "order": 1, "targetSets": 1,
                  "targetRepsPerSet": 2, "holdSeconds": 1, "repRestSeconds": 0.5 },
                { "id": "cat-cow", "name": "Cat Cow", "order": 2, "targetSets": 1,
                  "targetRepsPerSet": 1 }
            ] }"#,
        )
        .unwrap()
    }

    fn engine(store: &MemoryStore) -> SessionEngine<&MemoryStore> {
        let program = program();
        let gateway = SessionStore::new(store, &program);
        SessionEngine::open(program, gateway)
    }

    fn start(engine: &mut SessionEngine<&MemoryStore>) {
        let event = engine.dispatch(Action::new(ActionKind::StartSession {
            session_id: Some("s-1".into()),
        }));
        assert!(matches!(event, Event::SessionStarted { .. }));
    }

    #[test]
    fn dispatch_persists_every_change() {
        let store = MemoryStore::new();
        let mut engine = engine(&store);
        start(&mut engine);
        assert!(engine.store().read().is_some());

        engine.dispatch(Action::new(ActionKind::SkipExercise));
        let stored = engine.store().read().unwrap();
        assert_eq!(stored.skip_queue, ["bird-dog"]);
    }

    #[test]
    fn ignored_actions_report_ignored() {
        let store = MemoryStore::new();
        let mut engine = engine(&store);
        let event = engine.dispatch(Action::new(ActionKind::IncrementRep));
        assert!(matches!(
            event,
            Event::ActionIgnored { ref action, .. } if action == "increment_rep"
        ));
        start(&mut engine);
        // Hold exercise: manual reps are not allowed.
        let event = engine.dispatch(Action::new(ActionKind::IncrementRep));
        assert!(matches!(event, Event::ActionIgnored { .. }));
    }

    #[test]
    fn terminal_transition_clears_storage() {
        let store = MemoryStore::new();
        let mut engine = engine(&store);
        start(&mut engine);
        let event = engine.dispatch(Action::new(ActionKind::EndSessionEarly));
        assert!(matches!(
            event,
            Event::SessionEnded {
                status: SessionStatus::EndedEarly,
                ..
            }
        ));
        assert!(store.get("active_session").unwrap().is_none());
    }

    #[test]
    fn reopening_offers_resume() {
        let store = MemoryStore::new();
        {
            let mut engine = engine(&store);
            start(&mut engine);
            engine.dispatch(Action::new(ActionKind::SkipExercise));
        }
        let mut engine = engine(&store);
        assert!(engine.session().is_none());
        assert_eq!(engine.offered_resume().unwrap().session_id, "s-1");
        assert!(engine.accept_resume().is_some());
        assert_eq!(
            engine.session().unwrap().current_exercise_id.as_deref(),
            Some("cat-cow")
        );
    }

    #[test]
    fn declining_resume_clears_storage() {
        let store = MemoryStore::new();
        {
            let mut engine = engine(&store);
            start(&mut engine);
        }
        let mut engine = engine(&store);
        engine.decline_resume();
        assert!(engine.offered_resume().is_none());
        assert!(store.get("active_session").unwrap().is_none());
    }

    #[test]
    fn countdown_drives_hold_set_to_completion() {
        let store = MemoryStore::new();
        let mut engine = engine(&store);
        start(&mut engine);
        engine.dispatch(Action::new(ActionKind::StartRoutine));
        assert_eq!(engine.countdown_target(), Some(1_000));

        let clock = ManualClock::new(0);
        let mut countdown = Countdown::new(clock.clone());
        assert!(engine.arm(&mut countdown).is_empty());
        assert!(countdown.is_active());

        clock.advance(400);
        let events = engine.pump(&mut countdown);
        assert_eq!(events.len(), 1);
        assert_eq!(engine.session().unwrap().runtime.remaining_ms, 600);

        // Hold finishes: one rep, then a rep rest countdown is armed.
        clock.advance(600);
        engine.pump(&mut countdown);
        let session = engine.session().unwrap();
        assert_eq!(session.runtime.phase, RuntimePhase::RepRest);
        assert_eq!(session.exercise_progress["bird-dog"].sets[0].completed_reps, 1);
        assert_eq!(countdown.remaining_ms(), Some(500));

        clock.advance(500);
        engine.pump(&mut countdown);
        assert_eq!(engine.session().unwrap().runtime.phase, RuntimePhase::Hold);

        clock.advance(1_000);
        engine.pump(&mut countdown);
        let session = engine.session().unwrap();
        assert_eq!(session.runtime.phase, RuntimePhase::Complete);
        assert_eq!(session.exercise_progress["bird-dog"].sets[0].completed_reps, 2);
        assert!(!countdown.is_active());
        assert!(engine.countdown_target().is_none());

        // Late polls after completion never add reps.
        clock.advance(10_000);
        assert!(engine.pump(&mut countdown).is_empty());
        let stored = engine.store().read().unwrap();
        assert_eq!(stored.exercise_progress["bird-dog"].sets[0].completed_reps, 2);
    }

    #[test]
    fn arm_stops_countdown_when_not_counting() {
        let store = MemoryStore::new();
        let mut engine = engine(&store);
        start(&mut engine);
        let clock = ManualClock::new(0);
        let mut countdown = Countdown::new(clock);
        countdown.start(5_000.0);
        assert!(engine.arm(&mut countdown).is_empty());
        assert!(!countdown.is_active());
    }

    #[test]
    fn discard_forgets_everything() {
        let store = MemoryStore::new();
        let mut engine = engine(&store);
        start(&mut engine);
        engine.discard();
        assert!(engine.session().is_none());
        assert!(store.get("active_session").unwrap().is_none());
    }
}
