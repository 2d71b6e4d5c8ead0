mod countdown;
mod phase;

pub use countdown::{
    format_remaining, Countdown, CountdownSignal, ManualClock, MonotonicClock, TimeSource,
    DEFAULT_CADENCE_MS,
};
pub use phase::{transition, PhaseEvent, RuntimePhase};
