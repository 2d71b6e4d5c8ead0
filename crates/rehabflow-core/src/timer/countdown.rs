//! Wall-clock reconciled countdown.
//!
//! The countdown does not own a thread. A driver calls [`Countdown::poll`]
//! whenever [`Countdown::next_due_ms`] has passed; each poll samples the
//! time source and subtracts the real elapsed time since the previous
//! sample, so late or throttled polls never drift the displayed value.
//!
//! ```text
//! start(total) -> Tick(total) -> poll.. Tick(r) .. -> Tick(0) -> Completed
//! ```
//!
//! ## Usage
//!
//! ```ignore
//! let mut countdown = Countdown::new(MonotonicClock::new());
//! for signal in countdown.start(3_000.0) { /* Tick(3000) */ }
//! // In a loop, every cadence:
//! for signal in countdown.poll() { /* Tick(..) then Completed once */ }
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use tracing::debug;

/// Default sampling cadence in milliseconds.
pub const DEFAULT_CADENCE_MS: u64 = 100;

/// Source of monotonically non-decreasing milliseconds.
pub trait TimeSource {
    fn now_ms(&self) -> u64;
}

/// Platform high-resolution clock, measured from construction.
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeSource for MonotonicClock {
    fn now_ms(&self) -> u64 {
        self.origin.elapsed().as_millis() as u64
    }
}

/// Manually advanced clock. Clones share the same reading.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: Arc<AtomicU64>,
}

impl ManualClock {
    pub fn new(start_ms: u64) -> Self {
        Self {
            now: Arc::new(AtomicU64::new(start_ms)),
        }
    }

    pub fn advance(&self, delta_ms: u64) {
        self.now.fetch_add(delta_ms, Ordering::SeqCst);
    }

    pub fn set(&self, now_ms: u64) {
        self.now.store(now_ms, Ordering::SeqCst);
    }
}

impl TimeSource for ManualClock {
    fn now_ms(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }
}

/// Output of the countdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CountdownSignal {
    Tick { remaining_ms: u64 },
    Completed,
}

/// The armed timer. Dropping it is the only way to cancel.
#[derive(Debug, Clone, Copy)]
struct ArmedTimer {
    remaining_ms: u64,
    last_sample_ms: u64,
    next_due_ms: u64,
}

/// Countdown controller.
///
/// At most one countdown is armed at a time; completion is emitted exactly
/// once per [`start`](Countdown::start).
#[derive(Debug)]
pub struct Countdown<T: TimeSource = MonotonicClock> {
    clock: T,
    cadence_ms: u64,
    armed: Option<ArmedTimer>,
}

impl<T: TimeSource> Countdown<T> {
    pub fn new(clock: T) -> Self {
        Self::with_cadence(clock, DEFAULT_CADENCE_MS)
    }

    /// A zero cadence is treated as 1ms.
    pub fn with_cadence(clock: T, cadence_ms: u64) -> Self {
        Self {
            clock,
            cadence_ms: cadence_ms.max(1),
            armed: None,
        }
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn is_active(&self) -> bool {
        self.armed.is_some()
    }

    pub fn remaining_ms(&self) -> Option<u64> {
        self.armed.map(|a| a.remaining_ms)
    }

    pub fn cadence_ms(&self) -> u64 {
        self.cadence_ms
    }

    /// Time-source reading at which the next poll will sample.
    pub fn next_due_ms(&self) -> Option<u64> {
        self.armed.map(|a| a.next_due_ms)
    }

    // ── Commands ─────────────────────────────────────────────────────

    /// Begin counting down from `total_ms`, replacing any armed countdown.
    ///
    /// Negative or NaN totals are clamped to zero; fractions are rounded to
    /// the nearest millisecond. A zero total completes before returning.
    pub fn start(&mut self, total_ms: f64) -> Vec<CountdownSignal> {
        self.stop();
        let total = clamp_total(total_ms);
        if total == 0 {
            debug!("countdown started at zero, completing immediately");
            return vec![
                CountdownSignal::Tick { remaining_ms: 0 },
                CountdownSignal::Completed,
            ];
        }
        let now = self.clock.now_ms();
        self.armed = Some(ArmedTimer {
            remaining_ms: total,
            last_sample_ms: now,
            next_due_ms: now.saturating_add(self.cadence_ms),
        });
        debug!(total_ms = total, "countdown started");
        vec![CountdownSignal::Tick {
            remaining_ms: total,
        }]
    }

    /// Cancel the armed countdown. Idempotent.
    pub fn stop(&mut self) {
        if self.armed.take().is_some() {
            debug!("countdown stopped");
        }
    }

    /// Sample the clock if the cadence deadline has passed.
    ///
    /// Returns nothing when idle or not yet due; otherwise one tick and, when
    /// the remaining time reaches zero, a single completion.
    pub fn poll(&mut self) -> Vec<CountdownSignal> {
        let Some(mut armed) = self.armed else {
            return Vec::new();
        };
        let now = self.clock.now_ms();
        if now < armed.next_due_ms {
            return Vec::new();
        }

        let elapsed = now.saturating_sub(armed.last_sample_ms);
        armed.remaining_ms = armed.remaining_ms.saturating_sub(elapsed);
        armed.last_sample_ms = now;
        armed.next_due_ms = now.saturating_add(self.cadence_ms);

        let remaining_ms = armed.remaining_ms;
        if remaining_ms == 0 {
            self.armed = None;
            debug!("countdown completed");
            return vec![
                CountdownSignal::Tick { remaining_ms: 0 },
                CountdownSignal::Completed,
            ];
        }
        self.armed = Some(armed);
        vec![CountdownSignal::Tick { remaining_ms }]
    }
}

fn clamp_total(total_ms: f64) -> u64 {
    if !total_ms.is_finite() {
        return if total_ms == f64::INFINITY { u64::MAX } else { 0 };
    }
    total_ms.max(0.0).round() as u64
}

/// Format remaining milliseconds as `seconds.tenths`, rounding up.
///
/// A countdown never shows `0.0` until it has actually reached zero.
pub fn format_remaining(remaining_ms: i64) -> String {
    if remaining_ms <= 0 {
        return "0.0".to_string();
    }
    let tenths = remaining_ms / 100 + i64::from(remaining_ms % 100 != 0);
    format!("{}.{}", tenths / 10, tenths % 10)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn countdown() -> (ManualClock, Countdown<ManualClock>) {
        let clock = ManualClock::new(1_000);
        let countdown = Countdown::new(clock.clone());
        (clock, countdown)
    }

    #[test]
    fn start_emits_clamped_total() {
        let (_clock, mut cd) = countdown();
        assert_eq!(
            cd.start(1234.6),
            vec![CountdownSignal::Tick { remaining_ms: 1235 }]
        );
        assert!(cd.is_active());
    }

    #[test]
    fn start_zero_completes_synchronously() {
        let (_clock, mut cd) = countdown();
        assert_eq!(
            cd.start(0.0),
            vec![
                CountdownSignal::Tick { remaining_ms: 0 },
                CountdownSignal::Completed
            ]
        );
        assert!(!cd.is_active());
        assert!(cd.next_due_ms().is_none());
    }

    #[test]
    fn negative_and_nan_totals_clamp_to_zero() {
        let (_clock, mut cd) = countdown();
        assert_eq!(cd.start(-50.0).last(), Some(&CountdownSignal::Completed));
        assert_eq!(cd.start(f64::NAN).last(), Some(&CountdownSignal::Completed));
    }

    #[test]
    fn poll_before_cadence_is_silent() {
        let (clock, mut cd) = countdown();
        cd.start(1_000.0);
        clock.advance(50);
        assert!(cd.poll().is_empty());
        assert_eq!(cd.remaining_ms(), Some(1_000));
    }

    #[test]
    fn poll_subtracts_real_elapsed_time() {
        let (clock, mut cd) = countdown();
        cd.start(1_000.0);
        clock.advance(100);
        assert_eq!(cd.poll(), vec![CountdownSignal::Tick { remaining_ms: 900 }]);
        // A throttled driver polls late; the full gap is reconciled.
        clock.advance(650);
        assert_eq!(cd.poll(), vec![CountdownSignal::Tick { remaining_ms: 250 }]);
    }

    #[test]
    fn completion_fires_exactly_once() {
        let (clock, mut cd) = countdown();
        cd.start(150.0);
        clock.advance(100);
        assert_eq!(cd.poll(), vec![CountdownSignal::Tick { remaining_ms: 50 }]);
        clock.advance(5_000);
        let signals = cd.poll();
        assert_eq!(
            signals,
            vec![
                CountdownSignal::Tick { remaining_ms: 0 },
                CountdownSignal::Completed
            ]
        );
        clock.advance(5_000);
        assert!(cd.poll().is_empty());
    }

    #[test]
    fn restart_replaces_active_countdown() {
        let (clock, mut cd) = countdown();
        cd.start(10_000.0);
        clock.advance(100);
        cd.poll();
        cd.start(500.0);
        assert_eq!(cd.remaining_ms(), Some(500));
        clock.advance(500);
        assert_eq!(cd.poll().last(), Some(&CountdownSignal::Completed));
    }

    #[test]
    fn stop_is_idempotent() {
        let (clock, mut cd) = countdown();
        cd.start(1_000.0);
        cd.stop();
        cd.stop();
        clock.advance(2_000);
        assert!(cd.poll().is_empty());
    }

    #[test]
    fn clock_going_backwards_is_clamped() {
        let (clock, mut cd) = countdown();
        cd.start(1_000.0);
        clock.advance(200);
        cd.poll();
        clock.set(900);
        // Not due yet relative to the last sample, so nothing happens.
        assert!(cd.poll().is_empty());
        assert_eq!(cd.remaining_ms(), Some(800));
    }

    #[test]
    fn format_rounds_up_to_next_tenth() {
        assert_eq!(format_remaining(0), "0.0");
        assert_eq!(format_remaining(-20), "0.0");
        assert_eq!(format_remaining(1), "0.1");
        assert_eq!(format_remaining(100), "0.1");
        assert_eq!(format_remaining(101), "0.2");
        assert_eq!(format_remaining(2_950), "3.0");
        assert_eq!(format_remaining(12_340), "12.4");
    }

    #[test]
    fn format_handles_extreme_values() {
        assert_eq!(format_remaining(i64::MAX), "9223372036854775.9");
        assert_eq!(format_remaining(i64::MAX - 7), "9223372036854775.8");
        assert_eq!(format_remaining(i64::MIN), "0.0");
    }
}
