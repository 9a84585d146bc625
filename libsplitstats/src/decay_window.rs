use log::trace;
use tokio::time::{Duration, Instant};

use crate::snapshot::WindowSnapshot;
use crate::StatsError;

/// Once a window has gone this many window-durations without a write, a read
/// folds the projected value into the stored sum and moves the landmark up.
/// At that point the old value has decayed to e^-8 (~3.4e-4) of itself.
pub const REBASE_AFTER_WINDOWS: u32 = 8;

/**
 * DecayWindow.
 *
 * Tracks "how much has been added recently", where recently decays exponentially
 * with a time constant equal to `window`. I.e., a contribution of `X` made at `t0`
 * counts as `X * e^(-(t - t0) / window)` at time `t`, so after exactly one window
 * it counts as `X / e`.
 *
 * We store the decayed sum as of `landmark` (the last write). Each write first decays
 * the stored sum to `now`, then adds the delta and moves the landmark to `now`.
 * Reads project the stored sum to `now` without touching it, except for an
 * occasional rebase after long idle periods to keep the exponent small.
 *
 * Time is monotonic (`tokio::time::Instant`) and passed in by the caller so
 * several windows can be decayed to the exact same instant.
 */
#[derive(Clone, Debug, PartialEq)]
pub struct DecayWindow {
    window: Duration,
    /// `1 / window` in 1/seconds
    decay_rate: f64,
    /// idle time after which a read rebases. None if `REBASE_AFTER_WINDOWS` windows
    /// don't fit in a Duration, such a window never rebases
    rebase_after: Option<Duration>,
    /// time of the last write or rebase. Never moves backwards.
    landmark: Instant,
    /// decayed sum of all deltas as of `landmark`
    weighted_sum: f64,
}

impl DecayWindow {
    /// Create an empty window decaying with time constant `window`, starting at `now`.
    pub fn new(window: Duration, now: Instant) -> Result<DecayWindow, StatsError> {
        if window.is_zero() {
            return Err(StatsError::ZeroWindow);
        }
        Ok(DecayWindow::with_valid_window(window, now))
    }

    /// Caller guarantees `window > 0`
    pub(crate) fn with_valid_window(window: Duration, now: Instant) -> DecayWindow {
        DecayWindow {
            window,
            decay_rate: 1.0 / window.as_secs_f64(),
            rebase_after: window.checked_mul(REBASE_AFTER_WINDOWS),
            landmark: now,
            weighted_sum: 0.0,
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Add `delta` at time `now`. `delta` must be finite and non-negative, anything
    /// else is rejected with `StatsError::InvalidDeltaF64` and the window is left
    /// untouched. A delta of 0 just decays the stored sum up to `now`.
    pub fn add(&mut self, delta: f64, now: Instant) -> Result<(), StatsError> {
        if !delta.is_finite() || delta < 0.0 {
            return Err(StatsError::InvalidDeltaF64(delta));
        }
        self.accumulate(delta, now);
        Ok(())
    }

    /// `add()` without the check. The counter has already validated the delta.
    pub(crate) fn accumulate(&mut self, delta: f64, now: Instant) {
        self.weighted_sum = self.count(now) + delta;
        // if `now` is older than the landmark (clock regression, or a producer that
        // read its timestamp before another one got the lock) the delta is added
        // undecayed and we keep the newer landmark
        if now > self.landmark {
            self.landmark = now;
        }
    }

    /// The decayed count projected to `now`. Does not modify anything.
    pub fn count(&self, now: Instant) -> f64 {
        self.weighted_sum * self.decay_factor(now)
    }

    /// Decayed count and rate at `now`. Might rebase the internal state if the window
    /// has been idle for a long time, but that never changes the value observed.
    pub fn snapshot(&mut self, now: Instant) -> WindowSnapshot {
        let mut count = self.count(now);
        if let Some(rebase_after) = self.rebase_after {
            if now.saturating_duration_since(self.landmark) >= rebase_after {
                self.rebase(now, count);
                count = self.weighted_sum;
            }
        }
        WindowSnapshot::new(self.window, count)
    }

    fn rebase(&mut self, now: Instant, projected: f64) {
        // don't keep dragging subnormals around, they are zero for all practical purposes
        self.weighted_sum = if projected < f64::MIN_POSITIVE {
            0.0
        } else {
            projected
        };
        self.landmark = now;
    }

    fn decay_factor(&self, now: Instant) -> f64 {
        match now.checked_duration_since(self.landmark) {
            Some(elapsed) if elapsed.is_zero() => 1.0,
            Some(elapsed) => (-self.decay_rate * elapsed.as_secs_f64()).exp(),
            None => {
                trace!(
                    "Clock regression in {:?} window: now is {:?} before the landmark, not decaying",
                    self.window,
                    self.landmark - now
                );
                1.0
            }
        }
    }
}
