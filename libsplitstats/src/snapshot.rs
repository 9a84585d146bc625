use std::fmt::Display;

use serde::{Deserialize, Serialize};
use tokio::time::Duration;

/// Decayed count and rate of a single `DecayWindow` at one instant.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct WindowSnapshot {
    window: Duration,
    count: f64,
    /// `count / window`, per second
    rate: f64,
}

impl WindowSnapshot {
    pub fn new(window: Duration, count: f64) -> Self {
        WindowSnapshot {
            window,
            count,
            rate: compute_rate(count, window),
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn count(&self) -> f64 {
        self.count
    }

    pub fn rate(&self) -> f64 {
        self.rate
    }
}

/// Helper function to compute the rate per second of something.
/// Returns 0 if the duration is 0
#[inline]
fn compute_rate(count: f64, dt: Duration) -> f64 {
    let dt_sec = dt.as_secs_f64();
    if dt_sec > 0.0 {
        count / dt_sec
    } else {
        0.0
    }
}

/**
 * Immutable, point-in-time read of a `MultiWindowCounter`: the lifetime total plus
 * one `WindowSnapshot` per configured window, in the order the windows were
 * configured. Owns copies of everything, so it can be handed to whoever reports it
 * while the counter keeps moving.
 */
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    total: u64,
    windows: Vec<WindowSnapshot>,
}

impl Snapshot {
    pub(crate) fn new(total: u64, windows: Vec<WindowSnapshot>) -> Self {
        Snapshot { total, windows }
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    pub fn windows(&self) -> &[WindowSnapshot] {
        &self.windows
    }

    /// Look up the window with exactly the given duration
    pub fn window(&self, window: Duration) -> Option<&WindowSnapshot> {
        self.windows.iter().find(|w| w.window == window)
    }
}

impl Display for Snapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[total={}", self.total)?;
        for w in &self.windows {
            write!(
                f,
                " {:?}: count={:.3} rate={:.3}/s",
                w.window, w.count, w.rate
            )?;
        }
        write!(f, "]")
    }
}
