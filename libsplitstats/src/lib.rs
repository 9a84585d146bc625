/*!
 * Decaying multi-window counters for split (unit of work) progress reporting.
 *
 * A `MultiWindowCounter` tracks a monotonically growing quantity (bytes or rows
 * processed) and reports its all-time total as well as exponentially decayed
 * counts and rates over a fixed set of windows (10s, 30s and 1min for split
 * completion events). `SplitCompletionEvent` is the record built from those
 * snapshots when a split finishes.
 */
use thiserror::Error;
use tokio::time::Duration;

pub mod config;
pub mod counter;
pub mod decay_window;
pub mod snapshot;
pub mod split_completion;

pub use config::{ConfigError, StatsConfig};
pub use counter::{MultiWindowCounter, STANDARD_WINDOWS};
pub use decay_window::DecayWindow;
pub use snapshot::{Snapshot, WindowSnapshot};
pub use split_completion::{EventError, SplitCompletionEvent, SplitIdentity, SplitTimings};

#[derive(Clone, Debug, Error, PartialEq)]
pub enum StatsError {
    /// The tracked quantities only ever grow
    #[error("Invalid delta {0}: must be non-negative")]
    InvalidDelta(i64),
    #[error("Invalid delta {0}: must be finite and non-negative")]
    InvalidDeltaF64(f64),
    #[error("Need at least one time window")]
    NoWindows,
    #[error("Time windows must be longer than zero")]
    ZeroWindow,
    #[error("Time window {0:?} configured more than once")]
    DuplicateWindow(Duration),
}
