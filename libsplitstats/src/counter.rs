use std::sync::{Mutex, MutexGuard, PoisonError};

use itertools::Itertools;
use log::debug;
use tokio::time::{Duration, Instant};

use crate::decay_window::DecayWindow;
use crate::snapshot::Snapshot;
use crate::StatsError;

pub const TEN_SECONDS: Duration = Duration::from_secs(10);
pub const THIRTY_SECONDS: Duration = Duration::from_secs(30);
pub const ONE_MINUTE: Duration = Duration::from_secs(60);

/// The windows every split completion event reports on
pub const STANDARD_WINDOWS: [Duration; 3] = [TEN_SECONDS, THIRTY_SECONDS, ONE_MINUTE];

/**
 * Tracks a monotonically growing quantity (bytes, rows, ...) across multiple
 * time windows. E.g., bytes processed over the last 10s, 30s and 1min, plus
 * the all-time total that never decays.
 *
 * `add()` and `snapshot()` take `&self` and can be called from any number of
 * threads; share the counter with an `Arc`. Total and windows live behind one
 * mutex that is only held for the arithmetic of a single call, so every `add()`
 * lands in the total and in all windows together, and a snapshot never sees half
 * of an update.
 */
#[derive(Debug)]
pub struct MultiWindowCounter {
    /// The different time windows we track, in the order they were given.
    /// Same order as `CounterState::levels`; kept outside the lock since it never changes.
    window_sizes: Vec<Duration>,
    state: Mutex<CounterState>,
}

#[derive(Debug)]
struct CounterState {
    /// All time total. Saturates instead of wrapping
    total: u64,
    /// One DecayWindow per entry in `window_sizes`
    levels: Vec<DecayWindow>,
}

/// Checks a set of windows is usable for a `MultiWindowCounter`: at least one window,
/// none of them zero and no duplicates
pub(crate) fn validate_windows(window_sizes: &[Duration]) -> Result<(), StatsError> {
    if window_sizes.is_empty() {
        return Err(StatsError::NoWindows);
    }
    if window_sizes.iter().any(Duration::is_zero) {
        return Err(StatsError::ZeroWindow);
    }
    if let Some(dup) = window_sizes.iter().duplicates().next() {
        return Err(StatsError::DuplicateWindow(*dup));
    }
    Ok(())
}

impl MultiWindowCounter {
    /// Create a new counter tracking the windows in `window_sizes`
    /// (e.g., 10s, 30s, 60s).
    pub fn new(window_sizes: Vec<Duration>) -> Result<Self, StatsError> {
        Self::new_with_create_time(window_sizes, Instant::now())
    }

    /// Like `MultiWindowCounter::new()` but we can specify the start time; useful for
    /// deterministic testing
    pub fn new_with_create_time(
        window_sizes: Vec<Duration>,
        created_time: Instant,
    ) -> Result<Self, StatsError> {
        validate_windows(&window_sizes)?;
        Ok(Self::from_valid_windows(window_sizes, created_time))
    }

    /// A counter with the 10s, 30s and 1min windows used for split completion reporting
    pub fn with_standard_windows() -> Self {
        Self::from_valid_windows(STANDARD_WINDOWS.to_vec(), Instant::now())
    }

    fn from_valid_windows(window_sizes: Vec<Duration>, created_time: Instant) -> Self {
        debug!("New MultiWindowCounter with windows {:?}", window_sizes);
        let levels = window_sizes
            .iter()
            .map(|win| DecayWindow::with_valid_window(*win, created_time))
            .collect();
        MultiWindowCounter {
            window_sizes,
            state: Mutex::new(CounterState { total: 0, levels }),
        }
    }

    pub fn window_sizes(&self) -> &[Duration] {
        &self.window_sizes
    }

    /// Add `delta` to the total and to every window. Rejects negative deltas with
    /// `StatsError::InvalidDelta` without changing anything.
    pub fn add(&self, delta: i64) -> Result<(), StatsError> {
        self.add_at(delta, Instant::now())
    }

    /// Like `add()` but with an explicit timestamp. All windows are decayed to `now`.
    pub fn add_at(&self, delta: i64, now: Instant) -> Result<(), StatsError> {
        let delta = u64::try_from(delta).map_err(|_| StatsError::InvalidDelta(delta))?;
        let mut state = self.lock();
        state.total = state.total.saturating_add(delta);
        for lvl in &mut state.levels {
            lvl.accumulate(delta as f64, now);
        }
        Ok(())
    }

    /// The all-time total
    pub fn total(&self) -> u64 {
        self.lock().total
    }

    /// Read the total and all windows as of now
    pub fn snapshot(&self) -> Snapshot {
        self.snapshot_at(Instant::now())
    }

    /// Like `snapshot()` but with an explicit timestamp
    pub fn snapshot_at(&self, now: Instant) -> Snapshot {
        let mut state = self.lock();
        let windows = state.levels.iter_mut().map(|lvl| lvl.snapshot(now)).collect();
        Snapshot::new(state.total, windows)
    }

    fn lock(&self) -> MutexGuard<'_, CounterState> {
        // the state is a handful of numbers that are valid after every statement,
        // so a panic while holding the lock can't leave it broken
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod test {
    use approx::assert_relative_eq;

    use super::*;

    fn counts(snap: &Snapshot) -> Vec<f64> {
        snap.windows().iter().map(|w| w.count()).collect()
    }

    #[test]
    fn test_creation() {
        let c = MultiWindowCounter::new(vec![Duration::from_secs(60), Duration::from_secs(5)])
            .unwrap();
        assert_eq!(
            c.window_sizes(),
            &[Duration::from_secs(60), Duration::from_secs(5)]
        );
        let snap = c.snapshot();
        assert_eq!(snap.total(), 0);
        // window order is preserved
        assert_eq!(snap.windows()[0].window(), Duration::from_secs(60));
        assert_eq!(snap.windows()[1].window(), Duration::from_secs(5));
        assert_eq!(counts(&snap), vec![0.0, 0.0]);

        let c = MultiWindowCounter::with_standard_windows();
        assert_eq!(c.window_sizes(), &STANDARD_WINDOWS);
    }

    #[test]
    fn test_invalid_windows() {
        assert_eq!(
            MultiWindowCounter::new(vec![]).unwrap_err(),
            StatsError::NoWindows
        );
        assert_eq!(
            MultiWindowCounter::new(vec![Duration::from_secs(1), Duration::ZERO]).unwrap_err(),
            StatsError::ZeroWindow
        );
        assert_eq!(
            MultiWindowCounter::new(vec![
                Duration::from_secs(1),
                Duration::from_secs(2),
                Duration::from_secs(1)
            ])
            .unwrap_err(),
            StatsError::DuplicateWindow(Duration::from_secs(1))
        );
    }

    #[test]
    fn test_total_is_exact() {
        let t0 = Instant::now();
        let c = MultiWindowCounter::new_with_create_time(STANDARD_WINDOWS.to_vec(), t0).unwrap();
        let mut expected = 0;
        for i in 0..100 {
            let delta = i * 1_000_003;
            c.add_at(delta, t0 + Duration::from_millis(i as u64 * 250))
                .unwrap();
            expected += delta as u64;
            assert_eq!(c.total(), expected);
        }
        // the total doesn't decay
        let snap = c.snapshot_at(t0 + Duration::from_secs(3600));
        assert_eq!(snap.total(), expected);
    }

    /// any positive window is valid, however large, and reading it must not panic
    #[test]
    fn test_huge_windows() {
        let t0 = Instant::now();
        let c = MultiWindowCounter::new_with_create_time(
            vec![TEN_SECONDS, Duration::from_secs(u64::MAX / 4), Duration::MAX],
            t0,
        )
        .unwrap();
        c.add_at(100, t0).unwrap();
        // long enough idle that the 10s window rebases
        let snap = c.snapshot_at(t0 + Duration::from_secs(3600));
        assert_eq!(snap.total(), 100);
        assert!(snap.windows()[0].count() < 1e-100);
        assert_relative_eq!(snap.windows()[1].count(), 100.0, max_relative = 1e-9);
        assert_relative_eq!(snap.windows()[2].count(), 100.0, max_relative = 1e-9);

        let c = MultiWindowCounter::new(vec![Duration::from_secs(u64::MAX / 4)]).unwrap();
        c.add(100).unwrap();
        assert_eq!(c.snapshot().total(), 100);
    }

    #[test]
    fn test_total_saturates() {
        let t0 = Instant::now();
        let c = MultiWindowCounter::new_with_create_time(vec![TEN_SECONDS], t0).unwrap();
        c.add_at(i64::MAX, t0).unwrap();
        c.add_at(i64::MAX, t0).unwrap();
        c.add_at(i64::MAX, t0).unwrap();
        assert_eq!(c.total(), u64::MAX);
    }

    #[test]
    fn test_invalid_delta_leaves_state_unchanged() {
        let t0 = Instant::now();
        let c = MultiWindowCounter::new_with_create_time(STANDARD_WINDOWS.to_vec(), t0).unwrap();
        c.add_at(10, t0).unwrap();
        let before = c.snapshot_at(t0);
        assert_eq!(c.add_at(-1, t0), Err(StatsError::InvalidDelta(-1)));
        assert_eq!(c.add(i64::MIN), Err(StatsError::InvalidDelta(i64::MIN)));
        assert_eq!(c.snapshot_at(t0), before);
        assert_eq!(before.total(), 10);
    }

    /// add 100 at t0 and watch the three standard windows decay
    #[test]
    fn test_standard_windows_decay() {
        let t0 = Instant::now();
        let c = MultiWindowCounter::new_with_create_time(STANDARD_WINDOWS.to_vec(), t0).unwrap();
        c.add_at(100, t0).unwrap();

        let snap = c.snapshot_at(t0);
        assert_eq!(snap.total(), 100);
        assert_eq!(counts(&snap), vec![100.0, 100.0, 100.0]);
        assert_eq!(snap.window(TEN_SECONDS).unwrap().rate(), 10.0);
        assert_eq!(snap.window(ONE_MINUTE).unwrap().rate(), 100.0 / 60.0);

        let snap = c.snapshot_at(t0 + Duration::from_secs(10));
        assert_eq!(snap.total(), 100);
        let ten = snap.window(TEN_SECONDS).unwrap();
        let thirty = snap.window(THIRTY_SECONDS).unwrap();
        let minute = snap.window(ONE_MINUTE).unwrap();
        assert_relative_eq!(ten.count(), 100.0 * (-1.0f64).exp(), max_relative = 1e-12);
        assert_relative_eq!(
            thirty.count(),
            100.0 * (-1.0f64 / 3.0).exp(),
            max_relative = 1e-12
        );
        assert_relative_eq!(
            minute.count(),
            100.0 * (-1.0f64 / 6.0).exp(),
            max_relative = 1e-12
        );
        assert_relative_eq!(ten.count(), 36.8, epsilon = 0.05);
        assert_relative_eq!(thirty.count(), 71.7, epsilon = 0.05);
        assert_relative_eq!(minute.count(), 84.6, epsilon = 0.05);
        assert_relative_eq!(ten.rate(), ten.count() / 10.0, max_relative = 1e-12);
        assert_relative_eq!(thirty.rate(), thirty.count() / 30.0, max_relative = 1e-12);
        assert_relative_eq!(minute.rate(), minute.count() / 60.0, max_relative = 1e-12);
    }

    #[test]
    fn test_shorter_windows_decay_faster() {
        let t0 = Instant::now();
        let c = MultiWindowCounter::new_with_create_time(
            vec![
                Duration::from_secs(1),
                TEN_SECONDS,
                THIRTY_SECONDS,
                ONE_MINUTE,
                Duration::from_secs(600),
            ],
            t0,
        )
        .unwrap();
        for i in 0..20 {
            c.add_at(i * 7, t0 + Duration::from_millis(i as u64 * 300))
                .unwrap();
        }
        for secs in [7, 10, 30, 90, 600] {
            let snap = c.snapshot_at(t0 + Duration::from_secs(secs));
            let cnts = counts(&snap);
            for (shorter, longer) in cnts.iter().zip(cnts.iter().skip(1)) {
                assert!(shorter <= longer, "{} > {} at t={}s", shorter, longer, secs);
            }
        }
    }

    #[test]
    fn test_idempotent_reads() {
        let t0 = Instant::now();
        let c = MultiWindowCounter::new_with_create_time(STANDARD_WINDOWS.to_vec(), t0).unwrap();
        c.add_at(1234, t0).unwrap();
        let t1 = t0 + Duration::from_secs(17);
        assert_eq!(c.snapshot_at(t1), c.snapshot_at(t1));
        // long idle, so this read rebases. Must still read the same
        let t2 = t0 + Duration::from_secs(1000);
        assert_eq!(c.snapshot_at(t2), c.snapshot_at(t2));
    }

    #[test]
    fn test_all_windows_use_same_timestamp() {
        let t0 = Instant::now();
        let c = MultiWindowCounter::new_with_create_time(STANDARD_WINDOWS.to_vec(), t0).unwrap();
        c.add_at(10, t0).unwrap();
        c.add_at(10, t0 + TEN_SECONDS).unwrap();
        let snap = c.snapshot_at(t0 + TEN_SECONDS);
        for w in snap.windows() {
            let expected = 10.0 * (-TEN_SECONDS.as_secs_f64() / w.window().as_secs_f64()).exp() + 10.0;
            assert_relative_eq!(w.count(), expected, max_relative = 1e-12);
        }
    }

    /// Same thing, but driven from the tokio clock like real callers are
    #[tokio::test]
    async fn test_simulated_time() {
        tokio::time::pause();
        let c = MultiWindowCounter::with_standard_windows();
        c.add(100).unwrap();
        let snap = c.snapshot();
        assert_eq!(snap.total(), 100);
        assert_eq!(counts(&snap), vec![100.0, 100.0, 100.0]);
        // time is paused, so back to back reads are identical
        assert_eq!(c.snapshot(), snap);

        tokio::time::advance(Duration::from_secs(10)).await;
        let snap = c.snapshot();
        assert_eq!(snap.total(), 100);
        assert_relative_eq!(
            snap.window(TEN_SECONDS).unwrap().count(),
            100.0 * (-1.0f64).exp(),
            max_relative = 1e-9
        );
        assert_relative_eq!(
            snap.window(ONE_MINUTE).unwrap().count(),
            100.0 * (-1.0f64 / 6.0).exp(),
            max_relative = 1e-9
        );
    }
}
