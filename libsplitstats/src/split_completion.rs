use chrono::{DateTime, Utc};
use derive_getters::Getters;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::time::Duration;

use crate::counter::{ONE_MINUTE, TEN_SECONDS, THIRTY_SECONDS};
use crate::snapshot::{Snapshot, WindowSnapshot};

/// Event type name the reporting pipeline files these records under
pub const EVENT_TYPE: &str = "SplitCompletion";

#[derive(Error, Debug, Clone, PartialEq)]
pub enum EventError {
    #[error("Snapshot has no {0:?} window")]
    MissingWindow(Duration),
}

/// Who the split belongs to. Opaque to us, just copied into the event.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SplitIdentity {
    pub query_id: String,
    pub stage_id: String,
    pub task_id: String,
}

/// Timing information about a split. Everything except the queued time is optional,
/// e.g., a split that never produced output has no time to first byte.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SplitTimings {
    pub queued_time: Duration,
    pub execution_start_time: Option<DateTime<Utc>>,
    pub time_to_first_byte: Option<Duration>,
    pub time_to_last_byte: Option<Duration>,
    pub wall_time: Option<Duration>,
    pub cpu_time: Option<Duration>,
    pub user_time: Option<Duration>,
}

/// The part of a `Snapshot` that goes into an event: the total plus count and rate
/// for each of the three standard windows
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize, Getters)]
pub struct CounterFields {
    total: u64,
    count_ten_sec: f64,
    rate_ten_sec: f64,
    count_thirty_sec: f64,
    rate_thirty_sec: f64,
    count_one_min: f64,
    rate_one_min: f64,
}

impl TryFrom<&Snapshot> for CounterFields {
    type Error = EventError;

    fn try_from(snap: &Snapshot) -> Result<Self, Self::Error> {
        let get = |window: Duration| -> Result<WindowSnapshot, EventError> {
            snap.window(window)
                .copied()
                .ok_or(EventError::MissingWindow(window))
        };
        let ten = get(TEN_SECONDS)?;
        let thirty = get(THIRTY_SECONDS)?;
        let minute = get(ONE_MINUTE)?;
        Ok(CounterFields {
            total: snap.total(),
            count_ten_sec: ten.count(),
            rate_ten_sec: ten.rate(),
            count_thirty_sec: thirty.count(),
            rate_thirty_sec: thirty.rate(),
            count_one_min: minute.count(),
            rate_one_min: minute.rate(),
        })
    }
}

serde_with::with_prefix!(prefix_completed_data_size "completed_data_size_");
serde_with::with_prefix!(prefix_completed_positions "completed_positions_");

/**
 * Reported once per split when it completes. Carries the final snapshots of the
 * split's data size and positions (rows) counters, flattened into one record,
 * e.g., `completed_data_size_rate_ten_sec`.
 *
 * Optional durations stay `None` when unknown, there are no sentinel values.
 */
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, Getters)]
pub struct SplitCompletionEvent {
    query_id: String,
    stage_id: String,
    task_id: String,
    environment: String,
    queued_time_ms: u64,
    execution_start_time: Option<DateTime<Utc>>,
    time_to_first_byte_ms: Option<u64>,
    time_to_last_byte_ms: Option<u64>,
    #[serde(flatten, with = "prefix_completed_data_size")]
    completed_data_size: CounterFields,
    #[serde(flatten, with = "prefix_completed_positions")]
    completed_positions: CounterFields,
    wall_time_ms: Option<u64>,
    cpu_time_ms: Option<u64>,
    user_time_ms: Option<u64>,
    split_info_json: String,
}

fn to_millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

impl SplitCompletionEvent {
    /// Build the event from the final snapshots of a split's counters. Both snapshots
    /// need the 10s, 30s and 1min windows.
    pub fn new(
        identity: SplitIdentity,
        environment: impl Into<String>,
        timings: SplitTimings,
        completed_data_size: &Snapshot,
        completed_positions: &Snapshot,
        split_info_json: impl Into<String>,
    ) -> Result<Self, EventError> {
        Ok(SplitCompletionEvent {
            query_id: identity.query_id,
            stage_id: identity.stage_id,
            task_id: identity.task_id,
            environment: environment.into(),
            queued_time_ms: to_millis(timings.queued_time),
            execution_start_time: timings.execution_start_time,
            time_to_first_byte_ms: timings.time_to_first_byte.map(to_millis),
            time_to_last_byte_ms: timings.time_to_last_byte.map(to_millis),
            completed_data_size: completed_data_size.try_into()?,
            completed_positions: completed_positions.try_into()?,
            wall_time_ms: timings.wall_time.map(to_millis),
            cpu_time_ms: timings.cpu_time.map(to_millis),
            user_time_ms: timings.user_time.map(to_millis),
            split_info_json: split_info_json.into(),
        })
    }
}
