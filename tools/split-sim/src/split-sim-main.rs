use std::{
    sync::{Arc, OnceLock},
    thread,
    time::{Duration, Instant},
};

use anyhow::anyhow;
use chrono::Utc;
use clap::Parser;
use libsplitstats::{
    split_completion::EVENT_TYPE, MultiWindowCounter, SplitCompletionEvent, SplitIdentity,
    SplitTimings, StatsConfig, StatsError,
};
use log::{debug, info};

/// Run simulated splits: worker threads report bytes and rows processed into
/// decaying counters, and each finished split is printed to stdout as one
/// JSON split completion event per line.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// TOML file with the stats config (environment, window_ms). Uses the
    /// 10s/30s/1min defaults if not given
    #[arg(long)]
    config: Option<String>,
    /// Number of splits to run, one after the other
    #[arg(long, default_value_t = 3)]
    splits: usize,
    /// Worker threads per split, all feeding the same counters
    #[arg(long, default_value_t = 4)]
    workers: usize,
    #[arg(long, default_value_t = 1000)]
    adds_per_worker: u64,
    #[arg(long, default_value_t = 65_536)]
    bytes_per_add: i64,
    #[arg(long, default_value_t = 1024)]
    rows_per_add: i64,
    /// Sleep between two adds of the same worker, in microseconds
    #[arg(long, default_value_t = 0)]
    add_interval_us: u64,
    #[arg(long, default_value = "info")]
    log_level: String,
}

struct SplitCounters {
    data_size: MultiWindowCounter,
    positions: MultiWindowCounter,
    first_byte: OnceLock<Instant>,
}

fn run_worker(
    counters: &SplitCounters,
    args: &Args,
    worker: usize,
) -> Result<(), StatsError> {
    let interval = Duration::from_micros(args.add_interval_us);
    for _ in 0..args.adds_per_worker {
        counters.data_size.add(args.bytes_per_add)?;
        counters.first_byte.get_or_init(Instant::now);
        counters.positions.add(args.rows_per_add)?;
        if !interval.is_zero() {
            thread::sleep(interval);
        }
    }
    debug!("Worker {} done", worker);
    Ok(())
}

fn run_split(
    args: &Args,
    config: &StatsConfig,
    split: usize,
    queued_at: Instant,
) -> anyhow::Result<SplitCompletionEvent> {
    let counters = SplitCounters {
        data_size: config.new_counter()?,
        positions: config.new_counter()?,
        first_byte: OnceLock::new(),
    };
    let execution_start_time = Utc::now();
    let start = Instant::now();

    thread::scope(|s| -> anyhow::Result<()> {
        let handles: Vec<_> = (0..args.workers)
            .map(|worker| {
                let counters = &counters;
                s.spawn(move || run_worker(counters, args, worker))
            })
            .collect();
        for h in handles {
            h.join()
                .map_err(|_| anyhow!("A worker of split {} panicked", split))??;
        }
        Ok(())
    })?;
    let wall_time = start.elapsed();

    let data_size = counters.data_size.snapshot();
    let positions = counters.positions.snapshot();
    info!(
        "Split {} done after {:?}: bytes {} rows {}",
        split, wall_time, data_size, positions
    );

    let query_id = format!("sim_{}", std::process::id());
    let identity = SplitIdentity {
        stage_id: format!("{}.0", query_id),
        task_id: format!("{}.0.{}", query_id, split),
        query_id,
    };
    let timings = SplitTimings {
        queued_time: start - queued_at,
        execution_start_time: Some(execution_start_time),
        time_to_first_byte: counters.first_byte.get().map(|t| *t - start),
        time_to_last_byte: Some(wall_time),
        wall_time: Some(wall_time),
        // not measured by the simulation
        cpu_time: None,
        user_time: None,
    };
    let split_info = serde_json::json!({
        "split": split,
        "workers": args.workers,
        "adds_per_worker": args.adds_per_worker,
    });
    Ok(SplitCompletionEvent::new(
        identity,
        config.environment.clone(),
        timings,
        &data_size,
        &positions,
        split_info.to_string(),
    )?)
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    common::init::splitstats_init(&args.log_level);

    let config = match &args.config {
        Some(filename) => StatsConfig::from_toml_file(filename)?,
        None => StatsConfig::default(),
    };
    info!(
        "Running {} splits with {} workers each; env={} windows={:?}",
        args.splits,
        args.workers,
        config.environment,
        config.window_durations()
    );

    // all splits are queued up front and run one after the other
    let queued_at = Instant::now();
    for split in 0..args.splits {
        let event = run_split(&args, &config, split, queued_at)?;
        println!(
            "{}",
            serde_json::json!({ "event_type": EVENT_TYPE, "event": event })
        );
    }
    Ok(())
}
