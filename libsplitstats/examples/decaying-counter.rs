//! Feed a counter in bursts and log how the 10s/30s/1min windows follow along.
//! Runs on the paused tokio clock, so the whole minute is simulated instantly.
//!
//!     RUST_LOG=debug cargo run -p libsplitstats --example decaying-counter

use libsplitstats::MultiWindowCounter;
use log::info;
use tokio::time::Duration;

#[tokio::main(flavor = "current_thread", start_paused = true)]
async fn main() -> Result<(), libsplitstats::StatsError> {
    common::init::splitstats_init("info");
    let bytes = MultiWindowCounter::with_standard_windows();

    for sec in 0..60u64 {
        // busy for the first 20 seconds, then a trickle
        let delta = if sec < 20 { 1 << 20 } else { 4096 };
        bytes.add(delta)?;
        if sec % 5 == 0 {
            info!("t={:>2}s {}", sec, bytes.snapshot());
        }
        tokio::time::advance(Duration::from_secs(1)).await;
    }
    info!("final {}", bytes.snapshot());
    Ok(())
}
