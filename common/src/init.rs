use colored::Colorize;
use std::io::Write;

/**
 * Init logging framework with useful defaults.
 * Also sets RUST_BACKTRACE if not explicitly set in the env
 */
pub fn init_logging_with_level(log_level: &str) {
    // if RUST_LOG isn't set explicitly, use `log_level` as the default filter
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", log_level);
    }
    if std::env::var("RUST_BACKTRACE").is_err() {
        std::env::set_var("RUST_BACKTRACE", "1");
    }
    // try_init(): a second init (e.g., from a test harness) is not an error worth dying for
    let _ = env_logger::Builder::from_default_env()
        .format(|fmt, record| {
            let level_style = fmt.default_level_style(record.level());
            let ts = fmt.timestamp_millis();

            writeln!(
                fmt,
                "{} {} {} L{} > {}",
                ts,
                level_style.value(record.level()),
                record.target(),
                record.line().unwrap_or(0),
                record.args()
            )
        })
        .try_init();
}

/**
 * A panic in one of the worker threads only kills that thread and the
 * counters it was feeding would silently stop moving. Abort the whole
 * process instead, after printing the panic message in red.
 */
pub fn set_abort_on_panic() {
    use std::panic;
    let orig_panic_hook = panic::take_hook();
    panic::set_hook(Box::new(move |panic_info| {
        eprintln!("{}", panic_info.to_string().red());
        let _ = std::io::stderr().flush();
        orig_panic_hook(panic_info);
        std::process::abort();
    }));
}

/// Standard process init for the split-stats binaries: abort on panic and
/// log at `log_level` unless RUST_LOG says otherwise.
pub fn splitstats_init(log_level: &str) {
    set_abort_on_panic();
    init_logging_with_level(log_level);
}

// NOTE: we need these for integration testing as well
// as unit testing, so we should not wrap with #[cfg(test)]
use std::sync::Once;
static START: Once = Once::new();

pub fn splitstats_test_init() {
    // for tests, by default, only log on 'error' so we don't get
    // extra messages on 'cargo t'.
    //
    // BUT, if you're debugging a specific test, you can always pass
    // RUST_LOG=trace cargo t
    START.call_once(|| init_logging_with_level("error"));
}
