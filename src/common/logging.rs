use std::io::Write;
use std::sync::OnceLock;
use std::time::Instant;

static START_TIME: OnceLock<Instant> = OnceLock::new();

/// Initialize the logger for the command line tools, writing to stderr as
/// `[HH:MM:SS] LEVEL: message` with the time elapsed since startup.
///
/// The level is Info if verbose is true, otherwise Warn. `RUST_LOG` overrides both.
pub fn init_logger(verbose: bool) {
    START_TIME.set(Instant::now()).ok();

    let level = if verbose {
        log::LevelFilter::Info
    } else {
        log::LevelFilter::Warn
    };

    env_logger::Builder::new()
        .filter_level(level)
        .parse_env("RUST_LOG")
        .format(|buf, record| {
            let elapsed = START_TIME.get().map(|t| t.elapsed()).unwrap_or_default();
            let secs = elapsed.as_secs();

            writeln!(
                buf,
                "[{:02}:{:02}:{:02}] {}: {}",
                secs / 3600,
                (secs % 3600) / 60,
                secs % 60,
                record.level(),
                record.args()
            )
        })
        .target(env_logger::Target::Stderr)
        .init();
}
