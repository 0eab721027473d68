//! Logging initialization
//!
//! `RUST_LOG` always wins; otherwise the CLI verbosity count picks the
//! level (info by default, debug for `-v`, trace for `-vv`).

use tracing_subscriber::EnvFilter;

pub fn init_logging(verbosity: u8) {
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        EnvFilter::new(level_for(verbosity))
    };

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .try_init();
}

fn level_for(verbosity: u8) -> &'static str {
    match verbosity {
        0 => "info",
        1 => "debug",
        _ => "trace",
    }
}
