//! Logging setup for the `ferry` binary.

use tracing::debug;
use tracing_subscriber::EnvFilter;

/// Filter directive for a `-v` count when `RUST_LOG` is not set.
pub fn default_directive(verbosity: u8) -> &'static str {
    match verbosity {
        0 => "ferry=info,warn",
        1 => "ferry=debug,info",
        2 => "ferry=trace,debug",
        _ => "trace",
    }
}

/// Build the filter: `RUST_LOG` wins, else the verbosity default.
pub fn env_filter(verbosity: u8) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive(verbosity)))
}

/// Install the global subscriber. Later calls are ignored.
pub fn init_logging(verbosity: u8, json: bool) {
    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter(verbosity))
        .with_target(verbosity >= 2)
        .with_thread_ids(verbosity >= 3)
        .with_line_number(verbosity >= 3)
        .with_writer(std::io::stderr);

    let installed = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };

    if installed.is_ok() {
        debug!("Ferry started with verbosity level: {}", verbosity);
    }
}
