//! # Logging
//!
//! Structured logs go to stderr in the compact format, without module paths.
//! `RUST_LOG` wins when set; otherwise `-v` picks the level:
//!
//! ```bash
//! apphost run            # info: state transitions
//! apphost -v run         # debug: probes, resolution, child stdout
//! RUST_LOG=apphost_engine=trace apphost run
//! ```
//!
//! A transition reads like:
//!
//! ```text
//! INFO start: Starting resource="db" state=starting
//! INFO start: Resource ready resource="db" state=ready outcome=Some(Started)
//! WARN Resource failed resource="api" state=failed error=Not ready after 60s
//! ```

use tracing_subscriber::EnvFilter;

pub fn default_level(verbosity: u8) -> &'static str {
    match verbosity {
        0 => "info",
        1 => "debug",
        _ => "trace",
    }
}

pub fn setup_tracing(verbosity: u8) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level(verbosity)));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .init();
}
