//! Logging setup for binaries and tests embedding projectjail

use std::env;

/// Environment variable that switches the default level to `debug`
pub const DEBUG_ENV: &str = "PROJECTJAIL_DEBUG";

/// Install a compact `tracing` subscriber.
///
/// `RUST_LOG` wins when set; otherwise `default_directive` is used (or
/// `debug` when `PROJECTJAIL_DEBUG` is `1`/`true`). Returns `false` when a
/// global subscriber was already installed.
pub fn init_logging(default_directive: &str) -> bool {
    let debug = env::var(DEBUG_ENV).is_ok_and(|v| v == "1" || v.eq_ignore_ascii_case("true"));
    let fallback = if debug { "debug" } else { default_directive };

    let env_filter = env::var("RUST_LOG").unwrap_or_else(|_| fallback.to_string());
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(env_filter))
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .try_init()
        .is_ok()
}
