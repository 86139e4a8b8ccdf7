use std::env;
use tracing::debug;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

/// Level filter from `TRACING_LEVEL` (default `info`). `DEBUG=1` overrides
/// it with `debug`.
fn filter_directive() -> String {
    if env::var("DEBUG").is_ok_and(|v| v == "1") {
        return "debug".to_string();
    }
    env::var("TRACING_LEVEL").unwrap_or_else(|_| "info".to_string())
}

pub fn init_logger() -> impl Drop {
    let filter_layer = EnvFilter::new(filter_directive());

    let log_file_path =
        env::var("LOG_FILE_PATH").unwrap_or_else(|_| "./logs/dlprune.log".to_string());

    let file_appender = tracing_appender::rolling::never("./", log_file_path);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(std::io::stdout)
                .with_target(false)
                .without_time()
                .with_ansi(true),
        )
        .with(
            fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false),
        )
        .with(filter_layer)
        .init();

    debug!("Tracing is configured for stdout and file logging.");

    guard
}
