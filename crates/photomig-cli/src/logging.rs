use photomig_core::config::LoggingConfig;
use std::env;
use tracing::info;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

const LOG_FILE_NAME: &str = "photomig.log";

/// Stdout plus a plain-text file under `log_dir`. `RUST_LOG` overrides the
/// configured level. Keep the returned guard alive until exit so the file
/// writer flushes.
pub fn init_logger(config: &LoggingConfig) -> impl Drop {
    let filter = env::var("RUST_LOG").unwrap_or_else(|_| config.level.clone());
    let filter_layer = EnvFilter::try_new(&filter).unwrap_or_else(|_| EnvFilter::new("info"));

    let file_appender = tracing_appender::rolling::never(&config.log_dir, LOG_FILE_NAME);
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

    info!(
        "Logging to stdout and {}",
        config.log_dir.join(LOG_FILE_NAME).display()
    );

    guard
}
