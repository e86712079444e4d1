//! SerialScope bridge - Main Entry Point
//!
//! Serves the command router over JSON lines on stdin/stdout. Logs go to
//! stderr and to a daily rolling file in the app data directory.

use anyhow::Context;
use serialscope_rs::{
    config::{self, AppConfig},
    ChannelSink, CommandRouter, NativePortOpener, PortManager, StdioHost, StorageEngine,
};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

fn main() -> anyhow::Result<()> {
    let config = AppConfig::load_or_default();

    // Keep the guard alive so buffered log lines are flushed on exit
    let _log_guard = init_logging(&config);

    tracing::info!(
        "Starting {} {}",
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION")
    );
    tracing::debug!("Configuration: {:?}", config);

    let (sink, events) = ChannelSink::new();
    let ports = PortManager::new(config.serial, Box::new(NativePortOpener), Arc::new(sink));
    let storage =
        StorageEngine::from_config(config.storage).context("Failed to initialise storage")?;
    let router = CommandRouter::new(Arc::new(ports), Arc::new(storage));

    let host = StdioHost::new(router, events);
    let stdin = std::io::stdin();
    host.run(stdin.lock(), std::io::stdout())
        .context("Host loop failed")?;

    tracing::info!("Shut down cleanly");
    Ok(())
}

fn init_logging(config: &AppConfig) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,serialscope_rs=debug"));
    let stderr_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    let log_dir = config
        .logging
        .file_logging
        .then(|| config::ensure_app_data_dir().ok())
        .flatten()
        .map(|dir| dir.join(config::LOG_DIR));

    match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "serialscope.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::registry()
                .with(filter)
                .with(stderr_layer)
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_ansi(false)
                        .with_writer(writer),
                )
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::registry()
                .with(filter)
                .with(stderr_layer)
                .init();
            None
        }
    }
}
