//! Kazana - a command-line client for the Kazana document service.
//!
//! Log in, upload documents for automatic classification, browse the
//! categorized list with confidence scores, and correct categories.

mod app;
mod cli;

use std::io;
use std::path::Path;

use anyhow::Result;
use kazana_core::Config;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use app::App;

/// Log file prefix inside the cache directory's `logs/` folder
const LOG_FILE_PREFIX: &str = "kazana.log";

/// Initialize the tracing subscriber for logging.
///
/// Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug).
/// The returned guard flushes the log file on drop.
fn init_tracing(log_dir: Option<&Path>) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (
                Some(fmt::layer().with_writer(writer).with_ansi(false)),
                Some(guard),
            )
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(file_layer)
        .with(filter)
        .init();

    guard
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let command = match cli::parse_args(&args) {
        Ok(command) => command,
        Err(e) => {
            eprintln!("Error: {}\n\n{}", e, cli::USAGE);
            std::process::exit(2);
        }
    };

    let config = Config::load()?;
    let log_dir = config.cache_dir().ok().map(|dir| dir.join("logs"));
    let guard = init_tracing(log_dir.as_deref());
    info!(?command, "Kazana starting");

    let mut app = App::new(config)?;
    let result = app.run(command).await;
    drop(guard);

    if let Err(e) = result {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
    Ok(())
}
