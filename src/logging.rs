//! Tracing configuration and log routing.
//!
//! Chat turns and ingestion runs log to stdout with a compact formatter and to a file. When
//! `MEDCHAT_LOG_FILE` is set, logs are appended to that path (`off` disables the file sink);
//! otherwise a daily-rotated `logs/medchat.log.<date>` is written. The file sink goes through a
//! non-blocking writer.
use std::fs::OpenOptions;
use std::io::Write;
use std::sync::OnceLock;

use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

static LOG_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

const LOG_FILE_ENV: &str = "MEDCHAT_LOG_FILE";
const DEFAULT_LOG_DIR: &str = "logs";
const DEFAULT_LOG_FILE: &str = "medchat.log";

/// Install the stdout and file subscribers.
///
/// `RUST_LOG` controls filtering (default `info`). The CLI passes `quiet = true` so the REPL
/// transcript is not interleaved with log lines; file logging stays on either way.
pub fn init_tracing(quiet: bool) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let stdout_layer = (!quiet).then(|| fmt::layer().with_target(false).compact());

    let registry = tracing_subscriber::registry()
        .with(env_filter)
        .with(stdout_layer);

    if let Some(writer) = configure_file_writer() {
        let file_layer = fmt::layer()
            .with_writer(writer)
            .with_target(true)
            .with_ansi(false)
            .compact();

        registry.with(file_layer).init();
    } else {
        registry.init();
    }
}

/// Build the non-blocking file writer, or `None` when file logging is off or unavailable.
fn configure_file_writer() -> Option<NonBlocking> {
    let writer: Box<dyn Write + Send> = match std::env::var(LOG_FILE_ENV) {
        Ok(path) if path.trim().eq_ignore_ascii_case("off") => return None,
        Ok(path) => match OpenOptions::new().create(true).append(true).open(&path) {
            Ok(file) => Box::new(file),
            Err(err) => {
                eprintln!("Failed to open log file {path}: {err}");
                return None;
            }
        },
        Err(_) => {
            if let Err(err) = std::fs::create_dir_all(DEFAULT_LOG_DIR) {
                eprintln!("Failed to create {DEFAULT_LOG_DIR} directory: {err}");
                return None;
            }
            Box::new(tracing_appender::rolling::daily(
                DEFAULT_LOG_DIR,
                DEFAULT_LOG_FILE,
            ))
        }
    };

    let (non_blocking, guard) = tracing_appender::non_blocking(writer);
    let _ = LOG_GUARD.set(guard);
    Some(non_blocking)
}
