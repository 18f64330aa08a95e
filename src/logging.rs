//! Tracing subscriber setup used by the application.

use std::{env, sync::OnceLock};

use tracing_appender::{
    non_blocking,
    non_blocking::NonBlocking,
    rolling::{RollingFileAppender, Rotation},
};
use tracing_subscriber::{
    EnvFilter,
    fmt::{fmt, writer::MakeWriterExt},
};

/// Guard to ensure buffered logs are flushed on shutdown.
static LOG_GUARD: OnceLock<non_blocking::WorkerGuard> = OnceLock::new();

/// Installs the global subscriber.
///
/// `RUST_LOG` filters (default `info`), `LOG_FORMAT=json` switches to JSON
/// lines and `LOG_DIR` adds a daily rolling file next to stdout.
pub fn init() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));
    let file = env::var("LOG_DIR").ok().and_then(init_file_writer);

    let builder = fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_level(true);

    let stdout = std::io::stdout;

    match (json, file) {
        (true, Some(file)) => builder.json().with_writer(stdout.and(file)).init(),
        (true, None) => builder.json().with_writer(stdout).init(),
        (false, Some(file)) => builder
            .with_ansi(false)
            .with_writer(stdout.and(file))
            .init(),
        (false, None) => builder.with_ansi(true).init(),
    }

    tracing::info!(json, "logger initialized");
}

fn init_file_writer(dir: String) -> Option<NonBlocking> {
    let max_files = env::var("LOG_MAX_FILES")
        .ok()
        .and_then(|v| v.parse::<usize>().ok());

    let mut file_builder = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix("riftwatch.log");

    if let Some(n) = max_files {
        file_builder = file_builder.max_log_files(n);
    }

    let file_appender = match file_builder.build(&dir) {
        Ok(appender) => appender,
        Err(e) => {
            eprintln!("failed to create log file in {dir}: {e}, logging to stdout only");
            return None;
        }
    };

    let (file_writer, guard) = non_blocking(file_appender);

    // A second init keeps the first guard alive, which is all that matters.
    let _ = LOG_GUARD.set(guard);

    Some(file_writer)
}
