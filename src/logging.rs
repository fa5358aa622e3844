//! Ambient diagnostics, initialized once at startup.
//!
//! Uses `tracing-appender`'s non-blocking writer so that emitting a log event
//! never blocks the reactor thread, the idiomatic replacement for the
//! source's bespoke `BlockDeque`-backed async logger (explicitly not
//! reimplemented here; see DESIGN.md).

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

/// Initializes the global `tracing` subscriber to write to stdout through a
/// non-blocking writer. The returned guard must be held for the lifetime of
/// the process; dropping it stops flushing queued records.
pub fn init(log_level: &str) -> WorkerGuard {
    let (writer, guard) = tracing_appender::non_blocking(std::io::stdout());
    let filter = EnvFilter::try_new(log_level).unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_target(false)
        .init();

    guard
}

/// Like [`init`], but rolls output daily under `dir/<prefix>.YYYY-MM-DD`
/// instead of writing to stdout. Mirrors the source's "by day" log rotation
/// without its hand-rolled line-count rollover (left out; see DESIGN.md).
pub fn init_to_file(log_level: &str, dir: &std::path::Path, prefix: &str) -> WorkerGuard {
    let appender = tracing_appender::rolling::daily(dir, prefix);
    let (writer, guard) = tracing_appender::non_blocking(appender);
    let filter = EnvFilter::try_new(log_level).unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(false)
        .with_target(false)
        .init();

    guard
}
