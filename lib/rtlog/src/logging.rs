use std::path::Path;

use slog::Drain;
use sloggers::terminal::{Destination, TerminalLoggerBuilder};
use sloggers::types::Severity;
use sloggers::Build;

use crate::level::Level;

/// Builds the root logger for a node process.
///
/// Every binary (`dispatcher`, `game`, `gate`) calls this once at startup with the level parsed
/// from `-log` and a component name used as the top level `component` key on every record, then
/// derives per-module loggers from it with `log.new(o!(...))`.
pub fn init(component: &'static str, level: Level) -> slog::Logger {
    let mut builder = TerminalLoggerBuilder::new();
    builder.level(to_severity(level));
    builder.destination(Destination::Stderr);

    let drain = builder
        .build()
        .expect("failed to construct terminal logger")
        .fuse();

    slog::Logger::root(drain, slog::o!("component" => component))
}

/// Same as `init`, but also duplicates every record into a rotating log file. Used when a node
/// is started with `-d` (daemonized) and stderr is no longer attached to a terminal.
pub fn init_with_file(
    component: &'static str,
    level: Level,
    log_path: &Path,
) -> std::io::Result<slog::Logger> {
    use sloggers::file::FileLoggerBuilder;

    let mut file_builder = FileLoggerBuilder::new(log_path);
    file_builder.level(to_severity(level));
    let file_drain = file_builder
        .build()
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))?
        .fuse();

    let mut term_builder = TerminalLoggerBuilder::new();
    term_builder.level(to_severity(level));
    term_builder.destination(Destination::Stderr);
    let term_drain = term_builder
        .build()
        .expect("failed to construct terminal logger")
        .fuse();

    let drain = slog::Duplicate::new(file_drain, term_drain).fuse();
    let drain = slog_async::Async::new(drain).build().fuse();

    Ok(slog::Logger::root(drain, slog::o!("component" => component)))
}

fn to_severity(level: Level) -> Severity {
    match level {
        Level::Debug => Severity::Debug,
        Level::Info => Severity::Info,
        Level::Warn => Severity::Warning,
        Level::Error => Severity::Error,
        Level::Panic | Level::Fatal => Severity::Critical,
    }
}
