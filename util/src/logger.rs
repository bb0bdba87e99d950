//! # Logger
//!
//! Terminal and session log file output. The terminal gets coloured level
//! tags, the log file plain ones.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External imports
use colored::{ColoredString, Colorize};
use log::{info, Level};
use std::fmt::{self, Display};
use thiserror::Error;

// Internal imports
use crate::session::{self, Session};

// Re-exports
pub use log::LevelFilter;

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Targets which log on every tick, capped at these levels.
const PER_TICK_TARGETS: [(&str, LevelFilter); 2] = [
    ("swerve_lib::hal::sim", LevelFilter::Info),
    ("swerve_lib::telemetry", LevelFilter::Info),
];

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Errors associated with initialising the logger.
#[derive(Debug, Error)]
pub enum LoggerInitError {
    #[error("Expected a log level of at least `INFO`, found `{0}`")]
    InvalidMinLogLevel(LevelFilter),

    #[error("Error initialising the log file: {0}")]
    LogFileInitError(std::io::Error),

    #[error("An error occured while setting up the logger: {0}")]
    FernInitError(log::SetLoggerError)
}

// ---------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ---------------------------------------------------------------------------

/// Initialise the logger for this execution.
///
/// `min_level` must be `Info` or more verbose. Must only be called once.
pub fn logger_init(
    min_level: LevelFilter,
    session: &Session
) -> Result<(), LoggerInitError> {

    if min_level < Level::Info {
        return Err(LoggerInitError::InvalidMinLogLevel(min_level))
    }

    let log_file = fern::log_file(&session.log_file_path)
        .map_err(LoggerInitError::LogFileInitError)?;

    let terminal = fern::Dispatch::new()
        .format(|out, message, record| out.finish(format_args!(
            "{}",
            format_line(
                session::get_elapsed_seconds(),
                coloured_tag(record.level()),
                record.level(),
                record.target(),
                message
            )
        )))
        .chain(std::io::stdout());

    let file = fern::Dispatch::new()
        .format(|out, message, record| out.finish(format_args!(
            "{}",
            format_line(
                session::get_elapsed_seconds(),
                plain_tag(record.level()),
                record.level(),
                record.target(),
                message
            )
        )))
        .chain(log_file);

    let mut root = fern::Dispatch::new().level(min_level);
    for (target, level) in PER_TICK_TARGETS.iter() {
        root = root.level_for(*target, *level);
    }

    root.chain(terminal)
        .chain(file)
        .apply()
        .map_err(LoggerInitError::FernInitError)?;

    info!("Logging initialised");
    if let Some(epoch) = session::get_epoch() {
        info!("    Session epoch: {}", epoch);
    }
    info!("    Log level: {:?}", min_level);
    info!("    Log file path: {:?}", session.log_file_path);

    Ok(())
}

// ---------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ---------------------------------------------------------------------------

/// Format one log line. Debug and trace lines include the target.
fn format_line<T: Display>(
    elapsed_s: f64,
    tag: T,
    level: Level,
    target: &str,
    message: &fmt::Arguments
) -> String {
    if level > Level::Info {
        format!("[{:10.6} {}] {}: {}", elapsed_s, tag, target, message)
    }
    else {
        format!("[{:10.6} {}] {}", elapsed_s, tag, message)
    }
}

fn plain_tag(level: Level) -> &'static str {
    match level {
        Level::Trace => "TRC",
        Level::Debug => "DBG",
        Level::Info  => "INF",
        Level::Warn  => "WRN",
        Level::Error => "ERR"
    }
}

fn coloured_tag(level: Level) -> ColoredString {
    let tag = plain_tag(level);

    match level {
        Level::Trace => tag.dimmed().italic(),
        Level::Debug => tag.dimmed(),
        Level::Info  => tag.normal(),
        Level::Warn  => tag.yellow(),
        Level::Error => tag.red().bold()
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_format_line() {
        assert_eq!(
            format_line(1.5, plain_tag(Level::Info), Level::Info, "swerve_exec", &format_args!("Started")),
            "[  1.500000 INF] Started"
        );
        assert_eq!(
            format_line(
                0.02,
                plain_tag(Level::Debug),
                Level::Debug,
                "swerve_lib::module_ctrl",
                &format_args!("heading {}", 10)
            ),
            "[  0.020000 DBG] swerve_lib::module_ctrl: heading 10"
        );
    }
}
