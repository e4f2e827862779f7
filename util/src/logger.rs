//! Logger initialisation for the mower executables.
//!
//! Log records go to the session log file and, optionally, stdout. Each line
//! is stamped with the number of seconds since the session epoch so that logs
//! can be lined up against the scheduler's millisecond clock.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External imports
use std::str::FromStr;
use log::{self, info};
use fern;
use colored::{ColoredString, Colorize};
use serde::{Deserialize, Serialize};
use thiserror::Error;

// Internal imports
use crate::session;

// Re-exports
pub use log::LevelFilter;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Logging parameters, normally the `[log]` table of the exec's params file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogParams {
    /// Minimum level written to the outputs, e.g. `"debug"`.
    pub level: String,

    /// Also write log records to stdout.
    pub stdout: bool,

    /// Per-target level overrides, used to quieten chatty modules.
    pub target_levels: Vec<TargetLevel>,
}

/// A level override for a single log target (module path).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetLevel {
    pub target: String,
    pub level: String,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Errors associated with initialising the logger.
#[derive(Debug, Error)]
pub enum LoggerInitError {
    #[error("Expected a log level of at least `INFO`, found `{0}`")]
    InvalidMinLogLevel(log::LevelFilter),

    #[error("Unknown log level name `{0}`")]
    UnknownLevelName(String),

    #[error("Error initialising the log file: {0}")]
    LogFileInitError(std::io::Error),

    #[error("An error occured while setting up the logger: {0}")]
    FernInitError(log::SetLoggerError)
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Default for LogParams {
    fn default() -> Self {
        Self {
            level: String::from("debug"),
            stdout: true,
            target_levels: vec![TargetLevel {
                target: String::from("mow_lib::sched"),
                level: String::from("info"),
            }],
        }
    }
}

impl LogParams {
    /// Parse the minimum level name.
    pub fn min_level(&self) -> Result<LevelFilter, LoggerInitError> {
        parse_level(&self.level)
    }
}

// ---------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ---------------------------------------------------------------------------

/// Initialise the logger for this execution.
/// 
/// # Notes
/// 
/// - The minimum level must be `Info` or more verbose, warnings alone are not
///   enough to reconstruct a fault escalation from the log.
/// 
/// # Safety
/// 
/// - This function must only be called once to prevent corrupting logs.
pub fn logger_init(
    params: &LogParams, 
    session: &session::Session
) -> Result<(), LoggerInitError> {

    let min_level = params.min_level()?;

    if min_level < log::Level::Info {
        return Err(LoggerInitError::InvalidMinLogLevel(min_level))
    }

    // Setup the logger using fern's builder pattern
    let mut dispatch = fern::Dispatch::new()
        .format(|out, message, record| {

            // If debug or trace include the target, otherwise don't include it
            if record.level() > log::Level::Info {
                out.finish(format_args!(
                    "[{:10.3} {}] {}: {}",
                    session::get_elapsed_seconds(),
                    level_to_str(record.level()),
                    record.target(),
                    message
                ))
            }
            else {
                out.finish(format_args!(
                    "[{:10.3} {}] {}",
                    session::get_elapsed_seconds(),
                    level_to_str(record.level()),
                    message
                ))
            }

        })
        .level(min_level);

    for t in params.target_levels.iter() {
        dispatch = dispatch.level_for(t.target.clone(), parse_level(&t.level)?);
    }

    if params.stdout {
        dispatch = dispatch.chain(std::io::stdout());
    }

    let log_file = fern::log_file(session.log_file_path.clone())
        .map_err(LoggerInitError::LogFileInitError)?;

    dispatch
        .chain(log_file)
        .apply()
        .map_err(LoggerInitError::FernInitError)?;
    
    info!("Logging initialised");
    info!("    Session epoch: {}", session::get_epoch());
    info!("    Log level: {:?}", min_level);
    info!("    Log file path: {:?}", session.log_file_path);

    Ok(())
}

// ---------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ---------------------------------------------------------------------------

fn parse_level(name: &str) -> Result<LevelFilter, LoggerInitError> {
    LevelFilter::from_str(name)
        .map_err(|_| LoggerInitError::UnknownLevelName(name.to_string()))
}

/// Get the string representation of a log level
fn level_to_str(level: log::Level) -> ColoredString {
    match level {
        log::Level::Trace => "TRC".dimmed().italic(),
        log::Level::Debug => "DBG".dimmed(),
        log::Level::Info  => "INF".normal(),
        log::Level::Warn  => "WRN".yellow(),
        log::Level::Error => "ERR".red().bold()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_level_names() {
        let mut params = LogParams::default();
        assert_eq!(params.min_level().unwrap(), LevelFilter::Debug);

        params.level = String::from("TRACE");
        assert_eq!(params.min_level().unwrap(), LevelFilter::Trace);

        params.level = String::from("loud");
        assert!(matches!(
            params.min_level(),
            Err(LoggerInitError::UnknownLevelName(_))
        ));
    }
}
