//! Configures logging for the command line driver.
use std::fs::File;
use std::io::Write;
use std::path::PathBuf;

use env_logger::{Builder, Target};
use log::{trace, LevelFilter};
use time::OffsetDateTime;

/// Maps the number of `-v` flags to a level.
///
/// 0 only reports faults, 1 adds scan overruns, 2 adds mode changes,
/// 3 adds one line per scan and 4 traces every instruction.
fn level_for(verbosity: u8) -> Result<LevelFilter, String> {
    match verbosity {
        0 => Ok(LevelFilter::Error),
        1 => Ok(LevelFilter::Warn),
        2 => Ok(LevelFilter::Info),
        3 => Ok(LevelFilter::Debug),
        4 => Ok(LevelFilter::Trace),
        _ => Err(format!(
            "Verbosity {verbosity} is not supported, the most is -vvvv"
        )),
    }
}

/// Installs the global logger. Output goes to stderr unless `log_file`
/// names a file to create.
pub fn configure(verbosity: u8, log_file: Option<PathBuf>) -> Result<(), String> {
    let log_level = level_for(verbosity)?;

    let mut builder = Builder::new();

    if let Some(path) = log_file {
        let file = File::create(&path)
            .map_err(|e| format!("Unable to create log file {}. {}", path.display(), e))?;
        builder.target(Target::Pipe(Box::new(file)));
    }

    builder
        .format(|buf, record| {
            writeln!(
                buf,
                "[{} {}:{} {:?}] {}",
                record.level(),
                record.file().unwrap_or("unknown"),
                record.line().unwrap_or(0),
                OffsetDateTime::now_utc(),
                record.args()
            )
        })
        .filter_level(log_level)
        .try_init()
        .map_err(|e| format!("Unable to install logger. {e}"))?;

    trace!("Logger verbosity {log_level}");

    Ok(())
}
