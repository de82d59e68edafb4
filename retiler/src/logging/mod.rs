//! Logging setup.
//!
//! One call wires the process-wide subscriber: a non-blocking file writer
//! plus stdout, both behind an `EnvFilter` that defaults to `info` and
//! honors `RUST_LOG`. The previous session's log file is truncated on
//! startup.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Keeps the non-blocking file writer alive.
///
/// Dropping the guard flushes and closes the log file.
pub struct LoggingGuard {
    _file_guard: WorkerGuard,
}

pub fn default_log_dir() -> &'static str {
    "logs"
}

pub fn default_log_file() -> &'static str {
    "retiler.log"
}

/// Truncates (or creates) the session log file, creating the directory as
/// needed.
fn prepare_log_file(log_dir: &str, log_file: &str) -> io::Result<PathBuf> {
    fs::create_dir_all(log_dir)?;
    let path = Path::new(log_dir).join(log_file);
    fs::write(&path, "")?;
    Ok(path)
}

/// Initializes the global subscriber with file and stdout output.
///
/// The returned guard must stay alive for as long as file logging should
/// keep flushing.
///
/// # Errors
///
/// I/O errors from creating the log directory or truncating the file.
pub fn init_logging(log_dir: &str, log_file: &str) -> Result<LoggingGuard, io::Error> {
    prepare_log_file(log_dir, log_file)?;

    let file_appender = tracing_appender::rolling::never(log_dir, log_file);
    let (non_blocking_file, file_guard) = tracing_appender::non_blocking(file_appender);

    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(non_blocking_file)
        .with_ansi(false);
    let stdout_layer = tracing_subscriber::fmt::layer().with_writer(io::stdout);

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(stdout_layer)
        .init();

    Ok(LoggingGuard {
        _file_guard: file_guard,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    // The global subscriber installs once per process, so tests cover the
    // file preparation; the full init path is exercised by the CLI.

    #[test]
    fn test_default_paths() {
        assert_eq!(default_log_dir(), "logs");
        assert_eq!(default_log_file(), "retiler.log");
    }

    #[test]
    fn test_prepare_creates_nested_directories() {
        let root = tempfile::tempdir().expect("tempdir");
        let dir = root.path().join("deep").join("nested");
        let dir = dir.to_str().expect("utf-8 path");

        let path = prepare_log_file(dir, "session.log").expect("prepare");
        assert!(path.exists());
        assert_eq!(fs::read_to_string(&path).expect("read"), "");
    }

    #[test]
    fn test_prepare_truncates_previous_session() {
        let root = tempfile::tempdir().expect("tempdir");
        let dir = root.path().to_str().expect("utf-8 path");
        let stale = root.path().join("session.log");
        fs::write(&stale, "previous session").expect("seed");

        let path = prepare_log_file(dir, "session.log").expect("prepare");
        assert_eq!(path, stale);
        assert_eq!(fs::read_to_string(&path).expect("read"), "");
    }
}
