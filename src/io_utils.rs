use std::fmt;
use std::io;
use std::path::Path;

use crate::error::BurnInError;

#[derive(Debug)]
pub struct CliError {
    pub msg: String,
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.msg.fmt(f)
    }
}

impl std::error::Error for CliError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_deref()
            .map(|e| e as &(dyn std::error::Error + 'static))
    }
}

/// Format a user friendly I/O error message with suggestions.
pub fn format_io_error(operation: &str, path: &Path, err: &io::Error) -> String {
    use io::ErrorKind::*;
    let suggestion = match err.kind() {
        NotFound => "Check that the path exists and is correct.",
        PermissionDenied => "Check permissions or run as a user with device access.",
        UnexpectedEof => "File appears truncated or corrupted.",
        WriteZero => "Disk may be full. Free up space and try again.",
        Other if err.raw_os_error() == Some(28) => "Disk may be full. Free up space and try again.",
        _ if err.raw_os_error() == Some(16) => "Device is busy; make sure it is not mounted.",
        _ => "Check permissions or free up disk space.",
    };
    format!(
        "Error {} '{}': {}. {}",
        operation,
        path.display(),
        err,
        suggestion
    )
}

/// Convert an I/O error into a CLI error with context.
pub fn io_cli_error(operation: &str, path: &Path, err: io::Error) -> CliError {
    CliError {
        msg: format_io_error(operation, path, &err),
        source: Some(Box::new(err)),
    }
}

/// Convert an I/O error into a std::io::Error with context.
pub fn io_error(operation: &str, path: &Path, err: io::Error) -> io::Error {
    io::Error::new(err.kind(), format_io_error(operation, path, &err))
}

/// Simple CLI error from string.
pub fn simple_cli_error(msg: &str) -> CliError {
    CliError {
        msg: msg.to_string(),
        source: None,
    }
}

/// Convert a library error into a CLI error with a hint.
pub fn burnin_cli_error(context: &str, err: BurnInError) -> CliError {
    CliError {
        msg: format!("{}: {}", context, cli_hint(&err)),
        source: Some(Box::new(err)),
    }
}

/// Return an actionable hint for an error variant.
pub fn cli_hint(err: &BurnInError) -> String {
    use BurnInError::*;
    match err {
        Config(msg) => format!("{msg}. Invalid configuration."),
        Device { .. } | ShortTransfer { .. } => format!("{err}. The device will be retried."),
        Integrity { .. } => format!("{err}. The device is corrupting data."),
        DeviceTooSmall { .. } => err.to_string(),
        HistoryDecode { .. } => format!("{err}. Verify the history file is intact."),
        HistoryAppend { .. } | HistoryClosed => format!("{err}. The result was not recorded."),
        Validation(msg) | Discovery(msg) => msg.clone(),
        Io(io) => format!("{io}"),
    }
}
