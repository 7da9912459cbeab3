/*!
 * Error Types
 * Centralized error handling with thiserror and miette
 */

use super::types::Pid;
use miette::Diagnostic;
use thiserror::Error;

pub use crate::platform::PlatformError;
pub use crate::process::ProcError;
pub use crate::syscall::Errno;

/// Configuration errors
#[derive(Error, Debug, Clone, PartialEq, Eq, Diagnostic)]
pub enum ConfigError {
    #[error("Cannot read config file {path}: {reason}")]
    #[diagnostic(
        code(config::io),
        help("Check that KERNEL_CONFIG points to a readable JSON file.")
    )]
    Io { path: String, reason: String },

    #[error("Malformed config: {0}")]
    #[diagnostic(code(config::parse), help("The config file must be a JSON object."))]
    Parse(String),

    #[error("Invalid value for {key}: {value}")]
    #[diagnostic(code(config::invalid_value))]
    InvalidValue { key: &'static str, value: String },

    #[error("Empty pid range: {min}..={max}")]
    #[diagnostic(code(config::empty_pid_range), help("pid_max must be >= pid_min."))]
    EmptyPidRange { min: Pid, max: Pid },

    #[error("pid_min {pid_min} overlaps reserved kernel pid {reserved}")]
    #[diagnostic(
        code(config::reserved_pid),
        help("The kernel process owns the lowest id; start the range above it.")
    )]
    ReservedPid { pid_min: Pid, reserved: Pid },

    #[error("Process table of {max_processes} entries does not fit a pid range of {range}")]
    #[diagnostic(
        code(config::table_size),
        help("max_processes must be between 1 and the number of allocatable ids.")
    )]
    TableSize { max_processes: usize, range: usize },
}

/// Unified kernel error type with miette diagnostics
#[derive(Error, Debug, Diagnostic)]
pub enum KernelError {
    #[error("Configuration error: {0}")]
    #[diagnostic(transparent)]
    Config(#[from] ConfigError),

    #[error("Process table error: {0}")]
    #[diagnostic(
        code(kernel::process),
        help("The process table rejected the operation. See logs for the table state.")
    )]
    Process(#[from] ProcError),

    #[error("Platform error: {0}")]
    #[diagnostic(
        code(kernel::platform),
        help("An address-space, context or loader operation failed.")
    )]
    Platform(#[from] PlatformError),

    #[error("Syscall failed: {0}")]
    #[diagnostic(code(kernel::syscall))]
    Syscall(#[from] Errno),
}

/// Unwind payload raised by `kernel_panic!`
///
/// Distinct from ordinary panic payloads so a platform running user code
/// under `catch_unwind` can tell a kernel halt from a user program crash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KernelPanic(pub String);

impl std::fmt::Display for KernelPanic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "kernel panic: {}", self.0)
    }
}

/// Halt on an internal invariant violation
///
/// The relationship tree cannot be trusted after one of these, so there is
/// nothing to unwind to: log the diagnostic and panic with a `KernelPanic`.
#[macro_export]
macro_rules! kernel_panic {
    ($($arg:tt)*) => {{
        let message = format!($($arg)*);
        log::error!("kernel panic: {}", message);
        std::panic::panic_any($crate::core::errors::KernelPanic(message))
    }};
}
