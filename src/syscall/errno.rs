/*!
 * Syscall Error Numbers
 * Stable numeric error codes reported across the user/kernel boundary
 */

use crate::platform::PlatformError;
use crate::process::ProcError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error number returned to user code
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u32)]
#[allow(clippy::upper_case_acronyms)]
pub enum Errno {
    #[error("Function not implemented")]
    ENOSYS = 1,

    #[error("Out of memory")]
    ENOMEM = 3,

    #[error("Bad memory reference")]
    EFAULT = 6,

    #[error("String too long")]
    ENAMETOOLONG = 7,

    #[error("Invalid argument")]
    EINVAL = 8,

    #[error("Too many processes in system")]
    ENPROC = 12,

    #[error("File is not executable")]
    ENOEXEC = 13,

    #[error("Argument list too long")]
    E2BIG = 14,

    #[error("No child processes")]
    ECHILD = 16,

    #[error("No such file or directory")]
    ENOENT = 19,
}

impl Errno {
    const ALL: [Errno; 10] = [
        Errno::ENOSYS,
        Errno::ENOMEM,
        Errno::EFAULT,
        Errno::ENAMETOOLONG,
        Errno::EINVAL,
        Errno::ENPROC,
        Errno::ENOEXEC,
        Errno::E2BIG,
        Errno::ECHILD,
        Errno::ENOENT,
    ];

    #[inline(always)]
    #[must_use]
    pub const fn code(self) -> u32 {
        self as u32
    }

    pub fn from_code(code: u32) -> Option<Self> {
        Self::ALL.into_iter().find(|errno| errno.code() == code)
    }

    /// Symbolic name, for tracing
    pub const fn name(self) -> &'static str {
        match self {
            Errno::ENOSYS => "ENOSYS",
            Errno::ENOMEM => "ENOMEM",
            Errno::EFAULT => "EFAULT",
            Errno::ENAMETOOLONG => "ENAMETOOLONG",
            Errno::EINVAL => "EINVAL",
            Errno::ENPROC => "ENPROC",
            Errno::ENOEXEC => "ENOEXEC",
            Errno::E2BIG => "E2BIG",
            Errno::ECHILD => "ECHILD",
            Errno::ENOENT => "ENOENT",
        }
    }
}

impl From<PlatformError> for Errno {
    fn from(error: PlatformError) -> Self {
        match error {
            PlatformError::OutOfMemory => Errno::ENOMEM,
            PlatformError::Fault { .. } => Errno::EFAULT,
            PlatformError::NameTooLong { .. } => Errno::ENAMETOOLONG,
            PlatformError::NotFound(_) => Errno::ENOENT,
            PlatformError::NotExecutable(_) => Errno::ENOEXEC,
            PlatformError::SpawnFailed(_) => Errno::ENOMEM,
        }
    }
}

impl From<ProcError> for Errno {
    fn from(error: ProcError) -> Self {
        match error {
            ProcError::PidsExhausted { .. } | ProcError::TableFull { .. } => Errno::ENPROC,
            ProcError::NoSuchChild(_) => Errno::ECHILD,
        }
    }
}
