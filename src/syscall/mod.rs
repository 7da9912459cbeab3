/*!
 * Syscall Module
 *
 * The process syscalls (fork, getpid, waitpid, _exit, execv) and the trap
 * dispatcher that decodes them from a trap frame.
 */

mod dispatch;
pub mod errno;
mod execv;
mod exit;
mod fork;
mod getpid;
pub mod status;
mod wait;

pub use errno::Errno;
pub use execv::PreparedImage;
pub use status::{mkwait_exit, WaitStatus};

use serde::{Deserialize, Serialize};

/// Syscall numbers of the trap ABI
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(usize)]
pub enum SyscallNumber {
    Fork = 0,
    Execv = 2,
    Exit = 3,
    Waitpid = 4,
    Getpid = 5,
}

impl SyscallNumber {
    pub const fn name(self) -> &'static str {
        match self {
            SyscallNumber::Fork => "fork",
            SyscallNumber::Execv => "execv",
            SyscallNumber::Exit => "_exit",
            SyscallNumber::Waitpid => "waitpid",
            SyscallNumber::Getpid => "getpid",
        }
    }
}

impl TryFrom<usize> for SyscallNumber {
    type Error = Errno;

    fn try_from(callno: usize) -> Result<Self, Self::Error> {
        match callno {
            0 => Ok(SyscallNumber::Fork),
            2 => Ok(SyscallNumber::Execv),
            3 => Ok(SyscallNumber::Exit),
            4 => Ok(SyscallNumber::Waitpid),
            5 => Ok(SyscallNumber::Getpid),
            _ => Err(Errno::ENOSYS),
        }
    }
}
