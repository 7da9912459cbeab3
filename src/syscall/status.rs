/*!
 * Wait Status Encoding
 * The status word `waitpid` writes for an exited child
 */

use crate::core::types::ExitCode;
use serde::{Deserialize, Serialize};

/// Low two bits of a status word: how the process ended
const WAIT_HOW_MASK: i32 = 0b11;
const WAIT_EXITED: i32 = 0;

/// Encode a normal exit with `code`
#[inline]
#[must_use]
pub const fn mkwait_exit(code: ExitCode) -> i32 {
    (code << 2) | WAIT_EXITED
}

/// Decoded `waitpid` status word
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WaitStatus(i32);

impl WaitStatus {
    #[inline]
    pub const fn exited_with(code: ExitCode) -> Self {
        Self(mkwait_exit(code))
    }

    #[inline]
    pub const fn from_raw(raw: i32) -> Self {
        Self(raw)
    }

    #[inline]
    pub const fn raw(self) -> i32 {
        self.0
    }

    /// The process ended through `_exit`
    #[inline]
    pub const fn exited(self) -> bool {
        self.0 & WAIT_HOW_MASK == WAIT_EXITED
    }

    /// Code passed to `_exit`; meaningful when `exited()`
    #[inline]
    pub const fn exit_status(self) -> ExitCode {
        self.0 >> 2
    }
}
