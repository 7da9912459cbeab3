/*!
 * Core Types
 * Common types used across the kernel
 */

use serde::{Deserialize, Serialize};
use std::fmt;

/// Process ID type
pub type Pid = u32;

/// Exit code reported by `_exit` and observed by `waitpid`
pub type ExitCode = i32;

/// Execution context identifier (one per process, plus the supervisor)
pub type ContextId = u64;

/// Common result type for kernel operations
pub type KernelResult<T> = Result<T, super::errors::KernelError>;

/// Address in a user address space
///
/// Never dereferenced by the kernel directly; every access goes through the
/// platform's user-memory copy routines.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct UserAddr(pub usize);

impl UserAddr {
    pub const NULL: UserAddr = UserAddr(0);

    #[inline(always)]
    #[must_use]
    pub const fn is_null(self) -> bool {
        self.0 == 0
    }

    #[inline]
    #[must_use]
    pub const fn add(self, bytes: usize) -> Self {
        UserAddr(self.0.wrapping_add(bytes))
    }

    #[inline]
    #[must_use]
    pub const fn sub(self, bytes: usize) -> Self {
        UserAddr(self.0.wrapping_sub(bytes))
    }

    #[inline]
    #[must_use]
    pub const fn as_usize(self) -> usize {
        self.0
    }
}

impl fmt::Display for UserAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

impl From<usize> for UserAddr {
    fn from(addr: usize) -> Self {
        UserAddr(addr)
    }
}

/// Round `len` up to a multiple of `align` (power of two)
#[inline]
#[must_use]
pub const fn round_up(len: usize, align: usize) -> usize {
    (len + align - 1) & !(align - 1)
}
