/*!
 * Trap Frames
 * Saved user register state at a syscall boundary
 */

use crate::core::types::{ContextId, UserAddr};
use serde::{Deserialize, Serialize};

/// Size of the syscall instruction; the saved pc is advanced past it on return
pub const SYSCALL_INSN_SIZE: usize = 4;

/// User register state captured when a context traps into the kernel
///
/// `args` doubles as the argument registers on user entry: `argc` and `argv`
/// travel in `args[0]` and `args[1]`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrapFrame {
    pub callno: usize,
    pub args: [usize; 4],
    /// Return value register
    pub retval: i64,
    /// Non-zero when the syscall failed; holds the error number
    pub errno: u32,
    pub epc: UserAddr,
    pub sp: UserAddr,
}

impl TrapFrame {
    /// Frame for a syscall issued at `epc`
    pub fn syscall(callno: usize, args: [usize; 4], epc: UserAddr, sp: UserAddr) -> Self {
        Self {
            callno,
            args,
            epc,
            sp,
            ..Self::default()
        }
    }

    /// Frame for entering a fresh image at `entry`
    pub fn user_entry(entry: UserAddr, sp: UserAddr, argc: usize, argv: UserAddr) -> Self {
        Self {
            args: [argc, argv.as_usize(), 0, 0],
            epc: entry,
            sp,
            ..Self::default()
        }
    }

    #[inline]
    pub fn set_return(&mut self, value: i64) {
        self.retval = value;
        self.errno = 0;
    }

    #[inline]
    pub fn set_error(&mut self, errno: u32) {
        self.retval = -1;
        self.errno = errno;
    }

    /// Step the saved pc past the syscall instruction
    #[inline]
    pub fn advance(&mut self) {
        self.epc = self.epc.add(SYSCALL_INSN_SIZE);
    }

    #[inline]
    pub fn failed(&self) -> bool {
        self.errno != 0
    }
}

/// Kernel entry point for traps raised by user code
pub trait TrapHandler: Send + Sync {
    /// Handle a syscall trap from `context`, leaving results in `tf`
    ///
    /// Syscalls that never return (exit, successful image replacement) do not
    /// come back from this call.
    fn syscall(&self, context: ContextId, tf: &mut TrapFrame);
}
