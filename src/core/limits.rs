/*!
 * System Limits and Constants
 *
 * Centralized location for process-identity limits and user ABI constants.
 */

use super::types::{Pid, UserAddr};
use std::time::Duration;

// =============================================================================
// PROCESS IDENTIFIERS
// =============================================================================

/// Id of the kernel process, which owns the root of the relationship tree
/// Reserved: never handed out by the allocator
pub const KERNEL_PID: Pid = 1;

/// Lowest allocatable process id
pub const PID_MIN: Pid = 2;

/// Highest allocatable process id
pub const PID_MAX: Pid = 32767;

/// Default process-table size (live lifecycle nodes, kernel root excluded)
pub const DEFAULT_MAX_PROCESSES: usize = 256;

// =============================================================================
// IMAGE REPLACEMENT
// =============================================================================

/// Longest path accepted by execv, terminator included
pub const PATH_MAX: usize = 1024;

/// Total bytes of argument strings accepted by execv, terminators included
pub const ARG_MAX: usize = 64 * 1024;

/// Alignment of each argument string on the new user stack
pub const ARGV_ALIGN: usize = 8;

/// Width of a user pointer in the simulated ABI
pub const USER_PTR_SIZE: usize = 8;

// =============================================================================
// SIMULATED USER LAYOUT
// =============================================================================

/// Page size used by the simulated address spaces
pub const PAGE_SIZE: usize = 4096;

/// Top of the user stack
pub const USER_STACK_TOP: UserAddr = UserAddr(0x8000_0000);

/// Pages mapped for the user stack
pub const USER_STACK_PAGES: usize = 32;

/// Base of the per-process scratch region used by user-side syscall stubs
pub const USER_SCRATCH_BASE: UserAddr = UserAddr(0x1000_0000);

/// Pages mapped for the scratch region
pub const USER_SCRATCH_PAGES: usize = 64;

/// Base of the code region where images and fork continuations live
pub const USER_CODE_BASE: UserAddr = UserAddr(0x0040_0000);

/// Bytes between consecutive code entries
pub const CODE_SLOT_SIZE: usize = 0x100;

// =============================================================================
// OBSERVABILITY
// =============================================================================

/// Syscalls slower than this are reported at warn level
/// `waitpid` may block indefinitely and is exempt
pub const SLOW_SYSCALL_THRESHOLD: Duration = Duration::from_millis(10);
