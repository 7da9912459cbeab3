/*!
 * Process Lifecycle Kernel Library
 * Process identity, relationship tree and exit/wait rendezvous
 */

pub mod core;
pub mod kernel;
pub mod monitoring;
pub mod platform;
pub mod process;
pub mod syscall;

// Re-exports
pub use crate::core::{ConfigError, KernelConfig, KernelError, ReclaimPolicy, WakeStrategy};
pub use crate::core::{ContextId, ExitCode, KernelResult, Pid, UserAddr};
pub use kernel::{Kernel, KernelBuilder, ProcessRef};
pub use monitoring::{init_tracing, SyscallSpan};
pub use platform::sim::{SimPlatform, UserCtx, FAULT_EXIT_CODE};
pub use platform::{Platform, PlatformError, TrapFrame, TrapHandler};
pub use process::{NodeSnapshot, NodeState, ProcError, TableStats};
pub use syscall::{Errno, SyscallNumber, WaitStatus};
