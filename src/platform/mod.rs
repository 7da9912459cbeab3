/*!
 * Platform Module
 *
 * Collaborators the process core consumes through narrow contracts:
 * address spaces, user-memory copies, image loading and execution contexts.
 * The kernel is generic over `Platform`; `sim` is the host implementation.
 */

pub mod sim;
pub mod trap;

use crate::core::limits::USER_PTR_SIZE;
use crate::core::types::{ContextId, UserAddr};
use std::sync::{Arc, Weak};
use thiserror::Error;

pub use trap::{TrapFrame, TrapHandler, SYSCALL_INSN_SIZE};

/// Platform operation result
pub type PlatformResult<T> = Result<T, PlatformError>;

/// Collaborator failures
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PlatformError {
    #[error("Out of memory")]
    OutOfMemory,

    #[error("Bad user address {addr}")]
    Fault { addr: UserAddr },

    #[error("String longer than {max} bytes")]
    NameTooLong { max: usize },

    #[error("No such file: {0}")]
    NotFound(String),

    #[error("Not an executable: {0}")]
    NotExecutable(String),

    #[error("Cannot spawn execution context: {0}")]
    SpawnFailed(String),
}

/// Address-space management
pub trait AddressSpaces: Send + Sync + 'static {
    type Space: Send + Sync + 'static;

    /// Create an empty address space
    fn as_create(&self) -> PlatformResult<Arc<Self::Space>>;

    /// Duplicate `src`, contents included
    fn as_copy(&self, src: &Self::Space) -> PlatformResult<Arc<Self::Space>>;

    /// Tear down a space no context will run in again
    fn as_destroy(&self, space: Arc<Self::Space>);

    /// Make `space` the one the calling context runs in
    fn as_activate(&self, space: &Arc<Self::Space>);

    fn as_deactivate(&self);

    /// Map the user stack, returning the initial stack pointer
    fn as_define_stack(&self, space: &Self::Space) -> PlatformResult<UserAddr>;
}

/// Copies between kernel buffers and a user address space
pub trait UserAccess: AddressSpaces {
    fn copy_in(&self, space: &Self::Space, src: UserAddr, len: usize) -> PlatformResult<Vec<u8>>;

    fn copy_out(&self, space: &Self::Space, dst: UserAddr, bytes: &[u8]) -> PlatformResult<()>;

    /// Copy in a NUL-terminated string of at most `max` bytes, terminator
    /// included; the terminator is not returned
    fn copy_in_str(&self, space: &Self::Space, src: UserAddr, max: usize)
        -> PlatformResult<Vec<u8>>;

    /// Copy out `bytes` followed by a NUL terminator
    fn copy_out_str(&self, space: &Self::Space, dst: UserAddr, bytes: &[u8]) -> PlatformResult<()> {
        let mut buf = Vec::with_capacity(bytes.len() + 1);
        buf.extend_from_slice(bytes);
        buf.push(0);
        self.copy_out(space, dst, &buf)
    }

    fn copy_in_ptr(&self, space: &Self::Space, src: UserAddr) -> PlatformResult<UserAddr> {
        let raw = self.copy_in(space, src, USER_PTR_SIZE)?;
        let mut word = [0u8; USER_PTR_SIZE];
        word.copy_from_slice(&raw);
        Ok(UserAddr(u64::from_le_bytes(word) as usize))
    }

    fn copy_out_ptr(&self, space: &Self::Space, dst: UserAddr, ptr: UserAddr) -> PlatformResult<()> {
        self.copy_out(space, dst, &(ptr.as_usize() as u64).to_le_bytes())
    }

    fn copy_out_i32(&self, space: &Self::Space, dst: UserAddr, value: i32) -> PlatformResult<()> {
        self.copy_out(space, dst, &value.to_le_bytes())
    }
}

/// Executable image loading
pub trait ImageLoader: AddressSpaces {
    /// Load the image at `path` into `space`, returning its entry point
    fn load_image(&self, space: &Self::Space, path: &str) -> PlatformResult<UserAddr>;
}

/// Execution contexts and user-mode entry
pub trait ExecutionContexts: Send + Sync + 'static {
    /// Context the caller is running on
    fn current_context(&self) -> ContextId;

    /// Start a new context running `entry`
    fn spawn_context(
        &self,
        name: &str,
        entry: Box<dyn FnOnce() + Send + 'static>,
    ) -> PlatformResult<ContextId>;

    /// Terminate the calling context
    fn exit_context(&self) -> !;

    /// Drop to user mode with the given register state
    fn enter_user(&self, tf: TrapFrame) -> !;

    /// Route user traps to `handler`
    fn install_trap_handler(&self, handler: Weak<dyn TrapHandler>);
}

/// Everything the process core needs from the machine
pub trait Platform: UserAccess + ImageLoader + ExecutionContexts {}

impl<T> Platform for T where T: UserAccess + ImageLoader + ExecutionContexts {}
