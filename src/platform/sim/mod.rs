/*!
 * Host Simulation Platform
 *
 * Runs the process core on an ordinary OS: contexts are threads, address
 * spaces are sparse byte maps, executables are registered Rust closures.
 * Fault injection hooks let tests exercise every rollback path.
 */

mod context;
mod loader;
mod space;
mod user;

pub use context::SUPERVISOR_CONTEXT;
pub use space::{SimSpace, UserCode};
pub use user::UserCtx;

use crate::core::errors::KernelPanic;
use crate::core::limits::{
    PAGE_SIZE, USER_SCRATCH_BASE, USER_SCRATCH_PAGES, USER_STACK_PAGES, USER_STACK_TOP,
};
use crate::core::types::{ContextId, ExitCode, UserAddr};
use crate::platform::{
    AddressSpaces, ExecutionContexts, ImageLoader, PlatformError, PlatformResult, TrapFrame,
    TrapHandler, UserAccess,
};
use context::{take_one, SimContexts};
use loader::SimLoader;
use log::{debug, error};
use parking_lot::{Mutex, RwLock};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

/// Exit code reported for a user program that crashed or jumped to no code
pub const FAULT_EXIT_CODE: ExitCode = 255;

/// Host platform
pub struct SimPlatform {
    contexts: SimContexts,
    loader: SimLoader,
    trap: RwLock<Option<Weak<dyn TrapHandler>>>,
    next_space: AtomicU64,
    live_spaces: AtomicUsize,
    fail_as_create: AtomicUsize,
    fail_as_copy: AtomicUsize,
    user_faults: Mutex<Vec<String>>,
}

impl SimPlatform {
    pub fn new() -> Self {
        Self {
            contexts: SimContexts::new(),
            loader: SimLoader::new(),
            trap: RwLock::new(None),
            next_space: AtomicU64::new(1),
            live_spaces: AtomicUsize::new(0),
            fail_as_create: AtomicUsize::new(0),
            fail_as_copy: AtomicUsize::new(0),
            user_faults: Mutex::new(Vec::new()),
        }
    }

    /// Make `program` executable at `path`
    pub fn register_program<F>(&self, path: &str, program: F)
    where
        F: Fn(&mut UserCtx) -> ExitCode + Send + Sync + 'static,
    {
        self.loader.register(path, Arc::new(program));
    }

    /// Create a file at `path` that exists but is not executable
    pub fn register_data(&self, path: &str) {
        self.loader.register_data(path);
    }

    pub fn fail_next_as_create(&self, count: usize) {
        self.fail_as_create.store(count, Ordering::SeqCst);
    }

    pub fn fail_next_as_copy(&self, count: usize) {
        self.fail_as_copy.store(count, Ordering::SeqCst);
    }

    pub fn fail_next_spawns(&self, count: usize) {
        self.contexts.fail_next_spawns(count);
    }

    /// Address spaces created or copied and not yet destroyed
    pub fn live_spaces(&self) -> usize {
        self.live_spaces.load(Ordering::SeqCst)
    }

    /// Join every context; returns descriptions of abnormal terminations,
    /// user program crashes included
    pub fn join_contexts(&self) -> Vec<String> {
        let mut failures = self.contexts.join_all();
        failures.append(&mut self.user_faults.lock());
        failures
    }

    fn new_space_id(&self) -> u64 {
        self.next_space.fetch_add(1, Ordering::Relaxed)
    }

    fn handler(&self) -> Option<Arc<dyn TrapHandler>> {
        self.trap.read().as_ref().and_then(Weak::upgrade)
    }
}

impl Default for SimPlatform {
    fn default() -> Self {
        Self::new()
    }
}

impl AddressSpaces for SimPlatform {
    type Space = SimSpace;

    fn as_create(&self) -> PlatformResult<Arc<SimSpace>> {
        if take_one(&self.fail_as_create) {
            return Err(PlatformError::OutOfMemory);
        }
        let space = SimSpace::new(self.new_space_id());
        space.map_region(USER_SCRATCH_BASE, USER_SCRATCH_PAGES);
        self.live_spaces.fetch_add(1, Ordering::SeqCst);
        debug!("Created address space {}", space.id());
        Ok(Arc::new(space))
    }

    fn as_copy(&self, src: &SimSpace) -> PlatformResult<Arc<SimSpace>> {
        if take_one(&self.fail_as_copy) {
            return Err(PlatformError::OutOfMemory);
        }
        let copy = src.duplicate(self.new_space_id());
        self.live_spaces.fetch_add(1, Ordering::SeqCst);
        debug!("Copied address space {} to {}", src.id(), copy.id());
        Ok(Arc::new(copy))
    }

    fn as_destroy(&self, space: Arc<SimSpace>) {
        self.live_spaces.fetch_sub(1, Ordering::SeqCst);
        debug!("Destroyed address space {}", space.id());
    }

    fn as_activate(&self, space: &Arc<SimSpace>) {
        SimContexts::activate(space);
    }

    fn as_deactivate(&self) {
        SimContexts::deactivate();
    }

    fn as_define_stack(&self, space: &SimSpace) -> PlatformResult<UserAddr> {
        space.map_region(
            USER_STACK_TOP.sub(USER_STACK_PAGES * PAGE_SIZE),
            USER_STACK_PAGES,
        );
        Ok(USER_STACK_TOP)
    }
}

impl UserAccess for SimPlatform {
    fn copy_in(&self, space: &SimSpace, src: UserAddr, len: usize) -> PlatformResult<Vec<u8>> {
        space.read(src, len)
    }

    fn copy_out(&self, space: &SimSpace, dst: UserAddr, bytes: &[u8]) -> PlatformResult<()> {
        space.write(dst, bytes)
    }

    fn copy_in_str(&self, space: &SimSpace, src: UserAddr, max: usize) -> PlatformResult<Vec<u8>> {
        space.read_cstr(src, max)
    }
}

impl ImageLoader for SimPlatform {
    fn load_image(&self, space: &SimSpace, path: &str) -> PlatformResult<UserAddr> {
        self.loader.load(space, path)
    }
}

impl ExecutionContexts for SimPlatform {
    fn current_context(&self) -> ContextId {
        SimContexts::current()
    }

    fn spawn_context(
        &self,
        name: &str,
        entry: Box<dyn FnOnce() + Send + 'static>,
    ) -> PlatformResult<ContextId> {
        self.contexts.spawn(name, entry)
    }

    fn exit_context(&self) -> ! {
        SimContexts::exit()
    }

    fn enter_user(&self, tf: TrapFrame) -> ! {
        let Some(space) = SimContexts::active_space() else {
            panic!("entering user mode with no active address space");
        };
        let Some(handler) = self.handler() else {
            panic!("entering user mode with no trap handler installed");
        };

        let context = SimContexts::current();
        let code = space.code_at(tf.epc);
        let mut ctx = UserCtx::new(handler, context, space, tf);

        let status = match code {
            Some(code) => {
                match panic::catch_unwind(AssertUnwindSafe(|| code(&mut ctx))) {
                    Ok(status) => status,
                    // Context exits and kernel panics are not user faults
                    Err(payload)
                        if SimContexts::is_exit(payload.as_ref())
                            || payload.is::<KernelPanic>() =>
                    {
                        panic::resume_unwind(payload)
                    }
                    Err(_) => {
                        let message = format!(
                            "context {}: user program at {} crashed",
                            context,
                            ctx.registers().epc
                        );
                        error!("{}", message);
                        self.user_faults.lock().push(message);
                        FAULT_EXIT_CODE
                    }
                }
            }
            None => {
                error!("context {}: no code at {}", context, ctx.registers().epc);
                FAULT_EXIT_CODE
            }
        };

        ctx.exit(status)
    }

    fn install_trap_handler(&self, handler: Weak<dyn TrapHandler>) {
        *self.trap.write() = Some(handler);
    }
}
